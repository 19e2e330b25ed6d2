//! Structural comparison of value graphs.

use std::collections::HashMap;

use crate::value::Value;

/// Compare two graphs by shape.
///
/// Scalars compare by value, containers by contents, and function-like
/// values by source text (a [`Callback`](crate::Callback) equals a
/// [`CodeBlob`](crate::CodeBlob) with the same text). Containers must pair
/// one to one between the two sides, so cycles terminate and sharing on one
/// side must be mirrored on the other. The relation is symmetric.
pub fn shape_eq(a: &Value, b: &Value) -> bool {
    eq_inner(a, b, &mut Pairing::default())
}

/// Container identities matched so far, in both directions.
#[derive(Default)]
struct Pairing {
    left: HashMap<usize, usize>,
    right: HashMap<usize, usize>,
}

impl Pairing {
    /// `Some(consistent)` when either side was seen before, `None` for a
    /// fresh pair (which is then recorded).
    fn check(&mut self, x: usize, y: usize) -> Option<bool> {
        match (self.left.get(&x), self.right.get(&y)) {
            (None, None) => {
                self.left.insert(x, y);
                self.right.insert(y, x);
                None
            }
            (Some(&paired_y), Some(&paired_x)) => Some(paired_y == y && paired_x == x),
            _ => Some(false),
        }
    }
}

fn eq_inner(a: &Value, b: &Value, pairs: &mut Pairing) -> bool {
    if let (Some(left), Some(right)) = (a.function_source(), b.function_source()) {
        return left == right;
    }

    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            if let Some(consistent) = pairs.check(x.addr(), y.addr()) {
                return consistent;
            }
            let (left, right) = (x.items(), y.items());
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right.iter())
                    .all(|(l, r)| eq_inner(l, r, pairs))
        }
        (Value::Object(x), Value::Object(y)) => {
            if let Some(consistent) = pairs.check(x.addr(), y.addr()) {
                return consistent;
            }
            let (left, right) = (x.entries(), y.entries());
            left.len() == right.len()
                && left
                    .iter()
                    .zip(right.iter())
                    .all(|((lk, lv), (rk, rv))| lk == rk && eq_inner(lv, rv, pairs))
        }
        _ => false,
    }
}
