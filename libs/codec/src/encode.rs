//! Graph → text.

use std::collections::HashMap;

use serde_json::{json, Map, Number};

use crate::error::{render_path, CodecError};
use crate::value::Value;

pub(crate) const ID: &str = "$id";
pub(crate) const REF: &str = "$ref";
pub(crate) const OBJ: &str = "$obj";
pub(crate) const ARR: &str = "$arr";
pub(crate) const FN: &str = "$fn";

/// Serialize a value graph to text.
///
/// Cycles and shared containers are emitted once and referenced afterwards.
/// Functions are emitted as their source text.
pub fn serialize(value: &Value) -> Result<String, CodecError> {
    let mut encoder = Encoder::default();
    let mut path = Vec::new();
    let tree = encoder.encode(value, &mut path)?;
    Ok(serde_json::to_string(&tree)?)
}

#[derive(Default)]
struct Encoder {
    /// Container address → assigned id.
    seen: HashMap<usize, u64>,
    next_id: u64,
}

impl Encoder {
    /// Returns the existing id, or assigns a new one and reports it as fresh.
    fn visit(&mut self, addr: usize) -> (u64, bool) {
        if let Some(id) = self.seen.get(&addr) {
            return (*id, false);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.seen.insert(addr, id);
        (id, true)
    }

    fn encode(
        &mut self,
        value: &Value,
        path: &mut Vec<String>,
    ) -> Result<serde_json::Value, CodecError> {
        Ok(match value {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| CodecError::Unrepresentable {
                    path: render_path(path),
                    detail: format!("non-finite float {}", f),
                })?,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Callback(c) => json!({ FN: c.source() }),
            Value::Code(c) => json!({ FN: c.as_str() }),
            Value::Array(array) => {
                let (id, fresh) = self.visit(array.addr());
                if !fresh {
                    return Ok(json!({ REF: id }));
                }
                let items = array.items();
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    path.push(index.to_string());
                    out.push(self.encode(item, path)?);
                    path.pop();
                }
                json!({ ID: id, ARR: out })
            }
            Value::Object(object) => {
                let (id, fresh) = self.visit(object.addr());
                if !fresh {
                    return Ok(json!({ REF: id }));
                }
                let mut out = Map::new();
                for (key, item) in object.entries() {
                    path.push(key.clone());
                    let encoded = self.encode(&item, path)?;
                    path.pop();
                    out.insert(key, encoded);
                }
                json!({ ID: id, OBJ: out })
            }
        })
    }
}
