//! Dynamic value model for shared state snapshots.
//!
//! Arrays and objects are reference-counted, interior-mutable nodes so that a
//! graph can point back at itself (`a.self = a`). Cloning a [`Value`] clones
//! the handle for containers, not the contents.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{render_path, CodecError};

// =============================================================================
// Values
// =============================================================================

/// A node in an object graph.
#[derive(Clone, Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Array),
    Object(Object),
    /// An executable function carrying its textual representation.
    Callback(Callback),
    /// Function text received from another process. Not executable.
    Code(CodeBlob),
}

impl Value {
    /// Convert an acyclic JSON tree into a value graph.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => {
                Value::Array(Array::from_vec(items.iter().map(Value::from_json).collect()))
            }
            serde_json::Value::Object(map) => {
                let object = Object::new();
                for (key, value) in map {
                    object.insert(key.clone(), Value::from_json(value));
                }
                Value::Object(object)
            }
        }
    }

    /// Convert back into a JSON tree.
    ///
    /// Functions become their source text. Fails on cycles and non-finite floats.
    pub fn to_json(&self) -> Result<serde_json::Value, CodecError> {
        let mut stack = Vec::new();
        let mut path = Vec::new();
        to_json_inner(self, &mut stack, &mut path)
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Source text for function-like values.
    pub fn function_source(&self) -> Option<&str> {
        match self {
            Value::Callback(c) => Some(c.source()),
            Value::Code(c) => Some(c.as_str()),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

fn to_json_inner(
    value: &Value,
    stack: &mut Vec<usize>,
    path: &mut Vec<String>,
) -> Result<serde_json::Value, CodecError> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Int(i) => serde_json::Value::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .ok_or_else(|| CodecError::Unrepresentable {
                path: render_path(path),
                detail: format!("non-finite float {}", f),
            })?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Callback(c) => serde_json::Value::String(c.source().to_string()),
        Value::Code(c) => serde_json::Value::String(c.as_str().to_string()),
        Value::Array(array) => {
            let addr = array.addr();
            if stack.contains(&addr) {
                return Err(CodecError::Cycle(render_path(path)));
            }
            stack.push(addr);
            let mut out = Vec::with_capacity(array.len());
            for (index, item) in array.items().iter().enumerate() {
                path.push(index.to_string());
                out.push(to_json_inner(item, stack, path)?);
                path.pop();
            }
            stack.pop();
            serde_json::Value::Array(out)
        }
        Value::Object(object) => {
            let addr = object.addr();
            if stack.contains(&addr) {
                return Err(CodecError::Cycle(render_path(path)));
            }
            stack.push(addr);
            let mut out = serde_json::Map::new();
            for (key, item) in object.entries() {
                path.push(key.clone());
                out.insert(key, to_json_inner(&item, stack, path)?);
                path.pop();
            }
            stack.pop();
            serde_json::Value::Object(out)
        }
    })
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Object> for Value {
    fn from(o: Object) -> Self {
        Value::Object(o)
    }
}

impl From<Array> for Value {
    fn from(a: Array) -> Self {
        Value::Array(a)
    }
}

impl From<Callback> for Value {
    fn from(c: Callback) -> Self {
        Value::Callback(c)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(Array::from_vec(items.into_iter().map(Into::into).collect()))
    }
}

// =============================================================================
// Containers
// =============================================================================

/// Shared, mutable string-keyed map.
#[derive(Clone, Default)]
pub struct Object(Arc<RwLock<BTreeMap<String, Value>>>);

impl Object {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.write().insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.read().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        self.write().remove(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Snapshot of the entries. Container values are shared handles.
    pub fn entries(&self) -> Vec<(String, Value)> {
        self.read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// True if both handles point at the same node.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Value>> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// Must stay shallow: a derived impl would recurse forever on cyclic graphs.
impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("keys", &self.keys())
            .finish()
    }
}

/// Shared, mutable sequence.
#[derive(Clone, Default)]
pub struct Array(Arc<RwLock<Vec<Value>>>);

impl Array {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(items: Vec<Value>) -> Self {
        Self(Arc::new(RwLock::new(items)))
    }

    pub fn push(&self, value: impl Into<Value>) {
        self.write().push(value.into());
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        self.read().get(index).cloned()
    }

    /// Snapshot of the items. Container values are shared handles.
    pub fn items(&self) -> Vec<Value> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &Array) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Value>> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Value>> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Array {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Array").field("len", &self.len()).finish()
    }
}

// =============================================================================
// Functions
// =============================================================================

type CallbackFn = dyn Fn(&[Value]) -> Value + Send + Sync;

/// An executable function with a textual representation.
///
/// Only the text crosses a process boundary; the receiving side gets a
/// [`CodeBlob`].
#[derive(Clone)]
pub struct Callback {
    source: String,
    func: Arc<CallbackFn>,
}

impl Callback {
    /// Create a callback with explicit source text.
    pub fn new<F>(source: impl Into<String>, func: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self {
            source: source.into(),
            func: Arc::new(func),
        }
    }

    /// Create a callback whose source text is the function's type name.
    pub fn from_fn<F>(func: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Self::new(std::any::type_name::<F>(), func)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn call(&self, args: &[Value]) -> Value {
        (self.func)(args)
    }
}

impl fmt::Debug for Callback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Callback").field(&self.source).finish()
    }
}

/// Opaque function text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeBlob(String);

impl CodeBlob {
    pub fn new(source: impl Into<String>) -> Self {
        Self(source.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CodeBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_clone_shares_contents() {
        let object = Object::new();
        let alias = object.clone();
        alias.insert("k", 1);
        assert_eq!(object.get("k").and_then(|v| v.as_i64()), Some(1));
        assert!(object.ptr_eq(&alias));
    }

    #[test]
    fn test_from_fn_uses_type_name() {
        fn double(args: &[Value]) -> Value {
            Value::Int(args.first().and_then(Value::as_i64).unwrap_or(0) * 2)
        }

        let callback = Callback::from_fn(double);
        assert!(callback.source().ends_with("double"));
        assert_eq!(callback.call(&[Value::Int(21)]).as_i64(), Some(42));
    }

    #[test]
    fn test_to_json_rejects_cycles() {
        let object = Object::new();
        object.insert("self", object.clone());

        let err = Value::Object(object).to_json().unwrap_err();
        assert_eq!(err, CodecError::Cycle("$.self".to_string()));
    }

    #[test]
    fn test_json_roundtrip_tree() {
        let json = serde_json::json!({"a": {"b": [1, 2.5, "x"]}, "c": null});
        let value = Value::from_json(&json);
        assert_eq!(value.to_json().unwrap(), json);
    }

    #[test]
    fn test_debug_is_shallow_on_cycles() {
        let object = Object::new();
        object.insert("self", object.clone());
        let rendered = format!("{:?}", Value::Object(object));
        assert!(rendered.contains("self"));
    }
}
