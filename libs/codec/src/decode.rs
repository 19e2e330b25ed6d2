//! Text → graph.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Map;

use crate::encode::{ARR, FN, ID, OBJ, REF};
use crate::error::CodecError;
use crate::value::{Array, CodeBlob, Object, Value};

/// Deserialize text produced by [`serialize`](crate::serialize).
///
/// Back-references are restored as shared handles, so cycles in the original
/// graph are cycles in the result. Function text decodes to [`Value::Code`].
pub fn deserialize(text: &str) -> Result<Value, CodecError> {
    let tree = parse(text)?;

    // Containers are allocated up front so a reference may resolve no matter
    // which order the JSON map yields keys in.
    let mut shells = HashMap::new();
    collect_shells(&tree, &mut shells)?;

    decode(&tree, &shells)
}

/// Deepest JSON nesting accepted. Every graph container costs two levels
/// (the wrapper and its body), so this admits graphs 512 containers deep.
pub const MAX_DEPTH: usize = 1024;

fn parse(text: &str) -> Result<serde_json::Value, CodecError> {
    let depth = nesting_depth(text);
    if depth > MAX_DEPTH {
        return Err(CodecError::TooDeep(MAX_DEPTH));
    }

    // serde_json stops at 128 levels on its own; the scan above bounds it instead.
    let mut de = serde_json::Deserializer::from_str(text);
    de.disable_recursion_limit();
    let tree = serde_json::Value::deserialize(&mut de)?;
    de.end()?;
    Ok(tree)
}

/// Deepest bracket nesting outside string literals.
fn nesting_depth(text: &str) -> usize {
    let (mut depth, mut deepest) = (0usize, 0usize);
    let (mut in_string, mut escaped) = (false, false);
    for byte in text.bytes() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                deepest = deepest.max(depth);
            }
            b'}' | b']' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    deepest
}

fn collect_shells(
    tree: &serde_json::Value,
    shells: &mut HashMap<u64, Value>,
) -> Result<(), CodecError> {
    match tree {
        serde_json::Value::Array(_) => Err(CodecError::Malformed(
            "bare array outside an $arr wrapper".to_string(),
        )),
        serde_json::Value::Object(map) => {
            if let Some(body) = map.get(OBJ) {
                let id = wrapper_id(map)?;
                let children = body
                    .as_object()
                    .ok_or_else(|| CodecError::Malformed(format!("{} must be a map", OBJ)))?;
                register(shells, id, Value::Object(Object::new()))?;
                for child in children.values() {
                    collect_shells(child, shells)?;
                }
            } else if let Some(body) = map.get(ARR) {
                let id = wrapper_id(map)?;
                let children = body
                    .as_array()
                    .ok_or_else(|| CodecError::Malformed(format!("{} must be a list", ARR)))?;
                register(shells, id, Value::Array(Array::new()))?;
                for child in children {
                    collect_shells(child, shells)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn register(shells: &mut HashMap<u64, Value>, id: u64, shell: Value) -> Result<(), CodecError> {
    if shells.insert(id, shell).is_some() {
        return Err(CodecError::Malformed(format!("duplicate {} {}", ID, id)));
    }
    Ok(())
}

fn wrapper_id(map: &Map<String, serde_json::Value>) -> Result<u64, CodecError> {
    map.get(ID)
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| CodecError::Malformed(format!("container without {}", ID)))
}

fn decode(tree: &serde_json::Value, shells: &HashMap<u64, Value>) -> Result<Value, CodecError> {
    match tree {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
        serde_json::Value::Number(n) => Ok(match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        }),
        serde_json::Value::String(s) => Ok(Value::String(s.clone())),
        serde_json::Value::Array(_) => Err(CodecError::Malformed(
            "bare array outside an $arr wrapper".to_string(),
        )),
        serde_json::Value::Object(map) => decode_wrapper(map, shells),
    }
}

fn decode_wrapper(
    map: &Map<String, serde_json::Value>,
    shells: &HashMap<u64, Value>,
) -> Result<Value, CodecError> {
    if let Some(target) = map.get(REF) {
        let id = target
            .as_u64()
            .ok_or_else(|| CodecError::Malformed(format!("{} must be an integer", REF)))?;
        return shells
            .get(&id)
            .cloned()
            .ok_or(CodecError::DanglingReference(id));
    }

    if let Some(source) = map.get(FN) {
        let text = source
            .as_str()
            .ok_or_else(|| CodecError::Malformed(format!("{} must be a string", FN)))?;
        return Ok(Value::Code(CodeBlob::new(text)));
    }

    let id = wrapper_id(map)?;
    let shell = shells.get(&id).ok_or(CodecError::DanglingReference(id))?;

    match (shell, map.get(OBJ), map.get(ARR)) {
        (Value::Object(object), Some(serde_json::Value::Object(body)), None) => {
            for (key, child) in body {
                object.insert(key.clone(), decode(child, shells)?);
            }
            Ok(shell.clone())
        }
        (Value::Array(array), None, Some(serde_json::Value::Array(body))) => {
            for child in body {
                array.push(decode(child, shells)?);
            }
            Ok(shell.clone())
        }
        _ => Err(CodecError::Malformed(format!("unrecognized wrapper ${}", id))),
    }
}
