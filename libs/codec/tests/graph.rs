//! Graph codec behavior across the public API.

use blitz_codec::{
    deserialize, serialize, shape_eq, Array, Callback, CodecError, Object, Value, MAX_DEPTH,
};
use proptest::prelude::*;

fn state_like_graph() -> Value {
    // root.nodes.core.workers[0].node -> root.nodes.core
    let root = Object::new();
    let nodes = Object::new();
    let core = Object::new();
    let workers = Array::new();
    let worker = Object::new();

    worker.insert("pid", 4242);
    worker.insert("node", core.clone());
    workers.push(worker);

    core.insert("workers", workers);
    core.insert(
        "hooks",
        vec![Value::Callback(Callback::new(
            "fn verify_user_indices()",
            |_| Value::Null,
        ))],
    );
    nodes.insert("core", core);

    root.insert("nodes", nodes);
    root.insert("self", root.clone());
    Value::Object(root)
}

#[test]
fn test_self_reference_and_function_survive() {
    let a = Object::new();
    a.insert("self", a.clone());
    a.insert("greet", Callback::new("function greet() { return 'hi' }", |_| {
        Value::from("hi")
    }));
    let original = Value::Object(a);

    let text = serialize(&original).unwrap();
    assert!(text.contains("function greet() { return 'hi' }"));

    let decoded = deserialize(&text).unwrap();
    assert!(shape_eq(&original, &decoded));

    let object = decoded.as_object().unwrap();
    assert!(object
        .get("self")
        .and_then(|v| v.as_object().cloned())
        .is_some_and(|inner| inner.ptr_eq(object)));
    assert!(matches!(object.get("greet"), Some(Value::Code(_))));
}

#[test]
fn test_nested_back_reference_survives() {
    let original = state_like_graph();
    let decoded = deserialize(&serialize(&original).unwrap()).unwrap();
    assert!(shape_eq(&original, &decoded));

    let core = decoded
        .as_object()
        .and_then(|root| root.get("nodes"))
        .and_then(|nodes| nodes.as_object().and_then(|n| n.get("core")))
        .unwrap();
    let back = core
        .as_object()
        .and_then(|c| c.get("workers"))
        .and_then(|w| w.as_array().and_then(|w| w.get(0)))
        .and_then(|w| w.as_object().and_then(|w| w.get("node")))
        .unwrap();
    assert!(back.as_object().unwrap().ptr_eq(core.as_object().unwrap()));
}

#[test]
fn test_serialize_is_deterministic() {
    let graph = state_like_graph();
    assert_eq!(serialize(&graph).unwrap(), serialize(&graph).unwrap());
}

fn chain(depth: usize) -> Object {
    let head = Object::new();
    let mut tail = head.clone();
    for level in 1..depth {
        let next = Object::new();
        next.insert("level", level as i64);
        tail.insert("child", next.clone());
        tail = next;
    }
    tail.insert("head", head.clone());
    head
}

#[test]
fn test_deep_chain_survives() {
    // Well past the 64 containers serde_json's own limit would allow.
    let head = chain(300);
    let decoded = deserialize(&serialize(&Value::Object(head.clone())).unwrap()).unwrap();
    assert!(shape_eq(&decoded, &Value::Object(head)));

    let mut node = decoded.as_object().unwrap().clone();
    for _ in 1..300 {
        let next = node.get("child").unwrap().as_object().unwrap().clone();
        node = next;
    }
    assert_eq!(node.get("level").unwrap().as_i64(), Some(299));
    assert!(node.get("head").unwrap().as_object().unwrap().ptr_eq(decoded.as_object().unwrap()));
}

#[test]
fn test_chain_past_depth_limit_is_rejected() {
    let text = serialize(&Value::Object(chain(MAX_DEPTH))).unwrap();
    assert!(matches!(deserialize(&text), Err(CodecError::TooDeep(_))));
}

fn arb_json() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i64>().prop_map(serde_json::Value::from),
        "[a-z$]{0,8}".prop_map(serde_json::Value::String),
    ];
    leaf.prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z$]{1,6}", inner, 0..6)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn prop_acyclic_trees_keep_every_key(json in arb_json()) {
        let value = Value::from_json(&json);
        let decoded = deserialize(&serialize(&value).unwrap()).unwrap();
        prop_assert_eq!(decoded.to_json().unwrap(), json);
    }
}
