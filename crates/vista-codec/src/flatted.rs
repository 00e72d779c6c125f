//! Flat-array wire format.
//!
//! The payload is one JSON array. Entry `0` is the root. Every container and
//! every string is stored exactly once as its own entry; inside containers,
//! a string is a reference (`"3"` means entry 3) and numbers, booleans and
//! `null` are written inline. The format is compatible with the `flatted`
//! JavaScript package, which the dashboard clients speak.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde_json::Value as Json;

use crate::errors::{CodecError, Result};
use crate::graph::{Graph, Node, NodeId, Value};

/// Encode a graph into the flat-array format.
///
/// Runs in a single pass over a work queue, so deep or cyclic graphs cost no
/// stack depth and every node is written once.
pub fn encode(graph: &Graph) -> String {
    let mut encoder = Encoder::default();
    encoder.encode_root(graph);
    Json::Array(encoder.entries).to_string()
}

#[derive(Default)]
struct Encoder {
    entries: Vec<Json>,
    nodes: HashMap<NodeId, usize>,
    strings: HashMap<String, usize>,
    queue: VecDeque<(usize, NodeId)>,
}

impl Encoder {
    fn encode_root(&mut self, graph: &Graph) {
        match graph.root() {
            Value::Ref(id) => {
                let _ = self.reserve_node(*id);
            }
            Value::String(s) => {
                let _ = self.intern(s);
            }
            Value::Null | Value::Opaque(_) => self.entries.push(Json::Null),
            Value::Bool(b) => self.entries.push(Json::Bool(*b)),
            Value::Number(n) => self.entries.push(Json::Number(n.clone())),
        }

        while let Some((slot, id)) = self.queue.pop_front() {
            let entry = match graph.node(id) {
                Some(Node::Object(map)) => {
                    let mut out = serde_json::Map::new();
                    for (key, value) in map {
                        if let Some(encoded) = self.slot(value) {
                            let _ = out.insert(key.clone(), encoded);
                        }
                    }
                    Json::Object(out)
                }
                Some(Node::Array(items)) => Json::Array(
                    items
                        .iter()
                        .map(|v| self.slot(v).unwrap_or(Json::Null))
                        .collect(),
                ),
                None => Json::Null,
            };
            self.entries[slot] = entry;
        }
    }

    /// Inline representation of a value inside a container. `None` means the
    /// key is omitted.
    fn slot(&mut self, value: &Value) -> Option<Json> {
        match value {
            Value::Opaque(_) => None,
            Value::Null => Some(Json::Null),
            Value::Bool(b) => Some(Json::Bool(*b)),
            Value::Number(n) => Some(Json::Number(n.clone())),
            Value::String(s) => Some(index_ref(self.intern(s))),
            Value::Ref(id) => Some(index_ref(self.reserve_node(*id))),
        }
    }

    fn intern(&mut self, s: &str) -> usize {
        if let Some(index) = self.strings.get(s) {
            return *index;
        }
        let index = self.entries.len();
        self.entries.push(Json::String(s.to_owned()));
        let _ = self.strings.insert(s.to_owned(), index);
        index
    }

    fn reserve_node(&mut self, id: NodeId) -> usize {
        if let Some(index) = self.nodes.get(&id) {
            return *index;
        }
        let index = self.entries.len();
        self.entries.push(Json::Null);
        let _ = self.nodes.insert(id, index);
        self.queue.push_back((index, id));
        index
    }
}

fn index_ref(index: usize) -> Json {
    Json::String(index.to_string())
}

/// Decode a flat-array payload.
///
/// Every container entry becomes exactly one node, so references that shared
/// an entry on the wire share a node after decoding and cycles stay cycles.
/// Any structural problem fails the whole decode.
pub fn decode(raw: &str) -> Result<Graph> {
    let parsed: Json = serde_json::from_str(raw)?;
    let Json::Array(entries) = parsed else {
        return Err(CodecError::NotAnArray);
    };
    if entries.is_empty() {
        return Err(CodecError::Empty);
    }

    let mut decoder = Decoder {
        entries: &entries,
        graph: Graph::new(),
        nodes: HashMap::new(),
        queue: VecDeque::new(),
    };

    let root = match &entries[0] {
        Json::Object(_) | Json::Array(_) => Value::Ref(decoder.node_for(0)),
        other => primitive(other),
    };
    decoder.graph.set_root(root);

    while let Some((index, id)) = decoder.queue.pop_front() {
        let node = match &entries[index] {
            Json::Object(map) => {
                let mut out = BTreeMap::new();
                for (key, value) in map {
                    let _ = out.insert(key.clone(), decoder.revive(index, value)?);
                }
                Node::Object(out)
            }
            Json::Array(items) => Node::Array(
                items
                    .iter()
                    .map(|v| decoder.revive(index, v))
                    .collect::<Result<Vec<_>>>()?,
            ),
            _ => continue,
        };
        if let Some(slot) = decoder.graph.node_mut(id) {
            *slot = node;
        }
    }

    Ok(decoder.graph)
}

struct Decoder<'a> {
    entries: &'a [Json],
    graph: Graph,
    nodes: HashMap<usize, NodeId>,
    queue: VecDeque<(usize, NodeId)>,
}

impl Decoder<'_> {
    fn node_for(&mut self, index: usize) -> NodeId {
        if let Some(id) = self.nodes.get(&index) {
            return *id;
        }
        let placeholder = match &self.entries[index] {
            Json::Array(_) => Node::Array(Vec::new()),
            _ => Node::Object(BTreeMap::new()),
        };
        let id = self.graph.insert(placeholder);
        let _ = self.nodes.insert(index, id);
        self.queue.push_back((index, id));
        id
    }

    /// Turn one inline slot of entry `owner` into a graph value.
    fn revive(&mut self, owner: usize, slot: &Json) -> Result<Value> {
        match slot {
            Json::String(reference) => {
                let index: usize = reference
                    .parse()
                    .map_err(|_| CodecError::InvalidReference(reference.clone()))?;
                let target = self
                    .entries
                    .get(index)
                    .ok_or(CodecError::DanglingReference(index))?;
                Ok(match target {
                    Json::Object(_) | Json::Array(_) => Value::Ref(self.node_for(index)),
                    other => primitive(other),
                })
            }
            Json::Object(_) | Json::Array(_) => Err(CodecError::InlineContainer(owner)),
            other => Ok(primitive(other)),
        }
    }
}

fn primitive(json: &Json) -> Value {
    match json {
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => Value::Number(n.clone()),
        Json::String(s) => Value::String(s.clone()),
        Json::Null | Json::Object(_) | Json::Array(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn cyclic_pair() -> Graph {
        let mut g = Graph::new();
        let a = g.insert_object();
        let b = g.insert_object();
        let _ = g.set(a, "name", "a".into());
        let _ = g.set(a, "peer", Value::Ref(b));
        let _ = g.set(b, "name", "b".into());
        let _ = g.set(b, "peer", Value::Ref(a));
        g.set_root(Value::Ref(a));
        g
    }

    #[test]
    fn cycle_survives_round_trip() {
        let decoded = decode(&encode(&cyclic_pair())).unwrap();

        let a = decoded.root().clone();
        let b = decoded.get(&a, "peer").cloned().unwrap();
        assert_ne!(a, b);
        assert_eq!(decoded.get(&b, "peer"), Some(&a));
        assert_eq!(decoded.get(&b, "name").and_then(Value::as_str), Some("b"));
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn self_reference_survives_round_trip() {
        let mut g = Graph::new();
        let a = g.insert_array();
        let _ = g.push(a, Value::Ref(a));
        g.set_root(Value::Ref(a));

        let decoded = decode(&encode(&g)).unwrap();
        let root = decoded.root().clone();
        assert_eq!(decoded.at(&root, 0), Some(&root));
    }

    #[test]
    fn shared_reference_stays_shared() {
        let mut g = Graph::new();
        let shared = g.insert_object();
        let list = g.insert_array();
        let _ = g.push(list, Value::Ref(shared));
        let _ = g.push(list, Value::Ref(shared));
        g.set_root(Value::Ref(list));

        let decoded = decode(&encode(&g)).unwrap();
        let items = decoded.items(decoded.root()).unwrap();
        assert_eq!(items[0], items[1]);
        assert_eq!(decoded.len(), 2);
    }

    #[test]
    fn wire_layout_matches_flatted() {
        let g = Graph::from_json(&json!({"a": "x", "b": 1, "c": ["x"]}));
        let encoded = encode(&g);
        let parsed: Json = serde_json::from_str(&encoded).unwrap();
        assert_eq!(parsed, json!([{"a": "1", "b": 1, "c": "2"}, "x", ["1"]]));
    }

    #[test]
    fn decodes_flatted_output() {
        // flatted.stringify(a) where a = { self: a, tag: "t" }
        let g = decode(r#"[{"self":"0","tag":"1"},"t"]"#).unwrap();
        let root = g.root().clone();
        assert_eq!(g.get(&root, "self"), Some(&root));
        assert_eq!(g.get(&root, "tag").and_then(Value::as_str), Some("t"));
    }

    #[test]
    fn primitive_roots() {
        for value in [json!(null), json!(true), json!(42), json!("hello")] {
            let g = Graph::from_json(&value);
            let decoded = decode(&encode(&g)).unwrap();
            assert_eq!(decoded.to_json(decoded.root()).unwrap(), value);
        }
    }

    #[test]
    fn opaque_values_never_fail_encoding() {
        let mut g = Graph::new();
        let obj = g.insert_object();
        let arr = g.insert_array();
        let _ = g.set(obj, "callback", Value::Opaque("fn".into()));
        let _ = g.set(obj, "items", Value::Ref(arr));
        let _ = g.push(arr, Value::Opaque("handle".into()));
        g.set_root(Value::Ref(obj));

        let decoded = decode(&encode(&g)).unwrap();
        assert_eq!(decoded.to_json(decoded.root()).unwrap(), json!({"items": [null]}));
    }

    #[test]
    fn error_fields_survive_round_trip() {
        let mut g = Graph::new();
        let err = g.insert_error_payload("AssertionError", "expected 1 to be 2", Some("at foo.test.ts:3:5"));
        g.set_root(err);

        let decoded = decode(&encode(&g)).unwrap();
        let root = decoded.root();
        assert_eq!(decoded.get(root, "name").and_then(Value::as_str), Some("AssertionError"));
        assert_eq!(
            decoded.get(root, "message").and_then(Value::as_str),
            Some("expected 1 to be 2")
        );
        assert_eq!(
            decoded.get(root, "stack").and_then(Value::as_str),
            Some("at foo.test.ts:3:5")
        );
    }

    #[test]
    fn long_chain_encodes_without_recursion() {
        let mut g = Graph::new();
        let mut prev = g.insert_object();
        g.set_root(Value::Ref(prev));
        for _ in 0..100_000 {
            let next = g.insert_object();
            let _ = g.set(prev, "next", Value::Ref(next));
            prev = next;
        }
        let decoded = decode(&encode(&g)).unwrap();
        assert_eq!(decoded.len(), 100_001);
    }

    #[test]
    fn malformed_payloads_are_rejected() {
        assert_matches!(decode("not json"), Err(CodecError::Json(_)));
        assert_matches!(decode(r#"{"a":1}"#), Err(CodecError::NotAnArray));
        assert_matches!(decode("[]"), Err(CodecError::Empty));
        assert_matches!(decode(r#"[{"a":"9"}]"#), Err(CodecError::DanglingReference(9)));
        assert_matches!(decode(r#"[{"a":"x"}]"#), Err(CodecError::InvalidReference(_)));
        assert_matches!(decode(r#"[{"a":{"b":1}}]"#), Err(CodecError::InlineContainer(0)));
    }
}
