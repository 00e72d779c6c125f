//! Conversions between [`Graph`] and `serde_json` / `serde` types.

use std::collections::{BTreeMap, HashSet, btree_map};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::errors::{CodecError, Result};
use crate::graph::{Graph, Node, NodeId, Value};

impl Graph {
    /// Build a tree-shaped graph from a JSON value.
    pub fn from_json(json: &Json) -> Self {
        let mut graph = Graph::new();
        let root = graph.insert_json(json);
        graph.set_root(root);
        graph
    }

    /// Build a graph from any serializable value.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value)?;
        Ok(Self::from_json(&json))
    }

    /// Insert a JSON value into this graph and return the value slot that
    /// refers to it.
    pub fn insert_json(&mut self, json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.clone()),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => {
                let id = self.insert_array();
                let values: Vec<Value> = items.iter().map(|item| self.insert_json(item)).collect();
                if let Some(Node::Array(slot)) = self.node_mut(id) {
                    *slot = values;
                }
                Value::Ref(id)
            }
            Json::Object(map) => {
                let id = self.insert_object();
                let values: BTreeMap<String, Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), self.insert_json(v)))
                    .collect();
                if let Some(Node::Object(slot)) = self.node_mut(id) {
                    *slot = values;
                }
                Value::Ref(id)
            }
        }
    }

    /// Flatten the value into JSON.
    ///
    /// Shared references are expanded at every use. A reference back to a
    /// node that is already on the current path (a cycle) becomes `null`, and
    /// so do opaque values.
    ///
    /// The walk keeps its own stack. Nesting deeper than [`MAX_JSON_DEPTH`]
    /// or an expansion of more than [`MAX_JSON_VALUES`] values is an error,
    /// so a small payload that shares one node many times cannot blow up.
    pub fn to_json(&self, value: &Value) -> Result<Json> {
        let mut walk = Walk::default();
        let first = match walk.enter(self, value)? {
            Entered::Leaf(json) => return Ok(json),
            Entered::Node(frame) => frame,
        };
        let mut stack = vec![first];
        let mut done: Option<Json> = None;

        loop {
            let Some(top) = stack.last_mut() else {
                return Ok(done.unwrap_or(Json::Null));
            };
            if let Some(json) = done.take() {
                top.accept(json);
            }
            match top.next_child() {
                Some(child) => match walk.enter(self, child)? {
                    Entered::Leaf(json) => done = Some(json),
                    Entered::Node(frame) => {
                        if stack.len() >= MAX_JSON_DEPTH {
                            return Err(CodecError::TooDeep(MAX_JSON_DEPTH));
                        }
                        stack.push(frame);
                    }
                },
                None => {
                    if let Some(frame) = stack.pop() {
                        let _ = walk.on_path.remove(&frame.id());
                        done = Some(frame.finish());
                    }
                }
            }
        }
    }

    /// Deserialize the root into `T`, breaking cycles as [`Graph::to_json`]
    /// does.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_json(self.root())?)?)
    }
}

/// Deepest container nesting [`Graph::to_json`] flattens.
pub const MAX_JSON_DEPTH: usize = 256;

/// Most values [`Graph::to_json`] emits. A shared node counts once per use.
pub const MAX_JSON_VALUES: usize = 1 << 20;

#[derive(Default)]
struct Walk {
    on_path: HashSet<NodeId>,
    emitted: usize,
}

enum Entered<'a> {
    Leaf(Json),
    Node(Frame<'a>),
}

/// A container being flattened.
enum Frame<'a> {
    Object {
        id: NodeId,
        entries: btree_map::Iter<'a, String, Value>,
        key: Option<&'a str>,
        out: serde_json::Map<String, Json>,
    },
    Array {
        id: NodeId,
        items: std::slice::Iter<'a, Value>,
        out: Vec<Json>,
    },
}

impl Walk {
    fn enter<'a>(&mut self, graph: &'a Graph, value: &'a Value) -> Result<Entered<'a>> {
        self.emitted += 1;
        if self.emitted > MAX_JSON_VALUES {
            return Err(CodecError::TooLarge(MAX_JSON_VALUES));
        }
        let json = match value {
            Value::Null | Value::Opaque(_) => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => Json::Number(n.clone()),
            Value::String(s) => Json::String(s.clone()),
            Value::Ref(id) if self.on_path.contains(id) => Json::Null,
            Value::Ref(id) => match graph.node(*id) {
                Some(Node::Object(map)) => {
                    let _ = self.on_path.insert(*id);
                    return Ok(Entered::Node(Frame::Object {
                        id: *id,
                        entries: map.iter(),
                        key: None,
                        out: serde_json::Map::new(),
                    }));
                }
                Some(Node::Array(items)) => {
                    let _ = self.on_path.insert(*id);
                    return Ok(Entered::Node(Frame::Array {
                        id: *id,
                        items: items.iter(),
                        out: Vec::with_capacity(items.len()),
                    }));
                }
                None => Json::Null,
            },
        };
        Ok(Entered::Leaf(json))
    }
}

impl<'a> Frame<'a> {
    fn id(&self) -> NodeId {
        match self {
            Self::Object { id, .. } | Self::Array { id, .. } => *id,
        }
    }

    /// Next value to flatten. Opaque object members are skipped.
    fn next_child(&mut self) -> Option<&'a Value> {
        match self {
            Self::Object { entries, key, .. } => {
                let (k, v) = entries.find(|(_, v)| !matches!(v, Value::Opaque(_)))?;
                *key = Some(k.as_str());
                Some(v)
            }
            Self::Array { items, .. } => items.next(),
        }
    }

    fn accept(&mut self, json: Json) {
        match self {
            Self::Object { key, out, .. } => {
                if let Some(k) = key.take() {
                    let _ = out.insert(k.to_owned(), json);
                }
            }
            Self::Array { out, .. } => out.push(json),
        }
    }

    fn finish(self) -> Json {
        match self {
            Self::Object { out, .. } => Json::Object(out),
            Self::Array { out, .. } => Json::Array(out),
        }
    }
}
