//! Arena-backed value graph.
//!
//! Containers live in the arena and are addressed by [`NodeId`]; a [`Value`]
//! either holds a primitive inline or refers to a node. Two references to the
//! same node are the same object, which is how shared references and cycles
//! are represented.

use std::collections::{BTreeMap, HashMap, VecDeque};

/// Index of a container node inside a [`Graph`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the arena.
    pub fn index(self) -> usize {
        self.0
    }

    fn shifted(self, offset: usize) -> Self {
        Self(self.0 + offset)
    }
}

/// A value slot: a primitive, a reference to a container, or an opaque
/// handle that has no wire representation.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// `null`.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Number.
    Number(serde_json::Number),
    /// String.
    String(String),
    /// Reference to a container node.
    Ref(NodeId),
    /// Live handle or function. Encoded as `null` in arrays and omitted from
    /// objects.
    Opaque(String),
}

impl Value {
    /// Whether this value is a primitive (anything other than a container
    /// reference).
    pub fn is_primitive(&self) -> bool {
        !matches!(self, Self::Ref(_))
    }

    /// The referenced node, if this is a reference.
    pub fn as_ref_id(&self) -> Option<NodeId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// The string contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Rewrite the reference by `offset` (used when grafting graphs).
    fn shifted(&self, offset: usize) -> Self {
        match self {
            Self::Ref(id) => Self::Ref(id.shifted(offset)),
            other => other.clone(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Self::Ref(id)
    }
}

/// A container node.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// Keyed container.
    Object(BTreeMap<String, Value>),
    /// Ordered container.
    Array(Vec<Value>),
}

impl Node {
    fn shifted(&self, offset: usize) -> Self {
        match self {
            Self::Object(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.shifted(offset)))
                    .collect(),
            ),
            Self::Array(items) => Self::Array(items.iter().map(|v| v.shifted(offset)).collect()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            Self::Object(map) => Box::new(map.values()),
            Self::Array(items) => Box::new(items.iter()),
        }
    }
}

/// A rooted value graph.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Graph {
    pub(crate) nodes: Vec<Node>,
    pub(crate) root: Value,
}

impl Graph {
    /// Create an empty graph whose root is `null`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph holding a single primitive root.
    pub fn primitive(value: Value) -> Self {
        Self {
            nodes: Vec::new(),
            root: value,
        }
    }

    /// The root value.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Replace the root value.
    pub fn set_root(&mut self, root: Value) {
        self.root = root;
    }

    /// Number of container nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no container nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append a node and return its id.
    pub fn insert(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    /// Append an empty object node.
    pub fn insert_object(&mut self) -> NodeId {
        self.insert(Node::Object(BTreeMap::new()))
    }

    /// Append an empty array node.
    pub fn insert_array(&mut self) -> NodeId {
        self.insert(Node::Array(Vec::new()))
    }

    /// Borrow a node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    /// Mutably borrow a node.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0)
    }

    /// Resolve a value to the node it references.
    pub fn resolve(&self, value: &Value) -> Option<&Node> {
        value.as_ref_id().and_then(|id| self.node(id))
    }

    /// Set `key` on an object node. Returns `false` if `id` is not an object.
    pub fn set(&mut self, id: NodeId, key: impl Into<String>, value: Value) -> bool {
        match self.node_mut(id) {
            Some(Node::Object(map)) => {
                let _ = map.insert(key.into(), value);
                true
            }
            _ => false,
        }
    }

    /// Append to an array node. Returns `false` if `id` is not an array.
    pub fn push(&mut self, id: NodeId, value: Value) -> bool {
        match self.node_mut(id) {
            Some(Node::Array(items)) => {
                items.push(value);
                true
            }
            _ => false,
        }
    }

    /// Look up `key` on the object referenced by `value`.
    pub fn get<'a>(&'a self, value: &Value, key: &str) -> Option<&'a Value> {
        match self.resolve(value)? {
            Node::Object(map) => map.get(key),
            Node::Array(_) => None,
        }
    }

    /// Look up `index` on the array referenced by `value`.
    pub fn at<'a>(&'a self, value: &Value, index: usize) -> Option<&'a Value> {
        match self.resolve(value)? {
            Node::Array(items) => items.get(index),
            Node::Object(_) => None,
        }
    }

    /// Items of the array referenced by `value`.
    pub fn items<'a>(&'a self, value: &Value) -> Option<&'a [Value]> {
        match self.resolve(value)? {
            Node::Array(items) => Some(items),
            Node::Object(_) => None,
        }
    }

    /// Insert an object node describing a native error.
    ///
    /// `stack` is the error's `source()` chain, one cause per line, so the
    /// causal context survives the trip to the wire.
    pub fn insert_error(&mut self, err: &dyn std::error::Error) -> Value {
        let mut causes = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            causes.push(format!("    caused by: {cause}"));
            source = cause.source();
        }
        let message = err.to_string();
        let stack = if causes.is_empty() {
            format!("Error: {message}")
        } else {
            format!("Error: {message}\n{}", causes.join("\n"))
        };
        self.insert_error_payload("Error", &message, Some(&stack))
    }

    /// Insert an object node with the `name`, `message` and `stack` fields
    /// of an error.
    pub fn insert_error_payload(&mut self, name: &str, message: &str, stack: Option<&str>) -> Value {
        let id = self.insert_object();
        let _ = self.set(id, "name", name.into());
        let _ = self.set(id, "message", message.into());
        if let Some(stack) = stack {
            let _ = self.set(id, "stack", stack.into());
        }
        Value::Ref(id)
    }

    /// Copy every node of `other` into this graph and return `other`'s root
    /// rewritten to point at the copies.
    pub fn graft(&mut self, other: &Graph) -> Value {
        let offset = self.nodes.len();
        self.nodes
            .extend(other.nodes.iter().map(|node| node.shifted(offset)));
        other.root.shifted(offset)
    }

    /// Extract everything reachable from `value` into a new graph rooted at
    /// the copy of `value`. Identity relationships are preserved.
    pub fn subgraph(&self, value: &Value) -> Graph {
        let Some(start) = value.as_ref_id() else {
            return Graph::primitive(value.clone());
        };

        let mut remap: HashMap<NodeId, NodeId> = HashMap::new();
        let mut order: Vec<NodeId> = Vec::new();
        let mut queue = VecDeque::from([start]);
        let _ = remap.insert(start, NodeId(0));
        order.push(start);

        while let Some(id) = queue.pop_front() {
            let Some(node) = self.node(id) else { continue };
            for child in node.children() {
                if let Value::Ref(child_id) = child {
                    if !remap.contains_key(child_id) {
                        let _ = remap.insert(*child_id, NodeId(order.len()));
                        order.push(*child_id);
                        queue.push_back(*child_id);
                    }
                }
            }
        }

        let relink = |v: &Value| match v {
            Value::Ref(id) => remap.get(id).map_or(Value::Null, |new| Value::Ref(*new)),
            other => other.clone(),
        };

        let nodes = order
            .iter()
            .map(|id| match self.node(*id) {
                Some(Node::Object(map)) => {
                    Node::Object(map.iter().map(|(k, v)| (k.clone(), relink(v))).collect())
                }
                Some(Node::Array(items)) => Node::Array(items.iter().map(relink).collect()),
                None => Node::Object(BTreeMap::new()),
            })
            .collect();

        Graph {
            nodes,
            root: Value::Ref(NodeId(0)),
        }
    }
}
