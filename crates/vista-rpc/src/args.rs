//! Positional call arguments.

use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use vista_codec::{Graph, Node, Value};

use crate::errors::RpcError;

/// Arguments of one call: a graph whose root is an array.
///
/// All arguments of a frame share one graph, so an object passed twice (or
/// referenced from two arguments) stays one object.
#[derive(Clone, Debug, PartialEq)]
pub struct Args {
    graph: Graph,
}

impl Args {
    /// No arguments.
    pub fn empty() -> Self {
        let mut graph = Graph::new();
        let list = graph.insert_array();
        graph.set_root(Value::Ref(list));
        Self { graph }
    }

    /// Wrap a graph. A root that is not an array becomes the single argument.
    pub fn from_graph(graph: Graph) -> Self {
        if matches!(graph.resolve(graph.root()), Some(Node::Array(_))) {
            return Self { graph };
        }
        Self::from_graphs([graph])
    }

    /// Build from independent argument graphs.
    pub fn from_graphs(values: impl IntoIterator<Item = Graph>) -> Self {
        let mut args = Self::empty();
        for value in values {
            args.push_graph(&value);
        }
        args
    }

    /// Build from plain JSON values.
    pub fn from_json(values: impl IntoIterator<Item = Json>) -> Self {
        let mut args = Self::empty();
        for value in values {
            let slot = args.graph.insert_json(&value);
            args.push_value(slot);
        }
        args
    }

    /// Append one argument graph.
    pub fn push_graph(&mut self, value: &Graph) {
        let slot = self.graph.graft(value);
        self.push_value(slot);
    }

    fn push_value(&mut self, slot: Value) {
        if let Some(list) = self.graph.root().as_ref_id() {
            let _ = self.graph.push(list, slot);
        }
    }

    /// Number of arguments.
    pub fn len(&self) -> usize {
        self.graph.items(self.graph.root()).map_or(0, <[Value]>::len)
    }

    /// Whether there are no arguments.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The raw slot of argument `index`.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.graph.at(self.graph.root(), index)
    }

    /// The shared graph.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Consume into the shared graph.
    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Argument `index` as its own graph (`null` when absent).
    pub fn get(&self, index: usize) -> Graph {
        self.value(index)
            .map_or_else(Graph::new, |value| self.graph.subgraph(value))
    }

    /// Argument `index` flattened to JSON (`null` when absent).
    ///
    /// An argument too deep or too large to flatten is `INVALID_PARAMS`.
    pub fn json(&self, index: usize) -> Result<Json, RpcError> {
        let Some(value) = self.value(index) else {
            return Ok(Json::Null);
        };
        self.graph
            .to_json(value)
            .map_err(|e| RpcError::invalid_params(format!("Argument {index}: {e}")))
    }

    /// Deserialize a required argument.
    pub fn parse<T: DeserializeOwned>(&self, index: usize, name: &str) -> Result<T, RpcError> {
        serde_json::from_value(self.json(index)?)
            .map_err(|e| RpcError::invalid_params(format!("Invalid '{name}': {e}")))
    }

    /// Deserialize an optional argument; absent and `null` both yield `None`.
    pub fn optional<T: DeserializeOwned>(
        &self,
        index: usize,
        name: &str,
    ) -> Result<Option<T>, RpcError> {
        match self.json(index)? {
            Json::Null => Ok(None),
            value => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| RpcError::invalid_params(format!("Invalid '{name}': {e}"))),
        }
    }

    /// A required string argument.
    pub fn require_str(&self, index: usize, name: &str) -> Result<String, RpcError> {
        self.value(index)
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| RpcError::invalid_params(format!("Missing required parameter '{name}'")))
    }
}

impl Default for Args {
    fn default() -> Self {
        Self::empty()
    }
}
