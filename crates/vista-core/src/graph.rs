//! Linked encoding of task trees.
//!
//! Observers navigate from any task to its file and parent suite, so a file
//! is sent with every task carrying `file` (the owning file) and `suite`
//! (the parent suite, or the file for top-level tasks). The file also points
//! at itself through `file`.

use serde::Serialize;
use vista_codec::{CodecError, Graph, Value};

use crate::types::File;

/// Encode a list of files as one linked graph rooted at an array.
pub fn files_graph(files: &[File]) -> Result<Graph, CodecError> {
    let mut graph = Graph::new();
    let list = graph.insert_array();
    graph.set_root(Value::Ref(list));
    for file in files {
        let file_value = insert_linked_file(&mut graph, file)?;
        let _ = graph.push(list, file_value);
    }
    Ok(graph)
}

/// Encode one file as a linked graph.
pub fn file_graph(file: &File) -> Result<Graph, CodecError> {
    let mut graph = Graph::new();
    let root = insert_linked_file(&mut graph, file)?;
    graph.set_root(root);
    Ok(graph)
}

/// Encode any serializable value as a plain tree.
pub fn plain_graph<T: Serialize + ?Sized>(value: &T) -> Result<Graph, CodecError> {
    Graph::from_serialize(value)
}

fn insert_linked_file(graph: &mut Graph, file: &File) -> Result<Value, CodecError> {
    let json = serde_json::to_value(file)?;
    let file_value = graph.insert_json(&json);
    let Some(file_id) = file_value.as_ref_id() else {
        return Ok(file_value);
    };
    let _ = graph.set(file_id, "file", Value::Ref(file_id));

    let mut stack = vec![file_id];
    while let Some(suite) = stack.pop() {
        let children: Vec<Value> = graph
            .get(&Value::Ref(suite), "tasks")
            .and_then(|tasks| graph.items(tasks))
            .map(<[Value]>::to_vec)
            .unwrap_or_default();
        for child in children {
            let Some(task) = child.as_ref_id() else { continue };
            let _ = graph.set(task, "file", Value::Ref(file_id));
            let _ = graph.set(task, "suite", Value::Ref(suite));
            stack.push(task);
        }
    }
    Ok(file_value)
}
