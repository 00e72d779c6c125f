//! Call frames and their wire form.
//!
//! A frame is one object encoded with the flat-array codec:
//!
//! | key | meaning |
//! |---|---|
//! | `t` | `"q"` for requests and pushes, `"s"` for responses |
//! | `i` | call id; absent on pushes |
//! | `m` | method name |
//! | `a` | argument array |
//! | `r` | result (responses) |
//! | `e` | error (responses) |

use vista_codec::{Graph, Value};

use crate::args::Args;
use crate::errors::{ErrorBody, RpcError};
use crate::events::ClientEvent;

const TYPE_REQUEST: &str = "q";
const TYPE_RESPONSE: &str = "s";

/// One decoded frame.
#[derive(Clone, Debug, PartialEq)]
pub enum CallFrame {
    /// A call that expects a response.
    Request {
        /// Call id, unique per channel.
        id: String,
        /// Method name.
        method: String,
        /// Arguments.
        args: Args,
    },
    /// A call that expects nothing back.
    Push {
        /// Method name.
        method: String,
        /// Arguments.
        args: Args,
    },
    /// Answer to a request.
    Response {
        /// Id of the request being answered.
        id: String,
        /// Result or error.
        outcome: Result<Graph, ErrorBody>,
    },
}

impl CallFrame {
    /// Push frame for an observer event.
    pub fn event(event: ClientEvent, args: Args) -> Self {
        Self::Push {
            method: event.as_str().to_owned(),
            args,
        }
    }

    /// Encode to the wire form.
    pub fn encode(&self) -> String {
        let mut graph = Graph::new();
        let frame = graph.insert_object();
        graph.set_root(Value::Ref(frame));

        match self {
            Self::Request { id, method, args } => {
                let _ = graph.set(frame, "t", TYPE_REQUEST.into());
                let _ = graph.set(frame, "i", id.as_str().into());
                let _ = graph.set(frame, "m", method.as_str().into());
                let list = graph.graft(args.graph());
                let _ = graph.set(frame, "a", list);
            }
            Self::Push { method, args } => {
                let _ = graph.set(frame, "t", TYPE_REQUEST.into());
                let _ = graph.set(frame, "m", method.as_str().into());
                let list = graph.graft(args.graph());
                let _ = graph.set(frame, "a", list);
            }
            Self::Response { id, outcome } => {
                let _ = graph.set(frame, "t", TYPE_RESPONSE.into());
                let _ = graph.set(frame, "i", id.as_str().into());
                match outcome {
                    Ok(result) => {
                        let result = graph.graft(result);
                        let _ = graph.set(frame, "r", result);
                    }
                    Err(body) => {
                        let error = graph.graft(&body.to_graph());
                        let _ = graph.set(frame, "e", error);
                    }
                }
            }
        }

        vista_codec::encode(&graph)
    }

    /// Decode from the wire form. Any malformation is a protocol error.
    pub fn decode(raw: &str) -> Result<Self, RpcError> {
        let graph = vista_codec::decode(raw)?;
        let root = graph.root();
        if graph.resolve(root).is_none() {
            return Err(protocol("frame is not an object"));
        }

        let kind = graph
            .get(root, "t")
            .and_then(Value::as_str)
            .ok_or_else(|| protocol("frame has no type"))?;
        let id = match graph.get(root, "i") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => return Err(protocol("frame id must be a string")),
        };

        match kind {
            TYPE_REQUEST => {
                let method = graph
                    .get(root, "m")
                    .and_then(Value::as_str)
                    .ok_or_else(|| protocol("request has no method"))?
                    .to_owned();
                let args = match graph.get(root, "a") {
                    None | Some(Value::Null) => Args::empty(),
                    Some(list @ Value::Ref(_)) if graph.items(list).is_some() => {
                        Args::from_graph(graph.subgraph(list))
                    }
                    Some(_) => return Err(protocol("request arguments must be an array")),
                };
                Ok(match id {
                    Some(id) => Self::Request { id, method, args },
                    None => Self::Push { method, args },
                })
            }
            TYPE_RESPONSE => {
                let id = id.ok_or_else(|| protocol("response has no id"))?;
                let outcome = match graph.get(root, "e") {
                    Some(error) if *error != Value::Null => {
                        Err(ErrorBody::from_graph(&graph.subgraph(error)))
                    }
                    _ => Ok(graph
                        .get(root, "r")
                        .map_or_else(Graph::new, |result| graph.subgraph(result))),
                };
                Ok(Self::Response { id, outcome })
            }
            other => Err(protocol(&format!("unknown frame type '{other}'"))),
        }
    }
}

fn protocol(message: &str) -> RpcError {
    RpcError::Protocol {
        message: message.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn request_round_trip() {
        let frame = CallFrame::Request {
            id: "7".into(),
            method: "readTestFile".into(),
            args: Args::from_json([json!("/a.test.ts")]),
        };
        let decoded = CallFrame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn push_has_no_id_on_the_wire() {
        let frame = CallFrame::event(ClientEvent::Finished, Args::from_json([json!([])]));
        let wire: serde_json::Value = serde_json::from_str(&frame.encode()).unwrap();
        let root = wire[0].as_object().unwrap();
        assert!(!root.contains_key("i"));
        assert_matches!(CallFrame::decode(&frame.encode()).unwrap(), CallFrame::Push { method, .. } if method == "onFinished");
    }

    #[test]
    fn error_response_round_trip() {
        let body = RpcError::internal("boom").to_error_body();
        let frame = CallFrame::Response {
            id: "1".into(),
            outcome: Err(body.clone()),
        };
        assert_matches!(
            CallFrame::decode(&frame.encode()).unwrap(),
            CallFrame::Response { outcome: Err(b), .. } if b == body
        );
    }

    #[test]
    fn missing_result_is_null() {
        let raw = r#"[{"t":"1","i":"2"},"s","9"]"#;
        assert_matches!(
            CallFrame::decode(raw).unwrap(),
            CallFrame::Response { id, outcome: Ok(g) } if id == "9" && *g.root() == Value::Null
        );
    }

    #[test]
    fn accepts_numeric_ids() {
        let raw = r#"[{"t":"1","i":5,"m":"2","a":"3"},"q","getFiles",[]]"#;
        assert_matches!(
            CallFrame::decode(raw).unwrap(),
            CallFrame::Request { id, method, .. } if id == "5" && method == "getFiles"
        );
    }

    #[test]
    fn cyclic_result_survives() {
        let mut result = Graph::new();
        let file = result.insert_object();
        let tasks = result.insert_array();
        let task = result.insert_object();
        let _ = result.set(file, "tasks", Value::Ref(tasks));
        let _ = result.push(tasks, Value::Ref(task));
        let _ = result.set(task, "file", Value::Ref(file));
        result.set_root(Value::Ref(file));

        let frame = CallFrame::Response {
            id: "3".into(),
            outcome: Ok(result),
        };
        let CallFrame::Response { outcome: Ok(g), .. } = CallFrame::decode(&frame.encode()).unwrap()
        else {
            panic!("expected result");
        };
        let tasks = g.get(g.root(), "tasks").cloned().unwrap();
        let task = g.at(&tasks, 0).cloned().unwrap();
        assert_eq!(g.get(&task, "file"), Some(g.root()));
    }

    #[test]
    fn malformed_frames_are_protocol_errors() {
        for raw in [
            "garbage",
            r#"["just a string"]"#,
            r#"[{"m":"1"},"x"]"#,
            r#"[{"t":"1"},"q"]"#,
            r#"[{"t":"1","m":"2","a":"2"},"q","getFiles"]"#,
            r#"[{"t":"1"},"s"]"#,
            r#"[{"t":"1","m":"1"},"z"]"#,
        ] {
            assert_matches!(CallFrame::decode(raw), Err(RpcError::Protocol { .. }), "{raw}");
        }
    }
}
