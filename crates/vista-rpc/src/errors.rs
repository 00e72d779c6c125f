//! RPC error codes and error type.

use serde::{Deserialize, Serialize};
use vista_codec::{CodecError, Graph};

// ── Error code constants ────────────────────────────────────────────

/// Malformed frame. The connection that sent it is closed.
pub const PROTOCOL_ERROR: &str = "PROTOCOL_ERROR";
/// A call got no response in time.
pub const TIMEOUT: &str = "TIMEOUT";
/// Generic handler failure reported by the remote side.
pub const HANDLER_ERROR: &str = "HANDLER_ERROR";
/// Invalid or missing parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
/// Generic not-found.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Write attempted on a path the engine does not track.
pub const NOT_REGISTERED: &str = "NOT_REGISTERED";
/// Method not found in the registry.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// Send on a dead transport.
pub const TRANSPORT_CLOSED: &str = "TRANSPORT_CLOSED";
/// Pending call abandoned because the connection closed.
pub const CONNECTION_CLOSED: &str = "CONNECTION_CLOSED";

/// Error slot of a response frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable code.
    #[serde(default = "default_code")]
    pub code: String,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Error class name.
    #[serde(default = "default_name")]
    pub name: String,
    /// Optional stack or cause chain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

fn default_code() -> String {
    HANDLER_ERROR.to_owned()
}

fn default_name() -> String {
    "Error".to_owned()
}

impl ErrorBody {
    /// Encode as a graph for the response error slot.
    pub fn to_graph(&self) -> Graph {
        let mut graph = Graph::new();
        let root = graph.insert_error_payload(&self.name, &self.message, self.stack.as_deref());
        if let Some(id) = root.as_ref_id() {
            let _ = graph.set(id, "code", self.code.as_str().into());
        }
        graph.set_root(root);
        graph
    }

    /// Read an error slot. Anything that is not an object becomes a
    /// `HANDLER_ERROR` whose message is the flattened value. A slot too large
    /// to flatten keeps only the reason.
    pub fn from_graph(graph: &Graph) -> Self {
        let json = match graph.to_json(graph.root()) {
            Ok(json) => json,
            Err(err) => serde_json::Value::String(format!("Unreadable error payload: {err}")),
        };
        if json.is_object() {
            if let Ok(body) = serde_json::from_value::<ErrorBody>(json.clone()) {
                return body;
            }
        }
        let message = match json {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Self {
            code: default_code(),
            message,
            name: default_name(),
            stack: None,
        }
    }
}

/// RPC error type returned by handlers and by outbound calls.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// Inbound frame could not be decoded.
    #[error("protocol error: {message}")]
    Protocol {
        /// What was wrong with the frame.
        message: String,
    },

    /// No response arrived within the call timeout.
    #[error("[vista-api]: Timeout calling \"{method}\"")]
    Timeout {
        /// Method that was called.
        method: String,
    },

    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// Description of what is wrong.
        message: String,
    },

    /// Requested resource not found.
    #[error("{message}")]
    NotFound {
        /// Human-readable message.
        message: String,
    },

    /// Write on a file the engine does not track.
    #[error("Test file \"{id}\" was not registered, so it cannot be updated using the API.")]
    NotRegistered {
        /// Path that was rejected.
        id: String,
    },

    /// Internal error.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },

    /// No handler registered for the method.
    #[error("Method '{method}' not found")]
    MethodNotFound {
        /// Requested method.
        method: String,
    },

    /// The transport refused the frame.
    #[error("transport closed")]
    TransportClosed,

    /// The connection closed while the call was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// The remote side answered with an error.
    #[error("{}", .0.message)]
    Remote(ErrorBody),
}

impl RpcError {
    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &str {
        match self {
            Self::Protocol { .. } => PROTOCOL_ERROR,
            Self::Timeout { .. } => TIMEOUT,
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::NotFound { .. } => NOT_FOUND,
            Self::NotRegistered { .. } => NOT_REGISTERED,
            Self::Internal { .. } => INTERNAL_ERROR,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::TransportClosed => TRANSPORT_CLOSED,
            Self::ConnectionClosed => CONNECTION_CLOSED,
            Self::Remote(body) => &body.code,
        }
    }

    /// Convert to the wire-format error body.
    pub fn to_error_body(&self) -> ErrorBody {
        match self {
            Self::Remote(body) => body.clone(),
            _ => ErrorBody {
                code: self.code().to_owned(),
                message: self.to_string(),
                name: "HandlerError".to_owned(),
                stack: None,
            },
        }
    }

    /// Shorthand for [`RpcError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    /// Shorthand for [`RpcError::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<CodecError> for RpcError {
    fn from(err: CodecError) -> Self {
        Self::Protocol {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vista_codec::Value;

    #[test]
    fn timeout_message_names_method() {
        let err = RpcError::Timeout {
            method: "getFiles".into(),
        };
        assert_eq!(err.code(), TIMEOUT);
        assert_eq!(err.to_string(), "[vista-api]: Timeout calling \"getFiles\"");
    }

    #[test]
    fn not_registered_message() {
        let err = RpcError::NotRegistered {
            id: "/src/a.test.ts".into(),
        };
        assert_eq!(err.code(), NOT_REGISTERED);
        assert_eq!(
            err.to_string(),
            "Test file \"/src/a.test.ts\" was not registered, so it cannot be updated using the API."
        );
    }

    #[test]
    fn codec_error_becomes_protocol() {
        let err: RpcError = CodecError::Empty.into();
        assert_eq!(err.code(), PROTOCOL_ERROR);
    }

    #[test]
    fn error_body_uses_handler_name() {
        let body = RpcError::internal("boom").to_error_body();
        assert_eq!(body.code, INTERNAL_ERROR);
        assert_eq!(body.message, "boom");
        assert_eq!(body.name, "HandlerError");
    }

    #[test]
    fn remote_keeps_code() {
        let err = RpcError::Remote(ErrorBody {
            code: NOT_FOUND.into(),
            message: "nope".into(),
            name: "Error".into(),
            stack: None,
        });
        assert_eq!(err.code(), NOT_FOUND);
        assert_eq!(err.to_string(), "nope");
    }

    #[test]
    fn error_body_graph_round_trip() {
        let body = ErrorBody {
            code: NOT_REGISTERED.into(),
            message: "denied".into(),
            name: "HandlerError".into(),
            stack: Some("at x".into()),
        };
        assert_eq!(ErrorBody::from_graph(&body.to_graph()), body);
    }

    #[test]
    fn error_body_from_foreign_shapes() {
        let plain = ErrorBody::from_graph(&Graph::from_json(&json!("kaput")));
        assert_eq!(plain.code, HANDLER_ERROR);
        assert_eq!(plain.message, "kaput");

        let partial = ErrorBody::from_graph(&Graph::from_json(&json!({"message": "m"})));
        assert_eq!(partial.code, HANDLER_ERROR);
        assert_eq!(partial.name, "Error");
        assert_eq!(partial.message, "m");
    }

    #[test]
    fn deeply_nested_error_payload_is_summarized() {
        let mut graph = Graph::new();
        let head = graph.insert_object();
        let mut tail = head;
        for _ in 0..100_000 {
            let next = graph.insert_object();
            let _ = graph.set(tail, "cause", Value::Ref(next));
            tail = next;
        }
        graph.set_root(Value::Ref(head));

        let body = ErrorBody::from_graph(&graph);
        assert_eq!(body.code, HANDLER_ERROR);
        assert!(body.message.starts_with("Unreadable error payload"), "{}", body.message);
    }
}
