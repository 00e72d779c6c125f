//! Codec error type.

use thiserror::Error;

/// Errors raised while decoding a payload or converting between graphs and
/// `serde` types.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload was not valid JSON, or a typed conversion failed.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// The top-level JSON value was not an array.
    #[error("expected a top-level array")]
    NotAnArray,
    /// The top-level array had no root entry.
    #[error("payload has no root entry")]
    Empty,
    /// A reference string did not parse as an index.
    #[error("invalid reference '{0}'")]
    InvalidReference(String),
    /// A reference pointed past the end of the payload.
    #[error("reference {0} points past the end of the payload")]
    DanglingReference(usize),
    /// A non-root entry contained an object or array inline instead of a
    /// reference.
    #[error("entry {0} contains an inline container")]
    InlineContainer(usize),
    /// A value nested deeper than the flattening limit.
    #[error("value nests deeper than {0} levels")]
    TooDeep(usize),
    /// A value expanded to more entries than the flattening limit.
    #[error("value expands to more than {0} entries")]
    TooLarge(usize),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
