//! # vista-codec
//!
//! Identity-preserving encoding for value graphs that may contain cycles.
//!
//! - [`Graph`]: arena of object/array nodes addressed by [`NodeId`]
//! - [`encode`] / [`decode`]: flat-array wire format (one JSON array, every
//!   container and string stored once and referenced by index)
//! - Conversions to and from `serde_json` and `serde` types

#![deny(unsafe_code)]

pub mod convert;
pub mod errors;
pub mod flatted;
pub mod graph;

pub use convert::{MAX_JSON_DEPTH, MAX_JSON_VALUES};
pub use errors::{CodecError, Result};
pub use flatted::{decode, encode};
pub use graph::{Graph, Node, NodeId, Value};
