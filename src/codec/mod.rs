//! Codec module - serialization/deserialization for payloads.
//!
//! - [`JsonCodec`] - JSON using `serde_json`, with lossy UTF-8 decoding for
//!   inbound bodies
//!
//! Codecs are marker structs with static methods rather than trait objects;
//! the i3 protocol only ever carries JSON.

mod json;

pub use json::JsonCodec;
