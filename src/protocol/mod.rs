//! Protocol module - wire format, type tags, frames and envelopes.
//!
//! This module implements the i3 IPC framing:
//! - 14-byte header encoding/decoding
//! - Message/event type enumerations and tag classification
//! - Frame struct with typed accessors
//! - Envelope: a classified frame with a decoded JSON payload

mod envelope;
mod frame;
mod types;
mod wire_format;

pub use envelope::Envelope;
pub use frame::{build_frame, Frame};
pub use types::{classify, EventType, MessageType, TypeTag};
pub use wire_format::{
    decode_header, payload_length, Header, DEFAULT_MAX_PAYLOAD_SIZE, EVENT_FLAG,
    EVENT_ORDINAL_MASK, HEADER_SIZE, MAGIC,
};
