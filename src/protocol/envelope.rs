//! Classified, decoded frames.

use serde_json::Value;

use super::frame::Frame;
use super::types::{EventType, MessageType, TypeTag};
use crate::codec::JsonCodec;
use crate::error::Result;

/// A decoded frame: either a reply to a request or a pushed event.
///
/// The payload is opaque structured data; nothing in this crate looks at
/// its fields except the subscription acknowledgement.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Reply to a request.
    Reply {
        /// Request type this reply answers.
        message_type: MessageType,
        /// Decoded body.
        payload: Value,
    },
    /// Event pushed by the server.
    Event {
        /// Event class.
        event_type: EventType,
        /// Decoded body.
        payload: Value,
    },
}

impl Envelope {
    /// Classify and decode a frame.
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let tag = frame.classify()?;
        let payload = JsonCodec::decode_lossy(frame.payload())?;
        Ok(Self::from_tag(tag, payload))
    }

    /// Build an envelope from an already classified tag.
    pub fn from_tag(tag: TypeTag, payload: Value) -> Self {
        match tag {
            TypeTag::Reply(message_type) => Envelope::Reply {
                message_type,
                payload,
            },
            TypeTag::Event(event_type) => Envelope::Event {
                event_type,
                payload,
            },
        }
    }

    /// Check if this is an event.
    #[inline]
    pub fn is_event(&self) -> bool {
        matches!(self, Envelope::Event { .. })
    }

    /// Message type, for replies.
    pub fn message_type(&self) -> Option<MessageType> {
        match self {
            Envelope::Reply { message_type, .. } => Some(*message_type),
            Envelope::Event { .. } => None,
        }
    }

    /// Event type, for events.
    pub fn event_type(&self) -> Option<EventType> {
        match self {
            Envelope::Event { event_type, .. } => Some(*event_type),
            Envelope::Reply { .. } => None,
        }
    }

    /// Borrow the payload.
    pub fn payload(&self) -> &Value {
        match self {
            Envelope::Reply { payload, .. } | Envelope::Event { payload, .. } => payload,
        }
    }

    /// Take the payload.
    pub fn into_payload(self) -> Value {
        match self {
            Envelope::Reply { payload, .. } | Envelope::Event { payload, .. } => payload,
        }
    }
}
