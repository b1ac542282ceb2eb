//! Frame struct with typed accessors.
//!
//! Represents a complete protocol frame with header and payload.
//! Uses `bytes::Bytes` for zero-copy payload sharing.
//!
//! # Example
//!
//! ```
//! use i3wire_client::protocol::{Frame, MessageType};
//! use bytes::Bytes;
//!
//! let frame = Frame::new(MessageType::GetVersion.ordinal(), Bytes::from_static(b"{}")).unwrap();
//!
//! assert_eq!(frame.type_tag(), 7);
//! assert_eq!(frame.payload(), b"{}");
//! ```

use bytes::Bytes;

use super::types::TypeTag;
use super::wire_format::{payload_length, Header, HEADER_SIZE};
use crate::error::Result;

/// A complete protocol frame.
///
/// The header's declared length always matches the payload; there is no way
/// to build a frame where they disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    header: Header,
    payload: Bytes,
}

impl Frame {
    /// Create a new frame, deriving the header length from the payload.
    ///
    /// Fails with `Protocol` if the payload is longer than `u32::MAX` bytes.
    pub fn new(type_tag: u32, payload: Bytes) -> Result<Self> {
        let length = payload_length(payload.len())?;
        Ok(Self {
            header: Header::new(length, type_tag),
            payload,
        })
    }

    /// Create a frame from a type tag and raw bytes (copies data).
    pub fn from_parts(type_tag: u32, payload: &[u8]) -> Result<Self> {
        Self::new(type_tag, Bytes::copy_from_slice(payload))
    }

    /// Get the decoded header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get a reference to the payload bytes.
    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Get a clone of the payload as Bytes (cheap, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.clone()
    }

    /// Get the payload length.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Get the raw type tag.
    #[inline]
    pub fn type_tag(&self) -> u32 {
        self.header.type_tag
    }

    /// Check if the event flag is set.
    #[inline]
    pub fn is_event(&self) -> bool {
        self.header.is_event()
    }

    /// Classify the type tag.
    pub fn classify(&self) -> Result<TypeTag> {
        TypeTag::classify(self.header.type_tag)
    }

    /// Encode the frame into a contiguous buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }
}

/// Build a complete frame as a single byte vector.
///
/// # Example
///
/// ```
/// use i3wire_client::protocol::{build_frame, HEADER_SIZE};
///
/// let bytes = build_frame(0, b"nop").unwrap();
/// assert_eq!(bytes.len(), HEADER_SIZE + 3);
/// ```
pub fn build_frame(type_tag: u32, payload: &[u8]) -> Result<Vec<u8>> {
    let length = payload_length(payload.len())?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&Header::new(length, type_tag).encode());
    buf.extend_from_slice(payload);
    Ok(buf)
}
