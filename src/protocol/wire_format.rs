//! Wire format encoding and decoding.
//!
//! Implements the 14-byte i3 IPC header:
//! ```text
//! ┌──────────┬──────────┬──────────┐
//! │ Magic    │ Length   │ Type     │
//! │ 6 bytes  │ 4 bytes  │ 4 bytes  │
//! │ "i3-ipc" │ uint32 NE│ uint32 NE│
//! └──────────┴──────────┴──────────┘
//! ```
//!
//! Multi-byte integers use the host's native byte order: client and server
//! always share a machine.

use crate::error::{IpcError, Result};

/// Magic literal opening every frame.
pub const MAGIC: &[u8; 6] = b"i3-ipc";

/// Header size in bytes (fixed, exactly 14).
pub const HEADER_SIZE: usize = MAGIC.len() + 8;

/// Default maximum payload size (64 MiB). A full `get_tree` reply on a busy
/// session is a few hundred KiB.
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Bit 31 of the type tag marks an event frame.
pub const EVENT_FLAG: u32 = 1 << 31;

/// Mask selecting the event ordinal from an event type tag.
pub const EVENT_ORDINAL_MASK: u32 = 0x7F;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Payload length in bytes.
    pub payload_length: u32,
    /// Message or event type tag (bit 31 = event).
    pub type_tag: u32,
}

impl Header {
    /// Create a new header.
    pub fn new(payload_length: u32, type_tag: u32) -> Self {
        Self {
            payload_length,
            type_tag,
        }
    }

    /// Encode header to bytes.
    ///
    /// # Example
    ///
    /// ```
    /// use i3wire_client::protocol::{Header, HEADER_SIZE};
    ///
    /// let bytes = Header::new(0, 7).encode();
    /// assert_eq!(bytes.len(), HEADER_SIZE);
    /// assert_eq!(&bytes[..6], b"i3-ipc");
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (14 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..6].copy_from_slice(MAGIC);
        buf[6..10].copy_from_slice(&self.payload_length.to_ne_bytes());
        buf[10..14].copy_from_slice(&self.type_tag.to_ne_bytes());
    }

    /// Decode header from bytes.
    ///
    /// Fails with `MalformedFrame` if the buffer is too short or the magic
    /// literal does not match.
    ///
    /// # Example
    ///
    /// ```
    /// use i3wire_client::protocol::Header;
    ///
    /// let bytes = Header::new(5, 1).encode();
    /// let header = Header::decode(&bytes).unwrap();
    /// assert_eq!(header.payload_length, 5);
    /// assert_eq!(header.type_tag, 1);
    /// ```
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(IpcError::MalformedFrame(format!(
                "header needs {} bytes, got {}",
                HEADER_SIZE,
                buf.len()
            )));
        }

        if &buf[0..6] != MAGIC {
            return Err(IpcError::MalformedFrame(format!(
                "bad magic {:?}",
                String::from_utf8_lossy(&buf[0..6])
            )));
        }

        Ok(Self {
            payload_length: u32::from_ne_bytes([buf[6], buf[7], buf[8], buf[9]]),
            type_tag: u32::from_ne_bytes([buf[10], buf[11], buf[12], buf[13]]),
        })
    }

    /// Reject payloads larger than `max_payload_size`.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_length > max_payload_size {
            return Err(IpcError::MalformedFrame(format!(
                "Payload size {} exceeds maximum {}",
                self.payload_length, max_payload_size
            )));
        }
        Ok(())
    }

    /// Check if the event flag is set.
    #[inline]
    pub fn is_event(&self) -> bool {
        self.type_tag & EVENT_FLAG != 0
    }
}

/// Length field for a payload of `len` bytes.
///
/// Fails with `Protocol` if the payload does not fit the 32-bit length field.
pub fn payload_length(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| {
        IpcError::Protocol(format!(
            "payload of {} bytes exceeds the {} byte frame limit",
            len,
            u32::MAX
        ))
    })
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8]) -> Result<Header> {
    Header::decode(buf)
}
