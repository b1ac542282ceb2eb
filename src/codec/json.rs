//! JSON codec using `serde_json`.
//!
//! i3 encodes every request and reply body as JSON. Bodies can carry raw
//! window class or title bytes that are not valid UTF-8, so decoding of
//! inbound payloads replaces invalid sequences instead of failing.
//!
//! # Example
//!
//! ```
//! use i3wire_client::codec::JsonCodec;
//! use serde_json::json;
//!
//! let encoded = JsonCodec::encode(&json!({"success": true})).unwrap();
//! let decoded = JsonCodec::decode_lossy(&encoded).unwrap();
//! assert_eq!(decoded["success"], true);
//! ```

use std::borrow::Cow;

use serde_json::Value;

use crate::error::Result;

/// JSON codec for frame payloads.
pub struct JsonCodec;

impl JsonCodec {
    /// Encode a value to JSON bytes.
    #[inline]
    pub fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    /// Decode JSON bytes to a value.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Decode an inbound body into an untyped value.
    ///
    /// Invalid UTF-8 is replaced with U+FFFD. An empty body decodes to
    /// `Value::Null`.
    pub fn decode_lossy(bytes: &[u8]) -> Result<Value> {
        if bytes.is_empty() {
            return Ok(Value::Null);
        }

        match String::from_utf8_lossy(bytes) {
            Cow::Borrowed(text) => Ok(serde_json::from_str(text)?),
            Cow::Owned(text) => {
                tracing::debug!("Payload contained invalid UTF-8, decoding lossily");
                Ok(serde_json::from_str(&text)?)
            }
        }
    }

    /// Convert an untyped value into a concrete type.
    #[inline]
    pub fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
        Ok(serde_json::from_value(value)?)
    }
}
