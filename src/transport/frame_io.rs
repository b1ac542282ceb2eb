//! Reading whole frames off a byte stream.
//!
//! A domain socket may hand back fewer bytes than requested, so both the
//! header and the payload are read with `read_exact`, which loops over
//! partial reads.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{IpcError, Result};
use crate::protocol::{Frame, Header, HEADER_SIZE};

/// Read exactly one frame.
///
/// Waiting for the header is unbounded: an idle event stream is normal.
/// Once a header has arrived the payload must follow within
/// `payload_timeout`, otherwise the stream is stuck mid-frame and the read
/// fails with `Timeout`.
///
/// # Errors
///
/// - `ConnectionClosed` if the stream ends
/// - `MalformedFrame` on a bad magic or an oversized payload
/// - `Timeout` if the payload stalls
pub async fn read_frame<R>(
    reader: &mut R,
    max_payload_size: u32,
    payload_timeout: Duration,
) -> Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let mut header_buf = [0u8; HEADER_SIZE];
    reader
        .read_exact(&mut header_buf)
        .await
        .map_err(map_read_error)?;

    let header = Header::decode(&header_buf)?;
    header.validate(max_payload_size)?;

    let mut payload = BytesMut::zeroed(header.payload_length as usize);
    if !payload.is_empty() {
        match tokio::time::timeout(payload_timeout, reader.read_exact(&mut payload)).await {
            Ok(read) => {
                read.map_err(map_read_error)?;
            }
            Err(_) => return Err(IpcError::Timeout(payload_timeout)),
        }
    }

    Frame::new(header.type_tag, payload.freeze())
}

/// End of stream means the peer hung up.
fn map_read_error(err: std::io::Error) -> IpcError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        IpcError::ConnectionClosed
    } else {
        err.into()
    }
}
