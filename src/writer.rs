//! Dedicated writer task for outbound frames.
//!
//! All socket writes go through one task fed by an mpsc channel, so callers
//! never share the write half and frames are never interleaved.
//!
//! # Architecture
//!
//! ```text
//! request()   ─┐
//! subscribe() ─┼─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Socket
//! hook tasks  ─┘
//! ```
//!
//! Frames that are already queued when the task wakes up are coalesced into
//! one buffer and written with a single `write_all`.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{IpcError, Result};
use crate::protocol::{payload_length, Header, HEADER_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// A frame ready to be written to the socket.
#[derive(Debug)]
pub struct OutboundFrame {
    /// Pre-encoded header (14 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes (often empty for queries).
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    ///
    /// Fails with `Protocol` if the payload does not fit the length field.
    #[inline]
    pub fn new(type_tag: u32, payload: Bytes) -> Result<Self> {
        let length = payload_length(payload.len())?;
        Ok(Self {
            header: Header::new(length, type_tag).encode(),
            payload,
        })
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Queue a frame for writing.
    ///
    /// Fails with `ConnectionClosed` once the writer task has exited.
    pub async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| IpcError::ConnectionClosed)
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task exits cleanly when every handle has been dropped, or with an
/// error when a write fails.
pub fn spawn_writer_task<W>(writer: W, capacity: usize) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Main writer loop - receives frames and writes them to the socket.
async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();

    while let Some(first) = rx.recv().await {
        let mut batch = 1;
        encode_into(&mut buf, &first);

        while batch < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(frame) => {
                    encode_into(&mut buf, &frame);
                    batch += 1;
                }
                Err(_) => break,
            }
        }

        writer.write_all(&buf).await?;
        writer.flush().await?;
        tracing::trace!("Wrote {} frame(s), {} bytes", batch, buf.len());
        buf.clear();
    }

    tracing::debug!("Writer channel closed, stopping writer task");
    Ok(())
}

fn encode_into(buf: &mut BytesMut, frame: &OutboundFrame) {
    buf.reserve(frame.size());
    buf.extend_from_slice(&frame.header);
    buf.extend_from_slice(&frame.payload);
}
