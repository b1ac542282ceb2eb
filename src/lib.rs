//! # i3wire-client
//!
//! Async client for the i3 window manager IPC protocol.
//!
//! One Unix socket carries both request/reply traffic (commands and
//! queries) and events the server pushes once the client has subscribed.
//!
//! ## Architecture
//!
//! - **Writer task**: every outbound frame goes through one mpsc-fed task
//! - **Reader stage**: the only reader of the socket; resolves replies and
//!   subscription acknowledgements, queues events
//! - **Handler stage**: runs hooks for queued events in arrival order
//!
//! ## Example
//!
//! ```ignore
//! use i3wire_client::{Connection, EventType, Hook};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> i3wire_client::Result<()> {
//!     let conn = Connection::connect().await?;
//!
//!     conn.register(
//!         Hook::new(EventType::Window, |event: Value| async move {
//!             println!("focused {}", event["container"]["name"]);
//!             Ok(())
//!         })
//!         .on_change("focus"),
//!     );
//!     conn.subscribe(&[EventType::Window]).await?;
//!
//!     conn.command("workspace 2").await?;
//!     conn.wait_for_shutdown().await
//! }
//! ```

pub mod codec;
pub mod error;
pub mod handler;
pub mod protocol;
pub mod subscription;
pub mod transport;
pub mod writer;

mod client;
mod dispatch;

pub use client::{
    Connection, ConnectionBuilder, ConnectionConfig, DEFAULT_CONNECT_TIMEOUT,
    DEFAULT_REPLY_TIMEOUT,
};
pub use error::{IpcError, Result};
pub use handler::{Hook, HookHandle};
pub use protocol::{Envelope, EventType, MessageType};
