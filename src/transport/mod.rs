//! Transport module - socket discovery, connection and frame reading.
//!
//! Provides:
//! - socket path resolution (`I3SOCK`, `SWAYSOCK`, then `i3 --get-socketpath`)
//! - Unix domain socket connect with a timeout
//! - exact-length frame reads over any `AsyncRead`
//!
//! Writes go through the writer task in [`crate::writer`].

mod frame_io;
mod socket;

pub use frame_io::read_frame;
pub use socket::{connect, resolve_socket_path, SOCKET_ENV_VARS, SOCKET_PATH_PROGRAM};
