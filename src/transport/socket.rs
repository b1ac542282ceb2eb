//! Unix domain socket discovery and connection.
//!
//! # Example
//!
//! ```ignore
//! use i3wire_client::transport::{connect, resolve_socket_path};
//! use std::time::Duration;
//!
//! let path = resolve_socket_path().await?;
//! let stream = connect(&path, Duration::from_secs(1)).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::net::UnixStream;
use tokio::process::Command;

use crate::error::{IpcError, Result};

/// Environment variables consulted, in order, before asking the binary.
pub const SOCKET_ENV_VARS: [&str; 2] = ["I3SOCK", "SWAYSOCK"];

/// Program asked for the socket path when no variable is set.
pub const SOCKET_PATH_PROGRAM: &str = "i3";

/// Resolve the server socket path.
///
/// Tries `I3SOCK`, then `SWAYSOCK`, then `i3 --get-socketpath`.
pub async fn resolve_socket_path() -> Result<String> {
    for var in SOCKET_ENV_VARS {
        if let Some(path) = std::env::var_os(var) {
            let path = path.to_string_lossy().trim().to_string();
            if !path.is_empty() {
                tracing::debug!("Socket path from ${}: {}", var, path);
                return Ok(path);
            }
        }
    }

    let output = Command::new(SOCKET_PATH_PROGRAM)
        .arg("--get-socketpath")
        .output()
        .await
        .map_err(|e| {
            IpcError::SocketPathNotFound(format!("failed to run {}: {}", SOCKET_PATH_PROGRAM, e))
        })?;

    if !output.status.success() {
        return Err(IpcError::SocketPathNotFound(format!(
            "{} --get-socketpath exited with {}",
            SOCKET_PATH_PROGRAM, output.status
        )));
    }

    parse_socket_path_output(&output.stdout)
}

/// Extract the path from `--get-socketpath` output.
fn parse_socket_path_output(stdout: &[u8]) -> Result<String> {
    let path = String::from_utf8_lossy(stdout).trim_end().to_string();
    if path.is_empty() {
        return Err(IpcError::SocketPathNotFound(
            "empty --get-socketpath output".to_string(),
        ));
    }
    Ok(path)
}

/// Connect to the socket at `path`, giving up after `timeout`.
pub async fn connect(path: &str, timeout: Duration) -> Result<UnixStream> {
    let connect_error = |source: std::io::Error| IpcError::ConnectionError {
        path: path.to_string(),
        source: Arc::new(source),
    };

    match tokio::time::timeout(timeout, UnixStream::connect(path)).await {
        Ok(Ok(stream)) => {
            tracing::debug!("Connected to {}", path);
            Ok(stream)
        }
        Ok(Err(e)) => Err(connect_error(e)),
        Err(_) => Err(connect_error(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            format!("no connection within {:?}", timeout),
        ))),
    }
}
