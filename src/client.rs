//! Connection builder and request API.
//!
//! The [`ConnectionBuilder`] provides a fluent API for configuring a
//! connection. The [`Connection`] owns the lifecycle:
//! 1. Resolve the socket path (unless one was given)
//! 2. Connect and split the stream
//! 3. Spawn the writer task and the dispatcher stages
//! 4. Serve requests, subscriptions and hooks until shutdown
//!
//! # Example
//!
//! ```ignore
//! use i3wire_client::{Connection, EventType};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> i3wire_client::Result<()> {
//!     let conn = Connection::builder()
//!         .reply_timeout(std::time::Duration::from_secs(2))
//!         .connect()
//!         .await?;
//!
//!     println!("{}", conn.get_version().await?["human_readable"]);
//!
//!     conn.on(EventType::Workspace, |event: Value| async move {
//!         println!("workspace {}", event["change"]);
//!         Ok(())
//!     });
//!     conn.subscribe(&[EventType::Workspace]).await?;
//!
//!     conn.wait_for_shutdown().await
//! }
//! ```

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::dispatch::{Dispatcher, ReaderSettings, Shared, StopSignal};
use crate::error::{IpcError, Result};
use crate::handler::{Hook, HookHandle, HookResult};
use crate::protocol::{Envelope, EventType, MessageType, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::subscription;
use crate::transport;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Default bound on waiting for a reply.
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Default bound on establishing the socket connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// How long a request or subscription waits for its reply.
    ///
    /// Also bounds how long a payload may take to arrive once its header
    /// has been read.
    pub reply_timeout: Duration,
    /// How long `connect` may take.
    pub connect_timeout: Duration,
    /// Largest payload accepted from the server.
    pub max_payload_size: u32,
    /// Outbound frame queue capacity.
    pub channel_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            reply_timeout: DEFAULT_REPLY_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Builder for configuring and opening a [`Connection`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionBuilder {
    socket_path: Option<String>,
    config: ConnectionConfig,
}

impl ConnectionBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to this socket instead of resolving one.
    pub fn socket_path(mut self, path: impl Into<String>) -> Self {
        self.socket_path = Some(path.into());
        self
    }

    /// Set the reply timeout.
    ///
    /// Default: 1 second
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.reply_timeout = timeout;
        self
    }

    /// Set the connect timeout.
    ///
    /// Default: 5 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the largest accepted payload.
    ///
    /// Default: 64 MiB
    pub fn max_payload_size(mut self, limit: u32) -> Self {
        self.config.max_payload_size = limit;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Open the connection and start the dispatcher.
    pub async fn connect(self) -> Result<Connection> {
        let path = match self.socket_path {
            Some(path) => path,
            None => transport::resolve_socket_path().await?,
        };

        let stream = transport::connect(&path, self.config.connect_timeout).await?;
        let (read_half, write_half) = stream.into_split();

        tracing::info!("Connected to {}", path);
        Ok(Connection::from_io(read_half, write_half, self.config))
    }
}

struct Inner {
    shared: Arc<Shared>,
    writer: WriterHandle,
    /// Serializes requests and subscriptions.
    gate: Mutex<()>,
    stop: StopSignal,
    dispatcher: Mutex<Dispatcher>,
    config: ConnectionConfig,
}

/// An open IPC connection.
///
/// Cheap to clone; every clone talks to the same socket. A hook may capture
/// a clone to issue requests of its own. Because that clone keeps the
/// connection alive, such connections end with [`Connection::shutdown`].
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Create a new connection builder.
    pub fn builder() -> ConnectionBuilder {
        ConnectionBuilder::new()
    }

    /// Resolve the socket path and connect with default settings.
    pub async fn connect() -> Result<Self> {
        ConnectionBuilder::new().connect().await
    }

    /// Run the protocol over an existing reader/writer pair.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_io<R, W>(reader: R, writer: W, config: ConnectionConfig) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let shared = Arc::new(Shared::new());
        let (writer, writer_task) = spawn_writer_task(writer, config.channel_capacity);

        let settings = ReaderSettings {
            max_payload_size: config.max_payload_size,
            payload_timeout: config.reply_timeout,
        };
        let dispatcher = Dispatcher::spawn(reader, shared.clone(), settings);
        let stop = dispatcher.stop_signal();

        // A failed write leaves the stream unusable; fail waiters the same way.
        let watched = shared.clone();
        tokio::spawn(async move {
            match writer_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("Writer task failed: {}", e);
                    watched.correlator.close(e);
                }
                Err(e) => {
                    tracing::error!("Writer task panicked: {}", e);
                    watched.correlator.close(IpcError::ConnectionClosed);
                }
            }
        });

        Self {
            inner: Arc::new(Inner {
                shared,
                writer,
                gate: Mutex::new(()),
                stop,
                dispatcher: Mutex::new(dispatcher),
                config,
            }),
        }
    }

    /// Configuration this connection runs with.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Send one request and wait for its reply.
    ///
    /// Requests are serialized; a second caller waits for the first to
    /// finish. Subscriptions go through [`Connection::subscribe`].
    pub async fn request(
        &self,
        message_type: MessageType,
        payload: impl Into<Bytes>,
    ) -> Result<Envelope> {
        if message_type == MessageType::Subscribe {
            return Err(IpcError::Protocol(
                "subscribe requests go through subscribe()".to_string(),
            ));
        }

        let _gate = self.inner.gate.lock().await;
        let correlator = &self.inner.shared.correlator;

        let frame = OutboundFrame::new(message_type.ordinal(), payload.into())?;
        let rx = correlator.expect_reply(message_type)?;
        if let Err(e) = self.inner.writer.send(frame).await {
            correlator.withdraw_reply();
            return Err(correlator.closed().unwrap_or(e));
        }

        tracing::debug!("Sent {} request", message_type);
        correlator
            .await_reply(rx, self.inner.config.reply_timeout)
            .await
    }

    /// Send a request and deserialize the reply payload into `T`.
    pub async fn request_as<T: DeserializeOwned>(
        &self,
        message_type: MessageType,
        payload: impl Into<Bytes>,
    ) -> Result<T> {
        let envelope = self.request(message_type, payload).await?;
        crate::codec::JsonCodec::from_value(envelope.into_payload())
    }

    async fn query(&self, message_type: MessageType) -> Result<Value> {
        self.request(message_type, Bytes::new())
            .await
            .map(Envelope::into_payload)
    }

    /// Run a command string. Returns one result object per command.
    pub async fn command(&self, command: &str) -> Result<Value> {
        if command.trim().is_empty() {
            return Err(IpcError::Protocol("empty command".to_string()));
        }
        self.request(MessageType::Command, Bytes::copy_from_slice(command.as_bytes()))
            .await
            .map(Envelope::into_payload)
    }

    /// Run `verb` with `args` as a command, e.g. `run("workspace", "2")`.
    pub async fn run(&self, verb: &str, args: &str) -> Result<Value> {
        let command = if args.is_empty() {
            verb.to_string()
        } else {
            format!("{verb} {args}")
        };
        self.command(&command).await
    }

    /// List workspaces.
    pub async fn get_workspaces(&self) -> Result<Value> {
        self.query(MessageType::GetWorkspaces).await
    }

    /// List outputs.
    pub async fn get_outputs(&self) -> Result<Value> {
        self.query(MessageType::GetOutputs).await
    }

    /// Fetch the layout tree.
    pub async fn get_tree(&self) -> Result<Value> {
        self.query(MessageType::GetTree).await
    }

    /// List marks.
    pub async fn get_marks(&self) -> Result<Value> {
        self.query(MessageType::GetMarks).await
    }

    /// Fetch one bar's configuration, or the list of bar ids with `None`.
    pub async fn get_bar_config(&self, bar_id: Option<&str>) -> Result<Value> {
        let payload = bar_id.map_or_else(Bytes::new, |id| Bytes::copy_from_slice(id.as_bytes()));
        self.request(MessageType::GetBarConfig, payload)
            .await
            .map(Envelope::into_payload)
    }

    /// Fetch the server version.
    pub async fn get_version(&self) -> Result<Value> {
        self.query(MessageType::GetVersion).await
    }

    /// Subscribe to `events` in addition to the current subscriptions.
    ///
    /// Returns the full acknowledged set.
    pub async fn subscribe(&self, events: &[EventType]) -> Result<BTreeSet<EventType>> {
        let _gate = self.inner.gate.lock().await;
        let shared = &self.inner.shared;
        subscription::subscribe(
            &shared.correlator,
            &shared.subscriptions,
            &self.inner.writer,
            events,
            self.inner.config.reply_timeout,
        )
        .await
    }

    /// Event types acknowledged so far.
    pub fn subscriptions(&self) -> BTreeSet<EventType> {
        self.inner.shared.subscriptions.active()
    }

    /// Register a callback for `event_type`.
    pub fn on<F, T, Fut>(&self, event_type: EventType, callback: F) -> HookHandle
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        self.register(Hook::new(event_type, callback))
    }

    /// Register a prepared hook.
    pub fn register(&self, hook: Hook) -> HookHandle {
        self.inner.shared.hooks.register(hook)
    }

    /// Remove a hook. Returns `false` if it was already removed.
    pub fn unregister(&self, handle: HookHandle) -> bool {
        self.inner.shared.hooks.unregister(handle)
    }

    /// Drop events of the given types (all types with `None`) until resumed.
    pub fn pause(&self, event_types: Option<&[EventType]>) {
        self.inner.shared.hooks.pause(event_types);
    }

    /// Resume dispatch for the given types (all types with `None`).
    pub fn resume(&self, event_types: Option<&[EventType]>) {
        self.inner.shared.hooks.resume(event_types);
    }

    /// Check whether the connection has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.shared.correlator.closed().is_some()
    }

    /// Signal the dispatcher to stop without waiting for it.
    ///
    /// Safe to call from inside a hook.
    pub fn stop(&self) {
        self.inner.stop.raise();
    }

    /// Stop the dispatcher and wait for both stages to exit.
    ///
    /// Pending requests fail with `Cancelled`. Calling this from inside a
    /// hook never returns; use [`Connection::stop`] there.
    pub async fn shutdown(&self) {
        self.stop();
        let mut dispatcher = self.inner.dispatcher.lock().await;
        dispatcher.join_reader().await;
        dispatcher.join_handler().await;
        tracing::debug!("Connection shut down");
    }

    /// Wait until the connection ends.
    ///
    /// Returns `Ok` when it ended through `stop`/`shutdown` or because the
    /// server closed the stream, and the fatal cause otherwise.
    pub async fn wait_for_shutdown(&self) -> Result<()> {
        let cause = {
            let mut dispatcher = self.inner.dispatcher.lock().await;
            let cause = dispatcher.join_reader().await;
            dispatcher.join_handler().await;
            cause
        };

        match cause.or_else(|| self.inner.shared.correlator.closed()) {
            None | Some(IpcError::Cancelled) | Some(IpcError::ConnectionClosed) => Ok(()),
            Some(e) => Err(e),
        }
    }
}
