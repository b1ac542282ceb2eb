//! Dispatcher - the receive side of a connection.
//!
//! Two cooperating tasks share one stop signal:
//!
//! ```text
//!            ┌───────────────┐  replies/acks   ┌────────────┐
//! socket ──► │ reader stage  │ ──────────────► │ Correlator │ ──► request()
//!            │ (sole reader) │                 └────────────┘
//!            └──────┬────────┘
//!                   │ events (unbounded, arrival order)
//!                   ▼
//!            ┌───────────────┐                 ┌──────────────┐
//!            │ handler stage │ ──────────────► │ HookRegistry │
//!            └───────────────┘                 └──────────────┘
//! ```
//!
//! The reader stage resolves replies itself, so a slow hook in the handler
//! stage never delays a reply or stops the socket from being drained.

pub(crate) mod correlator;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::codec::JsonCodec;
use crate::error::{IpcError, Result};
use crate::handler::HookRegistry;
use crate::protocol::{Envelope, EventType, Frame, MessageType, TypeTag};
use crate::subscription::{parse_ack, SubscriptionState};
use crate::transport::read_frame;
use correlator::{Claim, Correlator};

/// Settings the reader stage needs.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReaderSettings {
    pub(crate) max_payload_size: u32,
    pub(crate) payload_timeout: Duration,
}

/// State shared between the two stages and the request side.
pub(crate) struct Shared {
    pub(crate) correlator: Correlator,
    pub(crate) subscriptions: SubscriptionState,
    pub(crate) hooks: HookRegistry,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            correlator: Correlator::new(),
            subscriptions: SubscriptionState::new(),
            hooks: HookRegistry::new(),
        }
    }
}

/// Cloneable trigger for the shared stop signal.
#[derive(Clone)]
pub(crate) struct StopSignal(Arc<watch::Sender<bool>>);

impl StopSignal {
    /// Raise the signal. Both stages exit at their next await point.
    pub(crate) fn raise(&self) {
        self.0.send_replace(true);
    }
}

/// Handle owning the two dispatcher tasks.
pub(crate) struct Dispatcher {
    stop: StopSignal,
    reader: Option<JoinHandle<IpcError>>,
    handler: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the reader and handler stages.
    pub(crate) fn spawn<R>(reader: R, shared: Arc<Shared>, settings: ReaderSettings) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let reader_task = tokio::spawn(reader_stage(
            reader,
            shared.clone(),
            events_tx,
            stop_rx.clone(),
            settings,
        ));
        let handler_task = tokio::spawn(handler_stage(events_rx, shared, stop_rx));

        Self {
            stop: StopSignal(Arc::new(stop_tx)),
            reader: Some(reader_task),
            handler: Some(handler_task),
        }
    }

    /// Signal handle that outlives a borrow of the dispatcher.
    pub(crate) fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Wait for the reader stage to end and return why it ended.
    ///
    /// Returns `None` if the reader was already joined.
    pub(crate) async fn join_reader(&mut self) -> Option<IpcError> {
        let task = self.reader.take()?;
        Some(task.await.unwrap_or_else(|e| {
            tracing::error!("Reader stage panicked: {}", e);
            IpcError::Cancelled
        }))
    }

    /// Wait for the handler stage to end.
    pub(crate) async fn join_handler(&mut self) {
        if let Some(task) = self.handler.take() {
            if let Err(e) = task.await {
                tracing::error!("Handler stage panicked: {}", e);
            }
        }
    }
}

/// Reader stage: pull frames off the socket and route them.
///
/// Returns the cause it stopped with; every waiter has been failed with
/// that cause by the time it returns.
async fn reader_stage<R>(
    mut reader: R,
    shared: Arc<Shared>,
    events: mpsc::UnboundedSender<Envelope>,
    mut stop: watch::Receiver<bool>,
    settings: ReaderSettings,
) -> IpcError
where
    R: AsyncRead + Unpin,
{
    let cause = loop {
        if *stop.borrow() {
            break IpcError::Cancelled;
        }

        let frame = tokio::select! {
            biased;
            changed = stop.changed() => {
                // A dropped sender means every Connection handle is gone.
                if changed.is_err() {
                    break IpcError::Cancelled;
                }
                continue;
            }
            frame = read_frame(&mut reader, settings.max_payload_size, settings.payload_timeout) => frame,
        };

        let routed = match frame {
            Ok(frame) => route_frame(&frame, &shared, &events),
            Err(e) => Err(e),
        };

        if let Err(e) = routed {
            break e;
        }
    };

    match &cause {
        IpcError::Cancelled => tracing::debug!("Reader stage stopped"),
        IpcError::ConnectionClosed => tracing::info!("Connection closed by server"),
        e => tracing::error!("Reader stage failed: {}", e),
    }
    shared.correlator.close(cause.clone());
    cause
}

/// Route one frame. An `Err` is fatal to the connection.
fn route_frame(
    frame: &Frame,
    shared: &Shared,
    events: &mpsc::UnboundedSender<Envelope>,
) -> Result<()> {
    let tag = match frame.classify() {
        Ok(tag) => tag,
        Err(e) if frame.is_event() => {
            tracing::warn!("Skipping event frame: {}", e);
            return Ok(());
        }
        Err(e) => {
            if !shared.correlator.fail_reply(e.clone()) {
                tracing::warn!("Skipping reply frame: {}", e);
            }
            return Ok(());
        }
    };

    match tag {
        TypeTag::Reply(MessageType::Subscribe) => route_ack(frame, shared),
        TypeTag::Reply(message_type) => {
            let outcome = JsonCodec::decode_lossy(frame.payload())
                .map(|payload| Envelope::from_tag(tag, payload));
            tracing::debug!("Routing {} reply", message_type);
            shared.correlator.deliver_reply(message_type, outcome)
        }
        TypeTag::Event(event_type) => {
            route_event(event_type, frame, shared, events);
            Ok(())
        }
    }
}

fn route_ack(frame: &Frame, shared: &Shared) -> Result<()> {
    let (pending, late) = match shared.correlator.claim_ack() {
        Claim::Waiter(pending) => (pending, false),
        // The caller timed out, but the server may still have accepted the
        // subscription and will push those events from now on.
        Claim::Abandoned(pending) => (pending, true),
        Claim::Unclaimed => return Err(IpcError::UnexpectedReply(MessageType::Subscribe)),
    };

    let outcome = JsonCodec::decode_lossy(frame.payload()).and_then(|payload| parse_ack(&payload));
    match outcome {
        Ok(()) => {
            // Recorded before the next frame is read, so events that follow
            // the acknowledgement are already expected.
            shared.subscriptions.record(&pending.events);
            if late {
                tracing::warn!("Late subscribe acknowledgement, subscribed to {:?}", pending.events);
            } else {
                tracing::debug!("Subscribed to {:?}", pending.events);
            }
            let events = pending.events.clone();
            pending.complete(Ok(events));
        }
        Err(e) if late => tracing::warn!("Late subscribe acknowledgement: {}", e),
        Err(e) => pending.complete(Err(e)),
    }
    Ok(())
}

fn route_event(
    event_type: EventType,
    frame: &Frame,
    shared: &Shared,
    events: &mpsc::UnboundedSender<Envelope>,
) {
    if !shared.subscriptions.is_subscribed(event_type) {
        tracing::warn!("Dropping {} event: not subscribed", event_type);
        return;
    }

    // Checked on arrival: an event read while its type is paused never
    // reaches a hook, even if the type is resumed before it would run.
    if shared.hooks.is_paused(event_type) {
        tracing::debug!("Dropping {} event: paused", event_type);
        return;
    }

    let payload = match JsonCodec::decode_lossy(frame.payload()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!("Dropping {} event with undecodable payload: {}", event_type, e);
            return;
        }
    };

    if events
        .send(Envelope::Event {
            event_type,
            payload,
        })
        .is_err()
    {
        tracing::debug!("Handler stage gone, dropping {} event", event_type);
    }
}

/// Handler stage: feed queued events to hooks, one at a time.
async fn handler_stage(
    mut events: mpsc::UnboundedReceiver<Envelope>,
    shared: Arc<Shared>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        if *stop.borrow() {
            break;
        }

        let envelope = tokio::select! {
            biased;
            changed = stop.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            envelope = events.recv() => envelope,
        };

        match envelope {
            Some(Envelope::Event {
                event_type,
                payload,
            }) => {
                shared.hooks.dispatch(event_type, &payload).await;
            }
            Some(Envelope::Reply { message_type, .. }) => {
                tracing::warn!("Handler stage received {} reply, ignoring", message_type);
            }
            None => break,
        }
    }

    tracing::debug!("Handler stage stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Hook;
    use crate::protocol::build_frame;
    use serde_json::Value;
    use tokio::io::{duplex, AsyncWriteExt};

    fn settings() -> ReaderSettings {
        ReaderSettings {
            max_payload_size: crate::protocol::DEFAULT_MAX_PAYLOAD_SIZE,
            payload_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_event_reaches_hook() {
        let shared = Arc::new(Shared::new());
        shared.subscriptions.record(&[EventType::Window].into_iter().collect());

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel();
        shared.hooks.register(Hook::new(EventType::Window, move |payload: Value| {
            let seen_tx = seen_tx.clone();
            async move {
                seen_tx.send(payload).ok();
                Ok(())
            }
        }));

        let (client, mut server) = duplex(4096);
        let mut dispatcher = Dispatcher::spawn(client, shared.clone(), settings());

        server
            .write_all(&build_frame(0x8000_0003, br#"{"change":"focus"}"#).unwrap())
            .await
            .unwrap();

        let payload = seen_rx.recv().await.unwrap();
        assert_eq!(payload["change"], "focus");

        dispatcher.stop_signal().raise();
        assert!(matches!(
            dispatcher.join_reader().await,
            Some(IpcError::Cancelled)
        ));
        dispatcher.join_handler().await;
    }

    #[tokio::test]
    async fn test_unexpected_reply_is_fatal() {
        let shared = Arc::new(Shared::new());
        let (client, mut server) = duplex(4096);
        let mut dispatcher = Dispatcher::spawn(client, shared.clone(), settings());

        server.write_all(&build_frame(4, b"{}").unwrap()).await.unwrap();

        let cause = dispatcher.join_reader().await.unwrap();
        assert!(matches!(cause, IpcError::UnexpectedReply(MessageType::GetTree)));
        assert!(matches!(
            shared.correlator.closed(),
            Some(IpcError::UnexpectedReply(_))
        ));
        dispatcher.join_handler().await;
    }

    #[tokio::test]
    async fn test_eof_closes_correlator() {
        let shared = Arc::new(Shared::new());
        let (client, server) = duplex(4096);
        let mut dispatcher = Dispatcher::spawn(client, shared.clone(), settings());
        let rx = shared.correlator.expect_reply(MessageType::GetTree).unwrap();

        drop(server);

        let result = shared
            .correlator
            .await_reply(rx, Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(IpcError::ConnectionClosed)));
        assert!(matches!(
            dispatcher.join_reader().await,
            Some(IpcError::ConnectionClosed)
        ));
        assert!(dispatcher.join_reader().await.is_none());
    }

    #[tokio::test]
    async fn test_unsubscribed_event_dropped() {
        let shared = Arc::new(Shared::new());
        let (hit_tx, mut hit_rx) = mpsc::unbounded_channel::<()>();
        shared.hooks.register(Hook::new(EventType::Mode, move |_: Value| {
            let hit_tx = hit_tx.clone();
            async move {
                hit_tx.send(()).ok();
                Ok(())
            }
        }));

        let (client, mut server) = duplex(4096);
        let mut dispatcher = Dispatcher::spawn(client, shared.clone(), settings());

        server
            .write_all(&build_frame(EventType::Mode.type_tag(), b"{}").unwrap())
            .await
            .unwrap();
        drop(server);

        dispatcher.join_reader().await;
        dispatcher.join_handler().await;
        assert!(hit_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_queued_events_dropped_after_stop() {
        let shared = Arc::new(Shared::new());
        shared.subscriptions.record(&[EventType::Mode].into_iter().collect());

        let release = Arc::new(tokio::sync::Notify::new());
        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<String>();
        let hook_release = release.clone();
        shared.hooks.register(Hook::new(EventType::Mode, move |payload: Value| {
            let seen_tx = seen_tx.clone();
            let release = hook_release.clone();
            async move {
                let change = payload["change"].as_str().unwrap_or_default().to_string();
                let hold = change == "first";
                seen_tx.send(change).ok();
                if hold {
                    release.notified().await;
                }
                Ok(())
            }
        }));

        let (client, mut server) = duplex(4096);
        let mut dispatcher = Dispatcher::spawn(client, shared.clone(), settings());

        let mut bytes = build_frame(EventType::Mode.type_tag(), br#"{"change":"first"}"#).unwrap();
        bytes.extend(build_frame(EventType::Mode.type_tag(), br#"{"change":"second"}"#).unwrap());
        server.write_all(&bytes).await.unwrap();

        assert_eq!(seen_rx.recv().await.unwrap(), "first");
        // Give the reader time to queue the second event behind the busy hook.
        tokio::time::sleep(Duration::from_millis(20)).await;

        dispatcher.stop_signal().raise();
        release.notify_one();

        dispatcher.join_handler().await;
        assert!(matches!(
            dispatcher.join_reader().await,
            Some(IpcError::Cancelled)
        ));
        assert!(seen_rx.try_recv().is_err());
    }
}
