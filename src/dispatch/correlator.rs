//! Reply correlation.
//!
//! The protocol carries no request ids: a reply belongs to whatever request
//! is outstanding. The correlator keeps one slot for ordinary replies and a
//! separate slot for subscription acknowledgements, so a Subscribe reply can
//! never satisfy a query and vice versa.
//!
//! A request that times out leaves its waiter *abandoned*. Its reply may
//! still arrive later; that reply is matched to the abandoned waiter instead
//! of being handed to the next request or treated as a protocol violation.
//! Late replies are dropped; a late subscription acknowledgement still
//! updates the subscription state.

use std::collections::{BTreeSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::{IpcError, Result};
use crate::protocol::{Envelope, EventType, MessageType};

/// Receiver for an ordinary reply.
pub(crate) type ReplyReceiver = oneshot::Receiver<Result<Envelope>>;

/// Receiver for a subscription acknowledgement.
pub(crate) type AckReceiver = oneshot::Receiver<Result<BTreeSet<EventType>>>;

/// A request waiting for its reply.
pub(crate) struct PendingReply {
    message_type: MessageType,
    tx: oneshot::Sender<Result<Envelope>>,
}

/// A subscribe call waiting for its acknowledgement.
pub(crate) struct PendingAck {
    /// Full event set requested from the server.
    pub(crate) events: BTreeSet<EventType>,
    tx: oneshot::Sender<Result<BTreeSet<EventType>>>,
}

impl PendingAck {
    /// Resolve the subscribe call.
    pub(crate) fn complete(self, outcome: Result<BTreeSet<EventType>>) {
        let _ = self.tx.send(outcome);
    }
}

/// What the reader should do with an inbound reply.
pub(crate) enum Claim<W> {
    /// Deliver to this waiter.
    Waiter(W),
    /// A timed-out waiter whose caller is gone.
    Abandoned(W),
    /// Nobody asked for this reply.
    Unclaimed,
}

struct Slot<W> {
    waiter: Option<W>,
    abandoned: VecDeque<W>,
}

impl<W> Slot<W> {
    fn new() -> Self {
        Self {
            waiter: None,
            abandoned: VecDeque::new(),
        }
    }

    fn claim(&mut self) -> Claim<W> {
        if let Some(stale) = self.abandoned.pop_front() {
            return Claim::Abandoned(stale);
        }
        match self.waiter.take() {
            Some(waiter) => Claim::Waiter(waiter),
            None => Claim::Unclaimed,
        }
    }

    fn abandon(&mut self) -> bool {
        match self.waiter.take() {
            Some(waiter) => {
                self.abandoned.push_back(waiter);
                true
            }
            None => false,
        }
    }
}

struct State {
    replies: Slot<PendingReply>,
    acks: Slot<PendingAck>,
    closed: Option<IpcError>,
}

/// Pending request bookkeeping shared between callers and the reader stage.
pub(crate) struct Correlator {
    state: Mutex<State>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(State {
                replies: Slot::new(),
                acks: Slot::new(),
                closed: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cause the connection was closed with, if any.
    pub(crate) fn closed(&self) -> Option<IpcError> {
        self.lock().closed.clone()
    }

    /// Register interest in the next reply of `message_type`.
    pub(crate) fn expect_reply(&self, message_type: MessageType) -> Result<ReplyReceiver> {
        let mut state = self.lock();
        if let Some(cause) = &state.closed {
            return Err(cause.clone());
        }
        if state.replies.waiter.is_some() {
            return Err(IpcError::Protocol(
                "a request is already in flight".to_string(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        state.replies.waiter = Some(PendingReply { message_type, tx });
        Ok(rx)
    }

    /// Register interest in the next subscription acknowledgement.
    pub(crate) fn expect_ack(&self, events: BTreeSet<EventType>) -> Result<AckReceiver> {
        let mut state = self.lock();
        if let Some(cause) = &state.closed {
            return Err(cause.clone());
        }
        if state.acks.waiter.is_some() {
            return Err(IpcError::Protocol(
                "a subscription is already in flight".to_string(),
            ));
        }
        let (tx, rx) = oneshot::channel();
        state.acks.waiter = Some(PendingAck { events, tx });
        Ok(rx)
    }

    /// Drop the reply waiter without expecting a reply (the frame was never sent).
    pub(crate) fn withdraw_reply(&self) {
        self.lock().replies.waiter = None;
    }

    /// Drop the ack waiter without expecting a reply (the frame was never sent).
    pub(crate) fn withdraw_ack(&self) {
        self.lock().acks.waiter = None;
    }

    /// Deliver a reply for `message_type`.
    ///
    /// Fails with `UnexpectedReply` if nothing was waiting or the waiter
    /// expected a different message type; both are fatal.
    pub(crate) fn deliver_reply(
        &self,
        message_type: MessageType,
        outcome: Result<Envelope>,
    ) -> Result<()> {
        let mut state = self.lock();
        match state.replies.claim() {
            Claim::Waiter(pending) if pending.message_type == message_type => {
                let _ = pending.tx.send(outcome);
                Ok(())
            }
            Claim::Waiter(pending) => {
                tracing::error!(
                    "Received {} reply while waiting for {}",
                    message_type,
                    pending.message_type
                );
                let _ = pending
                    .tx
                    .send(Err(IpcError::UnexpectedReply(message_type)));
                Err(IpcError::UnexpectedReply(message_type))
            }
            Claim::Abandoned(_) => {
                tracing::debug!("Discarding late {} reply", message_type);
                Ok(())
            }
            Claim::Unclaimed => Err(IpcError::UnexpectedReply(message_type)),
        }
    }

    /// Fail the pending request with a per-request error.
    ///
    /// Returns `false` if no request was waiting.
    pub(crate) fn fail_reply(&self, err: IpcError) -> bool {
        match self.lock().replies.claim() {
            Claim::Waiter(pending) => {
                let _ = pending.tx.send(Err(err));
                true
            }
            Claim::Abandoned(_) => true,
            Claim::Unclaimed => false,
        }
    }

    /// Take the pending subscription acknowledgement slot.
    pub(crate) fn claim_ack(&self) -> Claim<PendingAck> {
        self.lock().acks.claim()
    }

    /// Close the correlator, failing every waiter with `cause`.
    ///
    /// Later `expect_*` calls fail with the same cause.
    pub(crate) fn close(&self, cause: IpcError) {
        let mut state = self.lock();
        if state.closed.is_none() {
            state.closed = Some(cause.clone());
        }
        if let Some(pending) = state.replies.waiter.take() {
            let _ = pending.tx.send(Err(cause.clone()));
        }
        if let Some(pending) = state.acks.waiter.take() {
            pending.complete(Err(cause));
        }
    }

    /// Wait for a reply, abandoning the slot on timeout.
    pub(crate) async fn await_reply(&self, rx: ReplyReceiver, timeout: Duration) -> Result<Envelope> {
        wait(rx, timeout, || self.lock().replies.abandon()).await
    }

    /// Wait for an acknowledgement, abandoning the slot on timeout.
    pub(crate) async fn await_ack(
        &self,
        rx: AckReceiver,
        timeout: Duration,
    ) -> Result<BTreeSet<EventType>> {
        wait(rx, timeout, || self.lock().acks.abandon()).await
    }
}

async fn wait<T>(
    mut rx: oneshot::Receiver<Result<T>>,
    timeout: Duration,
    abandon: impl FnOnce() -> bool,
) -> Result<T> {
    match tokio::time::timeout(timeout, &mut rx).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(_)) => Err(IpcError::Cancelled),
        Err(_) => {
            if abandon() {
                return Err(IpcError::Timeout(timeout));
            }
            // The reader claimed the slot just as the timer fired; deliveries
            // happen under the lock, so the outcome is already in the channel.
            rx.try_recv()
                .unwrap_or(Err(IpcError::Timeout(timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reply(message_type: MessageType) -> Envelope {
        Envelope::Reply {
            message_type,
            payload: json!([]),
        }
    }

    #[tokio::test]
    async fn test_reply_reaches_waiter() {
        let correlator = Correlator::new();
        let rx = correlator.expect_reply(MessageType::GetMarks).unwrap();

        correlator
            .deliver_reply(MessageType::GetMarks, Ok(reply(MessageType::GetMarks)))
            .unwrap();

        let envelope = correlator
            .await_reply(rx, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(envelope.message_type(), Some(MessageType::GetMarks));
    }

    #[test]
    fn test_unclaimed_reply_is_unexpected() {
        let correlator = Correlator::new();
        let err = correlator
            .deliver_reply(MessageType::GetTree, Ok(reply(MessageType::GetTree)))
            .unwrap_err();
        assert!(matches!(err, IpcError::UnexpectedReply(MessageType::GetTree)));
    }

    #[tokio::test]
    async fn test_mismatched_reply_is_unexpected() {
        let correlator = Correlator::new();
        let rx = correlator.expect_reply(MessageType::GetTree).unwrap();

        let err = correlator
            .deliver_reply(MessageType::GetMarks, Ok(reply(MessageType::GetMarks)))
            .unwrap_err();
        assert!(matches!(err, IpcError::UnexpectedReply(_)));

        let waiter = correlator.await_reply(rx, Duration::from_secs(1)).await;
        assert!(matches!(waiter, Err(IpcError::UnexpectedReply(_))));
    }

    #[tokio::test]
    async fn test_timeout_abandons_slot() {
        let correlator = Correlator::new();
        let rx = correlator.expect_reply(MessageType::GetTree).unwrap();

        let err = correlator
            .await_reply(rx, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, IpcError::Timeout(_)));

        // The late reply is swallowed, not routed to the next request.
        let rx = correlator.expect_reply(MessageType::GetTree).unwrap();
        correlator
            .deliver_reply(MessageType::GetTree, Ok(reply(MessageType::GetTree)))
            .unwrap();
        correlator
            .deliver_reply(MessageType::GetTree, Ok(reply(MessageType::GetTree)))
            .unwrap();
        assert!(correlator
            .await_reply(rx, Duration::from_secs(1))
            .await
            .is_ok());
    }

    #[test]
    fn test_second_expect_rejected() {
        let correlator = Correlator::new();
        let _rx = correlator.expect_reply(MessageType::GetTree).unwrap();
        assert!(matches!(
            correlator.expect_reply(MessageType::GetTree),
            Err(IpcError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_close_fails_all_waiters() {
        let correlator = Correlator::new();
        let reply_rx = correlator.expect_reply(MessageType::GetTree).unwrap();
        let ack_rx = correlator
            .expect_ack([EventType::Window].into_iter().collect())
            .unwrap();

        correlator.close(IpcError::ConnectionClosed);

        let timeout = Duration::from_secs(1);
        assert!(matches!(
            correlator.await_reply(reply_rx, timeout).await,
            Err(IpcError::ConnectionClosed)
        ));
        assert!(matches!(
            correlator.await_ack(ack_rx, timeout).await,
            Err(IpcError::ConnectionClosed)
        ));
        assert!(matches!(
            correlator.expect_reply(MessageType::GetTree),
            Err(IpcError::ConnectionClosed)
        ));
    }

    #[test]
    fn test_ack_slot_is_separate() {
        let correlator = Correlator::new();
        let _ack = correlator
            .expect_ack([EventType::Mode].into_iter().collect())
            .unwrap();

        // An ordinary reply must not satisfy the ack waiter.
        assert!(correlator
            .deliver_reply(MessageType::Command, Ok(reply(MessageType::Command)))
            .is_err());
        assert!(matches!(correlator.claim_ack(), Claim::Waiter(_)));
    }

    #[test]
    fn test_fail_reply_without_waiter() {
        let correlator = Correlator::new();
        assert!(!correlator.fail_reply(IpcError::UnknownType { tag: 99 }));
    }
}
