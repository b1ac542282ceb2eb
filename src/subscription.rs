//! Subscription coordinator.
//!
//! A subscribe call sends the union of the current state and the requested
//! event types. The server answers with `{"success": bool}` on the Subscribe
//! reply type; the reader stage claims that acknowledgement, and on success
//! merges the set into [`SubscriptionState`] before reading the next frame.

use std::collections::BTreeSet;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::codec::JsonCodec;
use crate::dispatch::correlator::Correlator;
use crate::error::{IpcError, Result};
use crate::protocol::{EventType, MessageType};
use crate::writer::{OutboundFrame, WriterHandle};

/// Event types the server has acknowledged for this connection.
#[derive(Debug, Default)]
pub struct SubscriptionState {
    active: RwLock<BTreeSet<EventType>>,
}

impl SubscriptionState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge an acknowledged set into the state.
    pub(crate) fn record(&self, events: &BTreeSet<EventType>) {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(events.iter().copied());
    }

    /// Check whether `event_type` has been acknowledged.
    pub fn is_subscribed(&self, event_type: EventType) -> bool {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&event_type)
    }

    /// Snapshot of the acknowledged set.
    pub fn active(&self) -> BTreeSet<EventType> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Body of a Subscribe frame: a JSON array of event names.
pub fn subscribe_payload(events: &BTreeSet<EventType>) -> Result<Vec<u8>> {
    JsonCodec::encode(events)
}

/// Interpret a subscription acknowledgement.
pub(crate) fn parse_ack(payload: &Value) -> Result<()> {
    match payload.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(()),
        Some(false) => Err(IpcError::SubscriptionRejected(
            payload
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("server reported failure")
                .to_string(),
        )),
        None => Err(IpcError::SubscriptionRejected(format!(
            "acknowledgement without success flag: {payload}"
        ))),
    }
}

/// Send a Subscribe request and wait for the reader stage to settle it.
///
/// Returns the full acknowledged set.
pub(crate) async fn subscribe(
    correlator: &Correlator,
    state: &SubscriptionState,
    writer: &WriterHandle,
    requested: &[EventType],
    timeout: Duration,
) -> Result<BTreeSet<EventType>> {
    let mut desired = state.active();
    desired.extend(requested.iter().copied());

    let body = subscribe_payload(&desired)?;
    let frame = OutboundFrame::new(MessageType::Subscribe.ordinal(), Bytes::from(body))?;
    let rx = correlator.expect_ack(desired)?;

    if let Err(e) = writer.send(frame).await {
        correlator.withdraw_ack();
        return Err(correlator.closed().unwrap_or(e));
    }

    correlator.await_ack(rx, timeout).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_merges() {
        let state = SubscriptionState::new();
        assert!(!state.is_subscribed(EventType::Window));

        state.record(&[EventType::Window].into_iter().collect());
        state.record(&[EventType::Workspace, EventType::Window].into_iter().collect());

        assert!(state.is_subscribed(EventType::Window));
        assert!(state.is_subscribed(EventType::Workspace));
        assert!(!state.is_subscribed(EventType::Mode));
        assert_eq!(state.active().len(), 2);
    }

    #[test]
    fn test_subscribe_payload_uses_wire_names() {
        let events: BTreeSet<_> = [EventType::BarConfigUpdate, EventType::Workspace]
            .into_iter()
            .collect();
        let body = subscribe_payload(&events).unwrap();
        let decoded: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(decoded, json!(["workspace", "barconfig_update"]));
    }

    #[test]
    fn test_parse_ack() {
        assert!(parse_ack(&json!({"success": true})).is_ok());
        assert!(matches!(
            parse_ack(&json!({"success": false})),
            Err(IpcError::SubscriptionRejected(_))
        ));
        assert!(matches!(
            parse_ack(&json!({})),
            Err(IpcError::SubscriptionRejected(_))
        ));
        assert!(matches!(
            parse_ack(&Value::Null),
            Err(IpcError::SubscriptionRejected(_))
        ));
    }

    #[tokio::test]
    async fn test_subscribe_sends_union() {
        use crate::dispatch::correlator::Claim;
        use crate::transport::read_frame;
        use crate::writer::spawn_writer_task;

        let correlator = Correlator::new();
        let state = SubscriptionState::new();
        state.record(&[EventType::Mode].into_iter().collect());

        let (client, mut server) = tokio::io::duplex(4096);
        let (writer, _task) = spawn_writer_task(client, 8);

        let pending = subscribe(
            &correlator,
            &state,
            &writer,
            &[EventType::Window],
            Duration::from_secs(1),
        );
        let server_side = async {
            let frame = read_frame(&mut server, 1024, Duration::from_secs(1))
                .await
                .unwrap();
            assert_eq!(frame.type_tag(), MessageType::Subscribe.ordinal());
            let names: Value = serde_json::from_slice(frame.payload()).unwrap();
            assert_eq!(names, json!(["mode", "window"]));

            match correlator.claim_ack() {
                Claim::Waiter(ack) => {
                    let events = ack.events.clone();
                    ack.complete(Ok(events));
                }
                _ => panic!("no pending acknowledgement"),
            }
        };

        let (acked, ()) = tokio::join!(pending, server_side);
        let acked = acked.unwrap();
        assert!(acked.contains(&EventType::Mode));
        assert!(acked.contains(&EventType::Window));
    }
}
