//! Hooks: event filters paired with async callbacks.
//!
//! # Example
//!
//! ```
//! use i3wire_client::handler::Hook;
//! use i3wire_client::protocol::EventType;
//! use serde_json::Value;
//!
//! let hook = Hook::new(EventType::Window, |event: Value| async move {
//!     println!("focused {}", event["container"]["name"]);
//!     Ok(())
//! })
//! .on_change("focus");
//!
//! assert_eq!(hook.event_type(), EventType::Window);
//! ```

use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::codec::JsonCodec;
use crate::error::Result;
use crate::protocol::EventType;

/// Result type for hook callbacks.
pub type HookResult = Result<()>;

/// Boxed future for hook results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Predicate evaluated on the raw payload before the callback runs.
pub type Predicate = Box<dyn Fn(&Value) -> bool + Send + Sync + 'static>;

/// Trait for hook callbacks.
pub trait Callback: Send + Sync + 'static {
    /// Handle one event payload.
    fn call(&self, payload: Value) -> BoxFuture<'static, HookResult>;
}

/// Wrapper that deserializes the payload before calling the callback.
///
/// With `T = serde_json::Value` the payload is passed through untouched.
pub struct TypedCallback<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    callback: F,
    _phantom: PhantomData<fn(T) -> Fut>,
}

impl<F, T, Fut> TypedCallback<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    /// Create a new typed callback.
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            _phantom: PhantomData,
        }
    }
}

impl<F, T, Fut> Callback for TypedCallback<F, T, Fut>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    T: DeserializeOwned + Send + 'static,
    Fut: Future<Output = HookResult> + Send + 'static,
{
    fn call(&self, payload: Value) -> BoxFuture<'static, HookResult> {
        let parsed: T = match JsonCodec::from_value(payload) {
            Ok(v) => v,
            Err(e) => return Box::pin(async move { Err(e) }),
        };

        Box::pin((self.callback)(parsed))
    }
}

/// A registered event consumer.
pub struct Hook {
    event_type: EventType,
    change: Option<String>,
    predicate: Option<Predicate>,
    callback: Box<dyn Callback>,
}

impl Hook {
    /// Create a hook for `event_type`.
    ///
    /// The callback receives the payload deserialized into `T`; use
    /// `serde_json::Value` to get it as-is.
    pub fn new<F, T, Fut>(event_type: EventType, callback: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        T: DeserializeOwned + Send + 'static,
        Fut: Future<Output = HookResult> + Send + 'static,
    {
        Self {
            event_type,
            change: None,
            predicate: None,
            callback: Box::new(TypedCallback::new(callback)),
        }
    }

    /// Only fire when the payload's `change` field equals `change`.
    pub fn on_change(mut self, change: impl Into<String>) -> Self {
        self.change = Some(change.into());
        self
    }

    /// Only fire when `predicate` holds for the payload.
    pub fn filter<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    /// Event class this hook listens to.
    #[inline]
    pub fn event_type(&self) -> EventType {
        self.event_type
    }

    /// Required `change` value, if any.
    pub fn change(&self) -> Option<&str> {
        self.change.as_deref()
    }

    /// Check the change filter and predicate against a payload.
    pub fn matches(&self, payload: &Value) -> bool {
        if let Some(change) = &self.change {
            if payload.get("change").and_then(Value::as_str) != Some(change.as_str()) {
                return false;
            }
        }
        self.predicate.as_ref().map_or(true, |p| p(payload))
    }

    /// Run the callback.
    pub(crate) fn invoke(&self, payload: Value) -> BoxFuture<'static, HookResult> {
        self.callback.call(payload)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("event_type", &self.event_type)
            .field("change", &self.change)
            .field("predicate", &self.predicate.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_matches_without_filters() {
        let hook = Hook::new(EventType::Mode, |_: Value| async { Ok(()) });
        assert!(hook.matches(&json!({"change": "resize"})));
        assert!(hook.matches(&Value::Null));
    }

    #[test]
    fn test_change_filter() {
        let hook = Hook::new(EventType::Window, |_: Value| async { Ok(()) }).on_change("focus");

        assert_eq!(hook.change(), Some("focus"));
        assert!(hook.matches(&json!({"change": "focus"})));
        assert!(!hook.matches(&json!({"change": "title"})));
        assert!(!hook.matches(&json!({})));
    }

    #[test]
    fn test_predicate_and_change_combine() {
        let hook = Hook::new(EventType::Workspace, |_: Value| async { Ok(()) })
            .on_change("focus")
            .filter(|p| p["current"]["num"] == 3);

        assert!(hook.matches(&json!({"change": "focus", "current": {"num": 3}})));
        assert!(!hook.matches(&json!({"change": "focus", "current": {"num": 4}})));
        assert!(!hook.matches(&json!({"change": "init", "current": {"num": 3}})));
    }

    #[tokio::test]
    async fn test_typed_callback_decodes_payload() {
        #[derive(Deserialize)]
        struct ModeEvent {
            change: String,
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let hook = Hook::new(EventType::Mode, move |event: ModeEvent| {
            let tx = tx.clone();
            async move {
                tx.send(event.change).ok();
                Ok(())
            }
        });

        hook.invoke(json!({"change": "resize"})).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), "resize");
    }

    #[tokio::test]
    async fn test_typed_callback_decode_failure() {
        let hook = Hook::new(EventType::Mode, |_: Vec<u32>| async { Ok(()) });
        assert!(hook.invoke(json!({"change": "resize"})).await.is_err());
    }
}
