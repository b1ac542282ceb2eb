//! Hook registry for dispatching events by type.
//!
//! Hooks are kept in one ordered list per event type; dispatch walks the
//! list in registration order. Each hook (filters and callback) runs as its
//! own task and is awaited before the next one starts, so an error or a panic
//! in one hook is logged and the rest still run.
//!
//! # Example
//!
//! ```ignore
//! use i3wire_client::handler::{Hook, HookRegistry};
//! use i3wire_client::protocol::EventType;
//! use serde_json::Value;
//!
//! let registry = HookRegistry::new();
//! let handle = registry.register(Hook::new(EventType::Mode, |mode: Value| async move {
//!     println!("mode: {}", mode["change"]);
//!     Ok(())
//! }));
//!
//! registry.dispatch(EventType::Mode, &serde_json::json!({"change": "resize"})).await;
//! registry.unregister(handle);
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use super::hook::Hook;
use crate::protocol::EventType;

/// Opaque handle returned by [`HookRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle {
    id: u64,
    event_type: EventType,
}

impl HookHandle {
    /// Event type the hook was registered for.
    pub fn event_type(&self) -> EventType {
        self.event_type
    }
}

struct Inner {
    hooks: HashMap<EventType, Vec<(u64, Arc<Hook>)>>,
    paused: HashSet<EventType>,
    next_id: u64,
}

/// Registry of hooks, keyed by event type.
pub struct HookRegistry {
    inner: Mutex<Inner>,
}

impl HookRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                hooks: HashMap::new(),
                paused: HashSet::new(),
                next_id: 1,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a hook. It is appended after existing hooks of its type.
    pub fn register(&self, hook: Hook) -> HookHandle {
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        let event_type = hook.event_type();
        inner
            .hooks
            .entry(event_type)
            .or_default()
            .push((id, Arc::new(hook)));

        tracing::debug!("Registered hook {} for {} events", id, event_type);
        HookHandle { id, event_type }
    }

    /// Remove a hook. Returns `false` if it was already removed.
    pub fn unregister(&self, handle: HookHandle) -> bool {
        let mut inner = self.lock();
        let Some(list) = inner.hooks.get_mut(&handle.event_type) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != handle.id);
        before != list.len()
    }

    /// Suppress dispatch for the given types, or for all types with `None`.
    ///
    /// Events of a paused type are dropped, not queued. A connection drops
    /// them as they are read, so an event that arrives while its type is
    /// paused is never dispatched, even after `resume`.
    pub fn pause(&self, event_types: Option<&[EventType]>) {
        let mut inner = self.lock();
        let targets = event_types.unwrap_or(&EventType::ALL);
        inner.paused.extend(targets.iter().copied());
        tracing::debug!("Paused {:?}", targets);
    }

    /// Re-enable dispatch for the given types, or for all types with `None`.
    pub fn resume(&self, event_types: Option<&[EventType]>) {
        let mut inner = self.lock();
        match event_types {
            Some(targets) => {
                for event_type in targets {
                    inner.paused.remove(event_type);
                }
            }
            None => inner.paused.clear(),
        }
    }

    /// Check whether dispatch is suppressed for `event_type`.
    pub fn is_paused(&self, event_type: EventType) -> bool {
        self.lock().paused.contains(&event_type)
    }

    /// Invoke every matching hook for one event, in registration order.
    ///
    /// Returns the number of hooks that were invoked.
    pub async fn dispatch(&self, event_type: EventType, payload: &Value) -> usize {
        let hooks: Vec<(u64, Arc<Hook>)> = {
            let inner = self.lock();
            if inner.paused.contains(&event_type) {
                tracing::debug!("Dropping {} event: paused", event_type);
                return 0;
            }
            inner.hooks.get(&event_type).cloned().unwrap_or_default()
        };

        let mut invoked = 0;
        for (id, hook) in hooks {
            let payload = payload.clone();
            // Filters are user code too; they run inside the task so a panic
            // there is contained like one in the callback.
            let outcome = tokio::spawn(async move {
                if !hook.matches(&payload) {
                    return None;
                }
                Some(hook.invoke(payload).await)
            })
            .await;

            match outcome {
                Ok(None) => {}
                Ok(Some(Ok(()))) => invoked += 1,
                Ok(Some(Err(e))) => {
                    invoked += 1;
                    tracing::error!("Hook {} for {} event failed: {}", id, event_type, e);
                }
                Err(e) => {
                    invoked += 1;
                    tracing::error!("Hook {} for {} event panicked: {}", id, event_type, e);
                }
            }
        }

        invoked
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
