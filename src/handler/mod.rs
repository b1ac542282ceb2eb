//! Handler module - hooks and event dispatch.
//!
//! Provides:
//! - [`Hook`] - an event filter plus an async callback
//! - [`HookRegistry`] - ordered hooks per event type, with pause/resume
//!
//! # Example
//!
//! ```ignore
//! use i3wire_client::handler::{Hook, HookRegistry};
//! use i3wire_client::protocol::EventType;
//! use serde_json::Value;
//!
//! let registry = HookRegistry::new();
//!
//! registry.register(
//!     Hook::new(EventType::Workspace, |event: Value| async move {
//!         println!("now on {}", event["current"]["name"]);
//!         Ok(())
//!     })
//!     .on_change("focus"),
//! );
//! ```

mod hook;
mod registry;

pub use hook::{BoxFuture, Callback, Hook, HookResult, Predicate, TypedCallback};
pub use registry::{HookHandle, HookRegistry};
