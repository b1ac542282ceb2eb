//! Message and event type enumerations and type-tag classification.

use std::fmt;

use serde::Serialize;

use super::wire_format::{EVENT_FLAG, EVENT_ORDINAL_MASK};
use crate::error::{IpcError, Result};

/// Request (and reply) types, ordinal-encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageType {
    /// Run a command.
    Command = 0,
    /// List workspaces.
    GetWorkspaces = 1,
    /// Subscribe to event classes.
    Subscribe = 2,
    /// List outputs.
    GetOutputs = 3,
    /// Fetch the layout tree.
    GetTree = 4,
    /// List marks.
    GetMarks = 5,
    /// Fetch bar configuration.
    GetBarConfig = 6,
    /// Fetch version information.
    GetVersion = 7,
}

impl MessageType {
    /// All message types in ordinal order.
    pub const ALL: [MessageType; 8] = [
        MessageType::Command,
        MessageType::GetWorkspaces,
        MessageType::Subscribe,
        MessageType::GetOutputs,
        MessageType::GetTree,
        MessageType::GetMarks,
        MessageType::GetBarConfig,
        MessageType::GetVersion,
    ];

    /// Wire ordinal.
    #[inline]
    pub fn ordinal(self) -> u32 {
        self as u32
    }

    /// Look up a message type by ordinal.
    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Protocol name, e.g. `get_workspaces`.
    pub fn name(self) -> &'static str {
        match self {
            MessageType::Command => "command",
            MessageType::GetWorkspaces => "get_workspaces",
            MessageType::Subscribe => "subscribe",
            MessageType::GetOutputs => "get_outputs",
            MessageType::GetTree => "get_tree",
            MessageType::GetMarks => "get_marks",
            MessageType::GetBarConfig => "get_bar_config",
            MessageType::GetVersion => "get_version",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Event classes the server can push after a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Workspace focus/creation/removal.
    Workspace = 0,
    /// Output (monitor) changes.
    Output = 1,
    /// Binding mode changes.
    Mode = 2,
    /// Window changes.
    Window = 3,
    /// Bar configuration updates.
    #[serde(rename = "barconfig_update")]
    BarConfigUpdate = 4,
}

impl EventType {
    /// All event types in ordinal order.
    pub const ALL: [EventType; 5] = [
        EventType::Workspace,
        EventType::Output,
        EventType::Mode,
        EventType::Window,
        EventType::BarConfigUpdate,
    ];

    /// Wire ordinal (low 7 bits of the type tag).
    #[inline]
    pub fn ordinal(self) -> u32 {
        self as u32
    }

    /// Look up an event type by ordinal.
    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    /// Full type tag with the event flag set.
    #[inline]
    pub fn type_tag(self) -> u32 {
        EVENT_FLAG | self.ordinal()
    }

    /// Name used in subscribe payloads, e.g. `barconfig_update`.
    pub fn name(self) -> &'static str {
        match self {
            EventType::Workspace => "workspace",
            EventType::Output => "output",
            EventType::Mode => "mode",
            EventType::Window => "window",
            EventType::BarConfigUpdate => "barconfig_update",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeTag {
    /// Reply to a request of this type.
    Reply(MessageType),
    /// Unsolicited event of this type.
    Event(EventType),
}

impl TypeTag {
    /// Classify a raw type tag.
    ///
    /// Bit 31 set means event, with the ordinal in the low 7 bits; otherwise
    /// the whole tag is the message ordinal.
    ///
    /// # Example
    ///
    /// ```
    /// use i3wire_client::protocol::{EventType, TypeTag};
    ///
    /// let tag = TypeTag::classify(0x8000_0003).unwrap();
    /// assert_eq!(tag, TypeTag::Event(EventType::Window));
    /// ```
    pub fn classify(tag: u32) -> Result<Self> {
        if tag & EVENT_FLAG != 0 {
            EventType::from_ordinal(tag & EVENT_ORDINAL_MASK)
                .map(TypeTag::Event)
                .ok_or(IpcError::UnknownType { tag })
        } else {
            MessageType::from_ordinal(tag)
                .map(TypeTag::Reply)
                .ok_or(IpcError::UnknownType { tag })
        }
    }

    /// Check if this is an event.
    #[inline]
    pub fn is_event(self) -> bool {
        matches!(self, TypeTag::Event(_))
    }

    /// Ordinal within its enumeration.
    pub fn ordinal(self) -> u32 {
        match self {
            TypeTag::Reply(m) => m.ordinal(),
            TypeTag::Event(e) => e.ordinal(),
        }
    }
}

/// Classify a raw type tag (standalone function).
#[inline]
pub fn classify(tag: u32) -> Result<TypeTag> {
    TypeTag::classify(tag)
}
