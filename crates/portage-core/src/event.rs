#![forbid(unsafe_code)]

//! Application-facing event stream.
//!
//! Every event is addressed to a node (or to a surface that has no mounted
//! anchor node) and carries a flat key-value payload. Payload values are
//! strings, numbers, or booleans; nested structures are deliberately not
//! representable.
//!
//! # Invariants
//!
//! - Events are delivered in emission order.
//! - [`EventLog::drain`] hands each event out exactly once.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{NodeId, SurfaceId, TargetId};

/// A single payload value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventValue {
    Bool(bool),
    Number(f64),
    String(String),
}

impl EventValue {
    /// Borrow the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(*value),
            _ => None,
        }
    }

    /// Boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<bool> for EventValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for EventValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for EventValue {
    fn from(value: u64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<usize> for EventValue {
    fn from(value: usize) -> Self {
        Self::Number(value as f64)
    }
}

impl From<&str> for EventValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for EventValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

/// Ordered key-value payload.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventPayload(BTreeMap<String, EventValue>);

impl EventPayload {
    /// Create an empty payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<EventValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert or replace a value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<EventValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look up a value.
    pub fn get(&self, key: &str) -> Option<&EventValue> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EventValue)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }
}

/// Named event kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    Show,
    Open,
    Dismiss,
    LoadStart,
    LoadEnd,
    HeaderAction,
    DetentChange,
    Diagnostic,
    /// Host-defined event forwarded verbatim.
    Custom(String),
}

impl EventName {
    /// Wire name of the event (`onShow`, `onDismiss`, ...).
    pub fn as_str(&self) -> &str {
        match self {
            Self::Show => "onShow",
            Self::Open => "onOpen",
            Self::Dismiss => "onDismiss",
            Self::LoadStart => "onLoadStart",
            Self::LoadEnd => "onLoadEnd",
            Self::HeaderAction => "onHeaderAction",
            Self::DetentChange => "onDetentChange",
            Self::Diagnostic => "onDiagnostic",
            Self::Custom(name) => name,
        }
    }

    /// Parse a wire name, falling back to [`EventName::Custom`].
    pub fn parse(name: &str) -> Self {
        match name {
            "onShow" => Self::Show,
            "onOpen" => Self::Open,
            "onDismiss" => Self::Dismiss,
            "onLoadStart" => Self::LoadStart,
            "onLoadEnd" => Self::LoadEnd,
            "onHeaderAction" => Self::HeaderAction,
            "onDetentChange" => Self::DetentChange,
            "onDiagnostic" => Self::Diagnostic,
            other => Self::Custom(other.to_owned()),
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Addressee of an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTarget {
    /// A mounted node (surface anchors, portal targets, content).
    Node(NodeId),
    /// A surface presented without a mounted anchor node.
    Surface(SurfaceId),
    /// A portal target registered by the application rather than a node.
    Target(TargetId),
}

/// One delivered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEvent {
    pub target: EventTarget,
    pub name: EventName,
    pub payload: EventPayload,
}

impl NodeEvent {
    pub fn new(target: EventTarget, name: EventName, payload: EventPayload) -> Self {
        Self {
            target,
            name,
            payload,
        }
    }
}

/// Append-only outbox of events awaiting delivery to the application.
#[derive(Debug, Default)]
pub struct EventLog {
    pending: Vec<NodeEvent>,
    emitted_total: u64,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an event for delivery.
    pub fn emit(&mut self, event: NodeEvent) {
        self.emitted_total = self.emitted_total.saturating_add(1);
        self.pending.push(event);
    }

    /// Take every pending event in emission order.
    pub fn drain(&mut self) -> Vec<NodeEvent> {
        std::mem::take(&mut self.pending)
    }

    /// Pending events, oldest first.
    pub fn pending(&self) -> &[NodeEvent] {
        &self.pending
    }

    /// Total events ever emitted through this log.
    pub fn emitted_total(&self) -> u64 {
        self.emitted_total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names_round_trip() {
        for name in [
            EventName::Show,
            EventName::Open,
            EventName::Dismiss,
            EventName::LoadStart,
            EventName::LoadEnd,
            EventName::HeaderAction,
            EventName::DetentChange,
            EventName::Diagnostic,
        ] {
            assert_eq!(EventName::parse(name.as_str()), name);
        }
        assert_eq!(
            EventName::parse("onScroll"),
            EventName::Custom("onScroll".into())
        );
    }

    #[test]
    fn payload_is_key_ordered_and_flat() {
        let payload = EventPayload::new()
            .with("surfaceId", 4u64)
            .with("animated", true)
            .with("origin", "gesture");
        let keys: Vec<&str> = payload.iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["animated", "origin", "surfaceId"]);
        assert_eq!(payload.get("surfaceId").and_then(EventValue::as_f64), Some(4.0));
        assert_eq!(payload.get("animated").and_then(EventValue::as_bool), Some(true));
        assert_eq!(payload.get("origin").and_then(EventValue::as_str), Some("gesture"));
    }

    #[test]
    fn payload_serializes_as_plain_object() {
        let payload = EventPayload::new().with("title", "Done").with("index", 1usize);
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"index":1.0,"title":"Done"}"#);
    }

    #[test]
    fn drain_hands_out_each_event_once() {
        let mut log = EventLog::new();
        log.emit(NodeEvent::new(
            EventTarget::Node(NodeId::new(1)),
            EventName::Show,
            EventPayload::new(),
        ));
        log.emit(NodeEvent::new(
            EventTarget::Surface(SurfaceId::new(2)),
            EventName::Dismiss,
            EventPayload::new(),
        ));
        let first = log.drain();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].name, EventName::Show);
        assert!(log.drain().is_empty());
        assert_eq!(log.emitted_total(), 2);
    }
}
