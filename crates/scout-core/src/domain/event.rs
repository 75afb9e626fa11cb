//! Progress events streamed to observers during a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a progress event.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    Iteration,
    ToolCall,
    Finding,
    Status,
    Error,
}

/// A typed, timestamped notification of loop progress.
///
/// Transient: the engine guarantees emission, not persistence. `seq` is a
/// per-session monotone sequence number stamped by the bus at publication,
/// so any observer can assert it received events in order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressEvent {
    /// Event classification.
    #[serde(rename = "type")]
    pub kind: ProgressKind,

    /// Human-readable message.
    pub message: String,

    /// Structured payload.
    pub data: serde_json::Value,

    /// Monotone publication sequence number within the session.
    pub seq: u64,

    /// When the event was created.
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    fn new(kind: ProgressKind, message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind,
            message: message.into(),
            data,
            seq: 0,
            timestamp: Utc::now(),
        }
    }

    /// An iteration-completed event.
    pub fn iteration(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(ProgressKind::Iteration, message, data)
    }

    /// A tool-call event.
    pub fn tool_call(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(ProgressKind::ToolCall, message, data)
    }

    /// A new-candidate event.
    pub fn finding(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(ProgressKind::Finding, message, data)
    }

    /// A lifecycle status event.
    pub fn status(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(ProgressKind::Status, message, data)
    }

    /// An error event, published before any terminal failure.
    pub fn error(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self::new(ProgressKind::Error, message, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_serde_roundtrip() {
        let event = ProgressEvent::finding(
            "new candidate: alice",
            json!({"iteration": 2, "identity": "alice", "score": 0.95}),
        );

        let text = serde_json::to_string(&event).expect("serialize");
        let back: ProgressEvent = serde_json::from_str(&text).expect("deserialize");
        assert_eq!(event, back);
    }

    #[test]
    fn test_kind_wire_shape() {
        let event = ProgressEvent::tool_call("calling reddit_search", json!({}));
        let value = serde_json::to_value(&event).expect("serialize");
        assert_eq!(value["type"], "tool_call");
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_constructors_set_kind() {
        assert_eq!(
            ProgressEvent::iteration("i", json!({})).kind,
            ProgressKind::Iteration
        );
        assert_eq!(
            ProgressEvent::status("s", json!({})).kind,
            ProgressKind::Status
        );
        assert_eq!(
            ProgressEvent::error("e", json!({})).kind,
            ProgressKind::Error
        );
    }
}
