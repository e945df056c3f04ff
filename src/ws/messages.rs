//! Wire message types: inbound envelope, dispatch kinds, and payloads.
//!
//! All frames are UTF-8 JSON text. The inbound envelope carries a string
//! `type` discriminant and an opaque `data` payload whose shape depends on
//! the type. Unknown types are a normal occurrence (keep-alive pongs,
//! capability negotiation) and must stay silent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Top-level inbound message envelope.
///
/// The raw `type` string is preserved verbatim so the last-message slot
/// reflects exactly what arrived, including types this client does not
/// dispatch on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Message type discriminator.
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Variant-specific payload.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Server-side receive timestamp, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
    /// Originating channel, when provided.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// Dispatchable message kinds, parsed from the wire `type` string.
///
/// Everything not listed here maps to [`MessageKind::Other`], which the
/// router ignores by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    /// Progress update for a background task (transcription, summary, ...).
    TaskProgress,
    /// A notification feed entry.
    Notification,
    /// Another user joined a project the current user belongs to.
    UserJoined,
    /// Another user left or was removed from such a project.
    UserRemoved,
    /// The current user was added to a project.
    YouAddedToProject,
    /// The current user was removed from a project.
    YouRemovedFromProject,
    /// The server rejected the session's credentials.
    Unauthorized,
    /// The server reported a session-fatal error.
    Error,
    /// Anything else; the router ignores it.
    Other,
}

impl MessageKind {
    /// Maps a wire `type` string to its dispatch kind.
    #[must_use]
    pub fn from_type(msg_type: &str) -> Self {
        match msg_type {
            "task_progress" => Self::TaskProgress,
            "notification" => Self::Notification,
            "user_joined" => Self::UserJoined,
            "user_removed" => Self::UserRemoved,
            "you_added_to_project" => Self::YouAddedToProject,
            "you_removed_from_project" => Self::YouRemovedFromProject,
            "unauthorized" => Self::Unauthorized,
            "error" => Self::Error,
            _ => Self::Other,
        }
    }
}

/// Status of a background task reported via `task_progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// The task finished successfully.
    Completed,
    /// The task failed.
    Failed,
    /// The task failed with a server-side error.
    Error,
    /// The task is in progress.
    Running,
    /// Any status this client does not recognize.
    #[serde(other)]
    #[default]
    Unknown,
}

/// Payload of a `task_progress` message.
///
/// Every field is defaulted: servers of different ages omit fields freely
/// and a partial payload must not drop the whole frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskProgressPayload {
    /// Current task status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Task type key (e.g. `transcription`, `summary`).
    #[serde(default)]
    pub task_type: String,
    /// Completion percentage, when reported.
    #[serde(default)]
    pub progress: Option<f64>,
    /// Free-text detail, when reported.
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of a `notification` message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationPayload {
    /// Event type key used for translated display text.
    #[serde(default)]
    pub event_type: Option<String>,
    /// Literal fallback message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Payload of `user_joined` / `user_removed` messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemberChangePayload {
    /// Project the membership change applies to.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Id of the affected user.
    #[serde(default)]
    pub user_id: Option<String>,
    /// Display name of the affected user.
    #[serde(default)]
    pub user_name: Option<String>,
    /// Id of the user who performed a removal, when it was not self-initiated.
    #[serde(default)]
    pub removed_by: Option<String>,
}

/// Payload of `you_added_to_project` / `you_removed_from_project` messages.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MembershipPayload {
    /// Project the current user was added to or removed from.
    #[serde(default)]
    pub project_id: Option<String>,
    /// Server-composed display message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Serialized outbound keep-alive frame: `{"type":"ping"}`.
#[must_use]
pub fn ping_frame() -> String {
    r#"{"type":"ping"}"#.to_string()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn envelope_parses_with_optional_fields_absent() {
        let Ok(msg) = serde_json::from_str::<InboundMessage>(
            r#"{"type":"pong","data":{}}"#,
        ) else {
            panic!("expected envelope to parse");
        };
        assert_eq!(msg.msg_type, "pong");
        assert_eq!(msg.received_at, None);
        assert_eq!(msg.channel, None);
    }

    #[test]
    fn envelope_parses_with_optional_fields_present() {
        let Ok(msg) = serde_json::from_str::<InboundMessage>(
            r#"{"type":"notification","data":{"message":"hi"},"received_at":"2026-08-07T10:00:00Z","channel":"user:42"}"#,
        ) else {
            panic!("expected envelope to parse");
        };
        assert_eq!(msg.msg_type, "notification");
        assert_eq!(msg.channel.as_deref(), Some("user:42"));
        assert!(msg.received_at.is_some());
    }

    #[test]
    fn envelope_tolerates_missing_data() {
        let Ok(msg) = serde_json::from_str::<InboundMessage>(r#"{"type":"pong"}"#) else {
            panic!("expected envelope to parse");
        };
        assert!(msg.data.is_null());
    }

    #[test]
    fn known_kinds_map_from_wire_strings() {
        assert_eq!(
            MessageKind::from_type("task_progress"),
            MessageKind::TaskProgress
        );
        assert_eq!(
            MessageKind::from_type("you_removed_from_project"),
            MessageKind::YouRemovedFromProject
        );
        assert_eq!(MessageKind::from_type("unauthorized"), MessageKind::Unauthorized);
    }

    #[test]
    fn unknown_kinds_map_to_other() {
        assert_eq!(MessageKind::from_type("pong"), MessageKind::Other);
        assert_eq!(MessageKind::from_type("capabilities"), MessageKind::Other);
        assert_eq!(MessageKind::from_type(""), MessageKind::Other);
    }

    #[test]
    fn task_progress_payload_tolerates_partial_data() {
        let Ok(payload) = serde_json::from_value::<TaskProgressPayload>(
            serde_json::json!({"status": "running"}),
        ) else {
            panic!("expected payload to parse");
        };
        assert_eq!(payload.status, TaskStatus::Running);
        assert_eq!(payload.progress, None);
        assert!(payload.task_type.is_empty());
    }

    #[test]
    fn unrecognized_status_parses_as_unknown() {
        let Ok(payload) = serde_json::from_value::<TaskProgressPayload>(
            serde_json::json!({"status": "queued"}),
        ) else {
            panic!("expected payload to parse");
        };
        assert_eq!(payload.status, TaskStatus::Unknown);
    }

    #[test]
    fn ping_frame_is_the_bare_control_message() {
        assert_eq!(ping_frame(), r#"{"type":"ping"}"#);
    }
}
