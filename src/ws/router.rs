//! Inbound message routing.
//!
//! [`MessageRouter`] consumes text frames from the live connection, parses
//! them, keeps the most recent message for observers, and dispatches by
//! message kind to side-effecting handlers. Side effects are limited to:
//! cache invalidation, user-facing notifications, and (for authorization
//! failures only) ending the session. The router never writes to the socket
//! and owns no connection state.

use std::fmt;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use super::messages::{
    InboundMessage, MemberChangePayload, MembershipPayload, MessageKind, NotificationPayload,
    TaskProgressPayload, TaskStatus,
};
use crate::cache::{CacheInvalidator, CacheKey};
use crate::notify::{NotificationKind, Notifier};
use crate::session::SessionControl;
use crate::translate::Translate;

/// Routes inbound frames to per-type handlers.
///
/// Constructed once with its collaborators and shared with the connection
/// manager, which calls [`MessageRouter::handle_frame`] for every text frame
/// the socket delivers.
pub struct MessageRouter {
    cache: Arc<dyn CacheInvalidator>,
    notifier: Arc<dyn Notifier>,
    translator: Arc<dyn Translate>,
    session: Arc<dyn SessionControl>,
    last_message: RwLock<Option<InboundMessage>>,
}

impl fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRouter").finish_non_exhaustive()
    }
}

impl MessageRouter {
    /// Creates a router over the injected collaborators.
    #[must_use]
    pub fn new(
        cache: Arc<dyn CacheInvalidator>,
        notifier: Arc<dyn Notifier>,
        translator: Arc<dyn Translate>,
        session: Arc<dyn SessionControl>,
    ) -> Self {
        Self {
            cache,
            notifier,
            translator,
            session,
            last_message: RwLock::new(None),
        }
    }

    /// Returns a copy of the most recently received message, if any.
    ///
    /// Only the latest inbound message is retained; every successfully
    /// parsed frame replaces the previous value, including kinds the router
    /// does not otherwise act on.
    #[must_use]
    pub fn last_message(&self) -> Option<InboundMessage> {
        self.last_message.read().ok().and_then(|slot| slot.clone())
    }

    /// Processes one raw text frame.
    ///
    /// Malformed JSON is logged and dropped without touching the
    /// last-message slot; this method never panics and never propagates an
    /// error to the read loop.
    pub fn handle_frame(&self, raw: &str) {
        let message: InboundMessage = match serde_json::from_str(raw) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed frame");
                return;
            }
        };

        let kind = MessageKind::from_type(&message.msg_type);
        let msg_type = message.msg_type.clone();
        let data = message.data.clone();

        if let Ok(mut slot) = self.last_message.write() {
            *slot = Some(message);
        }

        match kind {
            MessageKind::TaskProgress => self.on_task_progress(data),
            MessageKind::Notification => self.on_notification(data),
            MessageKind::UserJoined => self.on_member_change(data, false),
            MessageKind::UserRemoved => self.on_member_change(data, true),
            MessageKind::YouAddedToProject => self.on_membership(data, true),
            MessageKind::YouRemovedFromProject => self.on_membership(data, false),
            MessageKind::Unauthorized | MessageKind::Error => {
                tracing::error!(msg_type, "server signalled a session-fatal condition");
                self.session.logout();
            }
            MessageKind::Other => {
                tracing::trace!(msg_type, "ignoring message type");
            }
        }
    }

    /// Parses a typed payload out of the `data` field.
    ///
    /// Payload structs default every field, so this only fails when `data`
    /// has the wrong overall shape, in which case the frame is dropped as
    /// locally malformed.
    fn parse_payload<T: DeserializeOwned>(kind: &str, data: serde_json::Value) -> Option<T> {
        match serde_json::from_value(data) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(kind, error = %e, "dropping frame with malformed payload");
                None
            }
        }
    }

    /// Resolves the human-readable label for a task type key.
    fn task_label(&self, task_type: &str) -> String {
        if task_type.is_empty() {
            return "task".to_string();
        }
        self.translator
            .lookup(&format!("tasks.types.{task_type}"), &[])
            .unwrap_or_else(|| task_type.to_string())
    }

    fn on_task_progress(&self, data: serde_json::Value) {
        let Some(payload) = Self::parse_payload::<TaskProgressPayload>("task_progress", data)
        else {
            return;
        };
        let label = self.task_label(&payload.task_type);

        match payload.status {
            TaskStatus::Completed => {
                let text = self
                    .translator
                    .lookup("tasks.progress.completed", &[("task", &label)])
                    .unwrap_or_else(|| format!("{label} completed"));
                self.notifier.notify(NotificationKind::Success, &text);
            }
            TaskStatus::Failed | TaskStatus::Error => {
                let text = self
                    .translator
                    .lookup("tasks.progress.failed", &[("task", &label)])
                    .unwrap_or_else(|| match &payload.message {
                        Some(detail) => format!("{label} failed: {detail}"),
                        None => format!("{label} failed"),
                    });
                self.notifier.notify(NotificationKind::Error, &text);
            }
            // A running task announces itself exactly once, at progress 0.
            TaskStatus::Running if payload.progress == Some(0.0) => {
                let text = self
                    .translator
                    .lookup("tasks.progress.started", &[("task", &label)])
                    .unwrap_or_else(|| format!("{label} started"));
                self.notifier.notify(NotificationKind::Info, &text);
            }
            TaskStatus::Running | TaskStatus::Unknown => {}
        }
    }

    fn on_notification(&self, data: serde_json::Value) {
        let Some(payload) = Self::parse_payload::<NotificationPayload>("notification", data)
        else {
            return;
        };

        let text = payload
            .event_type
            .as_deref()
            .filter(|event_type| !event_type.is_empty())
            .and_then(|event_type| {
                self.translator
                    .lookup(&format!("notifications.events.{event_type}"), &[])
            })
            .or_else(|| payload.message.clone().filter(|m| !m.is_empty()))
            .unwrap_or_else(|| {
                self.translator
                    .lookup("notifications.generic", &[])
                    .unwrap_or_else(|| "You have a new notification".to_string())
            });

        self.notifier.notify_incoming(&text);
        self.cache.invalidate(CacheKey::Notifications);
    }

    fn on_member_change(&self, data: serde_json::Value, removal: bool) {
        let kind = if removal { "user_removed" } else { "user_joined" };
        let Some(payload) = Self::parse_payload::<MemberChangePayload>(kind, data) else {
            return;
        };

        let name = payload
            .user_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "A user".to_string());

        let text = if removal {
            // A removal performed by someone else reads differently from a
            // member leaving on their own.
            let forced = match (&payload.removed_by, &payload.user_id) {
                (Some(by), Some(user_id)) => by != user_id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if forced {
                self.translator
                    .lookup("projects.member_removed", &[("name", &name)])
                    .unwrap_or_else(|| format!("{name} was removed from the project"))
            } else {
                self.translator
                    .lookup("projects.member_left", &[("name", &name)])
                    .unwrap_or_else(|| format!("{name} left the project"))
            }
        } else {
            self.translator
                .lookup("projects.member_joined", &[("name", &name)])
                .unwrap_or_else(|| format!("{name} joined the project"))
        };

        self.notifier.notify_incoming(&text);

        if let Some(project_id) = payload.project_id.filter(|id| !id.is_empty()) {
            self.cache.invalidate(CacheKey::Project(project_id));
        }
        self.cache.invalidate(CacheKey::Projects);
        self.cache.invalidate(CacheKey::Users);
        self.cache.invalidate(CacheKey::UserSearch(String::new()));
    }

    fn on_membership(&self, data: serde_json::Value, added: bool) {
        let kind = if added {
            "you_added_to_project"
        } else {
            "you_removed_from_project"
        };
        let Some(payload) = Self::parse_payload::<MembershipPayload>(kind, data) else {
            return;
        };

        let text = payload
            .message
            .clone()
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| {
                if added {
                    self.translator
                        .lookup("projects.you_added", &[])
                        .unwrap_or_else(|| "You were added to a project".to_string())
                } else {
                    self.translator
                        .lookup("projects.you_removed", &[])
                        .unwrap_or_else(|| "You were removed from a project".to_string())
                }
            });

        self.notifier.notify_incoming(&text);

        self.cache.invalidate(CacheKey::Projects);
        if let Some(project_id) = payload.project_id.filter(|id| !id.is_empty()) {
            self.cache.invalidate(CacheKey::Project(project_id));
        }
    }
}
