//! Notification event contract handed to the dispatcher.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::suggestion::Suggestion;

/// Event emitted when a scheduled or manual suggestion attempt resolves.
///
/// Consumed by the notification dispatcher (push or in-app rendering, out of
/// scope here). Serialized form is `{"type": "suggestion"|"error",
/// "recipientId": ..., "payload": ...}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SuggestionEvent {
    #[serde(rename = "suggestion", rename_all = "camelCase")]
    Ready { recipient_id: String, payload: Suggestion },
    #[serde(rename = "error", rename_all = "camelCase")]
    Error { recipient_id: String, payload: String },
}

impl SuggestionEvent {
    pub fn ready(suggestion: Suggestion) -> Self {
        Self::Ready { recipient_id: suggestion.recipient_id.clone(), payload: suggestion }
    }

    pub fn error(recipient_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Error { recipient_id: recipient_id.into(), payload: reason.into() }
    }

    pub fn recipient_id(&self) -> &str {
        match self {
            Self::Ready { recipient_id, .. } | Self::Error { recipient_id, .. } => recipient_id,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<SuggestionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SuggestionEvent>;

/// Unbounded channel pair for suggestion events. Unbounded is safe here:
/// event volume is bounded by the recipient count.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
