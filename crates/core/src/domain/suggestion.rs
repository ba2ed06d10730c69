use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::product::Product;

/// A product paired with a computed score and the reasons behind it,
/// produced fresh on every ranking call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    #[serde(flatten)]
    pub product: Product,
    pub score: i32,
    pub reasons: Vec<String>,
}

/// Lifecycle status of a persisted suggestion.
///
/// `Pending` is the only non-terminal state; the store rejects transitions
/// out of a terminal state (replacement deletes and recreates instead).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
}

/// A persisted, user-facing recommendation with a lifecycle status.
///
/// Product fields are a denormalized copy so later catalog refreshes cannot
/// mutate an already-surfaced suggestion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: Uuid,
    pub recipient_id: String,
    #[serde(flatten)]
    pub product: Product,
    pub score: i32,
    pub reasons: Vec<String>,
    pub status: SuggestionStatus,
    pub created_at: DateTime<Utc>,
}

impl Suggestion {
    /// Build a fresh pending suggestion from a ranked candidate.
    pub fn pending(recipient_id: impl Into<String>, candidate: ScoredCandidate) -> Self {
        Self {
            id: Uuid::new_v4(),
            recipient_id: recipient_id.into(),
            product: candidate.product,
            score: candidate.score,
            reasons: candidate.reasons,
            status: SuggestionStatus::Pending,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != SuggestionStatus::Pending
    }
}
