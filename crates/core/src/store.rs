//! In-memory suggestion store and lifecycle.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;
use uuid::Uuid;

use crate::domain::suggestion::{ScoredCandidate, Suggestion, SuggestionStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A suggestion already exists for the recipient. Normal outcome of the
    /// dedup guard, not a failure; callers swallow it.
    #[error("a suggestion already exists for recipient {recipient_id}")]
    AlreadyExists { recipient_id: String },
    #[error("suggestion not found: {0}")]
    NotFound(Uuid),
    #[error("invalid status transition from {from:?} to {to:?}")]
    InvalidTransition { from: SuggestionStatus, to: SuggestionStatus },
}

/// Keyed collection of suggestions, at most one per recipient.
///
/// The map key is the recipient id, which makes the uniqueness invariant
/// structural; the check-and-insert in [`upsert_pending`](Self::upsert_pending)
/// runs under the store lock so concurrent timer fires and manual fetches
/// cannot both insert for the same recipient.
#[derive(Debug, Default)]
pub struct SuggestionStore {
    inner: Mutex<HashMap<String, Suggestion>>,
}

impl SuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new pending suggestion only if the recipient has none.
    ///
    /// This is the write-time half of the double-check pattern: the scheduler
    /// checks at schedule time and again here, closing the race window
    /// between two almost-simultaneous fires.
    pub fn upsert_pending(
        &self,
        recipient_id: &str,
        candidate: ScoredCandidate,
    ) -> Result<Suggestion, StoreError> {
        let mut inner = self.inner.lock().expect("suggestion store lock poisoned");
        if inner.contains_key(recipient_id) {
            return Err(StoreError::AlreadyExists { recipient_id: recipient_id.to_string() });
        }
        let suggestion = Suggestion::pending(recipient_id, candidate);
        inner.insert(recipient_id.to_string(), suggestion.clone());
        Ok(suggestion)
    }

    /// Remove any existing suggestion for the recipient, regardless of
    /// status, and insert a fresh pending one. Backs the explicit
    /// "get new suggestion" action.
    pub fn replace(&self, recipient_id: &str, candidate: ScoredCandidate) -> Suggestion {
        let mut inner = self.inner.lock().expect("suggestion store lock poisoned");
        let suggestion = Suggestion::pending(recipient_id, candidate);
        inner.insert(recipient_id.to_string(), suggestion.clone());
        suggestion
    }

    /// Transition a suggestion's status. Only `Pending -> Accepted` and
    /// `Pending -> Rejected` are legal; terminal states only change via
    /// [`replace`](Self::replace) or deletion.
    pub fn set_status(
        &self,
        suggestion_id: Uuid,
        status: SuggestionStatus,
    ) -> Result<Suggestion, StoreError> {
        let mut inner = self.inner.lock().expect("suggestion store lock poisoned");
        let suggestion = inner
            .values_mut()
            .find(|suggestion| suggestion.id == suggestion_id)
            .ok_or(StoreError::NotFound(suggestion_id))?;

        if suggestion.status != SuggestionStatus::Pending || status == SuggestionStatus::Pending {
            return Err(StoreError::InvalidTransition { from: suggestion.status, to: status });
        }

        suggestion.status = status;
        Ok(suggestion.clone())
    }

    pub fn get(&self, recipient_id: &str) -> Option<Suggestion> {
        self.inner.lock().expect("suggestion store lock poisoned").get(recipient_id).cloned()
    }

    /// True when the recipient has any suggestion at all. Used by the
    /// scheduler's dedup guard.
    pub fn has_suggestion(&self, recipient_id: &str) -> bool {
        self.inner.lock().expect("suggestion store lock poisoned").contains_key(recipient_id)
    }

    pub fn remove_by_recipient(&self, recipient_id: &str) -> Option<Suggestion> {
        self.inner.lock().expect("suggestion store lock poisoned").remove(recipient_id)
    }

    pub fn remove_by_id(&self, suggestion_id: Uuid) -> Option<Suggestion> {
        let mut inner = self.inner.lock().expect("suggestion store lock poisoned");
        let key = inner
            .iter()
            .find(|(_, suggestion)| suggestion.id == suggestion_id)
            .map(|(key, _)| key.clone())?;
        inner.remove(&key)
    }

    /// Drop every suggestion, returning how many were removed.
    pub fn clear_all(&self) -> usize {
        let mut inner = self.inner.lock().expect("suggestion store lock poisoned");
        let cleared = inner.len();
        inner.clear();
        cleared
    }

    /// Snapshot of all suggestions, ordered by creation time.
    pub fn all(&self) -> Vec<Suggestion> {
        let inner = self.inner.lock().expect("suggestion store lock poisoned");
        let mut suggestions: Vec<Suggestion> = inner.values().cloned().collect();
        suggestions.sort_by_key(|suggestion| suggestion.created_at);
        suggestions
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("suggestion store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
