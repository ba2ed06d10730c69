use thiserror::Error;

use crate::ranker::RankError;
use crate::store::StoreError;

/// Failures surfaced by suggestion work, whether timer-driven or user-initiated.
///
/// None of these are fatal: a failed timer fire is terminal for that fire
/// only, and a failed user action is reported synchronously to the caller.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SuggestError {
    #[error("invalid recipient: {0}")]
    Validation(String),
    #[error("no budget is configured")]
    NoBudget,
    #[error("no candidate products are available")]
    NoCandidates,
    #[error("suggestion service failed: {0}")]
    Transport(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<RankError> for SuggestError {
    fn from(value: RankError) -> Self {
        match value {
            RankError::EmptyCatalog => Self::NoCandidates,
        }
    }
}
