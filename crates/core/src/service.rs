//! Ranking service boundary between the scheduler and the catalog.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::catalog::ProductCatalog;
use crate::domain::recipient::RecipientProfile;
use crate::domain::suggestion::ScoredCandidate;
use crate::errors::SuggestError;
use crate::ranker::SuggestionRanker;

/// The outbound suggestion call made from a timer fire or a manual fetch.
///
/// The trait keeps the scheduler transport-agnostic: production wires the
/// in-process catalog service, tests wire scripted fakes.
#[async_trait]
pub trait SuggestionService: Send + Sync {
    /// Produce a single candidate for one recipient, or `None` when the
    /// catalog has nothing worth suggesting.
    async fn suggest_one(
        &self,
        recipient: &RecipientProfile,
        budget: f64,
    ) -> Result<Option<ScoredCandidate>, SuggestError>;
}

/// In-process implementation ranking the loaded product catalog.
pub struct CatalogSuggestionService {
    catalog: Arc<ProductCatalog>,
    ranker: SuggestionRanker,
    rng: Mutex<StdRng>,
}

impl CatalogSuggestionService {
    pub fn new(catalog: Arc<ProductCatalog>) -> Self {
        Self::with_rng(catalog, StdRng::from_entropy())
    }

    /// Seeded constructor so tests control the shuffle.
    pub fn with_rng(catalog: Arc<ProductCatalog>, rng: StdRng) -> Self {
        Self { catalog, ranker: SuggestionRanker::new(), rng: Mutex::new(rng) }
    }

    /// Multi-candidate ranking used by the manual suggest endpoint.
    pub fn suggest_many(
        &self,
        recipients: &[RecipientProfile],
        budget: Option<f64>,
    ) -> Result<Vec<ScoredCandidate>, SuggestError> {
        let mut rng = self.rng.lock().expect("suggestion rng lock poisoned");
        Ok(self.ranker.rank(recipients, budget, self.catalog.products(), &mut *rng)?)
    }
}

#[async_trait]
impl SuggestionService for CatalogSuggestionService {
    async fn suggest_one(
        &self,
        recipient: &RecipientProfile,
        budget: f64,
    ) -> Result<Option<ScoredCandidate>, SuggestError> {
        let mut rng = self.rng.lock().expect("suggestion rng lock poisoned");
        Ok(self.ranker.rank_one(recipient, Some(budget), self.catalog.products(), &mut *rng)?)
    }
}
