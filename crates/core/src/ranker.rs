//! Catalog-wide ranking and candidate selection.

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::domain::product::Product;
use crate::domain::recipient::RecipientProfile;
use crate::domain::suggestion::ScoredCandidate;
use crate::scoring::GiftScorer;

/// Size of the randomization pool drawn from the top of the ranking.
///
/// Shuffling within the pool guards against showing the literal best match
/// on every request while keeping selection quality high.
pub const POOL_SIZE: usize = 20;
/// Candidates returned for a multi-suggestion request.
pub const MULTI_SUGGESTION_COUNT: usize = 6;
/// Suggestions are never shown with a non-positive score; the floor is
/// applied after ordering so it cannot change the ranking.
const MIN_DISPLAY_SCORE: i32 = 1;

#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RankError {
    #[error("no valid products in catalog")]
    EmptyCatalog,
}

/// Orchestrates the scorer over a full catalog for a set of recipients.
///
/// Randomness is injected so callers (and tests) control the shuffle.
#[derive(Clone, Copy, Debug, Default)]
pub struct SuggestionRanker {
    scorer: GiftScorer,
}

impl SuggestionRanker {
    pub fn new() -> Self {
        Self { scorer: GiftScorer::new() }
    }

    /// Rank the catalog for the given recipients and return up to
    /// [`MULTI_SUGGESTION_COUNT`] candidates from the shuffled top pool.
    ///
    /// Scores accumulate additively across recipients and reasons
    /// concatenate. There is no minimum acceptable score: any non-empty pool
    /// yields a result, allergy penalties included.
    pub fn rank<R: Rng + ?Sized>(
        &self,
        recipients: &[RecipientProfile],
        budget: Option<f64>,
        catalog: &[Product],
        rng: &mut R,
    ) -> Result<Vec<ScoredCandidate>, RankError> {
        self.rank_top(recipients, budget, catalog, MULTI_SUGGESTION_COUNT, rng)
    }

    /// Single-candidate path used by the scheduler: one recipient, one pick.
    pub fn rank_one<R: Rng + ?Sized>(
        &self,
        recipient: &RecipientProfile,
        budget: Option<f64>,
        catalog: &[Product],
        rng: &mut R,
    ) -> Result<Option<ScoredCandidate>, RankError> {
        let mut picked =
            self.rank_top(std::slice::from_ref(recipient), budget, catalog, 1, rng)?;
        Ok(picked.pop())
    }

    fn rank_top<R: Rng + ?Sized>(
        &self,
        recipients: &[RecipientProfile],
        budget: Option<f64>,
        catalog: &[Product],
        take: usize,
        rng: &mut R,
    ) -> Result<Vec<ScoredCandidate>, RankError> {
        let mut scored: Vec<ScoredCandidate> = catalog
            .iter()
            .filter(|product| !product.name.trim().is_empty())
            .map(|product| self.score_product(product, recipients, budget))
            .collect();

        if scored.is_empty() {
            return Err(RankError::EmptyCatalog);
        }

        // Stable sort: ties retain catalog order.
        scored.sort_by(|a, b| b.score.cmp(&a.score));
        scored.truncate(POOL_SIZE);
        scored.shuffle(rng);
        scored.truncate(take);

        for candidate in &mut scored {
            candidate.score = candidate.score.max(MIN_DISPLAY_SCORE);
        }

        Ok(scored)
    }

    fn score_product(
        &self,
        product: &Product,
        recipients: &[RecipientProfile],
        budget: Option<f64>,
    ) -> ScoredCandidate {
        let mut total = 0;
        let mut reasons = Vec::new();

        for recipient in recipients {
            let (score, mut recipient_reasons) = self.scorer.score(product, recipient, budget);
            total += score;
            reasons.append(&mut recipient_reasons);
        }

        if reasons.is_empty() {
            reasons.push("Great seasonal choice!".to_string());
        }

        ScoredCandidate { product: product.clone(), score: total, reasons }
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn alice() -> RecipientProfile {
        RecipientProfile::new("r1", "Alice").with_favorite_flowers(vec!["lily".to_string()])
    }

    fn catalog_of(count: usize) -> Vec<Product> {
        (0..count)
            .map(|index| Product::new(format!("p{index}"), format!("Bouquet {index}")))
            .collect()
    }

    #[test]
    fn empty_catalog_is_an_error_not_a_panic() {
        let ranker = SuggestionRanker::new();
        let result = ranker.rank(&[alice()], Some(50.0), &[], &mut rng());
        assert_eq!(result, Err(RankError::EmptyCatalog));
    }

    #[test]
    fn nameless_products_are_filtered_out() {
        let ranker = SuggestionRanker::new();
        let catalog = vec![Product::new("p1", "   "), Product::new("p2", "")];
        let result = ranker.rank(&[alice()], Some(50.0), &catalog, &mut rng());
        assert_eq!(result, Err(RankError::EmptyCatalog));
    }

    #[test]
    fn multi_request_returns_at_most_six() {
        let ranker = SuggestionRanker::new();
        let catalog = catalog_of(40);
        let picked = ranker.rank(&[alice()], Some(50.0), &catalog, &mut rng()).unwrap();
        assert_eq!(picked.len(), MULTI_SUGGESTION_COUNT);
    }

    #[test]
    fn rank_one_returns_a_single_candidate() {
        let ranker = SuggestionRanker::new();
        let catalog = catalog_of(3);
        let picked = ranker.rank_one(&alice(), Some(50.0), &catalog, &mut rng()).unwrap();
        assert!(picked.is_some());
    }

    #[test]
    fn pool_is_limited_to_the_top_twenty() {
        let ranker = SuggestionRanker::new();
        // 25 products; 20 high scorers and 5 with an allergy penalty that
        // pushes them far below the pool cutoff.
        let allergic = RecipientProfile::new("r1", "Alice")
            .with_allergies(vec!["fern".to_string()]);
        let mut catalog: Vec<Product> = (0..20)
            .map(|index| {
                Product::new(format!("good{index}"), format!("Rose {index}")).with_price(40.0)
            })
            .collect();
        catalog.extend((0..5).map(|index| Product::new(format!("bad{index}"), "Fern Pot")));

        for _ in 0..8 {
            let picked =
                ranker.rank(&[allergic.clone()], Some(50.0), &catalog, &mut rng()).unwrap();
            assert!(picked.iter().all(|candidate| candidate.product.id.starts_with("good")));
        }
    }

    #[test]
    fn penalized_products_stay_in_the_pool_when_nothing_scores_higher() {
        // The allergy term is a soft penalty: a catalog made entirely of
        // allergenic products still yields candidates.
        let ranker = SuggestionRanker::new();
        let allergic =
            RecipientProfile::new("r1", "Alice").with_allergies(vec!["lilies".to_string()]);
        let catalog = vec![Product::new("p1", "White Lily Bouquet")
            .with_description("A generous bouquet of white lilies")
            .with_price(40.0)];

        let picked = ranker.rank(&[allergic], Some(50.0), &catalog, &mut rng()).unwrap();
        assert_eq!(picked.len(), 1);
        assert_eq!(picked[0].product.id, "p1");
    }

    #[test]
    fn scores_are_clamped_to_a_display_floor_of_one() {
        let ranker = SuggestionRanker::new();
        let allergic =
            RecipientProfile::new("r1", "Alice").with_allergies(vec!["fern".to_string()]);
        let catalog = vec![Product::new("p1", "Fern Pot")];

        let picked = ranker.rank(&[allergic], None, &catalog, &mut rng()).unwrap();
        assert_eq!(picked[0].score, 1);
    }

    #[test]
    fn scores_accumulate_across_recipients() {
        let ranker = SuggestionRanker::new();
        let bob = RecipientProfile::new("r2", "Bob").with_favorite_flowers(vec!["lily".to_string()]);
        let catalog = vec![Product::new("p1", "White Lily Bouquet")];

        let picked = ranker.rank(&[alice(), bob], None, &catalog, &mut rng()).unwrap();
        // +2 per recipient's flower match; two reasons concatenated.
        assert_eq!(picked[0].score, 4);
        assert_eq!(picked[0].reasons.len(), 2);
    }

    #[test]
    fn fallback_reason_is_supplied_when_nothing_matched() {
        let ranker = SuggestionRanker::new();
        let catalog = vec![Product::new("p1", "Fern Pot")];
        let picked = ranker.rank(&[alice()], None, &catalog, &mut rng()).unwrap();
        assert_eq!(picked[0].reasons, vec!["Great seasonal choice!".to_string()]);
    }
}
