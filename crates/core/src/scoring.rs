//! Content-based scoring of a product against a recipient profile.

use crate::domain::product::Product;
use crate::domain::recipient::RecipientProfile;

/// Weighted additive scoring model.
///
/// Scores are computed over a case-insensitive concatenation of the product
/// name and description. Pure and deterministic: identical inputs always
/// yield the identical `(score, reasons)` pair. Raw scores are unbounded in
/// both directions; the ranker applies a cosmetic floor after ordering.
#[derive(Clone, Copy, Debug, Default)]
pub struct GiftScorer;

/// Points awarded per matched favorite flower.
const FLOWER_MATCH: i32 = 2;
/// Points awarded per matched favorite color or interest keyword.
const KEYWORD_MATCH: i32 = 1;
/// Penalty per allergy term found in the product text. Deliberately a soft
/// penalty, not a hard filter: a product mentioning an allergen can still be
/// suggested when its other signals dominate.
const ALLERGY_PENALTY: i32 = -5;
/// Interest keywords shorter than this are too generic to match on.
const MIN_KEYWORD_LEN: usize = 4;

impl GiftScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score one product for one recipient under the given budget.
    ///
    /// A missing price or non-positive budget skips the budget term entirely
    /// (no score change, no reason).
    pub fn score(
        &self,
        product: &Product,
        recipient: &RecipientProfile,
        budget: Option<f64>,
    ) -> (i32, Vec<String>) {
        let text = product_text(product);
        let mut score = 0;
        let mut reasons = Vec::new();

        if let (Some(price), Some(budget)) = (product.price, budget) {
            if price > 0.0 && budget > 0.0 {
                score += budget_tier(price, budget);
                if price <= budget {
                    reasons.push(format!("Within budget (£{price})"));
                }
            }
        }

        for flower in &recipient.favorite_flowers {
            if text.contains(&flower.to_lowercase()) {
                score += FLOWER_MATCH;
                reasons.push(format!(
                    "Contains {} favorite flower: {flower}",
                    possessive_name(recipient)
                ));
            }
        }

        for color in &recipient.favorite_colors {
            if text.contains(&color.to_lowercase()) {
                score += KEYWORD_MATCH;
            }
        }

        // Interest keywords come from the lowercased free-text field,
        // duplicates included: a word the user repeated counts once per
        // occurrence in the token list.
        let about = recipient.about_them.to_lowercase();
        for word in interest_tokens(&about) {
            if text.contains(word) {
                score += KEYWORD_MATCH;
            }
        }

        for allergy in &recipient.allergies {
            if text.contains(&allergy.to_lowercase()) {
                score += ALLERGY_PENALTY;
            }
        }

        if !product.images.is_empty() {
            score += 1;
        }
        if product.description.len() > 20 {
            score += 1;
        }

        (score, reasons)
    }
}

/// Budget fit tier over `price / budget`.
fn budget_tier(price: f64, budget: f64) -> i32 {
    let ratio = price / budget;
    if ratio <= 0.8 {
        3
    } else if ratio <= 1.0 {
        2
    } else if ratio <= 1.2 {
        1
    } else {
        -2
    }
}

fn product_text(product: &Product) -> String {
    format!("{} {}", product.name.to_lowercase(), product.description.to_lowercase())
}

/// Possessive form for reason strings; a nameless profile reads "their".
fn possessive_name(recipient: &RecipientProfile) -> String {
    let name = recipient.name.trim();
    if name.is_empty() {
        "their".to_string()
    } else {
        format!("{name}'s")
    }
}

/// Tokenize free text on non-word boundaries, keeping tokens long enough to
/// carry signal. The returned iterator preserves duplicates.
fn interest_tokens(about: &str) -> impl Iterator<Item = &str> {
    about
        .split(|ch: char| !ch.is_ascii_alphanumeric() && ch != '_')
        .filter(|token| token.len() >= MIN_KEYWORD_LEN)
}
