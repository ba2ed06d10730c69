use serde::{Deserialize, Serialize};

/// A tracked person gifts are suggested for.
///
/// Profiles are owned by the roster; the core only ever reads a snapshot.
/// Optional preference lists default to empty so partially filled profiles
/// score without special-casing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub about_them: String,
    #[serde(default)]
    pub favorite_colors: Vec<String>,
    #[serde(default)]
    pub favorite_flowers: Vec<String>,
    #[serde(default)]
    pub allergies: Vec<String>,
    #[serde(default)]
    pub budget_range: BudgetRange,
}

impl RecipientProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            about_them: String::new(),
            favorite_colors: Vec::new(),
            favorite_flowers: Vec::new(),
            allergies: Vec::new(),
            budget_range: BudgetRange::default(),
        }
    }

    pub fn with_about(mut self, about: impl Into<String>) -> Self {
        self.about_them = about.into();
        self
    }

    pub fn with_favorite_flowers(mut self, flowers: Vec<String>) -> Self {
        self.favorite_flowers = flowers;
        self
    }

    pub fn with_favorite_colors(mut self, colors: Vec<String>) -> Self {
        self.favorite_colors = colors;
        self
    }

    pub fn with_allergies(mut self, allergies: Vec<String>) -> Self {
        self.allergies = allergies;
        self
    }
}

/// Per-recipient spend window shown in the profile form.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BudgetRange {
    pub min: f64,
    pub max: f64,
}

impl Default for BudgetRange {
    fn default() -> Self {
        Self { min: 30.0, max: 80.0 }
    }
}
