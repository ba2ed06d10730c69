pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod ranker;
pub mod scheduler;
pub mod scoring;
pub mod service;
pub mod store;

pub use catalog::{CatalogError, ProductCatalog};
pub use config::{
    AppConfig, BudgetConfig, CatalogConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat,
    LoggingConfig, SchedulerConfig, ServerConfig,
};
pub use domain::product::Product;
pub use domain::recipient::{BudgetRange, RecipientProfile};
pub use domain::suggestion::{ScoredCandidate, Suggestion, SuggestionStatus};
pub use errors::SuggestError;
pub use events::{event_channel, EventReceiver, EventSender, SuggestionEvent};
pub use ranker::{RankError, SuggestionRanker, MULTI_SUGGESTION_COUNT};
pub use scheduler::{BudgetSource, RecipientScheduler, RosterSource};
pub use scoring::GiftScorer;
pub use service::{CatalogSuggestionService, SuggestionService};
pub use store::{StoreError, SuggestionStore};
