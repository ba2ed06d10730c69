use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use giftly_core::catalog::{CatalogError, ProductCatalog};
use giftly_core::config::{AppConfig, ConfigError};
use giftly_core::domain::recipient::RecipientProfile;
use giftly_core::events::{event_channel, EventReceiver, SuggestionEvent};
use giftly_core::scheduler::{BudgetSource, RecipientScheduler, RosterSource};
use giftly_core::service::{CatalogSuggestionService, SuggestionService};
use giftly_core::store::SuggestionStore;
use thiserror::Error;
use tracing::{info, warn};

use crate::routes::AppState;

pub struct Application {
    pub config: AppConfig,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("product catalog failed to load: {0}")]
    Catalog(#[from] CatalogError),
}

/// In-memory recipient roster. Session-scoped, like the store.
#[derive(Default)]
pub struct InMemoryRoster {
    recipients: RwLock<Vec<RecipientProfile>>,
}

impl InMemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by recipient id.
    pub fn upsert(&self, profile: RecipientProfile) {
        let mut recipients = self.recipients.write().expect("roster lock poisoned");
        recipients.retain(|existing| existing.id != profile.id);
        recipients.push(profile);
    }

    pub fn remove(&self, recipient_id: &str) -> bool {
        let mut recipients = self.recipients.write().expect("roster lock poisoned");
        let before = recipients.len();
        recipients.retain(|existing| existing.id != recipient_id);
        recipients.len() < before
    }

    pub fn get(&self, recipient_id: &str) -> Option<RecipientProfile> {
        self.recipients
            .read()
            .expect("roster lock poisoned")
            .iter()
            .find(|profile| profile.id == recipient_id)
            .cloned()
    }

    pub fn list(&self) -> Vec<RecipientProfile> {
        self.recipients.read().expect("roster lock poisoned").clone()
    }
}

#[async_trait]
impl RosterSource for InMemoryRoster {
    async fn snapshot(&self) -> Vec<RecipientProfile> {
        self.list()
    }
}

/// Single session-wide gift budget, adjustable over the API.
pub struct SessionBudget {
    amount: RwLock<f64>,
}

impl SessionBudget {
    pub fn new(initial: f64) -> Self {
        Self { amount: RwLock::new(initial) }
    }

    pub fn get(&self) -> f64 {
        *self.amount.read().expect("budget lock poisoned")
    }

    pub fn set(&self, amount: f64) {
        *self.amount.write().expect("budget lock poisoned") = amount;
    }
}

impl BudgetSource for SessionBudget {
    fn current_budget(&self) -> Option<f64> {
        Some(self.get())
    }
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let catalog = match ProductCatalog::from_file(&config.catalog.products_path) {
        Ok(catalog) => {
            info!(
                event_name = "system.bootstrap.catalog_loaded",
                products = catalog.len(),
                path = %config.catalog.products_path.display(),
                "product catalog loaded"
            );
            Some(Arc::new(catalog))
        }
        Err(CatalogError::Missing(path)) => {
            warn!(
                event_name = "system.bootstrap.catalog_missing",
                path = %path.display(),
                "products.json not found; catalog endpoints will return 404"
            );
            None
        }
        Err(error) => return Err(error.into()),
    };

    let store = Arc::new(SuggestionStore::new());
    let roster = Arc::new(InMemoryRoster::new());
    let budget = Arc::new(SessionBudget::new(config.budget.initial));

    // Scheduler fires against an empty catalog when the file is absent; the
    // resulting "no candidates" events surface the problem per recipient.
    let ranking_catalog =
        catalog.clone().unwrap_or_else(|| Arc::new(ProductCatalog::new(Vec::new())));
    let service = Arc::new(CatalogSuggestionService::new(ranking_catalog));

    let (events_tx, events_rx) = event_channel();
    spawn_event_logger(events_rx);

    let scheduler = Arc::new(RecipientScheduler::new(
        config.scheduler.clone(),
        Arc::clone(&store),
        Arc::clone(&roster) as Arc<dyn RosterSource>,
        Arc::clone(&budget) as Arc<dyn BudgetSource>,
        Arc::clone(&service) as Arc<dyn SuggestionService>,
        events_tx,
    ));
    // Schedule state never survives a restart.
    scheduler.reset();

    let state = AppState {
        catalog,
        store,
        roster,
        budget,
        service,
        scheduler,
        auto_suggest: config.scheduler.auto_suggest,
    };

    info!(event_name = "system.bootstrap.complete", "application bootstrap complete");

    Ok(Application { config, state })
}

/// Drains suggestion events into the log; replaces a push channel to clients.
fn spawn_event_logger(mut events: EventReceiver) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SuggestionEvent::Ready { recipient_id, payload } => {
                    info!(
                        event_name = "notify.suggestion_ready",
                        recipient_id = %recipient_id,
                        product = %payload.product.name,
                        score = payload.score,
                        "suggestion ready"
                    );
                }
                SuggestionEvent::Error { recipient_id, payload } => {
                    warn!(
                        event_name = "notify.suggestion_error",
                        recipient_id = %recipient_id,
                        reason = %payload,
                        "suggestion failed"
                    );
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use giftly_core::config::{ConfigOverrides, LoadOptions};

    use super::*;

    fn config_with_catalog(path: &str) -> AppConfig {
        AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                products_path: Some(path.into()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("config should load")
    }

    #[tokio::test]
    async fn bootstrap_without_catalog_file_yields_absent_catalog() {
        let app = bootstrap_with_config(config_with_catalog("does-not-exist/products.json"))
            .await
            .expect("bootstrap should tolerate a missing catalog");

        assert!(app.state.catalog.is_none());
        assert!(app.state.store.is_empty());
        assert!(app.state.scheduler.scheduled_recipients().is_empty());
    }

    #[tokio::test]
    async fn bootstrap_loads_catalog_and_initial_budget() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("products.json");
        std::fs::write(
            &path,
            r#"[{"id": "p1", "name": "Rose Posy", "price": 24.0}]"#,
        )
        .expect("write catalog");

        let app = bootstrap_with_config(config_with_catalog(path.to_str().expect("utf8 path")))
            .await
            .expect("bootstrap should succeed");

        let catalog = app.state.catalog.as_ref().expect("catalog present");
        assert_eq!(catalog.len(), 1);
        assert_eq!(app.state.budget.get(), app.config.budget.initial);
    }

    #[tokio::test]
    async fn roster_upsert_replaces_by_id() {
        let roster = InMemoryRoster::new();
        roster.upsert(RecipientProfile::new("r1", "Alice"));
        roster.upsert(RecipientProfile::new("r1", "Alice Updated"));

        let listed = roster.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "Alice Updated");

        assert!(roster.remove("r1"));
        assert!(!roster.remove("r1"));
    }
}
