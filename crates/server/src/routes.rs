//! JSON API.
//!
//! Endpoints:
//! - `GET    /health`                        — liveness.
//! - `GET    /api/products`                  — full catalog; 404 when the
//!   products file was absent at startup.
//! - `POST   /api/suggest`                   — ad-hoc multi-suggestion ranking.
//! - `GET    /api/people`                    — list tracked recipients.
//! - `POST   /api/people`                    — add a recipient (arms a timer).
//! - `DELETE /api/people/{id}`               — remove recipient, timer, suggestion.
//! - `POST   /api/people/{id}/refresh`       — replace the recipient's suggestion.
//! - `GET    /api/budget` / `PUT /api/budget` — session budget.
//! - `GET    /api/suggestions`               — all stored suggestions.
//! - `POST   /api/suggestions/fetch`         — fill in missing suggestions.
//! - `POST   /api/suggestions/{id}/accept`   — mark accepted.
//! - `POST   /api/suggestions/{id}/reject`   — mark rejected.
//! - `DELETE /api/suggestions`               — clear all, cancel all timers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use giftly_core::catalog::ProductCatalog;
use giftly_core::domain::recipient::{BudgetRange, RecipientProfile};
use giftly_core::domain::suggestion::SuggestionStatus;
use giftly_core::errors::SuggestError;
use giftly_core::scheduler::RecipientScheduler;
use giftly_core::service::{CatalogSuggestionService, SuggestionService};
use giftly_core::store::{StoreError, SuggestionStore};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use crate::bootstrap::{InMemoryRoster, SessionBudget};

#[derive(Clone)]
pub struct AppState {
    pub catalog: Option<Arc<ProductCatalog>>,
    pub store: Arc<SuggestionStore>,
    pub roster: Arc<InMemoryRoster>,
    pub budget: Arc<SessionBudget>,
    pub service: Arc<CatalogSuggestionService>,
    pub scheduler: Arc<RecipientScheduler>,
    pub auto_suggest: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/products", get(list_products))
        .route("/api/suggest", post(suggest))
        .route("/api/people", get(list_people).post(add_person))
        .route("/api/people/{id}", delete(delete_person))
        .route("/api/people/{id}/refresh", post(refresh_suggestion))
        .route("/api/budget", get(get_budget).put(put_budget))
        .route("/api/suggestions", get(list_suggestions).delete(clear_suggestions))
        .route("/api/suggestions/fetch", post(fetch_suggestions))
        .route("/api/suggestions/{id}/accept", post(accept_suggestion))
        .route("/api/suggestions/{id}/reject", post(reject_suggestion))
        .with_state(state)
}

type ApiResponse = (StatusCode, Json<Value>);

fn error_body(message: impl Into<String>) -> Json<Value> {
    Json(json!({ "error": message.into() }))
}

fn suggest_error_response(error: SuggestError) -> ApiResponse {
    let status = match &error {
        SuggestError::Validation(_) | SuggestError::NoBudget => StatusCode::BAD_REQUEST,
        SuggestError::NoCandidates => StatusCode::NOT_FOUND,
        SuggestError::Transport(_) => StatusCode::BAD_GATEWAY,
        SuggestError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
        SuggestError::Store(_) => StatusCode::CONFLICT,
    };
    (status, error_body(error.to_string()))
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    #[serde(default)]
    pub people: Vec<RecipientProfile>,
    #[serde(default)]
    pub budget: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPersonRequest {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
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
    pub budget_range: Option<BudgetRange>,
}

#[derive(Debug, Deserialize)]
pub struct BudgetRequest {
    pub amount: f64,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> ApiResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ready", "checkedAt": Utc::now().to_rfc3339() })),
    )
}

async fn list_products(State(state): State<AppState>) -> ApiResponse {
    match &state.catalog {
        Some(catalog) => (StatusCode::OK, Json(json!(catalog.products()))),
        None => (StatusCode::NOT_FOUND, error_body("products.json not found")),
    }
}

/// Ad-hoc ranking over the posted profiles; nothing is stored or scheduled.
async fn suggest(
    State(state): State<AppState>,
    Json(request): Json<SuggestRequest>,
) -> ApiResponse {
    if state.catalog.is_none() {
        return (StatusCode::NOT_FOUND, error_body("products.json not found"));
    }

    // An empty people list is fine: candidates fall back to presentation
    // bonuses and the generic reason.
    match state.service.suggest_many(&request.people, request.budget) {
        Ok(candidates) => (StatusCode::OK, Json(json!(candidates))),
        Err(error) => suggest_error_response(error),
    }
}

async fn list_people(State(state): State<AppState>) -> ApiResponse {
    (StatusCode::OK, Json(json!(state.roster.list())))
}

async fn add_person(
    State(state): State<AppState>,
    Json(request): Json<NewPersonRequest>,
) -> ApiResponse {
    if request.name.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, error_body("name is required"));
    }

    let profile = RecipientProfile {
        id: request
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        name: request.name.trim().to_string(),
        about_them: request.about_them,
        favorite_colors: request.favorite_colors,
        favorite_flowers: request.favorite_flowers,
        allergies: request.allergies,
        budget_range: request.budget_range.unwrap_or_default(),
    };

    state.roster.upsert(profile.clone());
    info!(
        event_name = "api.people.added",
        recipient_id = %profile.id,
        name = %profile.name,
        "recipient added"
    );

    if state.auto_suggest && state.budget.get() > 0.0 {
        state.scheduler.schedule(&profile);
    }

    (StatusCode::CREATED, Json(json!(profile)))
}

/// Removing a recipient tears down everything attached to them.
async fn delete_person(State(state): State<AppState>, Path(id): Path<String>) -> ApiResponse {
    state.scheduler.cancel(&id);
    state.store.remove_by_recipient(&id);

    if state.roster.remove(&id) {
        info!(event_name = "api.people.removed", recipient_id = %id, "recipient removed");
        (StatusCode::OK, Json(json!({ "removed": id })))
    } else {
        (StatusCode::NOT_FOUND, error_body(format!("no recipient with id {id}")))
    }
}

/// "Get new suggestion": replaces whatever is stored, any status.
async fn refresh_suggestion(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResponse {
    let Some(recipient) = state.roster.get(&id) else {
        return (StatusCode::NOT_FOUND, error_body(format!("no recipient with id {id}")));
    };
    let budget = state.budget.get();
    if budget <= 0.0 {
        return suggest_error_response(SuggestError::NoBudget);
    }

    match state.service.suggest_one(&recipient, budget).await {
        Ok(Some(candidate)) => {
            let suggestion = state.store.replace(&recipient.id, candidate);
            info!(
                event_name = "api.suggestions.replaced",
                recipient_id = %recipient.id,
                product = %suggestion.product.name,
                "suggestion replaced on request"
            );
            (StatusCode::OK, Json(json!(suggestion)))
        }
        Ok(None) => suggest_error_response(SuggestError::NoCandidates),
        Err(error) => suggest_error_response(error),
    }
}

async fn get_budget(State(state): State<AppState>) -> ApiResponse {
    (StatusCode::OK, Json(json!({ "budget": state.budget.get() })))
}

/// Setting a positive budget arms timers for every recipient still waiting on
/// a suggestion; `schedule` itself skips the ones that already have one.
async fn put_budget(
    State(state): State<AppState>,
    Json(request): Json<BudgetRequest>,
) -> ApiResponse {
    if !request.amount.is_finite() || request.amount < 0.0 {
        return (StatusCode::BAD_REQUEST, error_body("budget must be a non-negative number"));
    }

    state.budget.set(request.amount);
    info!(event_name = "api.budget.updated", amount = request.amount, "budget updated");

    if state.auto_suggest && request.amount > 0.0 {
        for recipient in state.roster.list() {
            state.scheduler.schedule(&recipient);
        }
    }

    (StatusCode::OK, Json(json!({ "budget": request.amount })))
}

async fn list_suggestions(State(state): State<AppState>) -> ApiResponse {
    (StatusCode::OK, Json(json!(state.store.all())))
}

/// Manual fetch: one suggestion for every recipient without one. Recipients
/// that already have a suggestion are left untouched.
async fn fetch_suggestions(State(state): State<AppState>) -> ApiResponse {
    if state.catalog.is_none() {
        return (StatusCode::NOT_FOUND, error_body("products.json not found"));
    }
    let budget = state.budget.get();
    if budget <= 0.0 {
        return suggest_error_response(SuggestError::NoBudget);
    }

    let mut created = Vec::new();
    for recipient in state.roster.list() {
        if state.store.has_suggestion(&recipient.id) {
            continue;
        }
        match state.service.suggest_one(&recipient, budget).await {
            Ok(Some(candidate)) => match state.store.upsert_pending(&recipient.id, candidate) {
                Ok(suggestion) => created.push(suggestion),
                // Lost a race against a timer fire for this recipient.
                Err(StoreError::AlreadyExists { .. }) => {}
                Err(error) => return suggest_error_response(error.into()),
            },
            Ok(None) => {}
            Err(error) => return suggest_error_response(error),
        }
    }

    info!(
        event_name = "api.suggestions.fetched",
        created = created.len(),
        "manual suggestion fetch complete"
    );
    (StatusCode::OK, Json(json!(created)))
}

async fn accept_suggestion(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResponse {
    set_status(&state, id, SuggestionStatus::Accepted)
}

async fn reject_suggestion(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResponse {
    set_status(&state, id, SuggestionStatus::Rejected)
}

fn set_status(state: &AppState, id: Uuid, status: SuggestionStatus) -> ApiResponse {
    match state.store.set_status(id, status) {
        Ok(suggestion) => {
            info!(
                event_name = "api.suggestions.status",
                suggestion_id = %id,
                recipient_id = %suggestion.recipient_id,
                status = ?status,
                "suggestion status updated"
            );
            (StatusCode::OK, Json(json!(suggestion)))
        }
        Err(error @ StoreError::NotFound(_)) => {
            (StatusCode::NOT_FOUND, error_body(error.to_string()))
        }
        Err(error) => (StatusCode::CONFLICT, error_body(error.to_string())),
    }
}

async fn clear_suggestions(State(state): State<AppState>) -> ApiResponse {
    state.scheduler.cancel_all();
    let cleared = state.store.clear_all();
    info!(event_name = "api.suggestions.cleared", cleared, "all suggestions cleared");
    (StatusCode::OK, Json(json!({ "cleared": cleared })))
}
