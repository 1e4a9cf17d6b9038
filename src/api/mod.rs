//! HTTP API: axum router and shared state.

pub mod auth;
pub mod chat;
pub mod error;
pub mod events;
pub mod users;

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::content::ContentGenerator;
use crate::events::EventImporter;
use crate::store::Database;
use crate::workflow::RegistrationService;

use self::error::ApiError;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn Database>,
    pub auth: AuthConfig,
    pub registrations: Arc<RegistrationService>,
    pub importer: Arc<EventImporter>,
    /// Chat-mode generation for the chatbot.
    pub generator: Arc<ContentGenerator>,
}

/// Build the Axum router with every REST route.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users", post(users::create_user))
        .route("/auth/token", post(users::login))
        .route("/users/me", get(users::me))
        .route("/users/me/contact", put(users::update_contact))
        .route("/users/me/registrations", get(users::my_registrations))
        .route("/users/{id}/promote", post(users::promote))
        .route("/events", get(events::list_events).post(events::create_event))
        .route("/events/import", post(events::import_event))
        .route("/events/{id}", get(events::get_event).put(events::update_event))
        .route("/events/{id}/register", post(events::register))
        .route("/registrations/{id}/jobs", get(events::registration_jobs))
        .route("/chat", post(chat::chat))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "engage-booster"
    }))
}

/// Parse a path id, answering 400 on garbage.
fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::bad_request(format!("Invalid {what} ID")))
}
