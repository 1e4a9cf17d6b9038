//! Event endpoints: listing, admin create/edit/import, registration, job status.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use tracing::info;

use crate::error::AuthError;
use crate::events::model::{EventSource, EventUpdate, NewEvent};

use super::auth::{AdminUser, CurrentUser};
use super::error::ApiError;
use super::{AppState, parse_id};

/// GET /events
pub async fn list_events(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.db.list_events().await?))
}

/// GET /events/{id}
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = parse_id(&id, "event")?;
    let event = state
        .db
        .get_event(event_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Event"))?;
    Ok(Json(event))
}

#[derive(Deserialize)]
pub struct CreateEventRequest {
    name: String,
    #[serde(default)]
    description: String,
    starts_at: DateTime<Utc>,
    /// Defaults to one hour after the start.
    #[serde(default)]
    ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    recording_url: Option<String>,
}

/// POST /events (admin)
pub async fn create_event(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(body): Json<CreateEventRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let new_event = NewEvent {
        name: body.name.trim().to_string(),
        description: body.description.trim().to_string(),
        starts_at: body.starts_at,
        ends_at: body.ends_at.unwrap_or(body.starts_at + Duration::hours(1)),
        source: EventSource::Manual,
        owner_id: admin.id,
        recording_url: body.recording_url.filter(|u| !u.trim().is_empty()),
    };
    new_event.validate().map_err(ApiError::BadRequest)?;

    let event = new_event.into_event();
    state.db.insert_event(&event).await?;
    info!(event_id = %event.id, owner_id = %admin.id, "Event created");
    Ok((StatusCode::CREATED, Json(event)))
}

/// PUT /events/{id} (admin)
pub async fn update_event(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(body): Json<EventUpdate>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = parse_id(&id, "event")?;
    let event = state
        .db
        .get_event(event_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Event"))?;

    let edited = body.apply(event).map_err(ApiError::BadRequest)?;
    state.db.update_event(&edited).await?;
    info!(event_id = %event_id, by = %admin.id, "Event edited");
    Ok(Json(edited))
}

#[derive(Deserialize)]
pub struct ImportRequest {
    url: String,
}

/// POST /events/import (admin)
pub async fn import_event(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(body): Json<ImportRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let event = state.importer.import_from_url(&body.url, admin.id).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

/// POST /events/{id}/register: registers the caller and starts the workflow.
pub async fn register(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let event_id = parse_id(&id, "event")?;
    let outcome = state.registrations.register(user.id, event_id).await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// GET /registrations/{id}/jobs: owner or admin only.
pub async fn registration_jobs(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let registration_id = parse_id(&id, "registration")?;
    let registration = state
        .db
        .get_registration(registration_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Registration"))?;

    if registration.user_id != user.id && !user.is_admin() {
        return Err(AuthError::Forbidden.into());
    }

    let jobs = state.db.list_jobs_for_registration(registration_id).await?;
    Ok(Json(jobs))
}
