//! User endpoints: sign-up, login, profile, contact preference, promotion.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Deserialize;
use tracing::info;

use crate::error::AuthError;
use crate::users::model::{ContactChannel, NewUser, UserRole};

use super::auth::{AdminUser, CurrentUser, hash_password, issue_token, verify_password};
use super::error::ApiError;
use super::{AppState, parse_id};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Deserialize)]
pub struct SignupRequest {
    email: String,
    name: String,
    password: String,
    #[serde(default)]
    job_title: Option<String>,
}

/// POST /users: the first account ever created becomes admin.
pub async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = body.email.trim().to_lowercase();
    if !is_plausible_email(&email) {
        return Err(ApiError::bad_request("Invalid email address"));
    }
    if body.name.trim().is_empty() {
        return Err(ApiError::bad_request("Name must not be empty"));
    }
    if body.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let password_hash = hash_password(body.password).await?;
    let user = state
        .db
        .create_user(&NewUser {
            email,
            name: body.name.trim().to_string(),
            password_hash,
            job_title: body
                .job_title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
        })
        .await
        .map_err(|e| match ApiError::from(e) {
            ApiError::Conflict(_) => ApiError::Conflict("Email already registered".into()),
            other => other,
        })?;

    info!(user_id = %user.id, role = %user.role, "User created");
    Ok((StatusCode::CREATED, Json(user)))
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    password: String,
}

/// POST /auth/token
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = body.email.trim().to_lowercase();
    let user = state
        .db
        .get_user_by_email(&email)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(user.password_hash.clone(), body.password).await {
        return Err(AuthError::InvalidCredentials.into());
    }

    let token = issue_token(&state.auth, user.id)?;
    Ok(Json(serde_json::json!({
        "access_token": token,
        "token_type": "bearer",
        "expires_in": state.auth.token_ttl.as_secs(),
    })))
}

/// GET /users/me
pub async fn me(CurrentUser(user): CurrentUser) -> impl IntoResponse {
    Json(user)
}

#[derive(Deserialize)]
pub struct ContactRequest {
    preferred_channel: ContactChannel,
    #[serde(default)]
    chat_id: Option<String>,
}

/// PUT /users/me/contact
pub async fn update_contact(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(body): Json<ContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let chat_id = body
        .chat_id
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .or(user.chat_id.clone());

    if body.preferred_channel == ContactChannel::Chat && chat_id.is_none() {
        return Err(ApiError::bad_request(
            "chat_id is required when the preferred channel is chat",
        ));
    }

    state
        .db
        .update_user_contact(user.id, body.preferred_channel, chat_id.as_deref())
        .await?;
    let updated = state
        .db
        .get_user(user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(updated))
}

/// POST /users/{id}/promote
pub async fn promote(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = parse_id(&id, "user")?;
    state.db.set_user_role(user_id, UserRole::Admin).await?;
    info!(user_id = %user_id, by = %admin.id, "User promoted to admin");

    let user = state
        .db
        .get_user(user_id)
        .await?
        .ok_or_else(|| ApiError::not_found("User"))?;
    Ok(Json(user))
}

/// GET /users/me/registrations: each registration with its event.
pub async fn my_registrations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, ApiError> {
    let registrations = state.db.list_registrations_for_user(user.id).await?;
    let mut out = Vec::with_capacity(registrations.len());
    for registration in registrations {
        let event = state.db.get_event(registration.event_id).await?;
        out.push(serde_json::json!({
            "registration": registration,
            "event": event,
        }));
    }
    Ok(Json(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_plausibility() {
        assert!(is_plausible_email("ada@example.com"));
        assert!(!is_plausible_email("ada.example.com"));
        assert!(!is_plausible_email("@example.com"));
        assert!(!is_plausible_email("ada@localhost"));
        assert!(!is_plausible_email("ada @example.com"));
    }
}
