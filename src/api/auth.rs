//! Password hashing, JWT issue/verify, and the authenticated-user extractors.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::users::model::User;

use super::AppState;
use super::error::ApiError;

/// JWT payload.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    /// Expiry as a UTC timestamp.
    pub exp: usize,
}

/// Hash a password with Argon2 and a random 16-byte salt.
pub async fn hash_password(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || {
        let salt: [u8; 16] = rand::thread_rng().r#gen();
        argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    })
    .await
    .map_err(|e| AuthError::Hashing(format!("hashing task failed: {e}")))?
}

/// Check a password against a stored Argon2 hash. Malformed hashes never match.
pub async fn verify_password(hash: String, password: String) -> bool {
    tokio::task::spawn_blocking(move || {
        argon2::verify_encoded(&hash, password.as_bytes()).unwrap_or(false)
    })
    .await
    .unwrap_or(false)
}

/// Issue an access token for `user_id`.
pub fn issue_token(config: &AuthConfig, user_id: Uuid) -> Result<String, AuthError> {
    let ttl = chrono::Duration::from_std(config.token_ttl)
        .map_err(|e| AuthError::InvalidToken(format!("bad token lifetime: {e}")))?;
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.expose_secret().as_bytes()),
    )
    .map_err(|e| AuthError::InvalidToken(format!("failed to encode token: {e}")))
}

/// Verify a token and return the user id it was issued for.
pub fn verify_token(config: &AuthConfig, token: &str) -> Result<Uuid, AuthError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.expose_secret().as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::InvalidToken(e.to_string()),
    })?;

    Uuid::parse_str(&data.claims.sub)
        .map_err(|_| AuthError::InvalidToken("subject is not a user id".into()))
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    let value = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::MissingToken)?;
    let (scheme, token) = value.split_once(' ').ok_or(AuthError::MissingToken)?;
    if !scheme.eq_ignore_ascii_case("bearer") || token.trim().is_empty() {
        return Err(AuthError::MissingToken);
    }
    Ok(token.trim())
}

/// The caller, resolved from a bearer token. Role is read fresh from the store.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let user_id = verify_token(&state.auth, token)?;
        let user = state
            .db
            .get_user(user_id)
            .await?
            .ok_or_else(|| AuthError::InvalidToken("user no longer exists".into()))?;
        Ok(Self(user))
    }
}

/// A caller with the admin role.
pub struct AdminUser(pub User);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::Forbidden.into());
        }
        Ok(Self(user))
    }
}
