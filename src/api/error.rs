//! HTTP error mapping. Every failure is `{"error": "<message>"}` with a fitting status.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::error;

use crate::error::{AuthError, DatabaseError, ImportError, RegistrationError};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(entity: &str) -> Self {
        Self::NotFound(format!("{entity} not found"))
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            Self::BadRequest(m)
            | Self::Unauthorized(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m)
            | Self::Unprocessable(m)
            | Self::BadGateway(m) => m,
            Self::Internal(detail) => {
                error!(error = %detail, "Request failed");
                "Internal server error".to_string()
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::NotFound { entity, .. } => Self::not_found(&entity),
            DatabaseError::Constraint(_) => Self::Conflict("Resource already exists".into()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Forbidden => Self::Forbidden(e.to_string()),
            AuthError::Hashing(_) => Self::Internal(e.to_string()),
            other => Self::Unauthorized(other.to_string()),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(e: RegistrationError) -> Self {
        match e {
            RegistrationError::AlreadyRegistered { .. } => Self::Conflict(e.to_string()),
            RegistrationError::NotFound { ref entity, .. } => Self::not_found(entity),
            RegistrationError::Database(db) => db.into(),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(e: ImportError) -> Self {
        match e {
            ImportError::InvalidUrl { .. } => Self::BadRequest(e.to_string()),
            ImportError::Fetch { .. } => Self::BadGateway(e.to_string()),
            ImportError::Extraction(_) => Self::Unprocessable(e.to_string()),
            ImportError::Database(db) => db.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_taxonomy() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (AuthError::Expired.into(), StatusCode::UNAUTHORIZED),
            (AuthError::Forbidden.into(), StatusCode::FORBIDDEN),
            (
                RegistrationError::AlreadyRegistered {
                    user_id: "u".into(),
                    event_id: "e".into(),
                }
                .into(),
                StatusCode::CONFLICT,
            ),
            (
                ImportError::Fetch {
                    url: "https://x".into(),
                    reason: "HTTP 500".into(),
                }
                .into(),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ImportError::Extraction("no date".into()).into(),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                DatabaseError::Query("disk".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
