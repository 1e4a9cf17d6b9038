//! Error types for the engagement service.

use std::time::Duration;

/// Why a fired notification job could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Registration error: {0}")]
    Registration(#[from] RegistrationError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Outbound messaging failures. Logged and recorded on the job row, never
/// surfaced to the HTTP caller.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Failed to send on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Invalid recipient for channel {name}: {reason}")]
    InvalidRecipient { name: String, reason: String },

    #[error("No destination for channel {name} on user {user}")]
    MissingDestination { name: String, user: String },
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Model-backed generation is disabled")]
    Disabled,
}

/// Event import failures.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("Invalid import URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("Could not extract event details: {0}")]
    Extraction(String),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

/// Authentication and authorization failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    Expired,

    #[error("Administrative privileges required")]
    Forbidden,

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Registration workflow failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("User {user_id} is already registered for event {event_id}")]
    AlreadyRegistered { user_id: String, event_id: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: String, id: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}
