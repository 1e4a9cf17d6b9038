//! Configuration types, built from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::channels::email::EmailConfig;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// HTTP listen port.
    pub port: u16,
    /// libSQL database file.
    pub db_path: PathBuf,
    pub auth: AuthConfig,
    /// `None` when model-backed generation is disabled or has no API key.
    pub llm: Option<LlmConfig>,
    pub generation: GenerationConfig,
    pub workflow: WorkflowConfig,
    /// `None` when `SMTP_HOST` is unset (email delivery is simulated).
    pub email: Option<EmailConfig>,
    /// `None` when `TELEGRAM_BOT_TOKEN` is unset (chat delivery is simulated).
    pub telegram_bot_token: Option<SecretString>,
}

/// JWT settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: SecretString,
    pub token_ttl: Duration,
}

/// Content generation limits.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Token budget for touchpoint messages.
    pub max_tokens: u32,
    /// Token budget for event extraction.
    pub extraction_max_tokens: u32,
    /// Token budget for chatbot replies.
    pub chat_max_tokens: u32,
    pub temperature: f32,
    /// Upper bound on a single inference call.
    pub timeout: Duration,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 250,
            extraction_max_tokens: 200,
            chat_max_tokens: 150,
            temperature: 0.7,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Notification workflow offsets.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    /// How long after the event ends the follow-up goes out.
    pub follow_up_delay: chrono::Duration,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            follow_up_delay: chrono::Duration::hours(2),
        }
    }
}

impl AppConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = parse_var("ENGAGE_PORT", 8000u16)?;
        let db_path = std::env::var("ENGAGE_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/engage.db"));

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| ConfigError::MissingEnvVar("JWT_SECRET".to_string()))?;
        if jwt_secret.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "JWT_SECRET".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        let ttl_minutes = parse_var("ACCESS_TOKEN_EXPIRE_MINUTES", 30u64)?;
        let auth = AuthConfig {
            jwt_secret: SecretString::from(jwt_secret),
            token_ttl: Duration::from_secs(ttl_minutes * 60),
        };

        let llm = llm_from_env()?;

        let generation = GenerationConfig {
            max_tokens: parse_var("LLM_MAX_TOKENS", 250u32)?,
            timeout: Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", 30u64)?),
            ..GenerationConfig::default()
        };

        let workflow = WorkflowConfig {
            follow_up_delay: follow_up_delay(parse_var("FOLLOW_UP_DELAY_HOURS", 2i64)?)?,
        };

        let telegram_bot_token = std::env::var("TELEGRAM_BOT_TOKEN")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(SecretString::from);

        Ok(Self {
            port,
            db_path,
            auth,
            llm,
            generation,
            workflow,
            email: EmailConfig::from_env(),
            telegram_bot_token,
        })
    }
}

fn llm_from_env() -> Result<Option<LlmConfig>, ConfigError> {
    let enabled = parse_bool("ENABLE_LLM", true)?;
    if !enabled {
        return Ok(None);
    }

    let Some(api_key) = std::env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty()) else {
        tracing::warn!("ENABLE_LLM is set but LLM_API_KEY is missing; using templates only");
        return Ok(None);
    };

    let backend = match std::env::var("LLM_BACKEND")
        .unwrap_or_else(|_| "anthropic".to_string())
        .to_lowercase()
        .as_str()
    {
        "anthropic" => LlmBackend::Anthropic,
        "openai" => LlmBackend::OpenAi,
        other => {
            return Err(ConfigError::InvalidValue {
                key: "LLM_BACKEND".to_string(),
                message: format!("unknown backend '{other}' (expected anthropic or openai)"),
            });
        }
    };

    let model =
        std::env::var("LLM_MODEL").unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());

    Ok(Some(LlmConfig {
        backend,
        api_key: SecretString::from(api_key),
        model,
    }))
}

fn parse_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Longest accepted wait between event end and the follow-up message.
const MAX_FOLLOW_UP_DELAY_HOURS: i64 = 24 * 30;

fn follow_up_delay(hours: i64) -> Result<chrono::Duration, ConfigError> {
    if !(0..=MAX_FOLLOW_UP_DELAY_HOURS).contains(&hours) {
        return Err(ConfigError::InvalidValue {
            key: "FOLLOW_UP_DELAY_HOURS".to_string(),
            message: format!("must be between 0 and {MAX_FOLLOW_UP_DELAY_HOURS}, got {hours}"),
        });
    }
    Ok(chrono::Duration::hours(hours))
}

fn parse_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a boolean, got '{other}'"),
            }),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_defaults_bound_tokens() {
        let config = GenerationConfig::default();
        assert_eq!(config.max_tokens, 250);
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn workflow_default_follow_up_is_two_hours() {
        assert_eq!(WorkflowConfig::default().follow_up_delay, chrono::Duration::hours(2));
    }

    #[test]
    fn follow_up_delay_bounds() {
        assert_eq!(follow_up_delay(0).unwrap(), chrono::Duration::zero());
        assert_eq!(follow_up_delay(720).unwrap(), chrono::Duration::hours(720));
        for hours in [-1, 721, i64::MAX] {
            let err = follow_up_delay(hours).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "FOLLOW_UP_DELAY_HOURS"));
        }
    }

    #[test]
    fn parse_var_falls_back_to_default() {
        let value: u16 = parse_var("ENGAGE_TEST_UNSET_PORT_VARIABLE", 1234).unwrap();
        assert_eq!(value, 1234);
    }
}
