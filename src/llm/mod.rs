//! Model access for content generation.
//!
//! rig-core does the HTTP work; [`RigAdapter`] narrows its completion models
//! to the [`LlmProvider`] trait the rest of the crate depends on.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Which hosted model family to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

/// Credentials and model choice.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Build the provider described by `config`.
///
/// Nothing is sent here; a bad key only surfaces on the first completion.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.model.trim().is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: config.backend.as_str().to_string(),
            reason: "model name is empty".to_string(),
        });
    }

    let key = config.api_key.expose_secret();
    let provider: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::Anthropic => {
            use rig::providers::anthropic;
            let client: rig::client::Client<anthropic::client::AnthropicExt> =
                anthropic::Client::new(key).map_err(|e| client_error(config.backend, e))?;
            Arc::new(RigAdapter::new(client.completion_model(&config.model), &config.model))
        }
        LlmBackend::OpenAi => {
            use rig::providers::openai;
            let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
                openai::Client::new(key).map_err(|e| client_error(config.backend, e))?;
            Arc::new(RigAdapter::new(client.completion_model(&config.model), &config.model))
        }
    };

    tracing::info!(backend = config.backend.as_str(), model = %config.model, "LLM provider ready");
    Ok(provider)
}

fn client_error(backend: LlmBackend, e: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: backend.as_str().to_string(),
        reason: format!("client setup failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: LlmBackend, model: &str) -> LlmConfig {
        LlmConfig {
            backend,
            api_key: secrecy::SecretString::from("test-key"),
            model: model.to_string(),
        }
    }

    #[test]
    fn providers_report_their_model() {
        let anthropic = create_provider(&config(LlmBackend::Anthropic, "claude-sonnet-4-20250514"));
        assert_eq!(anthropic.unwrap().model_name(), "claude-sonnet-4-20250514");

        let openai = create_provider(&config(LlmBackend::OpenAi, "gpt-4o-mini"));
        assert_eq!(openai.unwrap().model_name(), "gpt-4o-mini");
    }

    #[test]
    fn blank_model_is_rejected() {
        assert!(create_provider(&config(LlmBackend::OpenAi, "  ")).is_err());
    }
}
