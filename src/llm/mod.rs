//! LLM integration.
//!
//! Supports:
//! - **Groq**: hosted open-weight models via rig-core
//! - **Anthropic**: Claude via rig-core
//!
//! Uses the rig-core crate for HTTP transport and the `RigAdapter` to bridge
//! rig's `CompletionModel` trait to our `LlmProvider` trait.

pub mod provider;
mod rig_adapter;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::str::FromStr;
use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Groq,
    Anthropic,
}

impl FromStr for LlmBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            other => Err(ConfigError::InvalidValue {
                key: "llm_backend".to_string(),
                message: format!("unknown backend {other:?}, expected groq or anthropic"),
            }),
        }
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub temperature: f32,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Groq => create_groq_provider(config),
        LlmBackend::Anthropic => create_anthropic_provider(config),
    }
}

fn create_groq_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::groq;

    let client: groq::Client =
        groq::Client::new(config.api_key.expose_secret()).map_err(|e| LlmError::RequestFailed {
            provider: "groq".to_string(),
            reason: format!("Failed to create Groq client: {}", e),
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Groq (model: {})", config.model);
    Ok(Arc::new(
        RigAdapter::new(model, &config.model).with_temperature(config.temperature),
    ))
}

fn create_anthropic_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(
        RigAdapter::new(model, &config.model).with_temperature(config.temperature),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("Groq".parse::<LlmBackend>().unwrap(), LlmBackend::Groq);
        assert_eq!(
            "anthropic".parse::<LlmBackend>().unwrap(),
            LlmBackend::Anthropic
        );
        assert!("openai".parse::<LlmBackend>().is_err());
    }

    #[test]
    fn anthropic_provider_constructs_without_network() {
        // rig-core clients accept any string as API key at construction time.
        let config = LlmConfig {
            backend: LlmBackend::Anthropic,
            api_key: secrecy::SecretString::from("test-key"),
            model: "claude-3-5-sonnet-20241022".to_string(),
            temperature: 0.0,
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "claude-3-5-sonnet-20241022");
    }

    #[test]
    fn groq_provider_constructs_without_network() {
        let config = LlmConfig {
            backend: LlmBackend::Groq,
            api_key: secrecy::SecretString::from("gsk-test"),
            model: "openai/gpt-oss-20b".to_string(),
            temperature: 0.0,
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "openai/gpt-oss-20b");
    }
}
