//! Provider Factory
//!
//! Resolves a backend name plus endpoint/credential settings into a boxed
//! [`ChatProvider`].

use std::str::FromStr;
use std::sync::Arc;

use agent_core::error::{AgentError, Result};
use agent_core::provider::ChatProvider;

#[cfg(feature = "ollama")]
use crate::ollama::{OllamaConfig, OllamaProvider};
#[cfg(feature = "openai")]
use crate::openai::{OpenAiConfig, OpenAiProvider};

/// Supported backends
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
    Mistral,
}

impl FromStr for ProviderKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAi),
            "mistral" => Ok(Self::Mistral),
            other => Err(AgentError::Config(format!(
                "unsupported provider '{other}' (expected ollama, openai, or mistral)"
            ))),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ollama => write!(f, "ollama"),
            Self::OpenAi => write!(f, "openai"),
            Self::Mistral => write!(f, "mistral"),
        }
    }
}

/// Settings for constructing a provider
#[derive(Clone, Debug)]
pub struct ProviderSettings {
    pub kind: ProviderKind,

    /// Base URL override; each backend has a sensible default
    pub endpoint: Option<String>,

    /// API key, required by the hosted backends
    pub api_key: Option<String>,

    /// Idle read timeout between stream chunks, in seconds
    pub timeout_secs: u64,
}

/// Build a provider from settings
pub fn create_provider(settings: &ProviderSettings) -> Result<Arc<dyn ChatProvider>> {
    match settings.kind {
        #[cfg(feature = "ollama")]
        ProviderKind::Ollama => {
            let mut config = OllamaConfig::from_env();
            if let Some(endpoint) = &settings.endpoint {
                config.base_url = endpoint.clone();
            }
            config.timeout_secs = settings.timeout_secs;
            Ok(Arc::new(OllamaProvider::from_config(config)))
        }
        #[cfg(feature = "openai")]
        ProviderKind::OpenAi => {
            let api_key = require_key(settings, "openai")?;
            let base_url = settings
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".into());
            let mut config = OpenAiConfig::new(base_url, api_key);
            config.timeout_secs = settings.timeout_secs;
            Ok(Arc::new(OpenAiProvider::with_name("openai", config)))
        }
        #[cfg(feature = "openai")]
        ProviderKind::Mistral => {
            let api_key = require_key(settings, "mistral")?;
            let base_url = settings
                .endpoint
                .clone()
                .unwrap_or_else(|| "https://api.mistral.ai/v1".into());
            let mut config = OpenAiConfig::new(base_url, api_key);
            config.timeout_secs = settings.timeout_secs;
            Ok(Arc::new(OpenAiProvider::with_name("mistral", config)))
        }
        #[allow(unreachable_patterns)]
        _ => Err(AgentError::Config(format!(
            "provider '{}' is not compiled in",
            settings.kind
        ))),
    }
}

#[cfg(feature = "openai")]
fn require_key(settings: &ProviderSettings, provider: &str) -> Result<String> {
    settings.api_key.clone().ok_or_else(|| {
        AgentError::Config(format!("the {provider} provider requires an API key"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_parsing() {
        assert_eq!("ollama".parse::<ProviderKind>().unwrap(), ProviderKind::Ollama);
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAi);
        assert!("gemini".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_hosted_backend_requires_key() {
        let settings = ProviderSettings {
            kind: ProviderKind::OpenAi,
            endpoint: None,
            api_key: None,
            timeout_secs: 120,
        };
        assert!(create_provider(&settings).is_err());
    }

    #[test]
    fn test_ollama_endpoint_override() {
        let settings = ProviderSettings {
            kind: ProviderKind::Ollama,
            endpoint: Some("http://10.0.0.5:11434".into()),
            api_key: None,
            timeout_secs: 30,
        };
        let provider = create_provider(&settings).unwrap();
        assert_eq!(provider.info().name, "ollama");
    }
}
