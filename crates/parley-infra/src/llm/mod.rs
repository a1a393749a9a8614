//! LLM provider implementations.
//!
//! Contains concrete implementations of the [`LlmProvider`] trait defined in
//! `parley-core`: one OpenAI-compatible adapter (Azure OpenAI, Gemini, Groq,
//! self-hosted) and one for the Anthropic Messages API.
//!
//! Also provides a provider factory ([`create_provider`]) that constructs
//! the right adapter from an [`LlmConfig`], and [`build_registry`] which
//! does so for every loaded config.
//!
//! [`LlmProvider`]: parley_core::llm::provider::LlmProvider

pub mod anthropic;
pub mod http;
pub mod openai_compat;

use secrecy::SecretString;

use parley_core::llm::box_provider::BoxLlmProvider;
use parley_core::llm::registry::ProviderRegistry;
use parley_types::config::{BackendParams, LlmConfig};
use parley_types::llm::LlmError;

use self::anthropic::AnthropicProvider;
use self::openai_compat::{OpenAiCompatibleProvider, config as oai};

/// Why a backend config could not be turned into an adapter.
#[derive(Debug, thiserror::Error)]
pub enum ProviderBuildError {
    #[error("config '{config}': environment variable {env} is not set")]
    MissingApiKey { config: String, env: String },

    #[error("config '{config}': {source}")]
    Client {
        config: String,
        #[source]
        source: LlmError,
    },
}

/// Create a [`BoxLlmProvider`] from an [`LlmConfig`], reading API keys from
/// the process environment.
pub fn create_provider(config: &LlmConfig) -> Result<BoxLlmProvider, ProviderBuildError> {
    create_provider_with(config, |name| std::env::var(name).ok())
}

/// Create a [`BoxLlmProvider`], resolving API key variable names through `lookup`.
pub fn create_provider_with(
    config: &LlmConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<BoxLlmProvider, ProviderBuildError> {
    let require_key = |env: &str| -> Result<SecretString, ProviderBuildError> {
        lookup(env)
            .filter(|value| !value.is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ProviderBuildError::MissingApiKey {
                config: config.name.clone(),
                env: env.to_string(),
            })
    };
    let client_err = |source: LlmError| ProviderBuildError::Client {
        config: config.name.clone(),
        source,
    };

    let provider = match &config.backend {
        BackendParams::AzureOpenAi {
            endpoint,
            deployment,
            api_version,
            api_key_env,
        } => {
            let endpoint_config =
                oai::azure_defaults(require_key(api_key_env)?, endpoint, deployment, api_version);
            BoxLlmProvider::new(OpenAiCompatibleProvider::new(endpoint_config).map_err(client_err)?)
        }
        BackendParams::Gemini {
            model,
            api_key_env,
            base_url,
        } => {
            let endpoint_config =
                oai::gemini_defaults(require_key(api_key_env)?, model, base_url.as_deref());
            BoxLlmProvider::new(OpenAiCompatibleProvider::new(endpoint_config).map_err(client_err)?)
        }
        BackendParams::Groq {
            model,
            api_key_env,
            base_url,
        } => {
            let endpoint_config =
                oai::groq_defaults(require_key(api_key_env)?, model, base_url.as_deref());
            BoxLlmProvider::new(OpenAiCompatibleProvider::new(endpoint_config).map_err(client_err)?)
        }
        BackendParams::OpenAiCompatible {
            base_url,
            model,
            api_key_env,
            structured_output,
        } => {
            let key = match api_key_env {
                Some(env) => Some(require_key(env)?),
                None => None,
            };
            let endpoint_config = oai::custom(key, base_url, model, *structured_output);
            BoxLlmProvider::new(OpenAiCompatibleProvider::new(endpoint_config).map_err(client_err)?)
        }
        BackendParams::Anthropic {
            model,
            api_key_env,
            base_url,
        } => {
            let mut provider =
                AnthropicProvider::new(require_key(api_key_env)?, model.clone()).map_err(client_err)?;
            if let Some(base_url) = base_url {
                provider = provider.with_base_url(base_url.clone());
            }
            BoxLlmProvider::new(provider)
        }
    };

    Ok(provider)
}

/// Build a registry from every loaded config.
///
/// Configs whose adapter cannot be built (usually a missing API key) are
/// left out and returned alongside, so callers can report them. Templates
/// that reference them then fail their pool check at construction.
pub fn build_registry(configs: Vec<LlmConfig>) -> (ProviderRegistry, Vec<ProviderBuildError>) {
    build_registry_with(configs, |name| std::env::var(name).ok())
}

pub fn build_registry_with(
    configs: Vec<LlmConfig>,
    lookup: impl Fn(&str) -> Option<String>,
) -> (ProviderRegistry, Vec<ProviderBuildError>) {
    let mut registry = ProviderRegistry::new();
    let mut skipped = Vec::new();

    for config in configs {
        match create_provider_with(&config, &lookup) {
            Ok(provider) => {
                tracing::debug!(
                    config = %config.name,
                    family = %config.family(),
                    provider = provider.name(),
                    "loaded backend config"
                );
                registry.register(config, provider);
            }
            Err(e) => {
                tracing::warn!(config = %config.name, error = %e, "skipping backend config");
                skipped.push(e);
            }
        }
    }

    (registry, skipped)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, backend: BackendParams) -> LlmConfig {
        LlmConfig {
            name: name.to_string(),
            backend,
            tools_enabled: false,
            max_tokens: None,
            temperature: None,
        }
    }

    fn lookup(name: &str) -> Option<String> {
        match name {
            "GROQ_KEY" | "AZURE_KEY" | "ANTHROPIC_KEY" => Some("secret".to_string()),
            "EMPTY_KEY" => Some(String::new()),
            _ => None,
        }
    }

    fn groq(name: &str, env: &str) -> LlmConfig {
        config(
            name,
            BackendParams::Groq {
                model: "llama-3.3-70b".into(),
                api_key_env: env.into(),
                base_url: None,
            },
        )
    }

    #[test]
    fn test_create_provider_per_family() {
        let azure = config(
            "azure-gpt4o",
            BackendParams::AzureOpenAi {
                endpoint: "https://x.openai.azure.com".into(),
                deployment: "gpt-4o".into(),
                api_version: "2024-08-01-preview".into(),
                api_key_env: "AZURE_KEY".into(),
            },
        );
        let provider = create_provider_with(&azure, lookup).unwrap();
        assert_eq!(provider.name(), "azure_openai");
        assert!(provider.capabilities().structured_output);

        let provider = create_provider_with(&groq("groq", "GROQ_KEY"), lookup).unwrap();
        assert_eq!(provider.name(), "groq");
        assert!(!provider.capabilities().structured_output);

        let claude = config(
            "claude",
            BackendParams::Anthropic {
                model: "claude-sonnet-4-20250514".into(),
                api_key_env: "ANTHROPIC_KEY".into(),
                base_url: None,
            },
        );
        assert_eq!(create_provider_with(&claude, lookup).unwrap().name(), "anthropic");
    }

    #[test]
    fn test_local_server_needs_no_key() {
        let local = config(
            "local",
            BackendParams::OpenAiCompatible {
                base_url: "http://localhost:11434/v1".into(),
                model: "llama3".into(),
                api_key_env: None,
                structured_output: true,
            },
        );
        let provider = create_provider_with(&local, |_| None).unwrap();
        assert_eq!(provider.name(), "openai_compatible");
        assert!(provider.capabilities().structured_output);
    }

    #[test]
    fn test_missing_or_empty_key() {
        let err = create_provider_with(&groq("groq", "NOPE"), lookup).unwrap_err();
        assert!(matches!(
            err,
            ProviderBuildError::MissingApiKey { ref config, ref env } if config == "groq" && env == "NOPE"
        ));

        let err = create_provider_with(&groq("groq", "EMPTY_KEY"), lookup).unwrap_err();
        assert!(matches!(err, ProviderBuildError::MissingApiKey { .. }));
    }

    #[test]
    fn test_build_registry_skips_unbuildable() {
        let (registry, skipped) = build_registry_with(
            vec![groq("a", "GROQ_KEY"), groq("b", "NOPE"), groq("c", "GROQ_KEY")],
            lookup,
        );
        assert_eq!(registry.list_names(), vec!["a", "c"]);
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].to_string().contains("NOPE"));
    }
}
