//! Configuration types for Parley.
//!
//! `AppConfig` is the top-level `parley.toml`. `LlmConfig` is one named
//! backend configuration, loaded from its own YAML file.

use serde::{Deserialize, Serialize};

use crate::llm::ProviderFamily;

/// Top-level configuration for a Parley installation.
///
/// Loaded from `~/.parley/parley.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// SQLite URL. When unset the database lives at `{data_dir}/parley.db`.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Directory holding one `<name>.yaml` file per backend configuration.
    /// When unset, `{data_dir}/llm_configs`.
    #[serde(default)]
    pub llm_configs_dir: Option<String>,

    /// Experiment bucketing service. Absent means every session uses the default template.
    #[serde(default)]
    pub bucketing: Option<BucketingConfig>,

    /// Output token cap for backend configs that do not set their own.
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    1024
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            llm_configs_dir: None,
            bucketing: None,
            default_max_tokens: default_max_tokens(),
        }
    }
}

/// Connection settings for the PostHog-style bucketing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketingConfig {
    pub host: String,
    /// Name of the environment variable holding the project API key.
    #[serde(default = "default_bucketing_key_env")]
    pub api_key_env: String,
}

fn default_bucketing_key_env() -> String {
    "POSTHOG_API_KEY".to_string()
}

/// A named backend configuration.
///
/// Immutable for the life of the process. Credentials are referenced by
/// environment variable name and resolved when the provider is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Unique name. Defaults to the YAML file stem when omitted.
    #[serde(default)]
    pub name: String,

    #[serde(flatten)]
    pub backend: BackendParams,

    /// Whether template tools are offered to the model under this config.
    #[serde(default)]
    pub tools_enabled: bool,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub temperature: Option<f64>,
}

impl LlmConfig {
    pub fn family(&self) -> ProviderFamily {
        self.backend.family()
    }
}

/// Family-specific connection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum BackendParams {
    #[serde(rename = "azure_openai")]
    AzureOpenAi {
        /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`.
        endpoint: String,
        deployment: String,
        #[serde(default = "default_azure_api_version")]
        api_version: String,
        api_key_env: String,
    },
    Gemini {
        model: String,
        api_key_env: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Anthropic {
        model: String,
        api_key_env: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    Groq {
        model: String,
        api_key_env: String,
        #[serde(default)]
        base_url: Option<String>,
    },
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible {
        base_url: String,
        model: String,
        /// Local servers often need no key.
        #[serde(default)]
        api_key_env: Option<String>,
        #[serde(default)]
        structured_output: bool,
    },
}

fn default_azure_api_version() -> String {
    "2024-08-01-preview".to_string()
}

impl BackendParams {
    pub fn family(&self) -> ProviderFamily {
        match self {
            BackendParams::AzureOpenAi { .. } => ProviderFamily::AzureOpenAi,
            BackendParams::Gemini { .. } => ProviderFamily::Gemini,
            BackendParams::Anthropic { .. } => ProviderFamily::Anthropic,
            BackendParams::Groq { .. } => ProviderFamily::Groq,
            BackendParams::OpenAiCompatible { .. } => ProviderFamily::OpenAiCompatible,
        }
    }

    /// Model identifier sent on the wire (the deployment name for Azure).
    pub fn model(&self) -> &str {
        match self {
            BackendParams::AzureOpenAi { deployment, .. } => deployment,
            BackendParams::Gemini { model, .. }
            | BackendParams::Anthropic { model, .. }
            | BackendParams::Groq { model, .. }
            | BackendParams::OpenAiCompatible { model, .. } => model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.default_max_tokens, 1024);
        assert!(config.bucketing.is_none());
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_app_config_deserialize_with_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.default_max_tokens, 1024);
        assert!(config.llm_configs_dir.is_none());
    }

    #[test]
    fn test_app_config_deserialize_with_values() {
        let toml_str = r#"
database_url = "sqlite:///tmp/p.db"
default_max_tokens = 2048

[bucketing]
host = "https://eu.posthog.com"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.default_max_tokens, 2048);
        let bucketing = config.bucketing.unwrap();
        assert_eq!(bucketing.host, "https://eu.posthog.com");
        assert_eq!(bucketing.api_key_env, "POSTHOG_API_KEY");
    }

    #[test]
    fn test_llm_config_azure_yaml() {
        let yaml = r#"
name: azure-gpt4o
family: azure_openai
endpoint: https://example.openai.azure.com
deployment: gpt-4o
api_key_env: AZURE_OPENAI_KEY
tools_enabled: true
"#;
        let config: LlmConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.name, "azure-gpt4o");
        assert_eq!(config.family(), ProviderFamily::AzureOpenAi);
        assert!(config.tools_enabled);
        assert_eq!(config.backend.model(), "gpt-4o");
        match config.backend {
            BackendParams::AzureOpenAi { api_version, .. } => {
                assert_eq!(api_version, "2024-08-01-preview");
            }
            other => panic!("unexpected backend: {other:?}"),
        }
    }

    #[test]
    fn test_llm_config_openai_compatible_without_key() {
        let yaml = r#"
family: openai_compatible
base_url: http://localhost:11434/v1
model: llama3
"#;
        let config: LlmConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert!(config.name.is_empty());
        assert!(!config.tools_enabled);
        assert!(matches!(
            config.backend,
            BackendParams::OpenAiCompatible { api_key_env: None, structured_output: false, .. }
        ));
    }

    #[test]
    fn test_llm_config_unknown_family_rejected() {
        let yaml = "family: cohere\nmodel: command\napi_key_env: K\n";
        assert!(serde_yaml_ng::from_str::<LlmConfig>(yaml).is_err());
    }
}
