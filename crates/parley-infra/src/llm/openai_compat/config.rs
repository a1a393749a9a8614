//! Endpoint configuration and per-family defaults for OpenAI-compatible backends.
//!
//! Azure OpenAI, Gemini, Groq and self-hosted servers all speak the chat
//! completions protocol. They differ in URL layout, auth header and which
//! optional features they honour.

use secrecy::SecretString;

use parley_types::llm::ProviderCapabilities;

/// Gemini's OpenAI-compatible endpoint.
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

/// Groq's OpenAI-compatible endpoint.
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// How the API key is attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`.
    Bearer,
    /// `api-key: <key>` (Azure).
    ApiKeyHeader,
}

/// Configuration for an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Provider name reported by the adapter (e.g. "azure_openai", "groq").
    pub provider_name: String,
    /// Full chat completions URL, query string included.
    pub completions_url: String,
    /// Absent for local servers that need no key.
    pub api_key: Option<SecretString>,
    pub auth: AuthStyle,
    /// Model sent in the body. Azure routes by deployment instead and ignores it.
    pub model: String,
    pub capabilities: ProviderCapabilities,
}

fn chat_completions(base_url: &str) -> String {
    format!("{}/chat/completions", base_url.trim_end_matches('/'))
}

/// Azure OpenAI: deployment-scoped URL, `api-key` header.
pub fn azure_defaults(
    api_key: SecretString,
    endpoint: &str,
    deployment: &str,
    api_version: &str,
) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "azure_openai".into(),
        completions_url: format!(
            "{}/openai/deployments/{deployment}/chat/completions?api-version={api_version}",
            endpoint.trim_end_matches('/')
        ),
        api_key: Some(api_key),
        auth: AuthStyle::ApiKeyHeader,
        model: deployment.into(),
        capabilities: ProviderCapabilities {
            tool_calling: true,
            structured_output: true,
        },
    }
}

/// Google Gemini through its OpenAI-compatible beta endpoint.
pub fn gemini_defaults(
    api_key: SecretString,
    model: &str,
    base_url: Option<&str>,
) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "gemini".into(),
        completions_url: chat_completions(base_url.unwrap_or(GEMINI_BASE_URL)),
        api_key: Some(api_key),
        auth: AuthStyle::Bearer,
        model: model.into(),
        capabilities: ProviderCapabilities {
            tool_calling: true,
            structured_output: true,
        },
    }
}

/// Groq. Tool calling works on most hosted models; strict JSON schema output does not.
pub fn groq_defaults(api_key: SecretString, model: &str, base_url: Option<&str>) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "groq".into(),
        completions_url: chat_completions(base_url.unwrap_or(GROQ_BASE_URL)),
        api_key: Some(api_key),
        auth: AuthStyle::Bearer,
        model: model.into(),
        capabilities: ProviderCapabilities {
            tool_calling: true,
            structured_output: false,
        },
    }
}

/// Any other server speaking the protocol (vLLM, Ollama, LiteLLM, ...).
pub fn custom(
    api_key: Option<SecretString>,
    base_url: &str,
    model: &str,
    structured_output: bool,
) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: "openai_compatible".into(),
        completions_url: chat_completions(base_url),
        api_key,
        auth: AuthStyle::Bearer,
        model: model.into(),
        capabilities: ProviderCapabilities {
            tool_calling: true,
            structured_output,
        },
    }
}
