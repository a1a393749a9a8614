//! LlmProvider trait definition.
//!
//! This is the core abstraction that every backend adapter implements.
//! Uses RPITIT for `complete`.

use parley_types::llm::{CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities};

/// Trait for LLM backend adapters (Azure OpenAI, Gemini, Anthropic, etc.).
///
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
/// Implementations live in parley-infra (e.g., `OpenAiCompatibleProvider`).
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g., "anthropic", "gemini").
    fn name(&self) -> &str;

    /// What this provider supports (tool calling, structured output).
    fn capabilities(&self) -> &ProviderCapabilities;

    /// Send a completion request and receive the full response.
    ///
    /// Failures must be classified: timeouts, rate limits and overload are
    /// reported as such so the caller can fail over to another config.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
