use thiserror::Error;
use uuid::Uuid;

use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from rendering a prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("missing context variable '{0}'")]
    MissingContextVariable(String),

    #[error("unresolved placeholder '${0}'")]
    UnresolvedPlaceholder(String),

    #[error("malformed placeholder at byte {0}")]
    MalformedPlaceholder(usize),
}

/// Errors from picking a backend configuration out of a pool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("no eligible configuration left in the pool")]
    NoEligibleConfig,
}

/// Errors from the experiment bucketing service.
#[derive(Debug, Error)]
pub enum BucketingError {
    #[error("bucketing service unreachable: {0}")]
    Unavailable(String),

    #[error("unexpected bucketing response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by a conversation.
#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("chat history {0} not found")]
    HistoryNotFound(Uuid),

    #[error("message {0} not found in history")]
    MessageNotFound(Uuid),

    #[error("missing context variable '{0}'")]
    MissingContextVariable(String),

    #[error("unresolved placeholder '${0}'")]
    UnresolvedPlaceholder(String),

    #[error("malformed placeholder in template: {0}")]
    MalformedTemplate(String),

    #[error("backend '{config}' timed out")]
    AdapterTimeout { config: String },

    #[error("backend '{config}' rejected credentials")]
    AdapterAuthFailure { config: String },

    #[error("backend '{config}' rejected the request: {message}")]
    RequestInvalid { config: String, message: String },

    #[error("backend '{config}' response violates schema: {message}")]
    SchemaViolation { config: String, message: String },

    #[error("backend '{config}' failed: {source}")]
    Adapter {
        config: String,
        #[source]
        source: LlmError,
    },

    #[error("no eligible configuration left in the pool")]
    NoEligibleConfig,

    #[error("all configurations exhausted after trying {}", attempted.join(", "))]
    AllConfigsExhausted { attempted: Vec<String> },

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),
}

impl ConversationError {
    /// Classify an adapter failure for the config that produced it.
    pub fn from_adapter(config: &str, err: LlmError) -> Self {
        let config = config.to_string();
        match err {
            LlmError::Timeout => ConversationError::AdapterTimeout { config },
            LlmError::AuthenticationFailed => ConversationError::AdapterAuthFailure { config },
            LlmError::InvalidRequest(message) => {
                ConversationError::RequestInvalid { config, message }
            }
            LlmError::SchemaViolation(message) => {
                ConversationError::SchemaViolation { config, message }
            }
            source => ConversationError::Adapter { config, source },
        }
    }
}

impl From<RenderError> for ConversationError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::MissingContextVariable(key) => {
                ConversationError::MissingContextVariable(key)
            }
            RenderError::UnresolvedPlaceholder(name) => {
                ConversationError::UnresolvedPlaceholder(name)
            }
            RenderError::MalformedPlaceholder(_) => {
                ConversationError::MalformedTemplate(err.to_string())
            }
        }
    }
}

impl From<SelectionError> for ConversationError {
    fn from(err: SelectionError) -> Self {
        match err {
            SelectionError::NoEligibleConfig => ConversationError::NoEligibleConfig,
        }
    }
}
