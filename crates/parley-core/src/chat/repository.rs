//! ChatHistoryRepository trait definition.
//!
//! Persistence for append-only chat histories and their message ratings.

use parley_types::chat::{ChatHistory, HistoryMessage, RatingCounts, Thumb};
use parley_types::context::ContextVars;
use parley_types::error::RepositoryError;
use uuid::Uuid;

/// Repository trait for chat history persistence.
///
/// Implementations live in parley-infra (e.g., `SqliteChatHistoryRepository`).
/// Uses native async fn in traits (RPITIT, Rust 2024 edition).
pub trait ChatHistoryRepository: Send + Sync {
    /// Create a history with its seed messages.
    fn create_history(
        &self,
        history: &ChatHistory,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a history with all messages in append order, ratings attached.
    fn get_history(
        &self,
        history_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<Option<ChatHistory>, RepositoryError>> + Send;

    /// Append messages and replace the tracked context snapshot in one
    /// transaction. Either every message lands or none does.
    ///
    /// Returns `NotFound` if the history does not exist.
    fn append_messages(
        &self,
        history_id: &Uuid,
        messages: &[HistoryMessage],
        context_vars: &ContextVars,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Set (or replace) the rating of a message.
    ///
    /// Returns `NotFound` if the message is not part of that history.
    fn rate_message(
        &self,
        history_id: &Uuid,
        message_id: &Uuid,
        thumb: Thumb,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Thumbs up/down totals over a history.
    fn rating_counts(
        &self,
        history_id: &Uuid,
    ) -> impl std::future::Future<Output = Result<RatingCounts, RepositoryError>> + Send;
}
