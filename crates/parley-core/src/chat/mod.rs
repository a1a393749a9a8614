//! Chat history persistence port and lifecycle.

pub mod history;
pub mod repository;

pub use history::{HistoryManager, user_message_count, visible_transcript};
