//! Prompt template storage port.

pub mod repository;
