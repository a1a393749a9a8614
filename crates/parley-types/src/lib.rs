//! Shared domain types for Parley.
//!
//! This crate contains the domain types used across the workspace:
//! backend configurations, prompt templates, tools, chat histories,
//! LLM request/response shapes, and their associated error types.
//!
//! Zero infrastructure dependencies -- only serde, uuid, chrono, thiserror, schemars.

pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod template;
pub mod tool;
