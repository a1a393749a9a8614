//! Conversation orchestration and repository trait definitions for Parley.
//!
//! This crate defines the "ports" (repository, provider and bucketing traits)
//! that the infrastructure layer implements, and the conversation logic on
//! top of them. It depends only on `parley-types` -- never on
//! `parley-infra` or any database/IO crate.

pub mod chat;
pub mod conversation;
pub mod experiment;
pub mod llm;
pub mod prompt;
pub mod template;
pub mod tool;

#[cfg(test)]
pub(crate) mod testing;
