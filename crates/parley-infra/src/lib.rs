//! Infrastructure implementations for Parley.
//!
//! Concrete adapters for the ports defined in `parley-core`: SQLite
//! repositories, HTTP backend adapters, PostHog bucketing, and the
//! configuration loaders.

pub mod config;
pub mod experiment;
pub mod llm;
pub mod sqlite;
