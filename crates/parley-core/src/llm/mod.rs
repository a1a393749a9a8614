//! LLM provider abstractions for Parley.
//!
//! - `LlmProvider`: RPITIT trait for concrete backend adapters
//! - `BoxLlmProvider`: Object-safe wrapper for dynamic dispatch
//! - `ProviderRegistry`: loaded configs paired with their adapters
//! - `ConfigSelector`: uniform random pick from a template's pool

pub mod box_provider;
pub mod provider;
pub mod registry;
pub mod selector;
