//! Provider registry for runtime config lookup.
//!
//! A name-indexed registry of backend configurations, each paired with the
//! adapter built for it. Built once at startup and shared read-only.

use std::collections::HashMap;

use parley_types::config::LlmConfig;

use super::box_provider::BoxLlmProvider;

/// A loaded backend configuration and its adapter.
#[derive(Debug)]
pub struct RegisteredConfig {
    pub config: LlmConfig,
    pub provider: BoxLlmProvider,
}

/// Registry of available backend configurations, indexed by config name.
#[derive(Debug)]
pub struct ProviderRegistry {
    configs: HashMap<String, RegisteredConfig>,
}

impl ProviderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            configs: HashMap::new(),
        }
    }

    /// Register a config under its own name.
    ///
    /// If a config with this name already exists, it is replaced.
    pub fn register(&mut self, config: LlmConfig, provider: BoxLlmProvider) {
        self.configs
            .insert(config.name.clone(), RegisteredConfig { config, provider });
    }

    /// Look up a config by name.
    pub fn get(&self, name: &str) -> Option<&RegisteredConfig> {
        self.configs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    /// All registered config names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.configs.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Names from `pool` that have no loaded config, in pool order.
    pub fn missing<'a>(&self, pool: &'a [String]) -> Vec<&'a str> {
        pool.iter()
            .filter(|name| !self.contains(name))
            .map(String::as_str)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
