//! Prompt template types.

use serde::{Deserialize, Serialize};

use crate::context::ContextVars;
use crate::llm::Message;
use crate::tool::Tool;

/// A reusable prompt recipe.
///
/// A template names the pool of backend configurations it may run on,
/// the context keys it requires, the seed messages of a new conversation,
/// and the tools it exposes to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    /// Ordered pool of backend configuration names.
    #[serde(default)]
    pub llm_config_names: Vec<String>,
    #[serde(default)]
    pub required_kwargs: Vec<String>,
    #[serde(default)]
    pub initial_messages: Vec<Message>,
    #[serde(default)]
    pub system_prompt_template: String,
    /// Empty means the raw user message is sent.
    #[serde(default)]
    pub user_prompt_template: String,
    /// Context keys persisted in history.
    #[serde(default)]
    pub logged_context_vars: Vec<String>,
    #[serde(default)]
    pub tools: Vec<Tool>,
}

impl PromptTemplate {
    /// Required keys absent from `vars`, in declaration order.
    pub fn missing_required(&self, vars: &ContextVars) -> Vec<&str> {
        self.required_kwargs
            .iter()
            .filter(|k| !vars.contains_key(k.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn tool(&self, name: &str) -> Option<&Tool> {
        self.tools.iter().find(|t| t.name == name)
    }

    /// The pool with duplicates removed, first occurrence kept.
    pub fn pool(&self) -> Vec<String> {
        let mut pool: Vec<String> = Vec::with_capacity(self.llm_config_names.len());
        for name in &self.llm_config_names {
            if !pool.contains(name) {
                pool.push(name.clone());
            }
        }
        pool
    }
}
