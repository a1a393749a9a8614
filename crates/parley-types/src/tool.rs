//! Tool definitions attached to prompt templates.

use serde::{Deserialize, Serialize};

use crate::context::ContextVars;
use crate::llm::ToolDefinition;

/// A callable tool a template can offer to the model.
///
/// `handler` names a handler registered in the process's tool registry.
/// `context_params` lists parameters in `__name__` form; their values come
/// from the session context instead of the model and are hidden from `spec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub handler: String,
    #[serde(default)]
    pub default_args: ContextVars,
    pub spec: ToolDefinition,
    #[serde(default)]
    pub context_params: Vec<String>,
}

impl Tool {
    /// Build a tool from a full parameter schema, moving every `__name__`
    /// property out of the advertised spec and into `context_params`.
    pub fn from_signature(
        name: impl Into<String>,
        handler: impl Into<String>,
        description: Option<String>,
        mut parameters: serde_json::Value,
    ) -> Self {
        let mut context_params = Vec::new();

        if let Some(props) = parameters
            .get_mut("properties")
            .and_then(|p| p.as_object_mut())
        {
            let hidden: Vec<String> = props
                .keys()
                .filter(|k| is_context_param(k))
                .cloned()
                .collect();
            for key in &hidden {
                props.remove(key);
            }
            context_params = hidden;
        }

        if let Some(required) = parameters
            .get_mut("required")
            .and_then(|r| r.as_array_mut())
        {
            required.retain(|r| !r.as_str().is_some_and(is_context_param));
        }

        let name = name.into();
        Self {
            spec: ToolDefinition {
                name: name.clone(),
                description,
                parameters,
            },
            name,
            handler: handler.into(),
            default_args: ContextVars::new(),
            context_params,
        }
    }
}

/// Whether a parameter name uses the `__name__` context form.
pub fn is_context_param(param: &str) -> bool {
    param.len() > 4 && param.starts_with("__") && param.ends_with("__")
}

/// Context variable key for a `__name__` parameter.
pub fn context_key(param: &str) -> &str {
    param.trim_matches('_')
}
