//! Tool execution for model-requested function calls.
//!
//! Templates describe tools; the process registers the code behind them in
//! a [`ToolRegistry`] keyed by handler name. When a model asks for a tool,
//! arguments are assembled from the tool's defaults, the session context
//! and the model's own arguments (in increasing precedence), the handler
//! runs, and its result is packaged for the follow-up request.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Value, json};

use parley_types::context::ContextVars;
use parley_types::llm::ToolCall;
use parley_types::tool::{Tool, context_key};

/// Errors from running a tool.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("no handler registered under '{0}'")]
    UnknownHandler(String),

    #[error("invalid tool arguments: {0}")]
    InvalidArguments(String),

    #[error("tool failed: {0}")]
    Failed(String),
}

/// Executable code behind a tool.
///
/// Receives the merged argument object. Context params arrive under their
/// bare key (`__user_id__` is passed as `user_id`).
pub trait ToolHandler: Send + Sync {
    fn call(&self, args: ContextVars) -> impl Future<Output = Result<Value, ToolError>> + Send;
}

/// Plain synchronous functions are handlers too.
impl<F> ToolHandler for F
where
    F: Fn(ContextVars) -> Result<Value, ToolError> + Send + Sync,
{
    fn call(&self, args: ContextVars) -> impl Future<Output = Result<Value, ToolError>> + Send {
        std::future::ready(self(args))
    }
}

/// Object-safe version of [`ToolHandler`] with boxed futures.
pub trait ToolHandlerDyn: Send + Sync {
    fn call_boxed(
        &self,
        args: ContextVars,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>>;
}

impl<T: ToolHandler> ToolHandlerDyn for T {
    fn call_boxed(
        &self,
        args: ContextVars,
    ) -> Pin<Box<dyn Future<Output = Result<Value, ToolError>> + Send + '_>> {
        Box::pin(self.call(args))
    }
}

/// Handlers available to this process, indexed by handler name.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    handlers: HashMap<String, Arc<dyn ToolHandlerDyn>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Replaces any handler with the same name.
    pub fn register<T: ToolHandler + 'static>(&mut self, name: impl Into<String>, handler: T) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run `tool` for a model call and package the outcome.
    pub async fn invoke(&self, tool: &Tool, call: &ToolCall, context: &ContextVars) -> Value {
        let result = match build_arguments(tool, &call.arguments, context) {
            Ok(args) => match self.handlers.get(&tool.handler) {
                Some(handler) => handler.call_boxed(args).await,
                None => Err(ToolError::UnknownHandler(tool.handler.clone())),
            },
            Err(e) => Err(e),
        };

        if let Err(ref e) = result {
            tracing::warn!(tool = %tool.name, call_id = %call.id, error = %e, "tool call failed");
        }
        package_result(result)
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ToolRegistry").field("handlers", &names).finish()
    }
}

/// Merge defaults, context params, then the model's arguments.
///
/// Context params missing from `context` are skipped with a warning.
pub fn build_arguments(
    tool: &Tool,
    raw_arguments: &str,
    context: &ContextVars,
) -> Result<ContextVars, ToolError> {
    let model_args = parse_arguments(raw_arguments)?;

    let mut args = tool.default_args.clone();
    for param in &tool.context_params {
        let key = context_key(param);
        match context.get(key) {
            Some(value) => {
                args.insert(key.to_string(), value.clone());
            }
            None => {
                tracing::warn!(tool = %tool.name, param = %param, "context param not in session context");
            }
        }
    }
    args.extend(model_args);
    Ok(args)
}

fn parse_arguments(raw: &str) -> Result<ContextVars, ToolError> {
    if raw.trim().is_empty() {
        return Ok(ContextVars::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ToolError::InvalidArguments(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
    }
}

/// Wrap a handler outcome in the `{"status", "message"}` envelope sent back to the model.
pub fn package_result(result: Result<Value, ToolError>) -> Value {
    match result {
        Ok(output) => json!({ "status": "OK", "message": output }),
        Err(_) => json!({ "status": "Failed", "message": "Got error in tool call" }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::llm::ToolDefinition;

    fn tool() -> Tool {
        Tool {
            name: "weather".to_string(),
            handler: "weather.lookup".to_string(),
            default_args: json!({ "units": "metric", "city": "Paris" })
                .as_object()
                .cloned()
                .unwrap(),
            spec: ToolDefinition {
                name: "weather".to_string(),
                description: None,
                parameters: json!({ "type": "object" }),
            },
            context_params: vec!["__user_id__".to_string(), "__locale__".to_string()],
        }
    }

    fn call(arguments: &str) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            name: "weather".to_string(),
            arguments: arguments.to_string(),
        }
    }

    fn context() -> ContextVars {
        json!({ "user_id": "u-7", "city": "Oslo" }).as_object().cloned().unwrap()
    }

    #[test]
    fn test_argument_precedence() {
        let args = build_arguments(&tool(), r#"{"city":"Rome"}"#, &context()).unwrap();
        assert_eq!(args["units"], "metric");
        assert_eq!(args["user_id"], "u-7");
        // Model args beat defaults; context vars only fill declared params.
        assert_eq!(args["city"], "Rome");
        assert!(!args.contains_key("locale"));
    }

    #[test]
    fn test_empty_arguments_allowed() {
        let args = build_arguments(&tool(), "", &context()).unwrap();
        assert_eq!(args["city"], "Paris");
    }

    #[test]
    fn test_non_object_arguments_rejected() {
        assert!(matches!(
            build_arguments(&tool(), "[1,2]", &context()),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            build_arguments(&tool(), "{not json", &context()),
            Err(ToolError::InvalidArguments(_))
        ));
    }

    #[test]
    fn test_package_result_envelopes() {
        assert_eq!(
            package_result(Ok(json!("sunny"))),
            json!({ "status": "OK", "message": "sunny" })
        );
        assert_eq!(
            package_result(Err(ToolError::Failed("boom".into()))),
            json!({ "status": "Failed", "message": "Got error in tool call" })
        );
    }

    #[tokio::test]
    async fn test_invoke_registered_handler() {
        let mut registry = ToolRegistry::new();
        registry.register("weather.lookup", |args: ContextVars| -> Result<Value, ToolError> {
            Ok(json!(format!("{} for {}", args["city"].as_str().unwrap_or("?"), args["user_id"])))
        });

        let out = registry.invoke(&tool(), &call(r#"{"city":"Rome"}"#), &context()).await;
        assert_eq!(out["status"], "OK");
        assert_eq!(out["message"], "Rome for \"u-7\"");
    }

    #[tokio::test]
    async fn test_invoke_unknown_handler_fails_soft() {
        let registry = ToolRegistry::new();
        let out = registry.invoke(&tool(), &call("{}"), &context()).await;
        assert_eq!(out["status"], "Failed");
    }

    #[tokio::test]
    async fn test_invoke_handler_error() {
        let mut registry = ToolRegistry::new();
        registry.register("weather.lookup", |_args: ContextVars| -> Result<Value, ToolError> {
            Err(ToolError::Failed("upstream down".into()))
        });
        let out = registry.invoke(&tool(), &call("{}"), &context()).await;
        assert_eq!(out["message"], "Got error in tool call");
    }
}
