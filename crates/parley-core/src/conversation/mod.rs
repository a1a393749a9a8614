//! Conversation orchestration.
//!
//! A [`Conversation`] binds a prompt template, a chat history and a backend
//! config for the life of a session. Each [`Conversation::send`] renders
//! the prompts, calls the bound backend (failing over to other configs in
//! the template's pool on transient errors when asked to), runs at most one
//! tool round trip, validates structured output, and appends the turn.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use uuid::Uuid;

use parley_types::chat::{
    ChatHistory, HistoryMessage, MessageRole, RatingCounts, Thumb, TranscriptEntry,
};
use parley_types::context::{ContextVars, merge_context, restrict_context};
use parley_types::error::{ConversationError, SelectionError};
use parley_types::llm::{CompletionRequest, LlmError, Message, ResponseSchema};
use parley_types::template::PromptTemplate;

use crate::chat::history::{HistoryManager, visible_transcript};
use crate::chat::repository::ChatHistoryRepository;
use crate::experiment::{VariantBucketing, VariantResolver};
use crate::llm::registry::{ProviderRegistry, RegisteredConfig};
use crate::llm::selector::ConfigSelector;
use crate::prompt::render;
use crate::template::repository::TemplateRepository;
use crate::tool::ToolRegistry;

/// Output cap used when neither the config nor the deps set one.
pub const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Shared collaborators a conversation is opened against.
pub struct ConversationDeps<T, H> {
    pub templates: Arc<T>,
    pub histories: Arc<H>,
    pub registry: Arc<ProviderRegistry>,
    pub tools: Arc<ToolRegistry>,
    pub default_max_tokens: u32,
}

impl<T, H> Clone for ConversationDeps<T, H> {
    fn clone(&self) -> Self {
        Self {
            templates: Arc::clone(&self.templates),
            histories: Arc::clone(&self.histories),
            registry: Arc::clone(&self.registry),
            tools: Arc::clone(&self.tools),
            default_max_tokens: self.default_max_tokens,
        }
    }
}

impl<T, H> ConversationDeps<T, H> {
    pub fn new(templates: Arc<T>, histories: Arc<H>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            templates,
            histories,
            registry,
            tools: Arc::new(ToolRegistry::new()),
            default_max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_tools(mut self, tools: Arc<ToolRegistry>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_default_max_tokens(mut self, max_tokens: u32) -> Self {
        self.default_max_tokens = max_tokens;
        self
    }
}

/// How to open a conversation.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub prompt_name: String,
    /// Existing history to resume, or the id to give a new one.
    pub chat_history_id: Option<Uuid>,
    /// Create a new history (`true`) or load `chat_history_id` (`false`).
    pub initialize: bool,
    pub initializing_context_vars: ContextVars,
    pub response_format: Option<ResponseSchema>,
    /// Seed for config selection. Random when unset.
    pub selection_seed: Option<u64>,
}

impl OpenOptions {
    /// Start a new history for `prompt_name`.
    pub fn new(prompt_name: impl Into<String>) -> Self {
        Self {
            prompt_name: prompt_name.into(),
            chat_history_id: None,
            initialize: true,
            initializing_context_vars: ContextVars::new(),
            response_format: None,
            selection_seed: None,
        }
    }

    /// Resume history `id` for `prompt_name`.
    pub fn resume(prompt_name: impl Into<String>, id: Uuid) -> Self {
        Self {
            chat_history_id: Some(id),
            initialize: false,
            ..Self::new(prompt_name)
        }
    }

    pub fn with_vars(mut self, vars: ContextVars) -> Self {
        self.initializing_context_vars = vars;
        self
    }

    pub fn with_response_format(mut self, schema: ResponseSchema) -> Self {
        self.response_format = Some(schema);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.selection_seed = Some(seed);
        self
    }
}

/// One user turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub message: String,
    pub context_vars: ContextVars,
    /// Fail over to another config on timeout, rate limit or overload.
    pub retry_on_timeout: bool,
}

impl TurnRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context_vars: ContextVars::new(),
            retry_on_timeout: false,
        }
    }

    pub fn with_vars(mut self, vars: ContextVars) -> Self {
        self.context_vars = vars;
        self
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }
}

/// Result of a successful turn.
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub text: String,
    /// Parsed response when a response schema was sent.
    pub structured: Option<Value>,
    /// Id of the stored assistant message.
    pub message_id: Uuid,
    pub config_name: String,
    pub tool_data: Option<Value>,
}

/// Outcome of one adapter attempt.
struct Completion {
    text: String,
    structured: Option<Value>,
    tool_data: Option<Value>,
    generation_ms: u64,
}

/// A live session over one template and one chat history.
pub struct Conversation<T, H> {
    deps: ConversationDeps<T, H>,
    histories: HistoryManager<H>,
    template: PromptTemplate,
    pool: Vec<String>,
    history: ChatHistory,
    live_vars: ContextVars,
    response_format: Option<ResponseSchema>,
    validator: Option<jsonschema::Validator>,
    selector: ConfigSelector,
    bound_config: Option<String>,
}

impl<T, H> Conversation<T, H>
where
    T: TemplateRepository,
    H: ChatHistoryRepository,
{
    /// Open a conversation: resolve the template, check context and pool,
    /// create or load the history, and bind an initial config.
    pub async fn open(
        deps: &ConversationDeps<T, H>,
        options: OpenOptions,
    ) -> Result<Self, ConversationError> {
        let template = deps
            .templates
            .get_template(&options.prompt_name)
            .await?
            .ok_or_else(|| {
                ConversationError::Configuration(format!(
                    "prompt template '{}' not found",
                    options.prompt_name
                ))
            })?;

        let histories = HistoryManager::new(Arc::clone(&deps.histories));

        let existing = if options.initialize {
            None
        } else {
            let id = options.chat_history_id.ok_or_else(|| {
                ConversationError::Configuration(
                    "chat_history_id is required to resume a conversation".to_string(),
                )
            })?;
            Some(histories.load(&id).await?)
        };

        let mut live_vars = existing
            .as_ref()
            .map(|h| h.context_vars.clone())
            .unwrap_or_default();
        merge_context(&mut live_vars, &options.initializing_context_vars);

        let missing = template.missing_required(&live_vars);
        if !missing.is_empty() {
            return Err(ConversationError::Configuration(format!(
                "template '{}' requires context variables: {}",
                template.name,
                missing.join(", ")
            )));
        }

        let pool = template.pool();
        if pool.is_empty() {
            return Err(ConversationError::Configuration(format!(
                "template '{}' has no backend configs",
                template.name
            )));
        }
        let unknown = deps.registry.missing(&pool);
        if !unknown.is_empty() {
            return Err(ConversationError::Configuration(format!(
                "template '{}' references configs that are not loaded: {}",
                template.name,
                unknown.join(", ")
            )));
        }

        let validator = options
            .response_format
            .as_ref()
            .map(|schema| {
                jsonschema::validator_for(&schema.schema).map_err(|e| {
                    ConversationError::Configuration(format!(
                        "invalid response schema '{}': {e}",
                        schema.name
                    ))
                })
            })
            .transpose()?;

        let history = match existing {
            Some(history) => history,
            None => {
                histories
                    .init(
                        options.chat_history_id,
                        &template,
                        &options.initializing_context_vars,
                    )
                    .await?
            }
        };

        let mut selector = match options.selection_seed {
            Some(seed) => ConfigSelector::seeded(seed),
            None => ConfigSelector::new(),
        };
        let bound = selector.select(&pool, &[])?;

        tracing::info!(
            template = %template.name,
            history_id = %history.id,
            config = %bound,
            resumed = !options.initialize,
            "conversation opened"
        );

        Ok(Self {
            deps: deps.clone(),
            histories,
            template,
            pool,
            history,
            live_vars,
            response_format: options.response_format,
            validator,
            selector,
            bound_config: Some(bound),
        })
    }

    /// Open a conversation on the template an experiment assigns to `user_id`.
    ///
    /// `options.prompt_name` is the default template. It is used when the
    /// lookup fails, assigns nothing, or names a template that does not exist.
    pub async fn open_for_experiment<B: VariantBucketing>(
        deps: &ConversationDeps<T, H>,
        resolver: &VariantResolver<B>,
        user_id: &str,
        experiment: Option<&str>,
        mut options: OpenOptions,
    ) -> Result<Self, ConversationError> {
        let default = options.prompt_name.clone();
        let chosen = resolver.resolve(user_id, experiment, &default).await;

        if chosen != default {
            if deps.templates.get_template(&chosen).await?.is_some() {
                options.prompt_name = chosen;
            } else {
                tracing::warn!(
                    user_id,
                    variant = %chosen,
                    default = %default,
                    "variant template not found, using default template"
                );
            }
        }

        Self::open(deps, options).await
    }

    /// Run one turn.
    ///
    /// History is only modified when the whole turn succeeded.
    pub async fn send(&mut self, request: TurnRequest) -> Result<TurnReply, ConversationError> {
        merge_context(&mut self.live_vars, &request.context_vars);

        let system = render(
            &self.template.system_prompt_template,
            &self.live_vars,
            &self.template.required_kwargs,
        )?;
        let user_prompt = if self.template.user_prompt_template.is_empty() {
            request.message.clone()
        } else {
            let mut vars = self.live_vars.clone();
            vars.insert("user_msg".to_string(), Value::String(request.message.clone()));
            render(
                &self.template.user_prompt_template,
                &vars,
                &self.template.required_kwargs,
            )?
        };

        let mut messages: Vec<Message> = self
            .history
            .messages
            .iter()
            .map(|m| Message::new(m.role.clone(), m.content.clone()))
            .collect();
        messages.push(Message::user(user_prompt));
        let system = (!system.is_empty()).then_some(system);

        let mut config_name = match self.bound_config.clone() {
            Some(name) => name,
            None => self.selector.select(&self.pool, &[])?,
        };
        let mut attempted: Vec<String> = Vec::new();
        let mut tool_ran = false;

        let completion = loop {
            attempted.push(config_name.clone());
            let entry = self.deps.registry.get(&config_name).ok_or_else(|| {
                ConversationError::Configuration(format!("config '{config_name}' is not loaded"))
            })?;

            let result = self
                .attempt(entry, system.clone(), messages.clone(), &mut tool_ran)
                .await;
            let err = match result {
                Ok(completion) => break completion,
                Err(err) => err,
            };

            // A config that failed transiently is not tried first next turn.
            if err.is_transient() {
                self.bound_config = None;
            }

            if request.retry_on_timeout && err.is_transient() && !tool_ran {
                tracing::warn!(
                    config = %config_name,
                    history_id = %self.history.id,
                    attempt = attempted.len(),
                    error = %err,
                    "transient backend failure, trying another config"
                );
                match self.selector.select(&self.pool, &attempted) {
                    Ok(next) => config_name = next,
                    Err(SelectionError::NoEligibleConfig) => {
                        tracing::error!(
                            history_id = %self.history.id,
                            attempted = ?attempted,
                            "every config in the pool failed"
                        );
                        return Err(ConversationError::AllConfigsExhausted { attempted });
                    }
                }
                continue;
            }

            if tool_ran && err.is_transient() {
                tracing::warn!(
                    config = %config_name,
                    history_id = %self.history.id,
                    "tool already executed this turn, not failing over"
                );
            }
            tracing::error!(
                config = %config_name,
                history_id = %self.history.id,
                error = %err,
                "backend request failed"
            );
            return Err(ConversationError::from_adapter(&config_name, err));
        };

        let mut user = HistoryMessage::new(MessageRole::User, request.message);
        let logged = restrict_context(&request.context_vars, &self.template.logged_context_vars);
        if !logged.is_empty() {
            user.context_vars = Some(logged);
        }
        let mut assistant = HistoryMessage::new(MessageRole::Assistant, completion.text.clone());
        assistant.config_name = Some(config_name.clone());
        assistant.generation_ms = Some(completion.generation_ms);
        assistant.tool_data = completion.tool_data.clone();
        let message_id = assistant.id;

        self.histories
            .append_turn(
                &mut self.history,
                user,
                assistant,
                &request.context_vars,
                &self.template.logged_context_vars,
            )
            .await?;

        tracing::info!(
            config = %config_name,
            history_id = %self.history.id,
            attempts = attempted.len(),
            generation_ms = completion.generation_ms,
            "turn completed"
        );

        self.bound_config = Some(config_name.clone());
        Ok(TurnReply {
            text: completion.text,
            structured: completion.structured,
            message_id,
            config_name,
            tool_data: completion.tool_data,
        })
    }

    /// One call to one config, plus the tool follow-up if the model asks for it.
    ///
    /// `tool_ran` is set once a tool handler has been invoked, so the caller
    /// does not fail over and run it again.
    async fn attempt(
        &self,
        entry: &RegisteredConfig,
        system: Option<String>,
        messages: Vec<Message>,
        tool_ran: &mut bool,
    ) -> Result<Completion, LlmError> {
        let capabilities = entry.provider.capabilities();
        let config = &entry.config;

        let tools = if config.tools_enabled && !self.template.tools.is_empty() {
            if capabilities.tool_calling {
                self.template.tools.iter().map(|t| t.spec.clone()).collect()
            } else {
                tracing::warn!(config = %config.name, "config enables tools but backend cannot call them");
                Vec::new()
            }
        } else {
            Vec::new()
        };

        let response_schema = if capabilities.structured_output {
            self.response_format.clone()
        } else {
            if self.response_format.is_some() {
                tracing::debug!(config = %config.name, "backend has no structured output, schema not sent");
            }
            None
        };

        let request = CompletionRequest {
            model: config.backend.model().to_string(),
            messages,
            system,
            max_tokens: config.max_tokens.unwrap_or(self.deps.default_max_tokens),
            temperature: config.temperature,
            tools,
            response_schema,
        };

        let started = Instant::now();
        let mut response = entry.provider.complete(&request).await?;
        let mut tool_data = None;

        if let Some(call) = response.tool_calls.first().cloned() {
            match self.template.tool(&call.name) {
                Some(tool) => {
                    let output = self.deps.tools.invoke(tool, &call, &self.live_vars).await;
                    *tool_ran = true;
                    let mut follow_up = request.clone();
                    follow_up
                        .messages
                        .push(Message::assistant_tool_calls(vec![call.clone()]));
                    follow_up.messages.push(Message::tool_result(
                        call.id.clone(),
                        call.name.clone(),
                        output.to_string(),
                    ));
                    response = entry.provider.complete(&follow_up).await?;
                    tool_data = Some(json!({
                        "tool": call.name,
                        "call": call,
                        "output": output,
                    }));
                }
                None => {
                    tracing::warn!(config = %config.name, tool = %call.name, "model called a tool the template does not define");
                }
            }
        }

        let structured = match (&request.response_schema, &self.validator) {
            (Some(_), Some(validator)) => Some(validate_structured(validator, &response.content)?),
            _ => None,
        };

        Ok(Completion {
            text: response.content,
            structured,
            tool_data,
            generation_ms: started.elapsed().as_millis() as u64,
        })
    }

    pub async fn rate_message(&self, message_id: &Uuid, thumb: Thumb) -> Result<(), ConversationError> {
        self.histories.rate_message(&self.history.id, message_id, thumb).await
    }

    pub async fn rating_counts(&self) -> Result<RatingCounts, ConversationError> {
        self.histories.rating_counts(&self.history.id).await
    }
}

impl<T, H> Conversation<T, H> {
    pub fn history_id(&self) -> Uuid {
        self.history.id
    }

    /// Local snapshot of the history, including turns sent by this conversation.
    pub fn history(&self) -> &ChatHistory {
        &self.history
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Config the next turn will try first. `None` after the pool was exhausted.
    pub fn active_config(&self) -> Option<&str> {
        self.bound_config.as_deref()
    }

    pub fn context_vars(&self) -> &ContextVars {
        &self.live_vars
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        visible_transcript(&self.history)
    }
}

fn validate_structured(validator: &jsonschema::Validator, content: &str) -> Result<Value, LlmError> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| LlmError::SchemaViolation(format!("response is not JSON: {e}")))?;

    let violations: Vec<String> = validator.iter_errors(&value).map(|e| e.to_string()).collect();
    if violations.is_empty() {
        Ok(value)
    } else {
        Err(LlmError::SchemaViolation(violations.join("; ")))
    }
}
