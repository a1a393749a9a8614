//! In-memory test doubles for the core ports.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use parley_types::chat::{ChatHistory, HistoryMessage, RatingCounts, Thumb};
use parley_types::config::{BackendParams, LlmConfig};
use parley_types::context::ContextVars;
use parley_types::error::RepositoryError;
use parley_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, ProviderCapabilities, StopReason, ToolCall,
    Usage,
};
use parley_types::template::PromptTemplate;
use parley_types::tool::Tool;
use uuid::Uuid;

use crate::chat::repository::ChatHistoryRepository;
use crate::llm::provider::LlmProvider;
use crate::template::repository::TemplateRepository;

/// An `openai_compatible` config with the given name.
pub fn test_config(name: &str) -> LlmConfig {
    LlmConfig {
        name: name.to_string(),
        backend: BackendParams::OpenAiCompatible {
            base_url: "http://localhost:0/v1".to_string(),
            model: format!("{name}-model"),
            api_key_env: None,
            structured_output: false,
        },
        tools_enabled: false,
        max_tokens: None,
        temperature: None,
    }
}

pub fn text_response(text: &str) -> CompletionResponse {
    CompletionResponse {
        id: format!("resp-{}", Uuid::now_v7()),
        content: text.to_string(),
        model: "scripted".to_string(),
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
        tool_calls: Vec::new(),
    }
}

pub fn tool_call_response(tool: &str, arguments: &str) -> CompletionResponse {
    CompletionResponse {
        stop_reason: StopReason::ToolUse,
        tool_calls: vec![ToolCall {
            id: "call_1".to_string(),
            name: tool.to_string(),
            arguments: arguments.to_string(),
        }],
        ..text_response("")
    }
}

/// Shared handle on a [`ScriptedProvider`]'s queued results and received requests.
#[derive(Clone, Default)]
pub struct Script {
    results: Arc<Mutex<VecDeque<Result<CompletionResponse, LlmError>>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl Script {
    pub fn push_ok(&self, text: &str) -> &Self {
        self.push(Ok(text_response(text)))
    }

    pub fn push_err(&self, err: LlmError) -> &Self {
        self.push(Err(err))
    }

    pub fn push(&self, result: Result<CompletionResponse, LlmError>) -> &Self {
        self.results.lock().unwrap().push_back(result);
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

/// Provider that replays queued results in order and records every request.
pub struct ScriptedProvider {
    name: String,
    capabilities: ProviderCapabilities,
    script: Script,
}

impl ScriptedProvider {
    pub fn new(name: &str) -> (Self, Script) {
        let script = Script::default();
        let provider = Self {
            name: name.to_string(),
            capabilities: ProviderCapabilities {
                tool_calling: true,
                structured_output: false,
            },
            script: script.clone(),
        };
        (provider, script)
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

impl LlmProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> &ProviderCapabilities {
        &self.capabilities
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.script.requests.lock().unwrap().push(request.clone());
        self.script
            .results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(LlmError::Provider {
                    message: format!("script for '{}' exhausted", self.name),
                })
            })
    }
}

#[derive(Default)]
struct StoredHistory {
    history: Option<ChatHistory>,
    ratings: HashMap<Uuid, Thumb>,
}

/// Chat history store backed by a map.
#[derive(Default)]
pub struct InMemoryChatHistoryRepository {
    histories: Mutex<HashMap<Uuid, StoredHistory>>,
    fail_appends: AtomicBool,
}

impl InMemoryChatHistoryRepository {
    /// Make every subsequent append fail with a query error.
    pub fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }

    pub fn message_count(&self, history_id: &Uuid) -> usize {
        self.histories
            .lock()
            .unwrap()
            .get(history_id)
            .and_then(|s| s.history.as_ref())
            .map_or(0, |h| h.messages.len())
    }
}

impl ChatHistoryRepository for InMemoryChatHistoryRepository {
    async fn create_history(&self, history: &ChatHistory) -> Result<(), RepositoryError> {
        let mut map = self.histories.lock().unwrap();
        if map.contains_key(&history.id) {
            return Err(RepositoryError::Conflict(format!("history {} exists", history.id)));
        }
        map.insert(
            history.id,
            StoredHistory {
                history: Some(history.clone()),
                ratings: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn get_history(&self, history_id: &Uuid) -> Result<Option<ChatHistory>, RepositoryError> {
        let map = self.histories.lock().unwrap();
        Ok(map.get(history_id).and_then(|stored| {
            stored.history.clone().map(|mut h| {
                for msg in &mut h.messages {
                    msg.thumb = stored.ratings.get(&msg.id).copied();
                }
                h
            })
        }))
    }

    async fn append_messages(
        &self,
        history_id: &Uuid,
        messages: &[HistoryMessage],
        context_vars: &ContextVars,
    ) -> Result<(), RepositoryError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk full".to_string()));
        }
        let mut map = self.histories.lock().unwrap();
        let history = map
            .get_mut(history_id)
            .and_then(|s| s.history.as_mut())
            .ok_or(RepositoryError::NotFound)?;
        history.messages.extend_from_slice(messages);
        history.context_vars = context_vars.clone();
        Ok(())
    }

    async fn rate_message(
        &self,
        history_id: &Uuid,
        message_id: &Uuid,
        thumb: Thumb,
    ) -> Result<(), RepositoryError> {
        let mut map = self.histories.lock().unwrap();
        let stored = map.get_mut(history_id).ok_or(RepositoryError::NotFound)?;
        let known = stored
            .history
            .as_ref()
            .is_some_and(|h| h.message(*message_id).is_some());
        if !known {
            return Err(RepositoryError::NotFound);
        }
        stored.ratings.insert(*message_id, thumb);
        Ok(())
    }

    async fn rating_counts(&self, history_id: &Uuid) -> Result<RatingCounts, RepositoryError> {
        let map = self.histories.lock().unwrap();
        let mut counts = RatingCounts::default();
        if let Some(stored) = map.get(history_id) {
            for thumb in stored.ratings.values() {
                match thumb {
                    Thumb::Up => counts.thumbs_up += 1,
                    Thumb::Down => counts.thumbs_down += 1,
                }
            }
        }
        Ok(counts)
    }
}

/// Template store backed by a map.
#[derive(Default)]
pub struct InMemoryTemplateRepository {
    templates: Mutex<HashMap<String, PromptTemplate>>,
    tools: Mutex<HashMap<String, Tool>>,
}

impl InMemoryTemplateRepository {
    pub fn with(templates: impl IntoIterator<Item = PromptTemplate>) -> Self {
        let repo = Self::default();
        {
            let mut map = repo.templates.lock().unwrap();
            for t in templates {
                map.insert(t.name.clone(), t);
            }
        }
        repo
    }
}

impl TemplateRepository for InMemoryTemplateRepository {
    async fn get_template(&self, name: &str) -> Result<Option<PromptTemplate>, RepositoryError> {
        Ok(self.templates.lock().unwrap().get(name).cloned())
    }

    async fn save_template(&self, template: &PromptTemplate) -> Result<(), RepositoryError> {
        for tool in &template.tools {
            self.tools
                .lock()
                .unwrap()
                .insert(tool.name.clone(), tool.clone());
        }
        self.templates
            .lock()
            .unwrap()
            .insert(template.name.clone(), template.clone());
        Ok(())
    }

    async fn save_tool(&self, tool: &Tool) -> Result<(), RepositoryError> {
        self.tools
            .lock()
            .unwrap()
            .insert(tool.name.clone(), tool.clone());
        Ok(())
    }

    async fn get_tool(&self, name: &str) -> Result<Option<Tool>, RepositoryError> {
        Ok(self.tools.lock().unwrap().get(name).cloned())
    }

    async fn list_templates(&self) -> Result<Vec<PromptTemplate>, RepositoryError> {
        let mut all: Vec<PromptTemplate> = self.templates.lock().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}
