//! History lifecycle: create, load, append turns, rate messages.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use parley_types::chat::{
    ChatHistory, HistoryMessage, MessageRole, RatingCounts, Thumb, TranscriptEntry, TranscriptKind,
};
use parley_types::context::{ContextVars, merge_context, restrict_context};
use parley_types::error::{ConversationError, RepositoryError};
use parley_types::template::PromptTemplate;

use super::repository::ChatHistoryRepository;

/// Manages chat histories on top of a [`ChatHistoryRepository`].
///
/// Assumes a single writer per history id.
pub struct HistoryManager<H> {
    repo: Arc<H>,
}

impl<H> Clone for HistoryManager<H> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
        }
    }
}

impl<H: ChatHistoryRepository> HistoryManager<H> {
    pub fn new(repo: Arc<H>) -> Self {
        Self { repo }
    }

    /// Create a history seeded with the template's initial messages.
    ///
    /// Seed messages are stored verbatim and flagged `initial`. Only the
    /// template's logged context vars are kept.
    pub async fn init(
        &self,
        id: Option<Uuid>,
        template: &PromptTemplate,
        initial_vars: &ContextVars,
    ) -> Result<ChatHistory, ConversationError> {
        let now = Utc::now();
        let history = ChatHistory {
            id: id.unwrap_or_else(Uuid::now_v7),
            template_name: template.name.clone(),
            messages: template
                .initial_messages
                .iter()
                .map(|m| HistoryMessage::seeded(m.role.clone(), m.content.clone()))
                .collect(),
            context_vars: restrict_context(initial_vars, &template.logged_context_vars),
            created_at: now,
            updated_at: now,
        };

        self.repo.create_history(&history).await?;
        tracing::debug!(history_id = %history.id, seeded = history.messages.len(), "created chat history");
        Ok(history)
    }

    pub async fn load(&self, id: &Uuid) -> Result<ChatHistory, ConversationError> {
        self.repo
            .get_history(id)
            .await?
            .ok_or(ConversationError::HistoryNotFound(*id))
    }

    /// Append one user/assistant pair in a single store operation.
    ///
    /// `history` is the caller's snapshot. It is updated only when the store
    /// accepted both records.
    pub async fn append_turn(
        &self,
        history: &mut ChatHistory,
        user: HistoryMessage,
        assistant: HistoryMessage,
        vars: &ContextVars,
        logged: &[String],
    ) -> Result<(), ConversationError> {
        let mut tracked = history.context_vars.clone();
        merge_context(&mut tracked, &restrict_context(vars, logged));

        let pair = [user, assistant];
        self.repo
            .append_messages(&history.id, &pair, &tracked)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => ConversationError::HistoryNotFound(history.id),
                other => ConversationError::Storage(other),
            })?;

        history.messages.extend(pair);
        history.context_vars = tracked;
        history.updated_at = Utc::now();
        Ok(())
    }

    pub async fn rate_message(
        &self,
        history_id: &Uuid,
        message_id: &Uuid,
        thumb: Thumb,
    ) -> Result<(), ConversationError> {
        self.repo
            .rate_message(history_id, message_id, thumb)
            .await
            .map_err(|e| match e {
                RepositoryError::NotFound => ConversationError::MessageNotFound(*message_id),
                other => ConversationError::Storage(other),
            })
    }

    pub async fn rating_counts(&self, history_id: &Uuid) -> Result<RatingCounts, ConversationError> {
        Ok(self.repo.rating_counts(history_id).await?)
    }
}

/// Number of user messages, seeded ones included.
pub fn user_message_count(history: &ChatHistory) -> usize {
    history
        .messages
        .iter()
        .filter(|m| m.role == MessageRole::User)
        .count()
}

/// The conversation as an end user sees it.
///
/// Seeded messages and non-chat roles are skipped. Assistant content that is
/// a JSON object with a `message` field is unwrapped to that field.
pub fn visible_transcript(history: &ChatHistory) -> Vec<TranscriptEntry> {
    history
        .messages
        .iter()
        .filter(|m| !m.initial)
        .filter_map(|m| {
            let kind = match m.role {
                MessageRole::User => TranscriptKind::User,
                MessageRole::Assistant => TranscriptKind::Bot,
                _ => return None,
            };
            Some(TranscriptEntry {
                id: m.id,
                kind,
                message: display_text(&m.content),
                thumb: m.thumb,
                tool_data: m.tool_data.clone(),
            })
        })
        .collect()
}

fn display_text(content: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(serde_json::Value::Object(map)) => match map.get("message") {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => content.to_string(),
        },
        _ => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryChatHistoryRepository;
    use parley_types::llm::Message;
    use serde_json::json;

    fn template() -> PromptTemplate {
        PromptTemplate {
            name: "onboarding".to_string(),
            llm_config_names: vec!["a".into()],
            required_kwargs: vec![],
            initial_messages: vec![
                Message::assistant("Welcome, $name!"),
                Message::user("hi"),
            ],
            system_prompt_template: String::new(),
            user_prompt_template: String::new(),
            logged_context_vars: vec!["name".into(), "plan".into()],
            tools: vec![],
        }
    }

    fn vars(value: serde_json::Value) -> ContextVars {
        value.as_object().cloned().unwrap()
    }

    fn manager() -> (HistoryManager<InMemoryChatHistoryRepository>, Arc<InMemoryChatHistoryRepository>) {
        let repo = Arc::new(InMemoryChatHistoryRepository::default());
        (HistoryManager::new(Arc::clone(&repo)), repo)
    }

    #[tokio::test]
    async fn test_init_seeds_verbatim_and_restricts_vars() {
        let (manager, _repo) = manager();
        let history = manager
            .init(None, &template(), &vars(json!({ "name": "Ana", "token": "secret" })))
            .await
            .unwrap();

        assert_eq!(history.messages.len(), 2);
        assert!(history.messages.iter().all(|m| m.initial));
        assert_eq!(history.messages[0].content, "Welcome, $name!");
        assert_eq!(history.context_vars, vars(json!({ "name": "Ana" })));

        let loaded = manager.load(&history.id).await.unwrap();
        assert_eq!(loaded.messages.len(), 2);
    }

    #[tokio::test]
    async fn test_load_missing_history() {
        let (manager, _repo) = manager();
        let id = Uuid::now_v7();
        assert!(matches!(
            manager.load(&id).await,
            Err(ConversationError::HistoryNotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_append_turn_adds_pair_and_merges_vars() {
        let (manager, repo) = manager();
        let mut history = manager
            .init(None, &template(), &vars(json!({ "name": "Ana", "plan": "free" })))
            .await
            .unwrap();

        manager
            .append_turn(
                &mut history,
                HistoryMessage::new(MessageRole::User, "upgrade me"),
                HistoryMessage::new(MessageRole::Assistant, "done"),
                &vars(json!({ "plan": "pro", "ephemeral": 1 })),
                &template().logged_context_vars,
            )
            .await
            .unwrap();

        assert_eq!(history.messages.len(), 4);
        assert_eq!(repo.message_count(&history.id), 4);
        assert_eq!(history.context_vars, vars(json!({ "name": "Ana", "plan": "pro" })));

        let loaded = manager.load(&history.id).await.unwrap();
        assert_eq!(loaded.context_vars, history.context_vars);
    }

    #[tokio::test]
    async fn test_failed_append_leaves_snapshot_untouched() {
        let (manager, repo) = manager();
        let mut history = manager.init(None, &template(), &ContextVars::new()).await.unwrap();
        repo.fail_appends(true);

        let err = manager
            .append_turn(
                &mut history,
                HistoryMessage::new(MessageRole::User, "q"),
                HistoryMessage::new(MessageRole::Assistant, "a"),
                &ContextVars::new(),
                &[],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ConversationError::Storage(_)));
        assert_eq!(history.messages.len(), 2);
        assert_eq!(repo.message_count(&history.id), 2);
    }

    #[tokio::test]
    async fn test_rating_flow() {
        let (manager, _repo) = manager();
        let mut history = manager.init(None, &template(), &ContextVars::new()).await.unwrap();
        let assistant = HistoryMessage::new(MessageRole::Assistant, "answer");
        let assistant_id = assistant.id;
        manager
            .append_turn(
                &mut history,
                HistoryMessage::new(MessageRole::User, "q"),
                assistant,
                &ContextVars::new(),
                &[],
            )
            .await
            .unwrap();

        manager.rate_message(&history.id, &assistant_id, Thumb::Down).await.unwrap();
        manager.rate_message(&history.id, &assistant_id, Thumb::Up).await.unwrap();

        let counts = manager.rating_counts(&history.id).await.unwrap();
        assert_eq!(counts, RatingCounts { thumbs_up: 1, thumbs_down: 0 });

        let loaded = manager.load(&history.id).await.unwrap();
        assert_eq!(loaded.message(assistant_id).unwrap().thumb, Some(Thumb::Up));

        let stranger = Uuid::now_v7();
        assert!(matches!(
            manager.rate_message(&history.id, &stranger, Thumb::Up).await,
            Err(ConversationError::MessageNotFound(id)) if id == stranger
        ));
    }

    #[test]
    fn test_visible_transcript_and_counts() {
        let mut reply = HistoryMessage::new(
            MessageRole::Assistant,
            r#"{"message":"Your plan is Pro","confidence":0.9}"#,
        );
        reply.thumb = Some(Thumb::Up);
        let history = ChatHistory {
            id: Uuid::now_v7(),
            template_name: "t".into(),
            messages: vec![
                HistoryMessage::seeded(MessageRole::Assistant, "Welcome"),
                HistoryMessage::seeded(MessageRole::User, "seeded question"),
                HistoryMessage::new(MessageRole::User, "what plan?"),
                reply,
                HistoryMessage::new(MessageRole::User, "[1, 2]"),
                HistoryMessage::new(MessageRole::Assistant, "plain text"),
            ],
            context_vars: ContextVars::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let transcript = visible_transcript(&history);
        assert_eq!(transcript.len(), 4);
        assert_eq!(transcript[0].kind, TranscriptKind::User);
        assert_eq!(transcript[1].kind, TranscriptKind::Bot);
        assert_eq!(transcript[1].message, "Your plan is Pro");
        assert_eq!(transcript[1].thumb, Some(Thumb::Up));
        assert_eq!(transcript[2].message, "[1, 2]");
        assert_eq!(transcript[3].message, "plain text");

        assert_eq!(user_message_count(&history), 3);
    }
}
