//! Application state wiring all services together.
//!
//! The conversation layer is generic over repository and bucketing traits;
//! AppState pins them to the concrete infra implementations.

use std::path::PathBuf;
use std::sync::Arc;

use secrecy::SecretString;

use parley_core::conversation::ConversationDeps;
use parley_core::experiment::{VariantBucketing, VariantResolver};
use parley_core::llm::registry::ProviderRegistry;
use parley_infra::config::{
    database_url, llm_configs_dir, load_app_config, load_llm_configs, resolve_data_dir,
};
use parley_infra::experiment::PosthogBucketing;
use parley_infra::llm::build_registry;
use parley_infra::sqlite::chat::SqliteChatHistoryRepository;
use parley_infra::sqlite::pool::DatabasePool;
use parley_infra::sqlite::template::SqliteTemplateRepository;
use parley_types::config::{AppConfig, BucketingConfig};
use parley_types::error::BucketingError;

/// Conversation dependencies pinned to the SQLite repositories.
pub type ConcreteDeps = ConversationDeps<SqliteTemplateRepository, SqliteChatHistoryRepository>;

/// Bucketing chosen by `parley.toml`: PostHog when configured, otherwise none.
pub enum CliBucketing {
    Posthog(PosthogBucketing),
    Disabled,
}

impl VariantBucketing for CliBucketing {
    async fn variant(
        &self,
        user_id: &str,
        experiment: &str,
    ) -> Result<Option<String>, BucketingError> {
        match self {
            CliBucketing::Posthog(posthog) => posthog.variant(user_id, experiment).await,
            CliBucketing::Disabled => Ok(None),
        }
    }
}

/// Shared application state used by every CLI command.
pub struct AppState {
    pub deps: ConcreteDeps,
    pub resolver: VariantResolver<CliBucketing>,
    pub templates: Arc<SqliteTemplateRepository>,
    pub histories: Arc<SqliteChatHistoryRepository>,
    pub registry: Arc<ProviderRegistry>,
    /// Human-readable reasons configs were left out of the registry.
    pub skipped_configs: Vec<String>,
    pub config: AppConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: connect to DB, load configs, wire services.
    pub async fn init() -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_app_config(&data_dir).await;

        let db_pool = DatabasePool::new(&database_url(&data_dir, &config)).await?;
        let templates = Arc::new(SqliteTemplateRepository::new(db_pool.clone()));
        let histories = Arc::new(SqliteChatHistoryRepository::new(db_pool));

        let configs_dir = llm_configs_dir(&data_dir, &config);
        let llm_configs = load_llm_configs(&configs_dir).await?;
        let (registry, skipped) = build_registry(llm_configs);
        let registry = Arc::new(registry);

        tracing::info!(
            data_dir = %data_dir.display(),
            configs = registry.len(),
            skipped = skipped.len(),
            "parley initialized"
        );

        let bucketing = match &config.bucketing {
            Some(settings) => build_bucketing(settings),
            None => CliBucketing::Disabled,
        };

        // The CLI registers no tool handlers; model tool calls get a Failed result.
        let deps = ConversationDeps::new(
            Arc::clone(&templates),
            Arc::clone(&histories),
            Arc::clone(&registry),
        )
        .with_default_max_tokens(config.default_max_tokens);

        Ok(Self {
            deps,
            resolver: VariantResolver::new(Arc::new(bucketing)),
            templates,
            histories,
            registry,
            skipped_configs: skipped.iter().map(ToString::to_string).collect(),
            config,
            data_dir,
        })
    }
}

fn build_bucketing(settings: &BucketingConfig) -> CliBucketing {
    let Some(key) = std::env::var(&settings.api_key_env)
        .ok()
        .filter(|k| !k.is_empty())
    else {
        tracing::warn!(
            env = %settings.api_key_env,
            "bucketing configured but API key is not set, experiments disabled"
        );
        return CliBucketing::Disabled;
    };

    match PosthogBucketing::new(&settings.host, SecretString::from(key)) {
        Ok(posthog) => CliBucketing::Posthog(posthog),
        Err(e) => {
            tracing::warn!(error = %e, "failed to build bucketing client, experiments disabled");
            CliBucketing::Disabled
        }
    }
}
