//! Configuration loading for Parley.
//!
//! Reads `parley.toml` from the data directory (`~/.parley/` in production)
//! and the per-backend YAML files from the LLM config directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parley_types::config::{AppConfig, LlmConfig};

/// Errors loading backend configs. `parley.toml` itself never fails.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("duplicate backend config name '{0}'")]
    DuplicateName(String),
}

/// Resolve the data directory from environment or platform defaults.
///
/// Priority:
/// 1. `PARLEY_DATA_DIR` environment variable
/// 2. `~/.parley`
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("PARLEY_DATA_DIR") {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".parley");
    }

    // Last resort: current directory
    PathBuf::from(".parley")
}

/// Load `{data_dir}/parley.toml`.
///
/// - If the file does not exist, returns [`AppConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
pub async fn load_app_config(data_dir: &Path) -> AppConfig {
    let config_path = data_dir.join("parley.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No parley.toml found at {}, using defaults", config_path.display());
            return AppConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return AppConfig::default();
        }
    };

    match toml::from_str::<AppConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            AppConfig::default()
        }
    }
}

/// Where backend YAML files live for this installation.
pub fn llm_configs_dir(data_dir: &Path, config: &AppConfig) -> PathBuf {
    config
        .llm_configs_dir
        .as_ref()
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("llm_configs"))
}

/// SQLite URL for this installation.
pub fn database_url(data_dir: &Path, config: &AppConfig) -> String {
    config
        .database_url
        .clone()
        .unwrap_or_else(|| crate::sqlite::pool::default_database_url(data_dir))
}

/// Load every `*.yaml` / `*.yml` backend config in `dir`, sorted by name.
///
/// A config without a `name` takes its file stem. A missing directory yields
/// no configs; an unreadable or malformed file is an error.
pub async fn load_llm_configs(dir: &Path) -> Result<Vec<LlmConfig>, ConfigError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No LLM config directory at {}", dir.display());
            return Ok(Vec::new());
        }
        Err(source) => {
            return Err(ConfigError::Io {
                path: dir.to_path_buf(),
                source,
            });
        }
    };

    let mut configs = Vec::new();
    let mut seen = HashSet::new();

    loop {
        let entry = entries.next_entry().await.map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let Some(entry) = entry else { break };

        let path = entry.path();
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if !is_yaml {
            continue;
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;

        let mut config: LlmConfig =
            serde_yaml_ng::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;

        if config.name.is_empty() {
            config.name = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }

        if !seen.insert(config.name.clone()) {
            return Err(ConfigError::DuplicateName(config.name));
        }

        tracing::debug!(config = %config.name, family = %config.family(), "read backend config");
        configs.push(config);
    }

    configs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(configs)
}
