//! SQLite pool for the template and history stores.
//!
//! Every `parley` invocation opens the database at `{data_dir}/parley.db`,
//! applies pending migrations and then serves reads from a small reader pool
//! while all writes go through one writer connection.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

const READER_CONNECTIONS: u32 = 8;

/// How long a statement waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Reader and writer pools over one SQLite file.
///
/// `writer` holds a single connection, so the two inserts of a chat turn and
/// the multi-table template upsert never interleave with another write.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if needed) the database and run migrations.
    ///
    /// Both pools use WAL journal mode, foreign key enforcement and a
    /// 5-second busy timeout. The reader pool is read-only.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT)
            .create_if_missing(true);

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(base_opts.clone())
            .await?;

        // Readers must not see a half-migrated schema.
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(READER_CONNECTIONS)
            .connect_with(base_opts.read_only(true))
            .await?;

        tracing::debug!(url = %database_url, readers = READER_CONNECTIONS, "database pool ready");
        Ok(Self { reader, writer })
    }
}

/// Database URL for `{data_dir}/parley.db`.
pub fn default_database_url(data_dir: &Path) -> String {
    format!("sqlite://{}/parley.db", data_dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_url(dir: &tempfile::TempDir) -> String {
        format!("sqlite://{}?mode=rwc", dir.path().join("parley.db").display())
    }

    #[tokio::test]
    async fn test_pool_creates_store_tables() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&temp_url(&dir)).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_sqlx_migrations' ORDER BY name",
        )
        .fetch_all(&pool.reader)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        for expected in [
            "chat_histories",
            "chat_history_messages",
            "message_ratings",
            "prompt_templates",
            "template_llm_configs",
            "template_tools",
            "tools",
        ] {
            assert!(table_names.contains(&expected), "{expected} table missing");
        }
    }

    #[tokio::test]
    async fn test_pool_pragmas() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&temp_url(&dir)).await.unwrap();

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let (fk,): (i32,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool.writer)
            .await
            .unwrap();
        assert_eq!(fk, 1, "foreign keys should be enabled");
    }

    #[tokio::test]
    async fn test_reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let url = temp_url(&dir);

        let pool = DatabasePool::new(&url).await.unwrap();
        sqlx::query("INSERT INTO tools (name, handler, default_args, spec, context_params, updated_at) VALUES ('t', 'h', '{}', '{}', '[]', '2026-01-01T00:00:00Z')")
            .execute(&pool.writer)
            .await
            .unwrap();
        pool.writer.close().await;
        pool.reader.close().await;

        let reopened = DatabasePool::new(&url).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tools")
            .fetch_one(&reopened.reader)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_reader_rejects_writes() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DatabasePool::new(&temp_url(&dir)).await.unwrap();

        let result = sqlx::query("DELETE FROM tools").execute(&pool.reader).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_default_database_url() {
        let url = default_database_url(Path::new("/tmp/parley-home"));
        assert_eq!(url, "sqlite:///tmp/parley-home/parley.db");
    }
}
