//! SQLite template repository implementation.
//!
//! Templates are stored with their list-valued fields as JSON columns. The
//! config pool and tool links live in ordered join tables and are resolved
//! when a template is fetched.

use chrono::Utc;
use parley_core::template::repository::TemplateRepository;
use parley_types::context::ContextVars;
use parley_types::error::RepositoryError;
use parley_types::llm::{Message, ToolDefinition};
use parley_types::template::PromptTemplate;
use parley_types::tool::Tool;
use sqlx::Row;

use super::pool::DatabasePool;

/// SQLite-backed implementation of `TemplateRepository`.
pub struct SqliteTemplateRepository {
    pool: DatabasePool,
}

impl SqliteTemplateRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    async fn load_pool(&self, template_name: &str) -> Result<Vec<String>, RepositoryError> {
        sqlx::query_scalar(
            "SELECT config_name FROM template_llm_configs WHERE template_name = ? ORDER BY position ASC",
        )
        .bind(template_name)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))
    }

    async fn load_tools(&self, template_name: &str) -> Result<Vec<Tool>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT t.* FROM template_tools tt
               JOIN tools t ON t.name = tt.tool_name
               WHERE tt.template_name = ?
               ORDER BY tt.position ASC"#,
        )
        .bind(template_name)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut tools = Vec::with_capacity(rows.len());
        for row in &rows {
            let tool_row =
                ToolRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            tools.push(tool_row.into_tool()?);
        }
        Ok(tools)
    }

    async fn resolve(&self, row: TemplateRow) -> Result<PromptTemplate, RepositoryError> {
        let llm_config_names = self.load_pool(&row.name).await?;
        let tools = self.load_tools(&row.name).await?;
        row.into_template(llm_config_names, tools)
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct TemplateRow {
    name: String,
    required_kwargs: String,
    initial_messages: String,
    system_prompt_template: String,
    user_prompt_template: String,
    logged_context_vars: String,
}

impl TemplateRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            name: row.try_get("name")?,
            required_kwargs: row.try_get("required_kwargs")?,
            initial_messages: row.try_get("initial_messages")?,
            system_prompt_template: row.try_get("system_prompt_template")?,
            user_prompt_template: row.try_get("user_prompt_template")?,
            logged_context_vars: row.try_get("logged_context_vars")?,
        })
    }

    fn into_template(
        self,
        llm_config_names: Vec<String>,
        tools: Vec<Tool>,
    ) -> Result<PromptTemplate, RepositoryError> {
        Ok(PromptTemplate {
            required_kwargs: parse_json::<Vec<String>>(&self.required_kwargs, "required_kwargs")?,
            initial_messages: parse_json::<Vec<Message>>(&self.initial_messages, "initial_messages")?,
            logged_context_vars: parse_json::<Vec<String>>(
                &self.logged_context_vars,
                "logged_context_vars",
            )?,
            name: self.name,
            llm_config_names,
            system_prompt_template: self.system_prompt_template,
            user_prompt_template: self.user_prompt_template,
            tools,
        })
    }
}

struct ToolRow {
    name: String,
    handler: String,
    default_args: String,
    spec: String,
    context_params: String,
}

impl ToolRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            name: row.try_get("name")?,
            handler: row.try_get("handler")?,
            default_args: row.try_get("default_args")?,
            spec: row.try_get("spec")?,
            context_params: row.try_get("context_params")?,
        })
    }

    fn into_tool(self) -> Result<Tool, RepositoryError> {
        Ok(Tool {
            default_args: parse_json::<ContextVars>(&self.default_args, "default_args")?,
            spec: parse_json::<ToolDefinition>(&self.spec, "tool spec")?,
            context_params: parse_json::<Vec<String>>(&self.context_params, "context_params")?,
            name: self.name,
            handler: self.handler,
        })
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(s: &str, what: &str) -> Result<T, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid {what}: {e}")))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|e| RepositoryError::Query(e.to_string()))
}

async fn upsert_tool(conn: &mut sqlx::SqliteConnection, tool: &Tool) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"INSERT INTO tools (name, handler, default_args, spec, context_params, updated_at)
           VALUES (?, ?, ?, ?, ?, ?)
           ON CONFLICT(name) DO UPDATE SET
               handler = excluded.handler,
               default_args = excluded.default_args,
               spec = excluded.spec,
               context_params = excluded.context_params,
               updated_at = excluded.updated_at"#,
    )
    .bind(&tool.name)
    .bind(&tool.handler)
    .bind(to_json(&tool.default_args)?)
    .bind(to_json(&tool.spec)?)
    .bind(to_json(&tool.context_params)?)
    .bind(Utc::now().to_rfc3339())
    .execute(conn)
    .await
    .map_err(|e| RepositoryError::Query(e.to_string()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// TemplateRepository implementation
// ---------------------------------------------------------------------------

impl TemplateRepository for SqliteTemplateRepository {
    async fn get_template(&self, name: &str) -> Result<Option<PromptTemplate>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM prompt_templates WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let template_row =
                    TemplateRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(self.resolve(template_row).await?))
            }
            None => Ok(None),
        }
    }

    async fn save_template(&self, template: &PromptTemplate) -> Result<(), RepositoryError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self
            .pool
            .writer
            .begin()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO prompt_templates
                   (name, required_kwargs, initial_messages, system_prompt_template,
                    user_prompt_template, logged_context_vars, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(name) DO UPDATE SET
                   required_kwargs = excluded.required_kwargs,
                   initial_messages = excluded.initial_messages,
                   system_prompt_template = excluded.system_prompt_template,
                   user_prompt_template = excluded.user_prompt_template,
                   logged_context_vars = excluded.logged_context_vars,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&template.name)
        .bind(to_json(&template.required_kwargs)?)
        .bind(to_json(&template.initial_messages)?)
        .bind(&template.system_prompt_template)
        .bind(&template.user_prompt_template)
        .bind(to_json(&template.logged_context_vars)?)
        .bind(&now)
        .bind(&now)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        sqlx::query("DELETE FROM template_llm_configs WHERE template_name = ?")
            .bind(&template.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        for (position, config_name) in template.pool().iter().enumerate() {
            sqlx::query(
                "INSERT INTO template_llm_configs (template_name, config_name, position) VALUES (?, ?, ?)",
            )
            .bind(&template.name)
            .bind(config_name)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        }

        sqlx::query("DELETE FROM template_tools WHERE template_name = ?")
            .bind(&template.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        for (position, tool) in template.tools.iter().enumerate() {
            upsert_tool(&mut tx, tool).await?;
            sqlx::query(
                "INSERT INTO template_tools (template_name, tool_name, position) VALUES (?, ?, ?)",
            )
            .bind(&template.name)
            .bind(&tool.name)
            .bind(position as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e {
                    if db_err.message().contains("UNIQUE") {
                        return RepositoryError::Conflict(format!(
                            "tool '{}' listed twice on template '{}'",
                            tool.name, template.name
                        ));
                    }
                }
                RepositoryError::Query(e.to_string())
            })?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn save_tool(&self, tool: &Tool) -> Result<(), RepositoryError> {
        let mut conn = self
            .pool
            .writer
            .acquire()
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        upsert_tool(&mut conn, tool).await
    }

    async fn get_tool(&self, name: &str) -> Result<Option<Tool>, RepositoryError> {
        let row = sqlx::query("SELECT * FROM tools WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let tool_row =
                    ToolRow::from_row(&row).map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(tool_row.into_tool()?))
            }
            None => Ok(None),
        }
    }

    async fn list_templates(&self) -> Result<Vec<PromptTemplate>, RepositoryError> {
        let rows = sqlx::query("SELECT * FROM prompt_templates ORDER BY name ASC")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut templates = Vec::with_capacity(rows.len());
        for row in &rows {
            let template_row =
                TemplateRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            templates.push(self.resolve(template_row).await?);
        }
        Ok(templates)
    }
}
