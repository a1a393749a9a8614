//! TemplateRepository trait definition.

use parley_types::error::RepositoryError;
use parley_types::template::PromptTemplate;
use parley_types::tool::Tool;

/// Repository trait for prompt templates and the tools they reference.
///
/// Implementations live in parley-infra (e.g., `SqliteTemplateRepository`).
/// Templates are returned as complete snapshots: pool, tools and seed
/// messages resolved.
pub trait TemplateRepository: Send + Sync {
    /// Get a template by name.
    fn get_template(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<PromptTemplate>, RepositoryError>> + Send;

    /// Insert or replace a template, its pool and its tool links.
    ///
    /// Every tool on the template is upserted as well.
    fn save_template(
        &self,
        template: &PromptTemplate,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Insert or replace a tool by name.
    fn save_tool(
        &self,
        tool: &Tool,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Get a tool by name.
    fn get_tool(
        &self,
        name: &str,
    ) -> impl std::future::Future<Output = Result<Option<Tool>, RepositoryError>> + Send;

    /// List all templates, ordered by name.
    fn list_templates(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<PromptTemplate>, RepositoryError>> + Send;
}
