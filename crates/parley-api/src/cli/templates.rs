//! Template management CLI commands: import, list, show.
//!
//! Templates and tools are loaded from a YAML manifest. Tools are declared
//! once at the top level and referenced from templates by name.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde::Deserialize;

use parley_core::template::repository::TemplateRepository;
use parley_types::context::ContextVars;
use parley_types::llm::Message;
use parley_types::template::PromptTemplate;
use parley_types::tool::Tool;

use crate::state::AppState;

/// Template management subcommands.
#[derive(Subcommand)]
pub enum TemplatesCommand {
    /// Load templates and tools from a YAML manifest (upserts by name).
    Import {
        /// Path to the manifest file.
        file: PathBuf,
    },

    /// List all templates.
    #[command(alias = "ls")]
    List,

    /// Show one template.
    Show {
        /// Template name.
        name: String,
    },
}

/// Top-level manifest document.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub tools: Vec<ManifestTool>,
    #[serde(default)]
    pub templates: Vec<ManifestTemplate>,
}

/// A tool as written in a manifest. `parameters` is the full signature;
/// `__name__` parameters are split out as context params on import.
#[derive(Debug, Deserialize)]
pub struct ManifestTool {
    pub name: String,
    pub handler: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "empty_parameters")]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub default_args: ContextVars,
}

/// A template as written in a manifest, referencing tools by name.
#[derive(Debug, Deserialize)]
pub struct ManifestTemplate {
    pub name: String,
    pub llm_config_names: Vec<String>,
    #[serde(default)]
    pub required_kwargs: Vec<String>,
    #[serde(default)]
    pub initial_messages: Vec<Message>,
    #[serde(default)]
    pub system_prompt_template: String,
    #[serde(default)]
    pub user_prompt_template: String,
    #[serde(default)]
    pub logged_context_vars: Vec<String>,
    #[serde(default)]
    pub tools: Vec<String>,
}

fn empty_parameters() -> serde_json::Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

impl Manifest {
    /// Resolve tool references into complete tools and templates.
    pub fn resolve(self) -> Result<(Vec<Tool>, Vec<PromptTemplate>)> {
        let tools: Vec<Tool> = self
            .tools
            .into_iter()
            .map(|t| {
                let mut tool = Tool::from_signature(t.name, t.handler, t.description, t.parameters);
                tool.default_args = t.default_args;
                tool
            })
            .collect();
        let by_name: HashMap<&str, &Tool> = tools.iter().map(|t| (t.name.as_str(), t)).collect();

        let mut templates = Vec::with_capacity(self.templates.len());
        for t in self.templates {
            let mut resolved = Vec::with_capacity(t.tools.len());
            for name in &t.tools {
                let tool = by_name.get(name.as_str()).with_context(|| {
                    format!("template '{}' references unknown tool '{name}'", t.name)
                })?;
                resolved.push((*tool).clone());
            }
            templates.push(PromptTemplate {
                name: t.name,
                llm_config_names: t.llm_config_names,
                required_kwargs: t.required_kwargs,
                initial_messages: t.initial_messages,
                system_prompt_template: t.system_prompt_template,
                user_prompt_template: t.user_prompt_template,
                logged_context_vars: t.logged_context_vars,
                tools: resolved,
            });
        }

        Ok((tools, templates))
    }
}

/// Handle a template management subcommand.
pub async fn handle_templates_command(
    cmd: TemplatesCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        TemplatesCommand::Import { file } => import(state, &file, json).await,
        TemplatesCommand::List => list(state, json).await,
        TemplatesCommand::Show { name } => show(state, &name, json).await,
    }
}

async fn import(state: &AppState, file: &Path, json: bool) -> Result<()> {
    let content = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let manifest: Manifest = serde_yaml_ng::from_str(&content)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    let (tools, templates) = manifest.resolve()?;

    for tool in &tools {
        state.templates.save_tool(tool).await?;
    }
    for template in &templates {
        state.templates.save_template(template).await?;
        let unknown = state.registry.missing(&template.llm_config_names);
        if !unknown.is_empty() {
            tracing::warn!(
                template = %template.name,
                missing = %unknown.join(", "),
                "template references configs that are not loaded"
            );
        }
    }

    if json {
        let summary = serde_json::json!({
            "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
            "templates": templates.iter().map(|t| &t.name).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!();
        println!(
            "  {} Imported {} template{} and {} tool{} from {}",
            style("✓").green().bold(),
            style(templates.len()).bold(),
            if templates.len() == 1 { "" } else { "s" },
            style(tools.len()).bold(),
            if tools.len() == 1 { "" } else { "s" },
            style(file.display()).cyan()
        );
        println!();
    }

    Ok(())
}

async fn list(state: &AppState, json: bool) -> Result<()> {
    let templates = state.templates.list_templates().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&templates)?);
        return Ok(());
    }

    if templates.is_empty() {
        println!();
        println!(
            "  {} No templates. Use {} to load some.",
            style("i").blue().bold(),
            style("parley templates import <file.yaml>").cyan()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Name").fg(Color::White),
        Cell::new("Configs").fg(Color::White),
        Cell::new("Required").fg(Color::White),
        Cell::new("Tools").fg(Color::White),
    ]);

    for template in &templates {
        let missing = state.registry.missing(&template.llm_config_names);
        let configs_cell = if missing.is_empty() {
            Cell::new(template.pool().join(", ")).fg(Color::Green)
        } else {
            Cell::new(template.pool().join(", ")).fg(Color::Yellow)
        };
        table.add_row(vec![
            Cell::new(&template.name).fg(Color::Cyan),
            configs_cell,
            Cell::new(template.required_kwargs.join(", ")).fg(Color::DarkGrey),
            Cell::new(template.tools.len()).fg(Color::White),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    println!(
        "  {} template{}",
        style(templates.len()).bold(),
        if templates.len() == 1 { "" } else { "s" }
    );
    println!();

    Ok(())
}

async fn show(state: &AppState, name: &str, json: bool) -> Result<()> {
    let template = state
        .templates
        .get_template(name)
        .await?
        .with_context(|| format!("template '{name}' not found"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&template)?);
        return Ok(());
    }

    let dim_or = |s: &str| {
        if s.is_empty() {
            style("(none)".to_string()).dim().to_string()
        } else {
            s.to_string()
        }
    };

    println!();
    println!("  {}", style(&template.name).bold().cyan());
    println!();
    println!("  {} {}", style("Configs:").dim(), template.pool().join(", "));
    println!("  {} {}", style("Required:").dim(), dim_or(&template.required_kwargs.join(", ")));
    println!("  {} {}", style("Logged:").dim(), dim_or(&template.logged_context_vars.join(", ")));
    println!();
    println!("  {}", style("System prompt").bold());
    println!("  {}", dim_or(&template.system_prompt_template));
    println!();
    println!("  {}", style("User prompt").bold());
    println!("  {}", dim_or(&template.user_prompt_template));

    if !template.initial_messages.is_empty() {
        println!();
        println!("  {}", style("Initial messages").bold());
        for msg in &template.initial_messages {
            println!("  {} {}", style(format!("[{}]", msg.role)).dim(), msg.content);
        }
    }

    if !template.tools.is_empty() {
        println!();
        println!("  {}", style("Tools").bold());
        for tool in &template.tools {
            println!(
                "  {} {} {}",
                style("•").dim(),
                style(&tool.name).cyan(),
                style(format!("-> {}", tool.handler)).dim()
            );
        }
    }
    println!();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
tools:
  - name: lookup_order
    handler: orders.lookup
    description: Find an order by number
    parameters:
      type: object
      properties:
        order_number: { type: string }
        __customer_id__: { type: string }
      required: [order_number, __customer_id__]
    default_args:
      include_items: true

templates:
  - name: support
    llm_config_names: [azure-gpt4o, groq-llama]
    required_kwargs: [customer_id]
    initial_messages:
      - role: assistant
        content: Hi! How can I help?
    system_prompt_template: You support customer $customer_id.
    logged_context_vars: [customer_id]
    tools: [lookup_order]
  - name: plain
    llm_config_names: [groq-llama]
"#;

    #[test]
    fn test_manifest_resolves_tool_references() {
        let manifest: Manifest = serde_yaml_ng::from_str(MANIFEST).unwrap();
        let (tools, templates) = manifest.resolve().unwrap();

        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].context_params, vec!["__customer_id__"]);
        assert_eq!(tools[0].default_args["include_items"], true);
        assert!(tools[0].spec.parameters["properties"].get("__customer_id__").is_none());

        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].tools[0].handler, "orders.lookup");
        assert_eq!(templates[0].initial_messages[0].content, "Hi! How can I help?");
        assert!(templates[1].tools.is_empty());
        assert_eq!(templates[1].user_prompt_template, "");
    }

    #[test]
    fn test_manifest_unknown_tool_reference() {
        let manifest: Manifest = serde_yaml_ng::from_str(
            "templates:\n  - name: t\n    llm_config_names: [a]\n    tools: [ghost]\n",
        )
        .unwrap();
        let err = manifest.resolve().unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }
}
