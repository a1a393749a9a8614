//! `parley configs`: loaded backend configs and pool health.

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use parley_core::template::repository::TemplateRepository;
use parley_infra::config::llm_configs_dir;

use crate::state::AppState;

/// List loaded configs and every template pool name with no loaded config.
pub async fn list_configs(state: &AppState, json: bool) -> Result<()> {
    let templates = state.templates.list_templates().await?;

    let dangling: Vec<(String, Vec<String>)> = templates
        .iter()
        .filter_map(|t| {
            let missing: Vec<String> = state
                .registry
                .missing(&t.llm_config_names)
                .into_iter()
                .map(str::to_string)
                .collect();
            (!missing.is_empty()).then(|| (t.name.clone(), missing))
        })
        .collect();

    if json {
        let configs: Vec<_> = state
            .registry
            .list_names()
            .into_iter()
            .filter_map(|name| state.registry.get(name))
            .map(|entry| {
                serde_json::json!({
                    "name": entry.config.name,
                    "family": entry.config.family().to_string(),
                    "model": entry.config.backend.model(),
                    "tools_enabled": entry.config.tools_enabled,
                    "tool_calling": entry.provider.capabilities().tool_calling,
                    "structured_output": entry.provider.capabilities().structured_output,
                })
            })
            .collect();
        let report = serde_json::json!({
            "configs": configs,
            "skipped": state.skipped_configs,
            "missing": dangling
                .iter()
                .map(|(template, names)| serde_json::json!({ "template": template, "configs": names }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style("Backend configs from").bold(),
        style(llm_configs_dir(&state.data_dir, &state.config).display()).cyan()
    );
    println!();

    if state.registry.is_empty() {
        println!(
            "  {} No backend configs loaded. Add one <name>.yaml per config to that directory.",
            style("i").blue().bold()
        );
    } else {
        let mut table = Table::new();
        table.load_preset(presets::UTF8_FULL_CONDENSED);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Name").fg(Color::White),
            Cell::new("Family").fg(Color::White),
            Cell::new("Model").fg(Color::White),
            Cell::new("Tools").fg(Color::White),
            Cell::new("Structured").fg(Color::White),
        ]);

        let yes_no = |b: bool| {
            if b {
                Cell::new("yes").fg(Color::Green)
            } else {
                Cell::new("no").fg(Color::DarkGrey)
            }
        };

        for name in state.registry.list_names() {
            let Some(entry) = state.registry.get(name) else {
                continue;
            };
            table.add_row(vec![
                Cell::new(&entry.config.name).fg(Color::Cyan),
                Cell::new(entry.config.family().to_string()).fg(Color::White),
                Cell::new(entry.config.backend.model()).fg(Color::DarkGrey),
                yes_no(entry.config.tools_enabled && entry.provider.capabilities().tool_calling),
                yes_no(entry.provider.capabilities().structured_output),
            ]);
        }
        println!("{table}");
    }

    for reason in &state.skipped_configs {
        println!("  {} skipped: {reason}", style("!").yellow().bold());
    }

    if !dangling.is_empty() {
        println!();
        for (template, names) in &dangling {
            println!(
                "  {} template '{}' references configs that are not loaded: {}",
                style("✗").red(),
                style(template).cyan(),
                names.join(", ")
            );
        }
    }
    println!();

    Ok(())
}
