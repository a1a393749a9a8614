//! Parley CLI entry point.
//!
//! Binary name: `parley`
//!
//! Parses CLI arguments, initializes logging, database and backend configs,
//! then dispatches to the appropriate command handler.

mod cli;
mod state;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Set up tracing based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info,parley=debug",
        _ => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    // Initialize application state (DB, configs, bucketing)
    let state = AppState::init().await?;

    match cli.command {
        Commands::Templates { action } => {
            cli::templates::handle_templates_command(action, &state, cli.json).await?;
        }

        Commands::Configs => {
            cli::configs::list_configs(&state, cli.json).await?;
        }

        Commands::Chat(args) => {
            cli::chat::run_chat(&state, args, cli.json).await?;
        }

        Commands::History { history_id } => {
            cli::history::show_history(&state, history_id, cli.json).await?;
        }

        Commands::Rate {
            history_id,
            message_id,
            thumb,
        } => {
            cli::history::rate(&state, history_id, message_id, &thumb, cli.json).await?;
        }
    }

    Ok(())
}
