//! CLI command definitions and dispatch for the `parley` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod chat;
pub mod configs;
pub mod history;
pub mod templates;

use clap::{Parser, Subcommand};
use uuid::Uuid;

/// Talk to LLM backends through prompt templates.
#[derive(Parser)]
#[command(name = "parley", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage prompt templates and their tools.
    Templates {
        #[command(subcommand)]
        action: templates::TemplatesCommand,
    },

    /// List loaded backend configs and flag pool references with no config.
    Configs,

    /// Start an interactive conversation.
    Chat(chat::ChatArgs),

    /// Show the visible transcript of a chat history.
    History {
        /// Chat history id.
        history_id: Uuid,
    },

    /// Rate a message in a chat history.
    Rate {
        /// Chat history id.
        history_id: Uuid,

        /// Message id.
        message_id: Uuid,

        /// `up` or `down`.
        thumb: String,
    },
}

/// Parse `key=value` into a context variable. Values that parse as JSON
/// keep their type; anything else is a string.
pub fn parse_var(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
