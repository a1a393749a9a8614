//! `parley chat`: interactive conversation over stdin.
//!
//! Each line read is one turn. Lines starting with `/` are commands:
//! `/quit`, `/rate up|down` (rates the last reply) and `/id`.

mod input;

use std::io::Write;

use anyhow::Result;
use clap::Args;
use console::style;
use uuid::Uuid;

use parley_core::conversation::{Conversation, OpenOptions, TurnReply, TurnRequest};
use parley_types::chat::Thumb;
use parley_types::context::ContextVars;

use super::parse_var;
use input::{ChatInput, InputEvent};
use crate::state::AppState;

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Prompt template name (the default template when an experiment is given).
    pub prompt: String,

    /// Resume an existing chat history instead of starting a new one.
    #[arg(long = "history", value_name = "ID")]
    pub history: Option<Uuid>,

    /// Context variable as key=value (repeatable). JSON values keep their type.
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, serde_json::Value)>,

    /// Retry timed-out or rate-limited turns on another config from the pool.
    #[arg(long)]
    pub retry: bool,

    /// User id for experiment bucketing.
    #[arg(long, value_name = "ID")]
    pub user: Option<String>,

    /// Experiment whose variant picks the template.
    #[arg(long, requires = "user", value_name = "NAME")]
    pub experiment: Option<String>,
}

enum LineCommand {
    Quit,
    Rate(Thumb),
    ShowId,
    Unknown(String),
}

fn parse_command(line: &str) -> Option<LineCommand> {
    let rest = line.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let cmd = match parts.next().unwrap_or_default() {
        "quit" | "exit" | "q" => LineCommand::Quit,
        "id" => LineCommand::ShowId,
        "rate" => match parts.next().map(str::parse::<Thumb>) {
            Some(Ok(thumb)) => LineCommand::Rate(thumb),
            _ => LineCommand::Unknown("usage: /rate up|down".to_string()),
        },
        other => LineCommand::Unknown(format!("unknown command '/{other}'")),
    };
    Some(cmd)
}

/// Open the conversation and run the read-send-print loop until EOF or `/quit`.
pub async fn run_chat(state: &AppState, args: ChatArgs, json: bool) -> Result<()> {
    let vars: ContextVars = args.vars.into_iter().collect();

    let options = match args.history {
        Some(id) => OpenOptions::resume(&args.prompt, id).with_vars(vars),
        None => OpenOptions::new(&args.prompt).with_vars(vars),
    };

    let mut conversation = match args.user.as_deref() {
        Some(user_id) => {
            Conversation::open_for_experiment(
                &state.deps,
                &state.resolver,
                user_id,
                args.experiment.as_deref(),
                options,
            )
            .await?
        }
        None => Conversation::open(&state.deps, options).await?,
    };

    let interactive = console::user_attended() && !json;
    if interactive {
        println!();
        println!(
            "  {} {} {}",
            style("parley").bold().cyan(),
            style(&conversation.template().name).bold(),
            style(format!("(history {})", conversation.history_id())).dim()
        );
        println!("  {}", style("Type /quit to leave, /rate up|down to rate the last reply.").dim());
        println!();
    }

    let (mut input, mut out): (ChatInput, Box<dyn Write + Send>) = if interactive {
        let prompt = format!("{} ", style("you>").green().bold());
        let (input, writer) = ChatInput::terminal(prompt)
            .map_err(|e| anyhow::anyhow!("failed to initialize input: {e}"))?;
        (input, Box::new(writer))
    } else {
        (ChatInput::stdin(), Box::new(std::io::stdout()))
    };

    let mut last_reply: Option<Uuid> = None;

    loop {
        let line = match input.read_line().await {
            InputEvent::Eof => break,
            InputEvent::Interrupted => {
                writeln!(out, "  {}", style("Press Ctrl+D or type /quit to leave.").dim())?;
                continue;
            }
            InputEvent::Message(line) => line,
        };
        if line.is_empty() {
            continue;
        }

        if let Some(command) = parse_command(&line) {
            match command {
                LineCommand::Quit => break,
                LineCommand::ShowId => writeln!(out, "{}", conversation.history_id())?,
                LineCommand::Rate(thumb) => match last_reply {
                    Some(message_id) => {
                        conversation.rate_message(&message_id, thumb).await?;
                        if !json {
                            writeln!(out, "  {} rated {thumb}", style("✓").green())?;
                        }
                    }
                    None => writeln!(out, "  {} nothing to rate yet", style("!").yellow())?,
                },
                LineCommand::Unknown(msg) => writeln!(out, "  {} {msg}", style("!").yellow())?,
            }
            continue;
        }

        let request = TurnRequest::new(line).with_retry(args.retry);
        match conversation.send(request).await {
            Ok(reply) => {
                last_reply = Some(reply.message_id);
                print_reply(&mut out, conversation.history_id(), &reply, json, interactive)?;
            }
            Err(e) => {
                tracing::debug!(history_id = %conversation.history_id(), error = %e, "turn failed");
                if json {
                    writeln!(out, "{}", serde_json::json!({ "error": e.to_string() }))?;
                } else {
                    writeln!(out, "  {} {e}", style("✗").red().bold())?;
                }
            }
        }
    }
    drop(input);

    if interactive {
        println!();
        println!(
            "  {} history {}",
            style("Saved").dim(),
            style(conversation.history_id()).cyan()
        );
    }

    Ok(())
}

fn print_reply(
    out: &mut dyn Write,
    history_id: Uuid,
    reply: &TurnReply,
    json: bool,
    interactive: bool,
) -> Result<()> {
    if json {
        let line = serde_json::json!({
            "history_id": history_id,
            "message_id": reply.message_id,
            "config": reply.config_name,
            "text": reply.text,
            "structured": reply.structured,
            "tool_data": reply.tool_data,
        });
        writeln!(out, "{line}")?;
        return Ok(());
    }

    if interactive {
        writeln!(out, "{} {}", style("bot>").cyan().bold(), reply.text)?;
        writeln!(out, "{}", style(format!("     via {}", reply.config_name)).dim())?;
    } else {
        writeln!(out, "{}", reply.text)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert!(parse_command("hello").is_none());
        assert!(matches!(parse_command("/quit"), Some(LineCommand::Quit)));
        assert!(matches!(parse_command("/rate up"), Some(LineCommand::Rate(Thumb::Up))));
        assert!(matches!(parse_command("/rate down"), Some(LineCommand::Rate(Thumb::Down))));
        assert!(matches!(parse_command("/rate sideways"), Some(LineCommand::Unknown(_))));
        assert!(matches!(parse_command("/id"), Some(LineCommand::ShowId)));
        assert!(matches!(parse_command("/dance"), Some(LineCommand::Unknown(_))));
    }
}
