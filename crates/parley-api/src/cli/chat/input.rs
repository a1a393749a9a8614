//! Line input for the chat loop.
//!
//! On a terminal, `rustyline_async::Readline` gives line editing and reports
//! Ctrl+C and Ctrl+D as events. Piped input is read line by line.

use rustyline_async::{Readline, ReadlineError, ReadlineEvent, SharedWriter};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

/// Events produced by the input handler.
#[derive(Debug, PartialEq, Eq)]
pub enum InputEvent {
    /// A submitted line, trimmed.
    Message(String),
    /// End of input (Ctrl+D or a closed pipe).
    Eof,
    /// Ctrl+C at the prompt.
    Interrupted,
}

/// Where chat lines come from.
pub enum ChatInput {
    Terminal(Readline),
    Piped(Lines<Box<dyn AsyncBufRead + Unpin + Send>>),
}

impl ChatInput {
    /// Readline on the terminal with the given prompt.
    ///
    /// Output written through the returned `SharedWriter` is printed above
    /// the prompt instead of over it.
    pub fn terminal(prompt: String) -> Result<(Self, SharedWriter), ReadlineError> {
        let (rl, writer) = Readline::new(prompt)?;
        Ok((Self::Terminal(rl), writer))
    }

    /// Plain lines from stdin.
    pub fn stdin() -> Self {
        Self::from_reader(BufReader::new(tokio::io::stdin()))
    }

    pub fn from_reader(reader: impl AsyncBufRead + Unpin + Send + 'static) -> Self {
        let reader: Box<dyn AsyncBufRead + Unpin + Send> = Box::new(reader);
        Self::Piped(reader.lines())
    }

    /// Read the next line of input.
    pub async fn read_line(&mut self) -> InputEvent {
        match self {
            Self::Terminal(rl) => match rl.readline().await {
                Ok(ReadlineEvent::Line(line)) => InputEvent::Message(line.trim().to_string()),
                Ok(ReadlineEvent::Eof) => InputEvent::Eof,
                Ok(ReadlineEvent::Interrupted) => InputEvent::Interrupted,
                Err(e) => {
                    tracing::debug!(error = %e, "readline failed, ending input");
                    InputEvent::Eof
                }
            },
            Self::Piped(lines) => match lines.next_line().await {
                Ok(Some(line)) => InputEvent::Message(line.trim().to_string()),
                Ok(None) => InputEvent::Eof,
                Err(e) => {
                    tracing::debug!(error = %e, "stdin read failed, ending input");
                    InputEvent::Eof
                }
            },
        }
    }
}
