//! Interactive confirmation capability

use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::io::IsTerminal;
use tracing::debug;

use crate::PoolError;

/// Asks the user before destructive actions
pub trait Prompt {
    /// True when there is someone at a terminal to answer
    fn is_interactive(&self) -> bool;

    /// Ask a yes/no question; `default` is the answer for an empty reply
    fn confirm(&self, message: &str, default: bool) -> Result<bool, PoolError>;

    /// Show informational text ahead of a question
    fn show(&self, text: &str);
}

/// Terminal prompt backed by rustyline
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    pub fn new() -> Self {
        Self
    }
}

impl Prompt for TerminalPrompt {
    fn is_interactive(&self) -> bool {
        std::io::stdin().is_terminal() && std::io::stderr().is_terminal()
    }

    fn confirm(&self, message: &str, default: bool) -> Result<bool, PoolError> {
        debug!(%message, default, "TerminalPrompt::confirm: called");
        let mut editor = DefaultEditor::new().map_err(|e| PoolError::Prompt(e.to_string()))?;
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        let question = format!("{} {} ", message, hint);
        loop {
            match editor.readline(&question) {
                Ok(line) => match parse_answer(&line, default) {
                    Some(answer) => {
                        debug!(answer, "TerminalPrompt::confirm: answered");
                        return Ok(answer);
                    }
                    None => eprintln!("Please answer y or n."),
                },
                Err(ReadlineError::Interrupted) => {
                    debug!("TerminalPrompt::confirm: interrupted");
                    return Err(PoolError::Interrupted);
                }
                Err(ReadlineError::Eof) => {
                    debug!("TerminalPrompt::confirm: eof, declining");
                    return Ok(false);
                }
                Err(e) => return Err(PoolError::Prompt(e.to_string())),
            }
        }
    }

    fn show(&self, text: &str) {
        eprintln!("{}", text);
    }
}

/// Interpret a reply; `None` means the reply was not understood
pub fn parse_answer(line: &str, default: bool) -> Option<bool> {
    match line.trim().to_lowercase().as_str() {
        "" => Some(default),
        "y" | "yes" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
pub use scripted::ScriptedPrompt;
