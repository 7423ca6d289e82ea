use std::io::{self, BufRead, IsTerminal, Write};

use pilot::errors::{AgentError, AgentResult};
use pilot::mcp::CredentialPrompt;

/// Asks on the terminal for credentials missing from the command line.
/// Falls back to plain line input when stdin is not a terminal.
pub struct TerminalCredentials;

fn read_line(label: &str) -> AgentResult<String> {
    eprint!("{}: ", label);
    io::stderr().flush().ok();

    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| AgentError::Configuration(format!("cannot read {}: {}", label, e)))?;
    if read == 0 {
        return Err(AgentError::Configuration(format!(
            "{} required but input ended",
            label
        )));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn prompt_error(label: &str, e: io::Error) -> AgentError {
    AgentError::Configuration(format!("cannot read {}: {}", label, e))
}

impl CredentialPrompt for TerminalCredentials {
    fn username(&self) -> AgentResult<String> {
        if io::stdin().is_terminal() {
            cliclack::input("Username")
                .interact()
                .map_err(|e| prompt_error("username", e))
        } else {
            read_line("Username")
        }
    }

    fn password(&self) -> AgentResult<String> {
        if io::stdin().is_terminal() {
            cliclack::password("Password")
                .mask('▪')
                .interact()
                .map_err(|e| prompt_error("password", e))
        } else {
            read_line("Password")
        }
    }
}
