use std::io::{self, Write};

use anyhow::Result;
use bat::WrappingMode;
use cliclack::spinner;
use console::{style, Term};
use pilot::errors::AgentError;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::warn;

use super::{Input, Prompt};

const PROMPT: &str = "Query: ";
const THEME: &str = "zenburn";

pub struct RustylinePrompt {
    spinner: cliclack::ProgressBar,
    editor: DefaultEditor,
}

impl RustylinePrompt {
    pub fn new() -> Result<Self> {
        Ok(RustylinePrompt {
            spinner: spinner(),
            editor: DefaultEditor::new()?,
        })
    }
}

fn print_markdown(content: &str) {
    let printed = bat::PrettyPrinter::new()
        .input(bat::Input::from_bytes(content.as_bytes()))
        .theme(THEME)
        .language("Markdown")
        .colored_output(Term::stdout().is_term())
        .wrapping_mode(WrappingMode::Character)
        .print();
    if let Err(e) = printed {
        warn!("markdown rendering failed: {}", e);
        println!("{}", content);
    }
}

impl Prompt for RustylinePrompt {
    fn render(&mut self, answer: &str) {
        println!();
        print_markdown(answer);
        println!();
        if let Err(e) = io::stdout().flush() {
            warn!("failed to flush stdout: {}", e);
        }
    }

    fn render_error(&mut self, error: &AgentError) {
        eprintln!("\n{} {}", style("Error:").red().bold(), error);
    }

    fn show_busy(&mut self) {
        self.spinner = spinner();
        self.spinner.start("Thinking...");
    }

    fn hide_busy(&self) {
        self.spinner.stop("");
    }

    fn get_input(&mut self) -> Result<Input> {
        match self.editor.readline(PROMPT) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    // History is a convenience; losing an entry is harmless
                    let _ = self.editor.add_history_entry(line.as_str());
                }
                Ok(Input::from_line(&line))
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => Ok(Input::exit()),
            Err(e) => {
                eprintln!("Input error: {}", e);
                Ok(Input::exit())
            }
        }
    }

    fn close(&self) {
        println!("Goodbye!");
    }

    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any {
        panic!("Not implemented");
    }
}
