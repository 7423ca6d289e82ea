use anyhow::Result;
use pilot::errors::AgentError;
use pilot::models::tool::Tool;

pub mod credentials;
pub mod rustyline;

/// The terminal side of a session
pub trait Prompt {
    /// Show an answer from the agent
    fn render(&mut self, answer: &str);
    fn render_error(&mut self, error: &AgentError);
    fn get_input(&mut self) -> Result<Input>;
    fn show_busy(&mut self);
    fn hide_busy(&self);
    fn close(&self);
    fn ready(&self, tools: &[Tool]) {
        let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
        println!();
        println!("Connected to server with tools: {}", names.join(", "));
        println!("Type your queries or 'quit' to exit.");
        println!();
    }
    // Used for testing. Allows us to downcast to any type.
    #[cfg(test)]
    fn as_any(&self) -> &dyn std::any::Any;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Input {
    pub input_type: InputType,
    pub content: Option<String>, // Only set for InputType::Message
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputType {
    AskAgain, // Ask the user for input again. Control flow command.
    Message,  // User sent a query
    Exit,     // User wants to exit the session
}

impl Input {
    pub fn exit() -> Self {
        Input {
            input_type: InputType::Exit,
            content: None,
        }
    }

    /// Interpret one line typed at the prompt
    pub fn from_line(line: &str) -> Self {
        let text = line.trim();
        if text.is_empty() {
            Input {
                input_type: InputType::AskAgain,
                content: None,
            }
        } else if text.eq_ignore_ascii_case("quit") {
            Input::exit()
        } else {
            Input {
                input_type: InputType::Message,
                content: Some(text.to_string()),
            }
        }
    }
}
