// User-facing collaborators: message log, menus, forms and text prompts.

pub mod console;
pub mod transcript;

pub use console::ConsoleInterface;
pub use transcript::TranscriptInterface;

use crate::input_handler::KeyPress;
use crate::protocol::OutboundCommand;
use serde_json::{Map, Value};

/// A command the server wants sent back, with positional arguments that the
/// answer gets appended to.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub command: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl Reply {
    /// Builds the outbound command carrying `answer` as its last argument.
    pub fn answer(&self, answer: Value) -> OutboundCommand {
        let mut args = self.args.clone();
        args.push(answer);
        OutboundCommand::new(self.command.clone())
            .with_args(args)
            .with_kwargs(self.kwargs.clone())
    }

    pub fn invoke(&self) -> OutboundCommand {
        OutboundCommand::new(self.command.clone())
            .with_args(self.args.clone())
            .with_kwargs(self.kwargs.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuItem {
    pub name: String,
    /// `None` for headings.
    pub action: Option<Reply>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Menu {
    pub title: String,
    pub items: Vec<MenuItem>,
    pub escapable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextPrompt {
    pub message: String,
    pub reply: Reply,
    pub value: String,
    pub multiline: bool,
    pub escapable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    /// Single line input; `hidden` masks the echo.
    Line { hidden: bool },
    /// Multiline text.
    Text,
    Int,
    Float,
    /// `(value, label)` pairs.
    Choice(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormField {
    Label(String),
    Input {
        name: String,
        title: String,
        value: Value,
        kind: FieldKind,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Form {
    pub title: String,
    pub fields: Vec<FormField>,
    pub reply: Reply,
    pub ok: String,
    pub cancel: Option<String>,
}

/// Everything the session needs from whatever presents the game to the
/// user.
pub trait Interface {
    fn write_message(&mut self, text: &str, channel: Option<&str>);

    fn write_special(&mut self, text: &str) {
        self.write_message(&format!("--- {} ---", text), None);
    }

    fn set_title(&mut self, username: Option<&str>);

    fn open_url(&mut self, title: &str, href: &str);

    fn show_menu(&mut self, menu: Menu);

    fn show_form(&mut self, form: Form);

    fn get_text(&mut self, prompt: TextPrompt);

    fn copy(&mut self, text: &str);

    /// Offers a key press to any open prompt. Returns `Consumed` when the
    /// prompt took it, with the answer command if the prompt completed.
    fn handle_key(&mut self, key: &KeyPress) -> KeyOutcome;
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyOutcome {
    /// No prompt wanted the key; it belongs to the server.
    Ignored,
    Consumed,
    Answered(OutboundCommand),
}
