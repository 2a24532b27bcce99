use super::{FieldKind, Form, FormField, Interface, KeyOutcome, Menu, TextPrompt};
use crate::input_handler::KeyPress;
use crossterm::style::Print;
use crossterm::terminal::SetTitle;
use crossterm::{queue, QueueableCommand};
use serde_json::{Map, Value};
use std::io::{self, Stdout, Write};

const DEFAULT_TITLE: &str = "Mindspace";

/// An open prompt and what has been typed into it so far.
#[derive(Debug)]
enum Prompt {
    Menu {
        menu: Menu,
        /// Indices of the items that can be chosen, in display order.
        choices: Vec<usize>,
        digits: String,
    },
    Text {
        prompt: TextPrompt,
        buffer: String,
    },
    Form {
        form: Form,
        field: usize,
        values: Map<String, Value>,
        buffer: String,
    },
}

/// Line-oriented terminal front end. Expects raw mode, so every line ends
/// with `\r\n`.
pub struct ConsoleInterface<W: Write = Stdout> {
    out: W,
    prompt: Option<Prompt>,
}

impl ConsoleInterface<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleInterface<W> {
    pub fn new(out: W) -> Self {
        Self { out, prompt: None }
    }

    pub fn has_prompt(&self) -> bool {
        self.prompt.is_some()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print(&mut self, text: &str) {
        if let Err(e) = queue!(self.out, Print(text)).and_then(|_| self.out.flush()) {
            log::error!("[Session] Failed to write to terminal: {}", e);
        }
    }

    fn line(&mut self, text: &str) {
        let text = text.replace('\n', "\r\n");
        self.print(&format!("{}\r\n", text));
    }

    fn close_prompt(&mut self, note: &str) -> KeyOutcome {
        self.prompt = None;
        self.line(note);
        KeyOutcome::Consumed
    }

    fn menu_key(&mut self, key: &KeyPress) -> KeyOutcome {
        let Some(Prompt::Menu {
            menu,
            choices,
            digits,
        }) = self.prompt.as_mut()
        else {
            return KeyOutcome::Ignored;
        };
        if key.is("ESCAPE") {
            return if menu.escapable {
                self.close_prompt("Closed.")
            } else {
                KeyOutcome::Ignored
            };
        }
        if key.is("BACKSPACE") {
            if digits.pop().is_some() {
                self.print("\u{8} \u{8}");
            }
            return KeyOutcome::Consumed;
        }
        if let Some(c) = key.text.filter(char::is_ascii_digit) {
            digits.push(c);
            self.print(&c.to_string());
            return KeyOutcome::Consumed;
        }
        if !key.is("ENTER") {
            return KeyOutcome::Ignored;
        }
        let picked = digits
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|n| choices.get(n))
            .and_then(|&index| menu.items.get(index))
            .and_then(|item| item.action.as_ref())
            .map(|reply| reply.invoke());
        digits.clear();
        match picked {
            Some(command) => {
                self.prompt = None;
                self.line("");
                KeyOutcome::Answered(command)
            }
            None => {
                self.line("");
                self.line("Invalid selection.");
                KeyOutcome::Consumed
            }
        }
    }

    fn text_key(&mut self, key: &KeyPress) -> KeyOutcome {
        let Some(Prompt::Text { prompt, buffer }) = self.prompt.as_mut() else {
            return KeyOutcome::Ignored;
        };
        if key.is("ESCAPE") {
            if prompt.escapable {
                return self.close_prompt("Cancelled.");
            }
            return KeyOutcome::Consumed;
        }
        if key.is("BACKSPACE") {
            if buffer.pop().is_some() {
                self.print("\u{8} \u{8}");
            }
            return KeyOutcome::Consumed;
        }
        if key.is("ENTER") {
            // Multiline input ends with a line holding a single dot.
            if prompt.multiline {
                let last_line = buffer.rsplit('\n').next().unwrap_or_default();
                if last_line != "." {
                    buffer.push('\n');
                    self.print("\r\n");
                    return KeyOutcome::Consumed;
                }
                buffer.truncate(buffer.len() - 1);
                if buffer.ends_with('\n') {
                    buffer.pop();
                }
            }
            let answer = prompt.reply.answer(Value::String(std::mem::take(buffer)));
            self.prompt = None;
            self.line("");
            return KeyOutcome::Answered(answer);
        }
        if let Some(c) = key.text {
            buffer.push(c);
            self.print(&c.to_string());
        }
        KeyOutcome::Consumed
    }

    fn form_key(&mut self, key: &KeyPress) -> KeyOutcome {
        let Some(Prompt::Form {
            form,
            field,
            values,
            buffer,
        }) = self.prompt.as_mut()
        else {
            return KeyOutcome::Ignored;
        };
        if key.is("ESCAPE") {
            if form.cancel.is_some() {
                return self.close_prompt("Cancelled.");
            }
            return KeyOutcome::Consumed;
        }
        if key.is("BACKSPACE") {
            if buffer.pop().is_some() {
                self.print("\u{8} \u{8}");
            }
            return KeyOutcome::Consumed;
        }
        if !key.is("ENTER") {
            if let Some(c) = key.text {
                buffer.push(c);
                let hidden = matches!(
                    form.fields.get(*field),
                    Some(FormField::Input {
                        kind: FieldKind::Line { hidden: true },
                        ..
                    })
                );
                let echo = if hidden { '*' } else { c };
                self.print(&echo.to_string());
            }
            return KeyOutcome::Consumed;
        }

        let Some(FormField::Input {
            name, value, kind, ..
        }) = form.fields.get(*field)
        else {
            return self.advance_form(true);
        };
        let typed = std::mem::take(buffer);
        match field_value(kind, value, typed.trim()) {
            Ok(answer) => {
                values.insert(name.clone(), answer);
                *field += 1;
                self.line("");
                self.advance_form(true)
            }
            Err(problem) => {
                self.line("");
                self.line(&problem);
                self.ask_field();
                KeyOutcome::Consumed
            }
        }
    }

    /// Prints labels up to the next input and asks for it. Past the last
    /// field the form is submitted, or with `submit` unset, waits for Enter.
    fn advance_form(&mut self, submit: bool) -> KeyOutcome {
        loop {
            let Some(Prompt::Form {
                form,
                field,
                values,
                ..
            }) = self.prompt.as_mut()
            else {
                return KeyOutcome::Ignored;
            };
            match form.fields.get(*field) {
                Some(FormField::Label(text)) => {
                    let text = text.clone();
                    *field += 1;
                    self.line(&text);
                }
                Some(FormField::Input { .. }) => {
                    self.ask_field();
                    return KeyOutcome::Consumed;
                }
                None if !submit => {
                    self.line("Press Enter to confirm.");
                    return KeyOutcome::Consumed;
                }
                None => {
                    let answer = form.reply.answer(Value::Object(std::mem::take(values)));
                    self.prompt = None;
                    return KeyOutcome::Answered(answer);
                }
            }
        }
    }

    fn ask_field(&mut self) {
        let Some(Prompt::Form { form, field, .. }) = self.prompt.as_ref() else {
            return;
        };
        let Some(FormField::Input {
            title, value, kind, ..
        }) = form.fields.get(*field)
        else {
            return;
        };
        let mut lines = Vec::new();
        if let FieldKind::Choice(options) = kind {
            for (n, (_, label)) in options.iter().enumerate() {
                lines.push(format!("{}. {}", n + 1, label));
            }
        }
        let current = match kind {
            FieldKind::Line { hidden: true } => String::new(),
            _ => display_value(value),
        };
        let question = if current.is_empty() {
            format!("{}: ", title)
        } else {
            format!("{} [{}]: ", title, current)
        };
        for line in lines {
            self.line(&line);
        }
        self.print(&question);
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Turns what was typed into the value sent back. Empty input keeps the
/// current value; answers go back as strings the way the server expects.
fn field_value(kind: &FieldKind, current: &Value, typed: &str) -> Result<Value, String> {
    if typed.is_empty() {
        return Ok(match (kind, current) {
            (FieldKind::Choice(_), Value::Null) => Value::Null,
            (FieldKind::Int, Value::Null) => Value::String("0".to_string()),
            (FieldKind::Float, Value::Null) => Value::String("0.0".to_string()),
            _ => Value::String(display_value(current)),
        });
    }
    match kind {
        FieldKind::Int => typed
            .parse::<i64>()
            .map(|n| Value::String(n.to_string()))
            .map_err(|_| "Please enter a whole number.".to_string()),
        FieldKind::Float => typed
            .parse::<f64>()
            .map(|_| Value::String(typed.to_string()))
            .map_err(|_| "Please enter a number.".to_string()),
        FieldKind::Choice(options) => {
            let by_number = typed
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|n| options.get(n));
            let by_name = || {
                options
                    .iter()
                    .find(|(value, label)| value == typed || label == typed)
            };
            by_number
                .or_else(by_name)
                .map(|(value, _)| Value::String(value.clone()))
                .ok_or_else(|| "Please pick one of the options.".to_string())
        }
        FieldKind::Line { .. } | FieldKind::Text => Ok(Value::String(typed.to_string())),
    }
}

impl<W: Write> Interface for ConsoleInterface<W> {
    fn write_message(&mut self, text: &str, channel: Option<&str>) {
        match channel {
            Some(channel) => self.line(&format!("[{}] {}", channel, text)),
            None => self.line(text),
        }
    }

    fn set_title(&mut self, username: Option<&str>) {
        let title = match username {
            Some(name) => format!("{} ({})", DEFAULT_TITLE, name),
            None => DEFAULT_TITLE.to_string(),
        };
        if let Err(e) = self.out.queue(SetTitle(title)).and_then(|out| out.flush()) {
            log::warn!("[Session] Failed to set title: {}", e);
        }
    }

    fn open_url(&mut self, title: &str, href: &str) {
        self.line(&format!("{}: {}", title, href));
    }

    fn show_menu(&mut self, menu: Menu) {
        self.line(&menu.title);
        let mut choices = Vec::new();
        for (index, item) in menu.items.iter().enumerate() {
            match item.action {
                Some(_) => {
                    choices.push(index);
                    self.line(&format!("{}. {}", choices.len(), item.name));
                }
                None => self.line(&item.name),
            }
        }
        if menu.escapable {
            self.line("Type a number and press Enter, or Escape to close.");
        } else {
            self.line("Type a number and press Enter.");
        }
        self.prompt = Some(Prompt::Menu {
            menu,
            choices,
            digits: String::new(),
        });
    }

    fn show_form(&mut self, form: Form) {
        self.line(&form.title);
        match &form.cancel {
            Some(cancel) => self.line(&format!("Enter to {}, Escape to {}.", form.ok, cancel)),
            None => self.line(&format!("Press Enter after each field to {}.", form.ok)),
        }
        self.prompt = Some(Prompt::Form {
            form,
            field: 0,
            values: Map::new(),
            buffer: String::new(),
        });
        self.advance_form(false);
    }

    fn get_text(&mut self, prompt: TextPrompt) {
        self.line(&prompt.message);
        if prompt.multiline {
            self.line("End with a line containing only a dot.");
        }
        self.print(&prompt.value.replace('\n', "\r\n"));
        let buffer = prompt.value.clone();
        self.prompt = Some(Prompt::Text { prompt, buffer });
    }

    fn copy(&mut self, text: &str) {
        self.line(&format!("Copy: {}", text));
    }

    fn handle_key(&mut self, key: &KeyPress) -> KeyOutcome {
        match self.prompt {
            None => KeyOutcome::Ignored,
            Some(Prompt::Menu { .. }) => self.menu_key(key),
            Some(Prompt::Text { .. }) => self.text_key(key),
            Some(Prompt::Form { .. }) => self.form_key(key),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::OutboundCommand;
    use crate::ui::{MenuItem, Reply};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn console() -> ConsoleInterface<Vec<u8>> {
        ConsoleInterface::new(Vec::new())
    }

    fn reply(command: &str) -> Reply {
        Reply {
            command: command.to_string(),
            args: vec![json!(1)],
            kwargs: Map::new(),
        }
    }

    fn typed(console: &mut ConsoleInterface<Vec<u8>>, text: &str) {
        for c in text.chars() {
            assert_eq!(console.handle_key(&KeyPress::char(c)), KeyOutcome::Consumed);
        }
    }

    fn enter() -> KeyPress {
        KeyPress::new("ENTER")
    }

    #[test]
    fn test_messages_end_with_carriage_return() {
        let mut console = console();
        console.write_message("Hello\nthere", Some("ooc"));
        let out = String::from_utf8(console.into_inner()).unwrap();
        assert_eq!(out, "[ooc] Hello\r\nthere\r\n");
    }

    #[test]
    fn test_keys_pass_through_without_prompt() {
        let mut console = console();
        assert_eq!(console.handle_key(&KeyPress::char('n')), KeyOutcome::Ignored);
    }

    #[test]
    fn test_menu_selection_skips_headings() {
        let mut console = console();
        console.show_menu(Menu {
            title: "Exits".to_string(),
            items: vec![
                MenuItem {
                    name: "Outside".to_string(),
                    action: None,
                },
                MenuItem {
                    name: "North".to_string(),
                    action: Some(reply("go")),
                },
            ],
            escapable: false,
        });
        typed(&mut console, "1");
        assert_eq!(
            console.handle_key(&enter()),
            KeyOutcome::Answered(OutboundCommand::new("go").with_args(vec![json!(1)]))
        );
        assert!(!console.has_prompt());
    }

    #[test]
    fn test_escape_only_closes_escapable_menu() {
        let mut console = console();
        let menu = Menu {
            title: "Stuck".to_string(),
            items: Vec::new(),
            escapable: false,
        };
        console.show_menu(menu.clone());
        assert_eq!(console.handle_key(&KeyPress::new("ESCAPE")), KeyOutcome::Ignored);
        assert!(console.has_prompt());

        console.show_menu(Menu {
            escapable: true,
            ..menu
        });
        assert_eq!(console.handle_key(&KeyPress::new("ESCAPE")), KeyOutcome::Consumed);
        assert!(!console.has_prompt());
    }

    #[test]
    fn test_text_prompt_appends_answer() {
        let mut console = console();
        console.get_text(TextPrompt {
            message: "Describe yourself".to_string(),
            reply: reply("describe"),
            value: "ta".to_string(),
            multiline: false,
            escapable: true,
        });
        console.handle_key(&KeyPress::new("BACKSPACE"));
        typed(&mut console, "all");
        assert_eq!(
            console.handle_key(&enter()),
            KeyOutcome::Answered(
                OutboundCommand::new("describe").with_args(vec![json!(1), json!("tall")])
            )
        );
    }

    #[test]
    fn test_multiline_prompt_ends_on_dot() {
        let mut console = console();
        console.get_text(TextPrompt {
            message: "Text".to_string(),
            reply: reply("write"),
            value: String::new(),
            multiline: true,
            escapable: false,
        });
        typed(&mut console, "one");
        assert_eq!(console.handle_key(&enter()), KeyOutcome::Consumed);
        typed(&mut console, "two");
        console.handle_key(&enter());
        typed(&mut console, ".");
        assert_eq!(
            console.handle_key(&enter()),
            KeyOutcome::Answered(
                OutboundCommand::new("write").with_args(vec![json!(1), json!("one\ntwo")])
            )
        );
    }

    #[test]
    fn test_form_collects_fields() {
        let mut console = console();
        console.show_form(Form {
            title: "Edit".to_string(),
            fields: vec![
                FormField::Label("General".to_string()),
                FormField::Input {
                    name: "name".to_string(),
                    title: "Name".to_string(),
                    value: json!("Chair"),
                    kind: FieldKind::Line { hidden: false },
                },
                FormField::Input {
                    name: "size".to_string(),
                    title: "Size".to_string(),
                    value: json!(3),
                    kind: FieldKind::Int,
                },
                FormField::Input {
                    name: "colour".to_string(),
                    title: "Colour".to_string(),
                    value: json!("red"),
                    kind: FieldKind::Choice(vec![
                        ("red".to_string(), "Red".to_string()),
                        ("blue".to_string(), "Blue".to_string()),
                    ]),
                },
            ],
            reply: reply("edit"),
            ok: "Save".to_string(),
            cancel: Some("Cancel".to_string()),
        });
        // Keep the name.
        assert_eq!(console.handle_key(&enter()), KeyOutcome::Consumed);
        typed(&mut console, "big");
        assert_eq!(console.handle_key(&enter()), KeyOutcome::Consumed);
        console.handle_key(&KeyPress::new("BACKSPACE"));
        console.handle_key(&KeyPress::new("BACKSPACE"));
        console.handle_key(&KeyPress::new("BACKSPACE"));
        typed(&mut console, "4");
        assert_eq!(console.handle_key(&enter()), KeyOutcome::Consumed);
        typed(&mut console, "2");
        let answer = match console.handle_key(&enter()) {
            KeyOutcome::Answered(answer) => answer,
            other => panic!("Expected an answer, got {:?}", other),
        };
        assert_eq!(answer.name, "edit");
        assert_eq!(
            answer.args,
            vec![json!(1), json!({"name": "Chair", "size": "4", "colour": "blue"})]
        );
        let out = String::from_utf8(console.into_inner()).unwrap();
        assert!(out.contains("Please enter a whole number."));
    }

    #[test]
    fn test_form_without_cancel_swallows_escape() {
        let mut console = console();
        console.show_form(Form {
            title: "Sign".to_string(),
            fields: vec![FormField::Input {
                name: "text".to_string(),
                title: "Text".to_string(),
                value: Value::Null,
                kind: FieldKind::Text,
            }],
            reply: reply("sign"),
            ok: "OK".to_string(),
            cancel: None,
        });
        assert_eq!(console.handle_key(&KeyPress::new("ESCAPE")), KeyOutcome::Consumed);
        assert!(console.has_prompt());
    }
}
