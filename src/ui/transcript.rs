use super::{Form, Interface, KeyOutcome, Menu, TextPrompt};
use crate::input_handler::KeyPress;
use std::cell::RefCell;
use std::rc::Rc;

/// Everything shown through a [`TranscriptInterface`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Transcript {
    pub messages: Vec<String>,
    pub title: Option<String>,
    pub urls: Vec<(String, String)>,
    pub menus: Vec<Menu>,
    pub forms: Vec<Form>,
    pub prompts: Vec<TextPrompt>,
    pub copied: Vec<String>,
}

/// Remembers what it was asked to show instead of drawing it. Used when
/// there is no terminal to draw on; never takes a key press.
#[derive(Debug, Default)]
pub struct TranscriptInterface {
    transcript: Rc<RefCell<Transcript>>,
}

impl TranscriptInterface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle that stays readable after the interface is boxed.
    pub fn transcript(&self) -> Rc<RefCell<Transcript>> {
        Rc::clone(&self.transcript)
    }
}

impl Interface for TranscriptInterface {
    fn write_message(&mut self, text: &str, channel: Option<&str>) {
        log::info!("[Session] {}{}", channel.map(|c| format!("[{}] ", c)).unwrap_or_default(), text);
        self.transcript.borrow_mut().messages.push(text.to_string());
    }

    fn write_special(&mut self, text: &str) {
        log::info!("[Session] --- {} ---", text);
    }

    fn set_title(&mut self, username: Option<&str>) {
        self.transcript.borrow_mut().title = username.map(str::to_string);
    }

    fn open_url(&mut self, title: &str, href: &str) {
        self.transcript
            .borrow_mut()
            .urls
            .push((title.to_string(), href.to_string()));
    }

    fn show_menu(&mut self, menu: Menu) {
        self.transcript.borrow_mut().menus.push(menu);
    }

    fn show_form(&mut self, form: Form) {
        self.transcript.borrow_mut().forms.push(form);
    }

    fn get_text(&mut self, prompt: TextPrompt) {
        self.transcript.borrow_mut().prompts.push(prompt);
    }

    fn copy(&mut self, text: &str) {
        self.transcript.borrow_mut().copied.push(text.to_string());
    }

    fn handle_key(&mut self, _key: &KeyPress) -> KeyOutcome {
        KeyOutcome::Ignored
    }
}
