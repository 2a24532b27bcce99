// Key press model shared by the console prompts and the server's key bindings

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

/// One key press, named the way the server's key bindings expect:
/// upper-cased browser key names (`"A"`, `"ENTER"`, `"ARROWUP"`, `"F1"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPress {
    pub key: String,
    /// Any of `"ctrl"`, `"shift"`, `"alt"`, in that order.
    pub modifiers: Vec<&'static str>,
    /// The character typed, for prompts that collect text.
    pub text: Option<char>,
}

impl KeyPress {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            modifiers: Vec::new(),
            text: None,
        }
    }

    /// A printable key; its name is the upper-cased character.
    pub fn char(c: char) -> Self {
        Self {
            key: c.to_uppercase().collect(),
            modifiers: Vec::new(),
            text: Some(c),
        }
    }

    pub fn with_modifier(mut self, modifier: &'static str) -> Self {
        if !self.modifiers.contains(&modifier) {
            self.modifiers.push(modifier);
        }
        self
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| *m == modifier)
    }

    pub fn is(&self, key: &str) -> bool {
        self.key == key
    }

    /// Ctrl+Q leaves the client.
    pub fn is_quit(&self) -> bool {
        self.key == "Q" && self.has_modifier("ctrl")
    }

    /// Converts a terminal key event. Releases, repeats of nothing and keys
    /// without a name the server understands give `None`.
    pub fn from_event(event: &KeyEvent) -> Option<Self> {
        if event.kind == KeyEventKind::Release {
            return None;
        }
        let (key, text) = match event.code {
            KeyCode::Char(c) => {
                // Terminals report Ctrl+letter as the bare letter.
                let text = if event.modifiers.contains(KeyModifiers::CONTROL) {
                    None
                } else {
                    Some(c)
                };
                (c.to_uppercase().collect::<String>(), text)
            }
            KeyCode::Enter => ("ENTER".to_string(), None),
            KeyCode::Esc => ("ESCAPE".to_string(), None),
            KeyCode::Tab => ("TAB".to_string(), None),
            KeyCode::BackTab => ("TAB".to_string(), None),
            KeyCode::Backspace => ("BACKSPACE".to_string(), None),
            KeyCode::Delete => ("DELETE".to_string(), None),
            KeyCode::Insert => ("INSERT".to_string(), None),
            KeyCode::Home => ("HOME".to_string(), None),
            KeyCode::End => ("END".to_string(), None),
            KeyCode::PageUp => ("PAGEUP".to_string(), None),
            KeyCode::PageDown => ("PAGEDOWN".to_string(), None),
            KeyCode::Up => ("ARROWUP".to_string(), None),
            KeyCode::Down => ("ARROWDOWN".to_string(), None),
            KeyCode::Left => ("ARROWLEFT".to_string(), None),
            KeyCode::Right => ("ARROWRIGHT".to_string(), None),
            KeyCode::F(n) => (format!("F{}", n), None),
            _ => return None,
        };

        let mut press = KeyPress {
            key,
            modifiers: Vec::new(),
            text,
        };
        if event.modifiers.contains(KeyModifiers::CONTROL) {
            press = press.with_modifier("ctrl");
        }
        if event.modifiers.contains(KeyModifiers::SHIFT) || event.code == KeyCode::BackTab {
            press = press.with_modifier("shift");
        }
        if event.modifiers.contains(KeyModifiers::ALT) {
            press = press.with_modifier("alt");
        }
        Some(press)
    }
}
