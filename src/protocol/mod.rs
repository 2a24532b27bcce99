// Wire types shared by the transport, the dispatcher and the sound loader.

pub mod command;

pub use command::Command;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Server-assigned object identifier.
pub type ObjectId = i64;

/// A sound as the server names it: a path relative to the sound root plus
/// the md5 checksum of its contents. Sent on the wire as `[path, checksum]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(String, String)", into = "(String, String)")]
pub struct SoundKey {
    pub path: String,
    pub checksum: String,
}

impl SoundKey {
    pub fn new(path: impl Into<String>, checksum: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            checksum: checksum.into(),
        }
    }
}

impl From<(String, String)> for SoundKey {
    fn from((path, checksum): (String, String)) -> Self {
        Self { path, checksum }
    }
}

impl From<SoundKey> for (String, String) {
    fn from(key: SoundKey) -> Self {
        (key.path, key.checksum)
    }
}

impl std::fmt::Display for SoundKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}?{}", self.path, self.checksum)
    }
}

/// A point in the world. Values are taken from the server as-is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2) + (self.z - other.z).powi(2))
            .sqrt()
    }
}

/// Inbound frame as the server serialises it.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    pub name: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub kwargs: Map<String, Value>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// A command for the server. Serialised as the positional triple
/// `[name, args, kwargs]`.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCommand {
    pub name: String,
    pub args: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl OutboundCommand {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
            kwargs: Map::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_kwargs(mut self, kwargs: Map<String, Value>) -> Self {
        self.kwargs = kwargs;
        self
    }

    pub fn push_arg(&mut self, value: impl Into<Value>) {
        self.args.push(value.into());
    }

    pub fn login(username: &str, password: &str) -> Self {
        Self::new("login").with_args(vec![username.into(), password.into()])
    }

    pub fn identify(id: ObjectId) -> Self {
        Self::new("identify").with_args(vec![id.into()])
    }

    pub fn key(key: &str, modifiers: &[&str]) -> Self {
        let modifiers = modifiers.iter().map(|m| Value::from(*m)).collect();
        Self::new("key").with_args(vec![key.into(), Value::Array(modifiers)])
    }

    pub fn transmit(data: String) -> Self {
        Self::new("transmit").with_args(vec![data.into()])
    }

    pub fn quit() -> Self {
        Self::new("quit")
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&(&self.name, &self.args, &self.kwargs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_outbound_is_positional_triple() {
        let text = OutboundCommand::login("bob", "secret").to_json().unwrap();
        assert_eq!(text, r#"["login",["bob","secret"],{}]"#);
    }

    #[test]
    fn test_outbound_kwargs() {
        let mut kwargs = Map::new();
        kwargs.insert("id".into(), json!(3));
        let text = OutboundCommand::new("look").with_kwargs(kwargs).to_json().unwrap();
        assert_eq!(text, r#"["look",[],{"id":3}]"#);
    }

    #[test]
    fn test_envelope_defaults() {
        let envelope = Envelope::parse(r#"{"name": "remember_quit"}"#).unwrap();
        assert_eq!(envelope.name, "remember_quit");
        assert!(envelope.args.is_empty());
        assert!(envelope.kwargs.is_empty());
    }

    #[test]
    fn test_sound_key_from_pair() {
        let key: SoundKey = serde_json::from_value(json!(["a.ogg", "abc"])).unwrap();
        assert_eq!(key, SoundKey::new("a.ogg", "abc"));
        assert_eq!(serde_json::to_value(&key).unwrap(), json!(["a.ogg", "abc"]));
    }
}
