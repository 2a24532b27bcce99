use thiserror::Error;

/// Why a sound could not be made playable.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SoundError {
    #[error("Failed to download sound from {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("Unable to decode data from {path}: {reason}")]
    Decode { path: String, reason: String },
}

/// Failures raised by an audio backend.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("No audio output device: {0}")]
    NoDevice(String),

    #[error("Unknown audio node {0}")]
    UnknownNode(u64),

    #[error("Playback failed: {0}")]
    Playback(String),

    #[error("Microphone unavailable: {0}")]
    Microphone(String),

    #[error("Recording encode failed: {0}")]
    Encode(String),
}

/// A frame from the server that could not be turned into a command.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Bad arguments for {command}: {reason}")]
    BadArgs {
        command: &'static str,
        reason: String,
    },
}

impl ProtocolError {
    pub fn bad_args(command: &'static str, reason: impl Into<String>) -> Self {
        Self::BadArgs {
            command,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Failed to send command")]
    SendFailed,

    #[error("Protocol error: {0}")]
    Protocol(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("You must specify a {0}.")]
    Missing(&'static str),

    #[error("Failed to read preferences {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse preferences {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("Failed to save preferences: {0}")]
    Save(String),
}

/// A fetch finished for an ambience that has since moved on. Suppressed,
/// never shown.
#[derive(Debug, Error, PartialEq)]
#[error("Stale ambience update for {0}")]
pub struct StaleUpdate(pub String);
