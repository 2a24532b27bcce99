use crate::error::ConfigError;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Command line flags. Anything left out falls back to the saved
/// preferences.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "mindspace", version, about = "Terminal client for the mindspace audio game")]
pub struct Cli {
    /// Server host name
    #[arg(long)]
    pub host: Option<String>,

    /// WebSocket port
    #[arg(long)]
    pub port: Option<u16>,

    /// Port the server's web interface (and sounds) are served on
    #[arg(long)]
    pub web_port: Option<u16>,

    #[arg(long)]
    pub username: Option<String>,

    #[arg(long)]
    pub password: Option<String>,

    /// Preferences file (defaults to the platform config directory)
    #[arg(long)]
    pub prefs: Option<PathBuf>,

    /// Keep downloaded sounds in this directory
    #[arg(long)]
    pub sound_cache: Option<PathBuf>,

    /// Run without a sound device or terminal interface
    #[arg(long)]
    pub headless: bool,

    /// Give up when the connection drops instead of reconnecting
    #[arg(long)]
    pub no_reconnect: bool,
}

/// Connection details remembered between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub web_port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Preferences {
    /// `<config dir>/mindspace/preferences.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mindspace").join("preferences.toml"))
    }

    /// Reads preferences; a missing file is the same as an empty one.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(self).map_err(|e| ConfigError::Save(e.to_string()))?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ConfigError::Save(e.to_string()))?;
        }
        std::fs::write(path, text).map_err(|e| ConfigError::Save(e.to_string()))
    }
}

/// Everything needed to connect, after flags and preferences are merged.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub hostname: String,
    pub port: u16,
    pub web_port: u16,
    pub username: String,
    pub password: String,
    pub sound_cache: Option<PathBuf>,
    pub headless: bool,
    pub reconnect: bool,
}

impl ClientConfig {
    /// Flags win over preferences. Every connection field must come from
    /// one or the other.
    pub fn resolve(cli: &Cli, prefs: &Preferences) -> Result<Self, ConfigError> {
        Ok(Self {
            hostname: cli
                .host
                .clone()
                .or_else(|| prefs.hostname.clone())
                .filter(|host| !host.is_empty())
                .ok_or(ConfigError::Missing("hostname"))?,
            port: cli.port.or(prefs.port).ok_or(ConfigError::Missing("port"))?,
            web_port: cli
                .web_port
                .or(prefs.web_port)
                .ok_or(ConfigError::Missing("web_port"))?,
            username: cli
                .username
                .clone()
                .or_else(|| prefs.username.clone())
                .filter(|name| !name.is_empty())
                .ok_or(ConfigError::Missing("username"))?,
            password: cli
                .password
                .clone()
                .or_else(|| prefs.password.clone())
                .ok_or(ConfigError::Missing("password"))?,
            sound_cache: cli.sound_cache.clone(),
            headless: cli.headless,
            reconnect: !cli.no_reconnect,
        })
    }

    /// What gets written back for next time.
    pub fn preferences(&self) -> Preferences {
        Preferences {
            hostname: Some(self.hostname.clone()),
            port: Some(self.port),
            web_port: Some(self.web_port),
            username: Some(self.username.clone()),
            password: Some(self.password.clone()),
        }
    }

    pub fn websocket_url(&self) -> String {
        format!("ws://{}:{}", self.hostname, self.port)
    }

    pub fn sound_base_url(&self) -> String {
        format!("http://{}:{}", self.hostname, self.web_port)
    }
}
