use crate::audio::{decode_sound, SoundBuffer};
use crate::error::SoundError;
use crate::protocol::SoundKey;
use crate::state::SessionEvent;
use std::path::PathBuf;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

/// URL the server's web port serves `key` from. The checksum rides along as
/// the query string so stale copies are never reused.
pub fn sound_url(base_url: &str, key: &SoundKey) -> String {
    format!(
        "{}/{}?{}",
        base_url.trim_end_matches('/'),
        key.path.trim_start_matches('/'),
        key.checksum
    )
}

/// Escapes everything outside `[A-Za-z0-9.-]` as `_XX`, so distinct
/// inputs stay distinct on disk.
fn escape_file_name(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'.' | b'-' => escaped.push(byte as char),
            _ => escaped.push_str(&format!("_{:02X}", byte)),
        }
    }
    escaped
}

/// Cache file name for a sound: `checksum@path`, both escaped. Stable
/// across builds and keeps the path's extension last.
fn cache_file_name(key: &SoundKey) -> String {
    format!(
        "{}@{}",
        escape_file_name(&key.checksum),
        escape_file_name(key.path.trim_start_matches('/'))
    )
}

/// Downloads and decodes sounds for a session, one task per request, and
/// posts each outcome back to the session's inbox.
#[derive(Clone)]
pub struct SoundLoader {
    base_url: String,
    cache_dir: Option<PathBuf>,
    client: reqwest::Client,
    inbox: UnboundedSender<SessionEvent>,
}

impl SoundLoader {
    pub fn new(
        base_url: impl Into<String>,
        cache_dir: Option<PathBuf>,
        inbox: UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            cache_dir,
            client: reqwest::Client::new(),
            inbox,
        }
    }

    /// Serves requests until the session drops its sender.
    pub async fn run(self, mut requests: UnboundedReceiver<SoundKey>) {
        while let Some(key) = requests.recv().await {
            let loader = self.clone();
            tokio::spawn(async move {
                let result = loader.load(&key).await;
                if let Err(e) = &result {
                    log::warn!("[Loader] {}", e);
                }
                // The session may already be gone; nothing to report to then.
                let _ = loader.inbox.send(SessionEvent::SoundLoaded { key, result });
            });
        }
        log::debug!("[Loader] Request channel closed");
    }

    async fn load(&self, key: &SoundKey) -> Result<SoundBuffer, SoundError> {
        let data = self.load_bytes(key).await?;
        let path = key.path.clone();
        tokio::task::spawn_blocking(move || decode_sound(&path, data))
            .await
            .map_err(|e| SoundError::Decode {
                path: key.path.clone(),
                reason: e.to_string(),
            })?
    }

    async fn load_bytes(&self, key: &SoundKey) -> Result<Vec<u8>, SoundError> {
        let cached = self
            .cache_dir
            .as_ref()
            .map(|dir| dir.join(cache_file_name(key)));

        // Check if already cached
        if let Some(file_path) = &cached {
            if let Ok(data) = tokio::fs::read(file_path).await {
                log::debug!("[Loader] {} served from {}", key, file_path.display());
                return Ok(data);
            }
        }

        let url = sound_url(&self.base_url, key);
        let download_error = |reason: String| SoundError::Download {
            url: url.clone(),
            reason,
        };
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| download_error(e.to_string()))?;
        if !response.status().is_success() {
            return Err(download_error(format!("HTTP error: {}", response.status())));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| download_error(e.to_string()))?;

        if let Some(file_path) = &cached {
            if let Err(e) = self.store(file_path, &bytes).await {
                log::warn!("[Loader] Failed to cache {}: {}", key, e);
            }
        }
        Ok(bytes.to_vec())
    }

    async fn store(&self, file_path: &PathBuf, bytes: &[u8]) -> std::io::Result<()> {
        if let Some(dir) = file_path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(file_path, bytes).await
    }
}
