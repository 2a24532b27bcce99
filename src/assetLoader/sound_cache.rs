use crate::audio::SoundBuffer;
use crate::error::SoundError;
use crate::protocol::SoundKey;
use std::collections::HashMap;

/// Result of asking the cache for a sound.
#[derive(Debug)]
pub enum Lookup<W> {
    /// Already decoded; the waiter is handed straight back.
    Ready(SoundBuffer, W),
    /// Queued behind a fetch. `first` is true when this request started it
    /// and the caller has to issue the download.
    Pending { first: bool },
}

/// Decoded sounds keyed by path, plus the fetches in flight. A path holds
/// one checksum at a time; asking for another checksum is a miss.
#[derive(Debug)]
pub struct SoundCache<W> {
    ready: HashMap<String, (String, SoundBuffer)>,
    pending: HashMap<SoundKey, Vec<W>>,
}

impl<W> Default for SoundCache<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> SoundCache<W> {
    pub fn new() -> Self {
        Self {
            ready: HashMap::new(),
            pending: HashMap::new(),
        }
    }

    pub fn request(&mut self, key: &SoundKey, waiter: W) -> Lookup<W> {
        if let Some((checksum, buffer)) = self.ready.get(&key.path) {
            if *checksum == key.checksum {
                return Lookup::Ready(buffer.clone(), waiter);
            }
        }
        match self.pending.get_mut(key) {
            Some(waiters) => {
                waiters.push(waiter);
                Lookup::Pending { first: false }
            }
            None => {
                self.pending.insert(key.clone(), vec![waiter]);
                Lookup::Pending { first: true }
            }
        }
    }

    /// Settles a fetch and returns everyone who was waiting on it. Success
    /// replaces whatever was cached for the path; failure leaves it alone.
    pub fn complete(
        &mut self,
        key: &SoundKey,
        result: Result<SoundBuffer, SoundError>,
    ) -> (Result<SoundBuffer, SoundError>, Vec<W>) {
        let waiters = self.pending.remove(key).unwrap_or_default();
        if let Ok(buffer) = &result {
            self.ready
                .insert(key.path.clone(), (key.checksum.clone(), buffer.clone()));
        }
        (result, waiters)
    }

    pub fn get(&self, key: &SoundKey) -> Option<&SoundBuffer> {
        self.ready
            .get(&key.path)
            .filter(|(checksum, _)| *checksum == key.checksum)
            .map(|(_, buffer)| buffer)
    }

    pub fn is_pending(&self, key: &SoundKey) -> bool {
        self.pending.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}
