// Asset loader module for downloading, caching and decoding server sounds

pub mod asset_loader;
pub mod sound_cache;

pub use asset_loader::{sound_url, SoundLoader};
pub use sound_cache::{Lookup, SoundCache};
