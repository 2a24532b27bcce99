use crate::audio::MixerVolumes;
use crate::protocol::command::PlayerOptions;

/// What the server has told us about the logged-in player.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Player {
    pub username: Option<String>,
    pub transmition_id: Option<i64>,
    /// Per-mille of full scale; recordings quieter than this (RMS) are not
    /// transmitted.
    pub recording_threshold: f64,
    pub volumes: MixerVolumes,
    pub mic_muted: bool,
}

impl Player {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_options(&mut self, options: &PlayerOptions) {
        self.username = Some(options.username.clone());
        self.transmition_id = options.transmition_id;
        self.recording_threshold = options.recording_threshold.unwrap_or(0.0);
        self.volumes = MixerVolumes {
            sound: options.sound_volume,
            ambience: options.ambience_volume,
            music: options.music_volume,
        };
    }

    /// The threshold as an RMS level between 0 and 1.
    pub fn rms_threshold(&self) -> f32 {
        (self.recording_threshold / 1000.0).clamp(0.0, 1.0) as f32
    }
}
