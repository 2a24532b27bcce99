pub mod ambience;
pub mod backend;
pub mod headless;
pub mod microphone;
pub mod reverb;
pub mod rodio_backend;
pub mod sfx;

use self::backend::{AudioBackend, GraphModel, Microphone, NodeId, NodeKind, SourceId};
use crate::error::{AudioError, SoundError};
use crate::protocol::Position;
use rodio::{Decoder, Source};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

/// Panners without an explicit range use this.
pub const DEFAULT_MAX_DISTANCE: f64 = crate::protocol::command::DEFAULT_MAX_DISTANCE;

/// Decoded, interleaved PCM. Cloning shares the samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SoundBuffer {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Arc<[f32]>,
}

impl SoundBuffer {
    pub fn new(channels: u16, sample_rate: u32, samples: Vec<f32>) -> Self {
        Self {
            channels,
            sample_rate,
            samples: samples.into(),
        }
    }

    pub fn duration(&self) -> Duration {
        let frames = self.samples.len() as f64 / self.channels.max(1) as f64;
        Duration::from_secs_f64(frames / self.sample_rate.max(1) as f64)
    }
}

/// Decodes any format rodio understands into a [`SoundBuffer`].
pub fn decode_sound(path: &str, data: Vec<u8>) -> Result<SoundBuffer, SoundError> {
    let decoder = Decoder::new(Cursor::new(data)).map_err(|e| SoundError::Decode {
        path: path.to_string(),
        reason: e.to_string(),
    })?;
    // Metadata has to be read before the decoder is consumed.
    let channels = decoder.channels();
    let sample_rate = decoder.sample_rate();
    let samples: Vec<f32> = decoder.convert_samples::<f32>().collect();
    if samples.is_empty() {
        return Err(SoundError::Decode {
            path: path.to_string(),
            reason: "no samples".to_string(),
        });
    }
    Ok(SoundBuffer::new(channels, sample_rate, samples))
}

/// Where a new node sends its output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Output {
    /// The shared sound mixer, with the room's reverb send.
    Environment,
    Node(NodeId),
    Destination,
    /// Created unconnected.
    Detached,
}

/// Volumes applied to the shared mixers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MixerVolumes {
    pub sound: f64,
    pub ambience: f64,
    pub music: f64,
}

impl Default for MixerVolumes {
    fn default() -> Self {
        Self {
            sound: 1.0,
            ambience: 1.0,
            music: 1.0,
        }
    }
}

/// Builds and owns the session's audio nodes. Shared mixers and the
/// microphone are created the first time something needs them.
pub struct AudioGraph {
    backend: Box<dyn AudioBackend>,
    model: GraphModel,
    volumes: MixerVolumes,
    environment: Option<NodeId>,
    dry: Option<NodeId>,
    ambience: Option<NodeId>,
    music: Option<NodeId>,
    microphone: Option<Box<dyn Microphone>>,
}

impl AudioGraph {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        Self {
            backend,
            model: GraphModel::new(),
            volumes: MixerVolumes::default(),
            environment: None,
            dry: None,
            ambience: None,
            music: None,
            microphone: None,
        }
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    pub fn backend(&self) -> &dyn AudioBackend {
        self.backend.as_ref()
    }

    /// Stops everything and hands the device back for the next session.
    pub fn shutdown(mut self) -> Box<dyn AudioBackend> {
        let sources: Vec<SourceId> = self.model.voices().map(|(id, _)| *id).collect();
        for source in sources {
            self.stop(source);
        }
        if let Some(microphone) = self.microphone.as_mut() {
            microphone.cancel();
        }
        self.backend
    }

    fn resolve(&mut self, output: Output) -> Option<NodeId> {
        match output {
            Output::Environment => Some(self.environment_mixer()),
            Output::Node(node) => Some(node),
            Output::Destination => Some(NodeId::DESTINATION),
            Output::Detached => None,
        }
    }

    fn new_mixer(&mut self, volume: f64) -> NodeId {
        self.model
            .add_node(NodeKind::Gain, volume as f32, Some(NodeId::DESTINATION))
    }

    pub fn environment_mixer(&mut self) -> NodeId {
        match self.environment {
            Some(node) => node,
            None => {
                let node = self.new_mixer(self.volumes.sound);
                self.environment = Some(node);
                node
            }
        }
    }

    /// Sound mixer without the reverb send.
    pub fn dry_mixer(&mut self) -> NodeId {
        match self.dry {
            Some(node) => node,
            None => {
                let node = self.new_mixer(self.volumes.sound);
                self.dry = Some(node);
                node
            }
        }
    }

    pub fn ambience_mixer(&mut self) -> NodeId {
        match self.ambience {
            Some(node) => node,
            None => {
                let node = self.new_mixer(self.volumes.ambience);
                self.ambience = Some(node);
                node
            }
        }
    }

    pub fn music_mixer(&mut self) -> NodeId {
        match self.music {
            Some(node) => node,
            None => {
                let node = self.new_mixer(self.volumes.music);
                self.music = Some(node);
                node
            }
        }
    }

    pub fn has_environment(&self) -> bool {
        self.environment.is_some()
    }

    pub fn volumes(&self) -> MixerVolumes {
        self.volumes
    }

    /// Applies player volumes to whichever mixers exist; the rest pick them
    /// up when created.
    pub fn set_volumes(&mut self, volumes: MixerVolumes) {
        self.volumes = volumes;
        for (node, volume) in [
            (self.environment, volumes.sound),
            (self.dry, volumes.sound),
            (self.ambience, volumes.ambience),
            (self.music, volumes.music),
        ] {
            if let Some(node) = node {
                self.model.set_gain(node, volume as f32);
            }
        }
        self.refresh();
    }

    pub fn make_gain(&mut self, volume: f64, output: Output) -> NodeId {
        let output = self.resolve(output);
        self.model.add_node(NodeKind::Gain, volume as f32, output)
    }

    pub fn make_panner(&mut self, max_distance: Option<f64>, output: Output) -> NodeId {
        let output = self.resolve(output);
        self.model.add_node(
            NodeKind::Panner {
                position: Position::default(),
                max_distance: max_distance.unwrap_or(DEFAULT_MAX_DISTANCE),
            },
            1.0,
            output,
        )
    }

    /// The reverb tail follows the impulse length; its level follows the
    /// impulse's energy.
    pub fn make_convolver(&mut self, impulse: &SoundBuffer, output: Output) -> NodeId {
        let tail = impulse
            .duration()
            .clamp(Duration::from_millis(10), Duration::from_secs(5));
        let energy = impulse.samples.iter().map(|s| s * s).sum::<f32>();
        let rms = (energy / impulse.samples.len().max(1) as f32).sqrt();
        let amplitude = (rms * 4.0).clamp(0.1, 0.8);
        let output = self.resolve(output);
        self.model
            .add_node(NodeKind::Convolver { tail, amplitude }, 1.0, output)
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        if let Err(e) = self.model.connect(from, to) {
            log::warn!("[Audio] Connect failed: {}", e);
        }
        self.refresh();
    }

    pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
        self.model.disconnect(from, to);
        self.refresh();
    }

    /// Releases a node, stopping anything that played straight into it.
    pub fn release(&mut self, node: NodeId) {
        for source in self.model.release(node) {
            self.backend.stop_voice(source);
        }
        for mixer in [
            &mut self.environment,
            &mut self.dry,
            &mut self.ambience,
            &mut self.music,
        ] {
            if *mixer == Some(node) {
                *mixer = None;
            }
        }
        self.refresh();
    }

    pub fn release_when_idle(&mut self, node: NodeId) {
        self.model.mark_transient(node);
    }

    pub fn set_gain(&mut self, node: NodeId, volume: f64) {
        self.model.set_gain(node, volume as f32);
        self.refresh();
    }

    pub fn set_position(&mut self, node: NodeId, position: Position) {
        self.model.set_position(node, position);
        self.refresh();
    }

    pub fn set_max_distance(&mut self, node: NodeId, distance: f64) {
        self.model.set_max_distance(node, distance);
        self.refresh();
    }

    pub fn set_listener(&mut self, position: Position) {
        self.model.set_listener(position);
        self.refresh();
    }

    /// Starts a voice into `node`. `rate` of 1.0 is normal speed.
    pub fn play(
        &mut self,
        buffer: &SoundBuffer,
        label: &str,
        node: NodeId,
        looped: bool,
        rate: f64,
    ) -> Result<SourceId, AudioError> {
        if !self.model.contains(node) {
            return Err(AudioError::UnknownNode(node.0));
        }
        let source = self.model.add_voice(node, label, looped, rate as f32);
        let route = self
            .model
            .route(source)
            .ok_or(AudioError::UnknownNode(node.0))?;
        if let Err(e) = self.backend.start_voice(source, buffer, looped, &route) {
            self.model.remove_voice(source);
            return Err(e);
        }
        Ok(source)
    }

    pub fn set_rate(&mut self, source: SourceId, rate: f64) {
        self.model.set_rate(source, rate as f32);
        if let Some(route) = self.model.route(source) {
            self.backend.update_voice(source, &route);
        }
    }

    pub fn stop(&mut self, source: SourceId) {
        if self.model.remove_voice(source).is_some() {
            self.backend.stop_voice(source);
        }
    }

    pub fn is_playing(&self, source: SourceId) -> bool {
        self.model.voice(source).is_some()
    }

    /// Forgets finished one-shots and releases transient nodes they left
    /// idle.
    pub fn maintain(&mut self) {
        for source in self.backend.finished_voices() {
            self.model.remove_voice(source);
        }
        for node in self.model.idle_transients() {
            self.model.release(node);
        }
    }

    fn refresh(&mut self) {
        let sources: Vec<SourceId> = self.model.voices().map(|(id, _)| *id).collect();
        for source in sources {
            if let Some(route) = self.model.route(source) {
                self.backend.update_voice(source, &route);
            }
        }
    }

    pub fn has_microphone(&self) -> bool {
        self.microphone.is_some()
    }

    /// Opens the microphone the first time it is asked for.
    pub fn microphone(&mut self) -> Result<&mut dyn Microphone, AudioError> {
        if self.microphone.is_none() {
            let microphone = self.backend.open_microphone()?;
            log::info!("[Audio] Microphone opened");
            self.microphone = Some(microphone);
        }
        match self.microphone.as_deref_mut() {
            Some(microphone) => Ok(microphone),
            None => Err(AudioError::Microphone("not opened".to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::headless::HeadlessBackend;
    use super::*;

    fn tone() -> SoundBuffer {
        SoundBuffer::new(1, 8000, vec![0.25; 800])
    }

    #[test]
    fn test_environment_mixer_is_created_once() {
        let mut graph = AudioGraph::new(Box::new(HeadlessBackend::new()));
        assert!(!graph.has_environment());
        let first = graph.make_gain(1.0, Output::Environment);
        let second = graph.make_panner(None, Output::Environment);
        let environment = graph.environment_mixer();
        assert_eq!(graph.model().node(first).unwrap().outputs, vec![environment]);
        assert_eq!(graph.model().node(second).unwrap().outputs, vec![environment]);
        // destination, environment, gain, panner
        assert_eq!(graph.model().node_count(), 4);
    }

    #[test]
    fn test_detached_gain_has_no_output() {
        let mut graph = AudioGraph::new(Box::new(HeadlessBackend::new()));
        let gain = graph.make_gain(0.5, Output::Detached);
        assert!(graph.model().node(gain).unwrap().outputs.is_empty());
        assert!(!graph.has_environment());
    }

    #[test]
    fn test_volumes_apply_to_existing_mixers() {
        let mut graph = AudioGraph::new(Box::new(HeadlessBackend::new()));
        let environment = graph.environment_mixer();
        graph.set_volumes(MixerVolumes {
            sound: 0.3,
            ambience: 0.6,
            music: 0.9,
        });
        assert_eq!(graph.model().node(environment).unwrap().gain, 0.3);
        let music = graph.music_mixer();
        assert_eq!(graph.model().node(music).unwrap().gain, 0.9);
    }

    #[test]
    fn test_release_stops_voices() {
        let mut graph = AudioGraph::new(Box::new(HeadlessBackend::new()));
        let panner = graph.make_panner(Some(20.0), Output::Environment);
        let source = graph.play(&tone(), "a.ogg", panner, true, 1.0).unwrap();
        assert!(graph.is_playing(source));
        graph.release(panner);
        assert!(!graph.is_playing(source));
    }

    #[test]
    fn test_transient_released_after_one_shot() {
        let mut graph = AudioGraph::new(Box::new(HeadlessBackend::new()));
        let panner = graph.make_panner(None, Output::Environment);
        graph.release_when_idle(panner);
        graph.play(&tone(), "a.ogg", panner, false, 1.0).unwrap();
        graph.maintain();
        assert!(!graph.model().contains(panner));
    }

    #[test]
    fn test_play_into_missing_node_fails() {
        let mut graph = AudioGraph::new(Box::new(HeadlessBackend::new()));
        assert!(graph.play(&tone(), "a.ogg", NodeId(99), false, 1.0).is_err());
    }

    #[test]
    fn test_listener_move_updates_live_voices() {
        let mut graph = AudioGraph::new(Box::new(HeadlessBackend::new()));
        let panner = graph.make_panner(Some(10.0), Output::Environment);
        graph.set_position(panner, Position::new(5.0, 0.0, 0.0));
        let source = graph.play(&tone(), "a.ogg", panner, true, 1.0).unwrap();
        graph.set_listener(Position::new(5.0, 0.0, 0.0));

        let headless = graph
            .backend()
            .as_any()
            .downcast_ref::<HeadlessBackend>()
            .unwrap();
        assert_eq!(headless.active(), 1);
        let route = headless.route(source).unwrap();
        assert_eq!(route.listener, Position::new(5.0, 0.0, 0.0));
        assert_eq!(route.emitter, Some(Position::new(5.0, 0.0, 0.0)));
    }

    #[test]
    fn test_buffer_duration() {
        assert_eq!(tone().duration(), Duration::from_millis(100));
    }
}
