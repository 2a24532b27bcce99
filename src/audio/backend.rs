// Node bookkeeping shared by every backend, and the seam the device sits
// behind.

use super::SoundBuffer;
use crate::error::AudioError;
use crate::protocol::Position;
use std::any::Any;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    /// The speakers. Always present, never released.
    pub const DESTINATION: NodeId = NodeId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(pub u64);

/// Sounds closer than this are not attenuated.
pub const REFERENCE_DISTANCE: f64 = 1.0;
pub const ROLLOFF_FACTOR: f64 = 1.0;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Destination,
    Gain,
    Panner { position: Position, max_distance: f64 },
    Convolver { tail: Duration, amplitude: f32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeState {
    pub kind: NodeKind,
    pub gain: f32,
    /// First entry is the node's main output; any further entries are sends.
    pub outputs: Vec<NodeId>,
    /// Released automatically once nothing plays into it.
    pub transient: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VoiceState {
    pub node: NodeId,
    pub label: String,
    pub looped: bool,
    pub rate: f32,
}

/// How a voice should currently sound, derived from the chain of nodes it
/// plays into.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub volume: f32,
    /// Position of the nearest panner, if any. Unpanned voices sit on the
    /// listener.
    pub emitter: Option<Position>,
    pub listener: Position,
    pub reverb: Option<(Duration, f32)>,
    pub rate: f32,
}

/// Inverse distance model, silent past `max_distance`.
pub fn attenuation(distance: f64, max_distance: f64) -> f32 {
    if max_distance > 0.0 && distance > max_distance {
        return 0.0;
    }
    let clamped = distance.max(REFERENCE_DISTANCE);
    (REFERENCE_DISTANCE / (REFERENCE_DISTANCE + ROLLOFF_FACTOR * (clamped - REFERENCE_DISTANCE)))
        as f32
}

#[derive(Debug)]
pub struct GraphModel {
    nodes: BTreeMap<NodeId, NodeState>,
    voices: BTreeMap<SourceId, VoiceState>,
    listener: Position,
    next_id: u64,
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModel {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            NodeId::DESTINATION,
            NodeState {
                kind: NodeKind::Destination,
                gain: 1.0,
                outputs: Vec::new(),
                transient: false,
            },
        );
        Self {
            nodes,
            voices: BTreeMap::new(),
            listener: Position::default(),
            next_id: 1,
        }
    }

    fn next(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn add_node(&mut self, kind: NodeKind, gain: f32, output: Option<NodeId>) -> NodeId {
        let id = NodeId(self.next());
        let outputs = output
            .filter(|target| self.nodes.contains_key(target))
            .into_iter()
            .collect();
        self.nodes.insert(
            id,
            NodeState {
                kind,
                gain,
                outputs,
                transient: false,
            },
        );
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), AudioError> {
        if !self.nodes.contains_key(&to) {
            return Err(AudioError::UnknownNode(to.0));
        }
        let node = self
            .nodes
            .get_mut(&from)
            .ok_or(AudioError::UnknownNode(from.0))?;
        if !node.outputs.contains(&to) {
            node.outputs.push(to);
        }
        Ok(())
    }

    pub fn disconnect(&mut self, from: NodeId, to: NodeId) {
        if let Some(node) = self.nodes.get_mut(&from) {
            node.outputs.retain(|output| *output != to);
        }
    }

    /// Removes the node and every edge into it. Returns the voices that
    /// were playing straight into it; they are removed too.
    pub fn release(&mut self, id: NodeId) -> Vec<SourceId> {
        if id == NodeId::DESTINATION || self.nodes.remove(&id).is_none() {
            return Vec::new();
        }
        for node in self.nodes.values_mut() {
            node.outputs.retain(|output| *output != id);
        }
        let orphaned: Vec<SourceId> = self
            .voices
            .iter()
            .filter(|(_, voice)| voice.node == id)
            .map(|(source, _)| *source)
            .collect();
        for source in &orphaned {
            self.voices.remove(source);
        }
        orphaned
    }

    pub fn mark_transient(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.transient = true;
        }
    }

    /// Transient nodes with nothing left playing into them.
    pub fn idle_transients(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(id, node)| {
                node.transient && !self.voices.values().any(|voice| voice.node == **id)
            })
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn set_gain(&mut self, id: NodeId, gain: f32) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.gain = gain;
        }
    }

    pub fn set_position(&mut self, id: NodeId, new_position: Position) {
        if let Some(NodeState {
            kind: NodeKind::Panner { position, .. },
            ..
        }) = self.nodes.get_mut(&id)
        {
            *position = new_position;
        }
    }

    pub fn set_max_distance(&mut self, id: NodeId, distance: f64) {
        if let Some(NodeState {
            kind: NodeKind::Panner { max_distance, .. },
            ..
        }) = self.nodes.get_mut(&id)
        {
            *max_distance = distance;
        }
    }

    pub fn listener(&self) -> Position {
        self.listener
    }

    pub fn set_listener(&mut self, position: Position) {
        self.listener = position;
    }

    pub fn add_voice(&mut self, node: NodeId, label: &str, looped: bool, rate: f32) -> SourceId {
        let id = SourceId(self.next());
        self.voices.insert(
            id,
            VoiceState {
                node,
                label: label.to_string(),
                looped,
                rate,
            },
        );
        id
    }

    pub fn remove_voice(&mut self, id: SourceId) -> Option<VoiceState> {
        self.voices.remove(&id)
    }

    pub fn voice(&self, id: SourceId) -> Option<&VoiceState> {
        self.voices.get(&id)
    }

    pub fn voices(&self) -> impl Iterator<Item = (&SourceId, &VoiceState)> {
        self.voices.iter()
    }

    pub fn set_rate(&mut self, id: SourceId, rate: f32) {
        if let Some(voice) = self.voices.get_mut(&id) {
            voice.rate = rate;
        }
    }

    /// Walks the main outputs from the voice's node to the speakers,
    /// multiplying gains and distance attenuation on the way. A chain that
    /// never reaches the speakers is silent.
    pub fn route(&self, id: SourceId) -> Option<Route> {
        let voice = self.voices.get(&id)?;
        let mut volume = 1.0f32;
        let mut emitter = None;
        let mut reverb = None;
        let mut current = voice.node;
        let mut reached = false;
        for _ in 0..=self.nodes.len() {
            let Some(node) = self.nodes.get(&current) else {
                break;
            };
            if let NodeKind::Destination = node.kind {
                reached = true;
                break;
            }
            volume *= node.gain;
            if let NodeKind::Panner {
                position,
                max_distance,
            } = &node.kind
            {
                volume *= attenuation(position.distance_to(&self.listener), *max_distance);
                emitter.get_or_insert(*position);
            }
            if reverb.is_none() {
                reverb = node.outputs.iter().skip(1).find_map(|send| self.send_reverb(*send));
            }
            match node.outputs.first() {
                Some(next) => current = *next,
                None => break,
            }
        }
        Some(Route {
            volume: if reached { volume } else { 0.0 },
            emitter,
            listener: self.listener,
            reverb,
            rate: voice.rate,
        })
    }

    fn send_reverb(&self, send: NodeId) -> Option<(Duration, f32)> {
        match &self.nodes.get(&send)?.kind {
            NodeKind::Convolver { tail, amplitude } => {
                Some((*tail, amplitude * self.chain_gain(send)))
            }
            _ => None,
        }
    }

    fn chain_gain(&self, from: NodeId) -> f32 {
        let mut gain = 1.0;
        let mut current = from;
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(&current) {
                Some(node) if node.kind == NodeKind::Destination => return gain,
                Some(node) => {
                    gain *= node.gain;
                    match node.outputs.first() {
                        Some(next) => current = *next,
                        None => return 0.0,
                    }
                }
                None => return 0.0,
            }
        }
        0.0
    }
}

/// Raw samples captured from the microphone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Capture {
    pub channels: u16,
    pub sample_rate: u32,
    pub samples: Vec<f32>,
}

impl Capture {
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum / self.samples.len() as f32).sqrt()
    }
}

pub trait Microphone {
    fn start(&mut self) -> Result<(), AudioError>;

    /// Ends the current recording and hands back what was captured.
    fn stop(&mut self) -> Option<Capture>;

    fn cancel(&mut self);

    fn set_muted(&mut self, muted: bool);

    fn is_recording(&self) -> bool;
}

/// The device side of the audio graph. Node topology lives in
/// [`GraphModel`]; a backend only renders voices along the routes it is
/// given.
pub trait AudioBackend {
    fn start_voice(
        &mut self,
        source: SourceId,
        buffer: &SoundBuffer,
        looped: bool,
        route: &Route,
    ) -> Result<(), AudioError>;

    fn update_voice(&mut self, source: SourceId, route: &Route);

    fn stop_voice(&mut self, source: SourceId);

    /// One-shot voices that have run out of samples since the last call.
    fn finished_voices(&mut self) -> Vec<SourceId>;

    fn open_microphone(&mut self) -> Result<Box<dyn Microphone>, AudioError>;

    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attenuation_inverse_and_cutoff() {
        assert_eq!(attenuation(0.5, 50.0), 1.0);
        assert_eq!(attenuation(1.0, 50.0), 1.0);
        assert!((attenuation(3.0, 50.0) - 1.0 / 3.0).abs() < 1e-6);
        assert_eq!(attenuation(51.0, 50.0), 0.0);
    }

    #[test]
    fn test_route_multiplies_gains_to_destination() {
        let mut model = GraphModel::new();
        let mixer = model.add_node(NodeKind::Gain, 0.5, Some(NodeId::DESTINATION));
        let gain = model.add_node(NodeKind::Gain, 0.5, Some(mixer));
        let voice = model.add_voice(gain, "a.ogg", true, 1.0);
        let route = model.route(voice).unwrap();
        assert_eq!(route.volume, 0.25);
        assert_eq!(route.emitter, None);
    }

    #[test]
    fn test_route_detached_is_silent() {
        let mut model = GraphModel::new();
        let gain = model.add_node(NodeKind::Gain, 1.0, None);
        let voice = model.add_voice(gain, "a.ogg", false, 1.0);
        assert_eq!(model.route(voice).unwrap().volume, 0.0);
    }

    #[test]
    fn test_route_through_panner() {
        let mut model = GraphModel::new();
        let panner = model.add_node(
            NodeKind::Panner {
                position: Position::new(2.0, 0.0, 0.0),
                max_distance: 50.0,
            },
            1.0,
            Some(NodeId::DESTINATION),
        );
        let voice = model.add_voice(panner, "a.ogg", false, 1.0);
        let route = model.route(voice).unwrap();
        assert_eq!(route.emitter, Some(Position::new(2.0, 0.0, 0.0)));
        assert!((route.volume - 0.5).abs() < 1e-6);

        model.set_listener(Position::new(2.0, 0.0, 0.0));
        assert_eq!(model.route(voice).unwrap().volume, 1.0);
    }

    #[test]
    fn test_release_drops_edges_and_voices() {
        let mut model = GraphModel::new();
        let mixer = model.add_node(NodeKind::Gain, 1.0, Some(NodeId::DESTINATION));
        let gain = model.add_node(NodeKind::Gain, 1.0, Some(mixer));
        let voice = model.add_voice(mixer, "a.ogg", true, 1.0);
        assert_eq!(model.release(mixer), vec![voice]);
        assert!(model.node(gain).unwrap().outputs.is_empty());
        assert!(model.voice(voice).is_none());
        assert!(model.release(NodeId::DESTINATION).is_empty());
        assert!(model.contains(NodeId::DESTINATION));
    }

    #[test]
    fn test_reverb_send_is_found_on_chain() {
        let mut model = GraphModel::new();
        let wet = model.add_node(NodeKind::Gain, 0.5, Some(NodeId::DESTINATION));
        let convolver = model.add_node(
            NodeKind::Convolver {
                tail: Duration::from_millis(200),
                amplitude: 0.4,
            },
            1.0,
            Some(wet),
        );
        let mixer = model.add_node(NodeKind::Gain, 1.0, Some(NodeId::DESTINATION));
        model.connect(mixer, convolver).unwrap();
        let voice = model.add_voice(mixer, "a.ogg", false, 1.0);
        let (tail, amplitude) = model.route(voice).unwrap().reverb.unwrap();
        assert_eq!(tail, Duration::from_millis(200));
        assert!((amplitude - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_capture_rms() {
        let capture = Capture {
            channels: 1,
            sample_rate: 8000,
            samples: vec![0.5, -0.5, 0.5, -0.5],
        };
        assert!((capture.rms() - 0.5).abs() < 1e-6);
        assert_eq!(Capture::default().rms(), 0.0);
    }
}
