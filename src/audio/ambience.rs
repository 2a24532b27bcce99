use super::backend::{NodeId, SourceId};
use super::{AudioGraph, Output, SoundBuffer};
use crate::error::StaleUpdate;
use crate::protocol::{ObjectId, SoundKey};

/// Which ambience a fetch was issued for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmbienceSlot {
    Object(ObjectId),
    Zone,
    Room,
    Music,
}

/// Captured when an ambience asks for a new sound; the fetch may only start
/// playback if the ambience still carries the same ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    pub key: SoundKey,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmbienceChange {
    /// Nothing to fetch: same sound (levels updated) or cleared.
    Settled,
    Fetch(Ticket),
}

/// A looping background sound. At most one source plays at a time; the
/// gain node survives the sound being cleared so it can be reused.
#[derive(Debug, Default)]
pub struct Ambience {
    sound: Option<SoundKey>,
    gain: Option<NodeId>,
    volume: f64,
    rate: f64,
    source: Option<SourceId>,
    generation: u64,
}

impl Ambience {
    pub fn new() -> Self {
        Self {
            volume: 1.0,
            rate: 1.0,
            ..Self::default()
        }
    }

    pub fn sound(&self) -> Option<&SoundKey> {
        self.sound.as_ref()
    }

    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    pub fn gain(&self) -> Option<NodeId> {
        self.gain
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_playing(&self) -> bool {
        self.source.is_some()
    }

    fn stop_source(&mut self, graph: &mut AudioGraph) {
        if let Some(source) = self.source.take() {
            graph.stop(source);
        }
    }

    /// Points the ambience at `sound`. Clearing stops playback; the same
    /// sound only retunes gain and rate; a different one stops the old
    /// source and returns the ticket to fetch with.
    pub fn update(
        &mut self,
        graph: &mut AudioGraph,
        sound: Option<SoundKey>,
        volume: f64,
        rate: f64,
    ) -> AmbienceChange {
        self.volume = volume;
        self.rate = rate;
        match sound {
            None => {
                self.stop_source(graph);
                if self.sound.take().is_some() {
                    self.generation += 1;
                }
                AmbienceChange::Settled
            }
            Some(key) if self.sound.as_ref() == Some(&key) => {
                if let Some(gain) = self.gain {
                    graph.set_gain(gain, volume);
                }
                if let Some(source) = self.source {
                    graph.set_rate(source, rate);
                }
                AmbienceChange::Settled
            }
            Some(key) => {
                self.stop_source(graph);
                self.generation += 1;
                self.sound = Some(key.clone());
                AmbienceChange::Fetch(Ticket {
                    key,
                    generation: self.generation,
                })
            }
        }
    }

    /// Starts the fetched sound if `ticket` is still current. `output` is
    /// where a fresh gain node gets wired, resolved now rather than when the
    /// fetch began.
    pub fn commit(
        &mut self,
        graph: &mut AudioGraph,
        ticket: &Ticket,
        buffer: &SoundBuffer,
        output: Output,
    ) -> Result<(), StaleUpdate> {
        if ticket.generation != self.generation || self.sound.as_ref() != Some(&ticket.key) {
            return Err(StaleUpdate(ticket.key.to_string()));
        }
        let gain = match self.gain.filter(|gain| graph.model().contains(*gain)) {
            Some(gain) => {
                graph.set_gain(gain, self.volume);
                gain
            }
            None => {
                let gain = graph.make_gain(self.volume, output);
                self.gain = Some(gain);
                gain
            }
        };
        self.stop_source(graph);
        match graph.play(buffer, &ticket.key.path, gain, true, self.rate) {
            Ok(source) => self.source = Some(source),
            Err(e) => log::warn!("[Audio] Ambience {} failed to start: {}", ticket.key, e),
        }
        Ok(())
    }

    /// Forgets a sound whose fetch failed so a later update retries it.
    pub fn abandon(&mut self, ticket: &Ticket) {
        if ticket.generation == self.generation && self.sound.as_ref() == Some(&ticket.key) {
            self.sound = None;
            self.generation += 1;
        }
    }

    /// Stops playback and releases the gain node.
    pub fn release(&mut self, graph: &mut AudioGraph) {
        self.stop_source(graph);
        self.sound = None;
        self.generation += 1;
        if let Some(gain) = self.gain.take() {
            graph.release(gain);
        }
    }
}

/// The ambiences that belong to the world rather than to an object.
#[derive(Debug)]
pub struct AmbienceController {
    zone: Ambience,
    room: Ambience,
    music: Ambience,
    room_name: Option<String>,
}

impl Default for AmbienceController {
    fn default() -> Self {
        Self::new()
    }
}

impl AmbienceController {
    pub fn new() -> Self {
        Self {
            zone: Ambience::new(),
            room: Ambience::new(),
            music: Ambience::new(),
            room_name: None,
        }
    }

    pub fn get(&self, slot: AmbienceSlot) -> Option<&Ambience> {
        match slot {
            AmbienceSlot::Zone => Some(&self.zone),
            AmbienceSlot::Room => Some(&self.room),
            AmbienceSlot::Music => Some(&self.music),
            AmbienceSlot::Object(_) => None,
        }
    }

    pub fn get_mut(&mut self, slot: AmbienceSlot) -> Option<&mut Ambience> {
        match slot {
            AmbienceSlot::Zone => Some(&mut self.zone),
            AmbienceSlot::Room => Some(&mut self.room),
            AmbienceSlot::Music => Some(&mut self.music),
            AmbienceSlot::Object(_) => None,
        }
    }

    /// Zone and room loops go through the ambience mixer, music through its
    /// own.
    pub fn output(graph: &mut AudioGraph, slot: AmbienceSlot) -> Output {
        match slot {
            AmbienceSlot::Music => Output::Node(graph.music_mixer()),
            _ => Output::Node(graph.ambience_mixer()),
        }
    }

    pub fn update(
        &mut self,
        graph: &mut AudioGraph,
        slot: AmbienceSlot,
        sound: Option<SoundKey>,
        volume: f64,
        rate: f64,
    ) -> AmbienceChange {
        match self.get_mut(slot) {
            Some(ambience) => ambience.update(graph, sound, volume, rate),
            None => AmbienceChange::Settled,
        }
    }

    pub fn room_name(&self) -> Option<&str> {
        self.room_name.as_deref()
    }

    pub fn set_room_name(&mut self, name: String) {
        self.room_name = Some(name);
    }

    pub fn release(&mut self, graph: &mut AudioGraph) {
        self.zone.release(graph);
        self.room.release(graph);
        self.music.release(graph);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::headless::HeadlessBackend;
    use pretty_assertions::assert_eq;

    fn graph() -> AudioGraph {
        AudioGraph::new(Box::new(HeadlessBackend::new()))
    }

    fn buffer(len: usize) -> SoundBuffer {
        SoundBuffer::new(1, 8000, vec![0.1; len])
    }

    fn ticket(change: AmbienceChange) -> Ticket {
        match change {
            AmbienceChange::Fetch(ticket) => ticket,
            other => panic!("Expected a fetch, got {:?}", other),
        }
    }

    #[test]
    fn test_new_sound_asks_for_fetch() {
        let mut graph = graph();
        let mut ambience = Ambience::new();
        let key = SoundKey::new("a.ogg", "abc");
        let ticket = ticket(ambience.update(&mut graph, Some(key.clone()), 0.5, 1.0));
        assert_eq!(ticket.key, key);
        assert!(!ambience.is_playing());

        ambience
            .commit(&mut graph, &ticket, &buffer(10), Output::Environment)
            .unwrap();
        let source = ambience.source().unwrap();
        let voice = graph.model().voice(source).unwrap();
        assert!(voice.looped);
        assert_eq!(graph.model().node(ambience.gain().unwrap()).unwrap().gain, 0.5);
    }

    #[test]
    fn test_same_sound_only_retunes() {
        let mut graph = graph();
        let mut ambience = Ambience::new();
        let key = SoundKey::new("a.ogg", "abc");
        let first = ticket(ambience.update(&mut graph, Some(key.clone()), 0.5, 1.0));
        ambience
            .commit(&mut graph, &first, &buffer(10), Output::Environment)
            .unwrap();
        let source = ambience.source();

        let change = ambience.update(&mut graph, Some(key), 0.8, 1.5);
        assert_eq!(change, AmbienceChange::Settled);
        assert_eq!(ambience.source(), source);
        assert_eq!(graph.model().node(ambience.gain().unwrap()).unwrap().gain, 0.8);
        assert_eq!(graph.model().voice(source.unwrap()).unwrap().rate, 1.5);
    }

    #[test]
    fn test_clearing_keeps_gain_node() {
        let mut graph = graph();
        let mut ambience = Ambience::new();
        let first = ticket(ambience.update(&mut graph, Some(SoundKey::new("a.ogg", "1")), 1.0, 1.0));
        ambience
            .commit(&mut graph, &first, &buffer(10), Output::Environment)
            .unwrap();
        let gain = ambience.gain();
        let source = ambience.source().unwrap();

        assert_eq!(ambience.update(&mut graph, None, 1.0, 1.0), AmbienceChange::Settled);
        assert!(!ambience.is_playing());
        assert!(!graph.is_playing(source));
        assert_eq!(ambience.gain(), gain);
        assert!(graph.model().contains(gain.unwrap()));
    }

    #[test]
    fn test_late_fetch_does_not_override_newer_one() {
        let mut graph = graph();
        let mut ambience = Ambience::new();
        let older = ticket(ambience.update(&mut graph, Some(SoundKey::new("a.ogg", "1")), 1.0, 1.0));
        let newer = ticket(ambience.update(&mut graph, Some(SoundKey::new("b.ogg", "2")), 1.0, 1.0));

        ambience
            .commit(&mut graph, &newer, &buffer(20), Output::Environment)
            .unwrap();
        let playing = ambience.source().unwrap();
        assert!(ambience
            .commit(&mut graph, &older, &buffer(10), Output::Environment)
            .is_err());
        assert_eq!(ambience.source(), Some(playing));
        assert_eq!(graph.model().voice(playing).unwrap().label, "b.ogg");
        assert_eq!(graph.model().voices().count(), 1);
    }

    #[test]
    fn test_fetch_after_clear_is_stale() {
        let mut graph = graph();
        let mut ambience = Ambience::new();
        let pending = ticket(ambience.update(&mut graph, Some(SoundKey::new("a.ogg", "1")), 1.0, 1.0));
        ambience.update(&mut graph, None, 1.0, 1.0);
        assert!(ambience
            .commit(&mut graph, &pending, &buffer(10), Output::Environment)
            .is_err());
        assert!(!ambience.is_playing());
    }

    #[test]
    fn test_abandon_allows_retry() {
        let mut graph = graph();
        let mut ambience = Ambience::new();
        let key = SoundKey::new("a.ogg", "1");
        let failed = ticket(ambience.update(&mut graph, Some(key.clone()), 1.0, 1.0));
        ambience.abandon(&failed);
        assert_eq!(ambience.sound(), None);
        assert!(matches!(
            ambience.update(&mut graph, Some(key), 1.0, 1.0),
            AmbienceChange::Fetch(_)
        ));
    }

    #[test]
    fn test_controller_routes_music_to_music_mixer() {
        let mut graph = graph();
        let mut controller = AmbienceController::new();
        let change = controller.update(
            &mut graph,
            AmbienceSlot::Music,
            Some(SoundKey::new("music/a.ogg", "m")),
            1.0,
            1.0,
        );
        let ticket = ticket(change);
        let output = AmbienceController::output(&mut graph, AmbienceSlot::Music);
        let music = controller.get_mut(AmbienceSlot::Music).unwrap();
        music.commit(&mut graph, &ticket, &buffer(10), output).unwrap();
        let gain = music.gain().unwrap();
        let mixer = graph.music_mixer();
        assert_eq!(graph.model().node(gain).unwrap().outputs, vec![mixer]);
        assert!(controller.get(AmbienceSlot::Object(1)).is_none());
    }
}
