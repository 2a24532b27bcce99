use super::ambience::Ticket;
use super::backend::NodeId;
use super::{AudioGraph, Output, SoundBuffer};
use crate::error::StaleUpdate;
use crate::protocol::SoundKey;

/// The room's convolution send: environment mixer → convolver → wet gain →
/// speakers. Loaded the same way as an ambience, with the same staleness
/// rule.
#[derive(Debug, Default)]
pub struct Reverb {
    impulse: Option<SoundKey>,
    volume: f64,
    convolver: Option<NodeId>,
    wet: Option<NodeId>,
    generation: u64,
}

impl Reverb {
    pub fn new() -> Self {
        Self {
            volume: 1.0,
            ..Self::default()
        }
    }

    pub fn impulse(&self) -> Option<&SoundKey> {
        self.impulse.as_ref()
    }

    pub fn convolver(&self) -> Option<NodeId> {
        self.convolver
    }

    /// Returns the ticket to fetch with when the impulse changed.
    pub fn update(
        &mut self,
        graph: &mut AudioGraph,
        impulse: Option<SoundKey>,
        volume: f64,
    ) -> Option<Ticket> {
        self.volume = volume;
        if impulse.is_some() && impulse == self.impulse {
            if let Some(wet) = self.wet {
                graph.set_gain(wet, volume);
            }
            return None;
        }
        self.detach(graph);
        self.generation += 1;
        self.impulse = impulse.clone();
        impulse.map(|key| Ticket {
            key,
            generation: self.generation,
        })
    }

    pub fn commit(
        &mut self,
        graph: &mut AudioGraph,
        ticket: &Ticket,
        buffer: &SoundBuffer,
    ) -> Result<(), StaleUpdate> {
        if ticket.generation != self.generation || self.impulse.as_ref() != Some(&ticket.key) {
            return Err(StaleUpdate(ticket.key.to_string()));
        }
        self.detach(graph);
        let wet = graph.make_gain(self.volume, Output::Destination);
        let convolver = graph.make_convolver(buffer, Output::Node(wet));
        let environment = graph.environment_mixer();
        graph.connect(environment, convolver);
        self.wet = Some(wet);
        self.convolver = Some(convolver);
        Ok(())
    }

    /// Forgets an impulse whose fetch failed so it can be asked for again.
    pub fn abandon(&mut self, ticket: &Ticket) {
        if ticket.generation == self.generation && self.impulse.as_ref() == Some(&ticket.key) {
            self.impulse = None;
            self.generation += 1;
        }
    }

    fn detach(&mut self, graph: &mut AudioGraph) {
        if let Some(convolver) = self.convolver.take() {
            graph.release(convolver);
        }
        if let Some(wet) = self.wet.take() {
            graph.release(wet);
        }
    }

    pub fn release(&mut self, graph: &mut AudioGraph) {
        self.detach(graph);
        self.impulse = None;
        self.generation += 1;
    }
}
