use super::backend::{NodeId, SourceId};
use super::{AudioGraph, Output, SoundBuffer};
use crate::error::AudioError;
use crate::protocol::Position;

/// Where a one-shot sound is heard from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Placement {
    /// Interface feedback: unpanned and dry.
    Interface,
    /// Through an existing panner (an object's).
    Through(NodeId),
    /// From a point in the world, via a throwaway panner.
    At {
        position: Position,
        volume: f64,
        max_distance: f64,
        dry: bool,
    },
}

pub fn play_one_shot(
    graph: &mut AudioGraph,
    buffer: &SoundBuffer,
    label: &str,
    placement: Placement,
) -> Result<SourceId, AudioError> {
    match placement {
        Placement::Interface => {
            let mixer = graph.dry_mixer();
            graph.play(buffer, label, mixer, false, 1.0)
        }
        Placement::Through(panner) => graph.play(buffer, label, panner, false, 1.0),
        Placement::At {
            position,
            volume,
            max_distance,
            dry,
        } => {
            let output = if dry {
                Output::Node(graph.dry_mixer())
            } else {
                Output::Environment
            };
            let panner = graph.make_panner(Some(max_distance), output);
            graph.set_gain(panner, volume);
            graph.set_position(panner, position);
            graph.release_when_idle(panner);
            graph.play(buffer, label, panner, false, 1.0)
        }
    }
}
