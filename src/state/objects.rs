use crate::audio::ambience::Ambience;
use crate::audio::backend::NodeId;
use crate::audio::{AudioGraph, Output};
use crate::protocol::{ObjectId, Position};
use std::collections::HashMap;

/// A sound-emitting thing in the world.
#[derive(Debug)]
pub struct SpatialObject {
    pub id: ObjectId,
    pub position: Position,
    pub max_distance: f64,
    pub panner: NodeId,
    pub ambience: Ambience,
}

/// Every object the server has identified this session, plus which one the
/// player is.
#[derive(Debug, Default)]
pub struct SpatialObjectTable {
    objects: HashMap<ObjectId, SpatialObject>,
    character: Option<ObjectId>,
}

impl SpatialObjectTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the object on first sight, then moves it. Moving the
    /// character moves the listener too.
    pub fn identify(
        &mut self,
        graph: &mut AudioGraph,
        id: ObjectId,
        position: Position,
        max_distance: f64,
    ) -> &mut SpatialObject {
        let is_character = self.character == Some(id);
        let object = self.objects.entry(id).or_insert_with(|| {
            log::debug!("[Session] New object #{}", id);
            SpatialObject {
                id,
                position,
                max_distance,
                panner: graph.make_panner(Some(max_distance), Output::Environment),
                ambience: Ambience::new(),
            }
        });
        object.position = position;
        object.max_distance = max_distance;
        graph.set_position(object.panner, position);
        graph.set_max_distance(object.panner, max_distance);
        if is_character {
            graph.set_listener(position);
        }
        object
    }

    /// Forgets an object, silencing its ambience and anything playing from
    /// it. Deleting an unknown id does nothing.
    pub fn delete(&mut self, graph: &mut AudioGraph, id: ObjectId) -> bool {
        match self.objects.remove(&id) {
            Some(mut object) => {
                object.ambience.release(graph);
                graph.release(object.panner);
                true
            }
            None => false,
        }
    }

    /// Records the player's object. Returns false when it has not been
    /// identified yet; the listener follows once it is.
    pub fn set_character(&mut self, graph: &mut AudioGraph, id: ObjectId) -> bool {
        self.character = Some(id);
        match self.objects.get(&id) {
            Some(object) => {
                graph.set_listener(object.position);
                true
            }
            None => false,
        }
    }

    pub fn character(&self) -> Option<ObjectId> {
        self.character
    }

    pub fn get(&self, id: ObjectId) -> Option<&SpatialObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SpatialObject> {
        self.objects.get_mut(&id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn release_all(&mut self, graph: &mut AudioGraph) {
        let ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        for id in ids {
            self.delete(graph, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::headless::HeadlessBackend;
    use crate::audio::SoundBuffer;
    use pretty_assertions::assert_eq;

    fn graph() -> AudioGraph {
        AudioGraph::new(Box::new(HeadlessBackend::new()))
    }

    #[test]
    fn test_identify_creates_then_moves() {
        let mut graph = graph();
        let mut table = SpatialObjectTable::new();
        let panner = table
            .identify(&mut graph, 4, Position::new(1.0, 0.0, 0.0), 20.0)
            .panner;
        let moved = table.identify(&mut graph, 4, Position::new(2.0, 3.0, 0.0), 30.0);
        assert_eq!(moved.panner, panner);
        assert_eq!(moved.position, Position::new(2.0, 3.0, 0.0));
        assert_eq!(table.len(), 1);
        let environment = graph.environment_mixer();
        assert_eq!(graph.model().node(panner).unwrap().outputs, vec![environment]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let mut graph = graph();
        let mut table = SpatialObjectTable::new();
        let panner = table.identify(&mut graph, 1, Position::default(), 10.0).panner;
        let source = graph
            .play(&SoundBuffer::new(1, 8000, vec![0.1; 8]), "a.ogg", panner, true, 1.0)
            .unwrap();

        assert!(table.delete(&mut graph, 1));
        assert!(!graph.model().contains(panner));
        assert!(!graph.is_playing(source));
        assert!(!table.delete(&mut graph, 1));
        assert!(!table.delete(&mut graph, 99));
        assert!(table.is_empty());
    }

    #[test]
    fn test_character_moves_listener() {
        let mut graph = graph();
        let mut table = SpatialObjectTable::new();
        assert!(!table.set_character(&mut graph, 7));
        assert_eq!(graph.model().listener(), Position::default());

        table.identify(&mut graph, 7, Position::new(5.0, 5.0, 0.0), 10.0);
        assert_eq!(graph.model().listener(), Position::new(5.0, 5.0, 0.0));
        assert_eq!(table.character(), Some(7));
    }
}
