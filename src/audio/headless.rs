use super::backend::{AudioBackend, Capture, Microphone, Route, SourceId};
use super::SoundBuffer;
use crate::error::AudioError;
use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// What the headless backend was asked to do, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum VoiceEvent {
    Started {
        source: SourceId,
        samples: usize,
        looped: bool,
        volume: f32,
    },
    Stopped(SourceId),
    MicrophoneOpened,
}

pub type VoiceLog = Rc<RefCell<Vec<VoiceEvent>>>;

/// Backend for running without a sound device. Keeps the last route of
/// every voice so the mix can be inspected.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    routes: BTreeMap<SourceId, (bool, Route)>,
    log: VoiceLog,
    input_level: f32,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the microphone hear a square wave of this amplitude instead
    /// of silence.
    pub fn with_input_level(mut self, level: f32) -> Self {
        self.input_level = level;
        self
    }

    /// Shared handle on the event log; stays readable after the backend has
    /// been boxed into a graph.
    pub fn log(&self) -> VoiceLog {
        Rc::clone(&self.log)
    }

    pub fn route(&self, source: SourceId) -> Option<&Route> {
        self.routes.get(&source).map(|(_, route)| route)
    }

    pub fn active(&self) -> usize {
        self.routes.len()
    }
}

impl AudioBackend for HeadlessBackend {
    fn start_voice(
        &mut self,
        source: SourceId,
        buffer: &SoundBuffer,
        looped: bool,
        route: &Route,
    ) -> Result<(), AudioError> {
        self.routes.insert(source, (looped, route.clone()));
        self.log.borrow_mut().push(VoiceEvent::Started {
            source,
            samples: buffer.samples.len(),
            looped,
            volume: route.volume,
        });
        Ok(())
    }

    fn update_voice(&mut self, source: SourceId, route: &Route) {
        if let Some((_, current)) = self.routes.get_mut(&source) {
            *current = route.clone();
        }
    }

    fn stop_voice(&mut self, source: SourceId) {
        if self.routes.remove(&source).is_some() {
            self.log.borrow_mut().push(VoiceEvent::Stopped(source));
        }
    }

    /// Nothing is rendered, so one-shots are over as soon as anyone asks.
    fn finished_voices(&mut self) -> Vec<SourceId> {
        let finished: Vec<SourceId> = self
            .routes
            .iter()
            .filter(|(_, (looped, _))| !looped)
            .map(|(source, _)| *source)
            .collect();
        for source in &finished {
            self.routes.remove(source);
        }
        finished
    }

    fn open_microphone(&mut self) -> Result<Box<dyn Microphone>, AudioError> {
        self.log.borrow_mut().push(VoiceEvent::MicrophoneOpened);
        Ok(Box::new(HeadlessMicrophone::new(self.input_level)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Hears a constant level; silence unless the backend was given one.
#[derive(Debug, Default)]
pub struct HeadlessMicrophone {
    level: f32,
    recording: bool,
    muted: bool,
}

impl HeadlessMicrophone {
    pub fn new(level: f32) -> Self {
        Self {
            level,
            ..Self::default()
        }
    }
}

impl Microphone for HeadlessMicrophone {
    fn start(&mut self) -> Result<(), AudioError> {
        self.recording = true;
        Ok(())
    }

    fn stop(&mut self) -> Option<Capture> {
        if !std::mem::take(&mut self.recording) {
            return None;
        }
        Some(Capture {
            channels: 1,
            sample_rate: 16000,
            samples: if self.muted {
                Vec::new()
            } else {
                (0..1600)
                    .map(|i| if i % 2 == 0 { self.level } else { -self.level })
                    .collect()
            },
        })
    }

    fn cancel(&mut self) {
        self.recording = false;
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    fn is_recording(&self) -> bool {
        self.recording
    }
}
