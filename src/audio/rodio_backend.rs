use super::backend::{AudioBackend, Microphone, Route, SourceId};
use super::microphone::CpalMicrophone;
use super::SoundBuffer;
use crate::error::AudioError;
use crate::protocol::Position;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Source, SpatialSink};
use std::any::Any;
use std::collections::HashMap;

/// Half the distance between the listener's ears, in world units.
const EAR_OFFSET: f32 = 0.1;

type BoxedSource = Box<dyn Source<Item = f32> + Send>;

/// Plays voices on the default output device, one spatial sink per voice.
pub struct RodioBackend {
    // The stream must outlive every sink; it is not Send, so the backend
    // stays on the session thread.
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    voices: HashMap<SourceId, SpatialSink>,
}

impl RodioBackend {
    pub fn new() -> Result<Self, AudioError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| AudioError::NoDevice(e.to_string()))?;
        log::info!("[Audio] Output device ready");
        Ok(Self {
            _stream: stream,
            stream_handle,
            voices: HashMap::new(),
        })
    }
}

fn point(position: Position) -> [f32; 3] {
    [position.x as f32, position.y as f32, position.z as f32]
}

fn ears(listener: Position) -> ([f32; 3], [f32; 3]) {
    let [x, y, z] = point(listener);
    ([x - EAR_OFFSET, y, z], [x + EAR_OFFSET, y, z])
}

fn emitter(route: &Route) -> [f32; 3] {
    point(route.emitter.unwrap_or(route.listener))
}

fn build_source(buffer: &SoundBuffer, looped: bool, route: &Route) -> BoxedSource {
    let samples = SamplesBuffer::new(buffer.channels, buffer.sample_rate, buffer.samples.to_vec());
    match (route.reverb, looped) {
        (Some((tail, amplitude)), true) => Box::new(samples.buffered().reverb(tail, amplitude).repeat_infinite()),
        (Some((tail, amplitude)), false) => Box::new(samples.buffered().reverb(tail, amplitude)),
        (None, true) => Box::new(samples.repeat_infinite()),
        (None, false) => Box::new(samples),
    }
}

impl AudioBackend for RodioBackend {
    fn start_voice(
        &mut self,
        source: SourceId,
        buffer: &SoundBuffer,
        looped: bool,
        route: &Route,
    ) -> Result<(), AudioError> {
        let (left, right) = ears(route.listener);
        let sink = SpatialSink::try_new(&self.stream_handle, emitter(route), left, right)
            .map_err(|e| AudioError::Playback(e.to_string()))?;
        sink.set_volume(route.volume);
        sink.set_speed(route.rate);
        sink.append(build_source(buffer, looped, route));
        sink.play();
        self.voices.insert(source, sink);
        Ok(())
    }

    fn update_voice(&mut self, source: SourceId, route: &Route) {
        if let Some(sink) = self.voices.get(&source) {
            let (left, right) = ears(route.listener);
            sink.set_emitter_position(emitter(route));
            sink.set_left_ear_position(left);
            sink.set_right_ear_position(right);
            sink.set_volume(route.volume);
            sink.set_speed(route.rate);
        }
    }

    fn stop_voice(&mut self, source: SourceId) {
        if let Some(sink) = self.voices.remove(&source) {
            sink.stop();
        }
    }

    fn finished_voices(&mut self) -> Vec<SourceId> {
        let finished: Vec<SourceId> = self
            .voices
            .iter()
            .filter(|(_, sink)| sink.empty())
            .map(|(source, _)| *source)
            .collect();
        for source in &finished {
            self.voices.remove(source);
        }
        finished
    }

    fn open_microphone(&mut self) -> Result<Box<dyn Microphone>, AudioError> {
        Ok(Box::new(CpalMicrophone::open()?))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
