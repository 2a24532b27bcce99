use super::backend::{Capture, Microphone};
use crate::error::AudioError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rodio::cpal;
use rodio::cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use rodio::cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Default input device, opened in whatever sample format it prefers and
/// kept as f32. The stream runs from the moment it is opened; samples are
/// only kept while recording and unmuted.
pub struct CpalMicrophone {
    _stream: cpal::Stream,
    buffer: Arc<Mutex<Vec<f32>>>,
    recording: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
    channels: u16,
    sample_rate: u32,
}

impl CpalMicrophone {
    pub fn open() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| AudioError::Microphone("no input device".to_string()))?;
        let config = device
            .default_input_config()
            .map_err(|e| AudioError::Microphone(e.to_string()))?;
        let channels = config.channels();
        let sample_rate = config.sample_rate().0;

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let recording = Arc::new(AtomicBool::new(false));
        let muted = Arc::new(AtomicBool::new(false));
        let tap = Tap {
            buffer: Arc::clone(&buffer),
            recording: Arc::clone(&recording),
            muted: Arc::clone(&muted),
        };

        let sample_format = config.sample_format();
        let config: cpal::StreamConfig = config.into();
        let stream = match sample_format {
            SampleFormat::F32 => tap.build::<f32>(&device, &config),
            SampleFormat::I16 => tap.build::<i16>(&device, &config),
            SampleFormat::U16 => tap.build::<u16>(&device, &config),
            SampleFormat::I32 => tap.build::<i32>(&device, &config),
            SampleFormat::U8 => tap.build::<u8>(&device, &config),
            other => {
                return Err(AudioError::Microphone(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(|e| AudioError::Microphone(e.to_string()))?;
        stream
            .play()
            .map_err(|e| AudioError::Microphone(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            buffer,
            recording,
            muted,
            channels,
            sample_rate,
        })
    }

    fn take_samples(&self) -> Vec<f32> {
        match self.buffer.lock() {
            Ok(mut samples) => std::mem::take(&mut *samples),
            Err(_) => Vec::new(),
        }
    }
}

/// The input callback's view of a [`CpalMicrophone`].
struct Tap {
    buffer: Arc<Mutex<Vec<f32>>>,
    recording: Arc<AtomicBool>,
    muted: Arc<AtomicBool>,
}

impl Tap {
    fn keep<T>(&self, data: &[T])
    where
        T: Sample,
        f32: FromSample<T>,
    {
        if !self.recording.load(Ordering::Relaxed) || self.muted.load(Ordering::Relaxed) {
            return;
        }
        if let Ok(mut samples) = self.buffer.lock() {
            samples.extend(data.iter().map(|sample| sample.to_sample::<f32>()));
        }
    }

    /// Builds an input stream in the device's own sample format, converting
    /// to f32 as samples arrive.
    fn build<T>(
        self,
        device: &cpal::Device,
        config: &cpal::StreamConfig,
    ) -> Result<cpal::Stream, cpal::BuildStreamError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        device.build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| self.keep(data),
            |e| log::error!("[Audio] Microphone stream error: {}", e),
            None,
        )
    }
}

impl Microphone for CpalMicrophone {
    fn start(&mut self) -> Result<(), AudioError> {
        self.take_samples();
        self.recording.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn stop(&mut self) -> Option<Capture> {
        if !self.recording.swap(false, Ordering::Relaxed) {
            return None;
        }
        Some(Capture {
            channels: self.channels,
            sample_rate: self.sample_rate,
            samples: self.take_samples(),
        })
    }

    fn cancel(&mut self) {
        self.recording.store(false, Ordering::Relaxed);
        self.take_samples();
    }

    fn set_muted(&mut self, muted: bool) {
        self.muted.store(muted, Ordering::Relaxed);
    }

    fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }
}

/// Encodes a capture as a base64 WAV file, or `None` when it is no louder
/// than `threshold` (RMS).
pub fn encode_transmission(capture: &Capture, threshold: f32) -> Result<Option<String>, AudioError> {
    if capture.samples.is_empty() || capture.rms() <= threshold {
        return Ok(None);
    }
    let spec = hound::WavSpec {
        channels: capture.channels,
        sample_rate: capture.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec)
            .map_err(|e| AudioError::Encode(e.to_string()))?;
        for sample in &capture.samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer
                .write_sample(value)
                .map_err(|e| AudioError::Encode(e.to_string()))?;
        }
        writer
            .finalize()
            .map_err(|e| AudioError::Encode(e.to_string()))?;
    }
    Ok(Some(STANDARD.encode(bytes)))
}
