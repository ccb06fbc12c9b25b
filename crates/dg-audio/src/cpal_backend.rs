//! CPAL-based audio output backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, Stream, StreamConfig};
use dg_engine::Engine;
use log::{error, info};

use crate::traits::{AudioError, AudioOutput};

/// CPAL-based audio output.
///
/// The engine is moved into the device callback, which renders straight
/// into the device buffer; nothing sits between them.
pub struct CpalOutput {
    device: Device,
    config: StreamConfig,
    stream: Option<Stream>,
    running: Arc<AtomicBool>,
}

impl CpalOutput {
    /// Open the default output device.
    pub fn open() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDevice)?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DeviceInit(e.to_string()))?;

        let mut config: StreamConfig = config.into();
        // The engine renders stereo; extra channels are written silent.
        config.channels = config.channels.max(2);

        Ok(Self { device, config, stream: None, running: Arc::new(AtomicBool::new(false)) })
    }

    pub fn channels(&self) -> usize {
        self.config.channels as usize
    }
}

impl AudioOutput for CpalOutput {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn run(&mut self, mut engine: Engine) -> Result<(), AudioError> {
        let device_rate = self.sample_rate();
        let engine_rate = engine.settings().sample_rate;
        if engine_rate != device_rate {
            return Err(AudioError::SampleRateMismatch { engine: engine_rate, device: device_rate });
        }

        let running = Arc::clone(&self.running);
        let channels = self.channels();
        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    if running.load(Ordering::Relaxed) {
                        engine.render_interleaved(data, channels);
                    } else {
                        data.fill(0.0);
                    }
                },
                |err| error!("audio stream error: {err}"),
                None,
            )
            .map_err(|e| AudioError::StreamCreate(e.to_string()))?;

        self.running.store(true, Ordering::Relaxed);
        stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        self.stream = Some(stream);
        info!("audio stream running: {device_rate} Hz, {channels} channels");
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioError> {
        self.running.store(true, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.play().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        self.running.store(false, Ordering::Relaxed);
        if let Some(ref stream) = self.stream {
            stream.pause().map_err(|e| AudioError::Playback(e.to_string()))?;
        }
        Ok(())
    }
}
