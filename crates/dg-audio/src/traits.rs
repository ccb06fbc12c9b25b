//! Audio output trait and error types.

use dg_engine::Engine;
use thiserror::Error;

/// Error type for audio operations.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("device init error: {0}")]
    DeviceInit(String),
    #[error("stream create error: {0}")]
    StreamCreate(String),
    #[error("playback error: {0}")]
    Playback(String),
    #[error("no audio device available")]
    NoDevice,
    #[error("engine runs at {engine} Hz but the device at {device} Hz")]
    SampleRateMismatch { engine: u32, device: u32 },
}

/// Trait for audio output backends.
pub trait AudioOutput {
    /// Device sample rate; the engine must be built for it.
    fn sample_rate(&self) -> u32;

    /// Hand the engine to the device callback and start the stream.
    fn run(&mut self, engine: Engine) -> Result<(), AudioError>;

    /// Resume a stopped stream.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Output silence and pause the stream. The engine is kept.
    fn stop(&mut self) -> Result<(), AudioError>;
}
