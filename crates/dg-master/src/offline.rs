//! Offline rendering and WAV export.
//!
//! `OfflineRenderer` runs the session and its engine in lockstep on the
//! calling thread: one control tick, then one block. Control time is
//! derived from the render clock, so results are deterministic.

use std::io::{Cursor, Seek, Write};
use std::path::Path;
use std::time::Duration;

use dg_engine::Engine;
use dg_ir::AudioBuffer;

use crate::error::ExportError;
use crate::session::Session;

pub struct OfflineRenderer {
    session: Session,
    engine: Engine,
    block: AudioBuffer,
}

impl OfflineRenderer {
    pub fn new(session: Session, engine: Engine) -> Self {
        let block = AudioBuffer::stereo(engine.settings().block_size);
        Self { session, engine, block }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn sample_rate(&self) -> u32 {
        self.engine.settings().sample_rate
    }

    /// Control time matching the render clock.
    pub fn elapsed(&self) -> Duration {
        let rate = u64::from(self.sample_rate());
        let samples = self.engine.sample_time();
        Duration::from_secs(samples / rate)
            + Duration::from_nanos((samples % rate) * 1_000_000_000 / rate)
    }

    /// Tick and render one block, appending it interleaved to `out`.
    pub fn render_block(&mut self, out: &mut Vec<f32>) {
        self.session.tick_at(self.elapsed());
        self.engine.process_block(&mut self.block);
        let frames = self.engine.settings().block_size;
        let start = out.len();
        out.resize(start + frames * 2, 0.0);
        self.block.write_interleaved(&mut out[start..], 2, frames);
    }

    /// Render at least `frames` frames (whole blocks) of interleaved stereo.
    pub fn render_frames(&mut self, frames: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * 2 + self.engine.settings().block_size * 2);
        while out.len() < frames * 2 {
            self.render_block(&mut out);
        }
        out
    }

    pub fn render_seconds(&mut self, seconds: f64) -> Vec<f32> {
        let frames = (seconds.max(0.0) * f64::from(self.sample_rate())).ceil() as usize;
        self.render_frames(frames)
    }

    pub fn into_parts(self) -> (Session, Engine) {
        (self.session, self.engine)
    }
}

/// Write interleaved stereo samples as 16-bit PCM.
pub fn write_wav<W: Write + Seek>(
    writer: W,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), ExportError> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut wav = hound::WavWriter::new(writer, spec)?;
    for s in samples {
        wav.write_sample((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
    }
    wav.finalize()?;
    Ok(())
}

pub fn write_wav_file(
    path: impl AsRef<Path>,
    samples: &[f32],
    sample_rate: u32,
) -> Result<(), ExportError> {
    let file = std::io::BufWriter::new(std::fs::File::create(path).map_err(hound::Error::IoError)?);
    write_wav(file, samples, sample_rate)
}

pub fn wav_bytes(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, ExportError> {
    let mut cursor = Cursor::new(Vec::new());
    write_wav(&mut cursor, samples, sample_rate)?;
    Ok(cursor.into_inner())
}
