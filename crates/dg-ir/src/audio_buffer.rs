//! Planar f32 audio buffer used for every bus in the mixer.

use alloc::vec;
use alloc::vec::Vec;

/// Maximum number of audio channels per buffer.
pub const MAX_CHANNELS: u16 = 8;

/// Channel count of instrument, insert and master buses.
pub const STEREO: u16 = 2;

/// Default block size for audio processing.
pub const BLOCK_SIZE: usize = 256;

/// A multichannel f32 audio buffer in planar layout.
///
/// Data is stored as `channels` contiguous planes of `frames` samples each.
/// `data[ch * frames + frame]` gives the sample for channel `ch` at `frame`.
/// A block may use fewer frames than the buffer holds; the `*_range`
/// helpers and `peak` take the number of live frames explicitly.
#[derive(Clone, Debug)]
pub struct AudioBuffer {
    data: Vec<f32>,
    channels: u16,
    frames: u16,
}

impl AudioBuffer {
    /// Create a new silent buffer with the given dimensions.
    pub fn new(channels: u16, frames: u16) -> Self {
        let channels = channels.min(MAX_CHANNELS);
        Self {
            data: vec![0.0; channels as usize * frames as usize],
            channels,
            frames,
        }
    }

    /// A silent stereo buffer holding `frames` frames.
    pub fn stereo(frames: usize) -> Self {
        Self::new(STEREO, frames.min(u16::MAX as usize) as u16)
    }

    /// Fill all samples with zero.
    pub fn silence(&mut self) {
        self.data.fill(0.0);
    }

    /// Zero frames `start..end` of every channel.
    pub fn silence_range(&mut self, start: usize, end: usize) {
        let end = end.min(self.frames as usize);
        if start >= end {
            return;
        }
        for ch in 0..self.channels {
            self.channel_mut(ch)[start..end].fill(0.0);
        }
    }

    /// Number of channels.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames.
    pub fn frames(&self) -> u16 {
        self.frames
    }

    /// Read-only access to one channel's sample data.
    pub fn channel(&self, ch: u16) -> &[f32] {
        let start = ch as usize * self.frames as usize;
        &self.data[start..start + self.frames as usize]
    }

    /// Mutable access to one channel's sample data.
    pub fn channel_mut(&mut self, ch: u16) -> &mut [f32] {
        let start = ch as usize * self.frames as usize;
        let len = self.frames as usize;
        &mut self.data[start..start + len]
    }

    /// Mutable access to the left and right planes at once.
    ///
    /// A mono buffer yields its only plane and an empty right slice.
    pub fn stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let frames = self.frames as usize;
        let mid = frames.min(self.data.len());
        let (left, rest) = self.data.split_at_mut(mid);
        let right_len = frames.min(rest.len());
        (left, &mut rest[..right_len])
    }

    /// Overwrite this buffer with the overlapping part of `source`.
    pub fn copy_from(&mut self, source: &AudioBuffer) {
        let chs = self.channels.min(source.channels);
        let frs = self.frames.min(source.frames) as usize;
        for ch in 0..chs {
            self.channel_mut(ch)[..frs].copy_from_slice(&source.channel(ch)[..frs]);
        }
    }

    /// Sum overlapping channels from `source` into this buffer.
    pub fn mix_from(&mut self, source: &AudioBuffer) {
        self.mix_from_scaled(source, 1.0);
    }

    /// Sum overlapping channels from `source` into this buffer with gain.
    pub fn mix_from_scaled(&mut self, source: &AudioBuffer, gain: f32) {
        let chs = self.channels.min(source.channels);
        let frs = self.frames.min(source.frames) as usize;
        for ch in 0..chs {
            let dst = self.channel_mut(ch);
            let src = source.channel(ch);
            for i in 0..frs {
                dst[i] += src[i] * gain;
            }
        }
    }

    /// Scale all samples by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        for s in &mut self.data {
            *s *= gain;
        }
    }

    /// Largest absolute sample of channel `ch` within the first `frames` frames.
    pub fn channel_peak(&self, ch: u16, frames: usize) -> f32 {
        if ch >= self.channels {
            return 0.0;
        }
        let frames = frames.min(self.frames as usize);
        self.channel(ch)[..frames]
            .iter()
            .fold(0.0f32, |peak, s| peak.max(s.abs()))
    }

    /// Largest absolute sample over all channels within the first `frames` frames.
    pub fn peak(&self, frames: usize) -> f32 {
        (0..self.channels).fold(0.0f32, |peak, ch| peak.max(self.channel_peak(ch, frames)))
    }

    /// Write the first `frames` frames interleaved into `out`, which holds
    /// `out_channels` samples per frame. Extra device channels get silence;
    /// a mono device gets the left plane.
    pub fn write_interleaved(&self, out: &mut [f32], out_channels: usize, frames: usize) {
        let frames = frames.min(self.frames as usize);
        for (i, frame) in out.chunks_mut(out_channels).take(frames).enumerate() {
            for (ch, sample) in frame.iter_mut().enumerate() {
                *sample = if (ch as u16) < self.channels {
                    self.channel(ch as u16)[i]
                } else {
                    0.0
                };
            }
        }
    }
}

/// Left/right gains for a pan position in `[-1, 1]`.
///
/// Equal-power law with an extra narrowing term: the side opposite the pan
/// direction is scaled down linearly so that hard pan fully silences it.
pub fn pan_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    let theta = (pan + 1.0) * core::f32::consts::FRAC_PI_4;
    let mut left = libm::cosf(theta);
    let mut right = libm::sinf(theta);
    if pan > 0.0 {
        left *= 1.0 - pan;
    } else if pan < 0.0 {
        right *= 1.0 + pan;
    }
    (left, right)
}
