//! One-pole low-pass filter.

use core::f32::consts::TAU;

use dg_ir::AudioBuffer;

use crate::machine::{EffectProcessor, MachineInfo, MachineType, ParamInfo};

const DEFAULT_CUTOFF: f32 = 4410.0;

static PARAMS: &[ParamInfo] = &[ParamInfo {
    id: 0,
    name: "Cutoff",
    min: 20.0,
    max: 20_000.0,
    default: DEFAULT_CUTOFF,
}];

static INFO: MachineInfo = MachineInfo {
    name: "Lowpass",
    machine_type: MachineType::Effect,
    params: PARAMS,
};

/// `y = y_prev + alpha * (x - y_prev)` per channel.
pub struct LowpassFilter {
    prev: [f32; 2],
    alpha: f32,
    cutoff_hz: f32,
    sample_rate: u32,
}

impl LowpassFilter {
    pub fn new() -> Self {
        let mut filter = Self {
            prev: [0.0; 2],
            alpha: 0.0,
            cutoff_hz: DEFAULT_CUTOFF,
            sample_rate: 48_000,
        };
        filter.recompute_alpha();
        filter
    }

    fn recompute_alpha(&mut self) {
        let nyquist = self.sample_rate as f32 * 0.5;
        let fc = self.cutoff_hz.min(nyquist);
        self.alpha = 1.0 - (-TAU * fc / self.sample_rate as f32).exp();
    }
}

impl Default for LowpassFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectProcessor for LowpassFilter {
    fn info(&self) -> &MachineInfo {
        &INFO
    }

    fn init(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.recompute_alpha();
    }

    fn process(&mut self, buffer: &mut AudioBuffer, frames: usize) {
        let alpha = self.alpha;
        for ch in 0..buffer.channels().min(2) {
            let mut prev = self.prev[ch as usize];
            for s in buffer.channel_mut(ch).iter_mut().take(frames) {
                prev += alpha * (*s - prev);
                *s = prev;
            }
            self.prev[ch as usize] = prev;
        }
    }

    fn set_param(&mut self, param: u16, value: f32) {
        if param == 0 && value.is_finite() {
            self.cutoff_hz = value.clamp(PARAMS[0].min, PARAMS[0].max);
            self.recompute_alpha();
        }
    }

    fn reset(&mut self) {
        self.prev = [0.0; 2];
    }
}
