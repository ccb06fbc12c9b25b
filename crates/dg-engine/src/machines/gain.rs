//! Static gain effect.

use dg_ir::AudioBuffer;

use crate::machine::{EffectProcessor, MachineInfo, MachineType, ParamInfo};

static PARAMS: &[ParamInfo] = &[ParamInfo {
    id: 0,
    name: "Gain",
    min: 0.0,
    max: 4.0,
    default: 1.0,
}];

static INFO: MachineInfo = MachineInfo {
    name: "Gain",
    machine_type: MachineType::Effect,
    params: PARAMS,
};

pub struct GainEffect {
    gain: f32,
}

impl GainEffect {
    pub fn new() -> Self {
        Self { gain: 1.0 }
    }
}

impl Default for GainEffect {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectProcessor for GainEffect {
    fn info(&self) -> &MachineInfo {
        &INFO
    }

    fn init(&mut self, _sample_rate: u32) {}

    fn process(&mut self, buffer: &mut AudioBuffer, frames: usize) {
        for ch in 0..buffer.channels() {
            for s in buffer.channel_mut(ch).iter_mut().take(frames) {
                *s *= self.gain;
            }
        }
    }

    fn set_param(&mut self, param: u16, value: f32) {
        if param == 0 && value.is_finite() {
            self.gain = value.clamp(PARAMS[0].min, PARAMS[0].max);
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_only_live_frames() {
        let mut g = GainEffect::new();
        g.set_param(0, 0.5);
        let mut buf = AudioBuffer::stereo(3);
        buf.channel_mut(0).fill(1.0);
        g.process(&mut buf, 2);
        assert_eq!(buf.channel(0), &[0.5, 0.5, 1.0]);
    }

    #[test]
    fn gain_is_clamped() {
        let mut g = GainEffect::new();
        g.set_param(0, 100.0);
        assert_eq!(g.gain, 4.0);
        g.set_param(0, f32::NAN);
        assert_eq!(g.gain, 4.0);
    }
}
