//! Passthrough effect: stands in for a unit that failed to instantiate.
//!
//! Keeps the insert audible and the chain shape intact.

use dg_ir::AudioBuffer;

use crate::machine::{EffectProcessor, MachineInfo, MachineType};

static INFO: MachineInfo = MachineInfo {
    name: "Passthrough",
    machine_type: MachineType::Effect,
    params: &[],
};

pub struct Passthrough;

impl EffectProcessor for Passthrough {
    fn info(&self) -> &MachineInfo { &INFO }
    fn init(&mut self, _sample_rate: u32) {}
    fn process(&mut self, _buffer: &mut AudioBuffer, _frames: usize) {}
    fn set_param(&mut self, _param: u16, _value: f32) {}
    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_leaves_buffer_unchanged() {
        let mut m = Passthrough;
        m.init(44100);
        let mut buf = AudioBuffer::stereo(2);
        buf.channel_mut(0).copy_from_slice(&[0.5, -0.3]);
        buf.channel_mut(1).copy_from_slice(&[0.8, -0.1]);
        let original = buf.clone();
        m.process(&mut buf, 2);
        assert_eq!(buf.channel(0), original.channel(0));
        assert_eq!(buf.channel(1), original.channel(1));
    }
}
