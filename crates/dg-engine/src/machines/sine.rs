//! Small polyphonic sine instrument used for demos and tests.

use core::f32::consts::TAU;

use arrayvec::ArrayVec;
use dg_ir::AudioBuffer;

use crate::machine::{InstrumentProcessor, MachineInfo, MachineType, ParamInfo};

const MAX_VOICES: usize = 8;
const RELEASE_MS: f32 = 5.0;

static PARAMS: &[ParamInfo] = &[ParamInfo {
    id: 0,
    name: "Level",
    min: 0.0,
    max: 1.0,
    default: 0.25,
}];

static INFO: MachineInfo = MachineInfo {
    name: "Sine",
    machine_type: MachineType::Instrument,
    params: PARAMS,
};

#[derive(Clone, Copy, Debug)]
struct Voice {
    note: u8,
    phase: f32,
    increment: f32,
    amplitude: f32,
    /// 1.0 while held, ramps to 0 after release.
    envelope: f32,
    releasing: bool,
}

pub struct SineInstrument {
    voices: ArrayVec<Voice, MAX_VOICES>,
    level: f32,
    sample_rate: u32,
    release_step: f32,
}

impl SineInstrument {
    pub fn new() -> Self {
        let mut inst = Self {
            voices: ArrayVec::new(),
            level: PARAMS[0].default,
            sample_rate: 48_000,
            release_step: 0.0,
        };
        inst.init(48_000);
        inst
    }

    /// Number of voices still producing sound.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }
}

impl Default for SineInstrument {
    fn default() -> Self {
        Self::new()
    }
}

fn note_hz(note: u8) -> f32 {
    440.0 * ((note as f32 - 69.0) / 12.0).exp2()
}

impl InstrumentProcessor for SineInstrument {
    fn info(&self) -> &MachineInfo {
        &INFO
    }

    fn init(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        self.release_step = 1000.0 / (RELEASE_MS * self.sample_rate as f32);
    }

    fn note_on(&mut self, note: u8, velocity: u8) {
        if self.voices.is_full() {
            // Steal the oldest voice.
            self.voices.remove(0);
        }
        self.voices.push(Voice {
            note,
            phase: 0.0,
            increment: note_hz(note) / self.sample_rate as f32,
            amplitude: velocity as f32 / 127.0,
            envelope: 1.0,
            releasing: false,
        });
    }

    fn note_off(&mut self, note: u8) {
        for v in self.voices.iter_mut().filter(|v| v.note == note) {
            v.releasing = true;
        }
    }

    fn all_notes_off(&mut self) {
        for v in &mut self.voices {
            v.releasing = true;
        }
    }

    fn set_param(&mut self, param: u16, value: f32) {
        if param == 0 && value.is_finite() {
            self.level = value.clamp(0.0, 1.0);
        }
    }

    fn render(&mut self, output: &mut AudioBuffer, start: usize, end: usize) {
        let end = end.min(output.frames() as usize);
        if start >= end || self.voices.is_empty() {
            return;
        }
        let level = self.level;
        let release_step = self.release_step;
        let (left, right) = output.stereo_mut();
        for voice in &mut self.voices {
            for i in start..end {
                if voice.releasing {
                    voice.envelope = (voice.envelope - release_step).max(0.0);
                }
                let s = (voice.phase * TAU).sin() * voice.amplitude * voice.envelope * level;
                left[i] += s;
                if let Some(r) = right.get_mut(i) {
                    *r += s;
                }
                voice.phase = (voice.phase + voice.increment).fract();
            }
        }
        self.voices.retain(|v| v.envelope > 0.0);
    }

    fn reset(&mut self) {
        self.voices.clear();
    }
}
