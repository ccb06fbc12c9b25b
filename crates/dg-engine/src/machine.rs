//! Processor traits for instruments and effects.
//!
//! The engine treats processors as opaque units with a fixed parameter and
//! IO contract. All methods run on the render path and must not allocate,
//! lock or block.

use dg_ir::AudioBuffer;

/// Whether a machine generates or processes audio.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MachineType {
    Instrument,
    Effect,
}

/// Metadata describing a machine parameter.
#[derive(Debug)]
pub struct ParamInfo {
    pub id: u16,
    pub name: &'static str,
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

/// Static metadata about a machine.
#[derive(Debug)]
pub struct MachineInfo {
    pub name: &'static str,
    pub machine_type: MachineType,
    pub params: &'static [ParamInfo],
}

impl MachineInfo {
    pub fn param(&self, id: u16) -> Option<&ParamInfo> {
        self.params.iter().find(|p| p.id == id)
    }
}

/// An effect unit processing a stereo bus in place.
pub trait EffectProcessor: Send {
    fn info(&self) -> &MachineInfo;
    fn init(&mut self, sample_rate: u32);
    /// Process the first `frames` frames of `buffer` in place.
    fn process(&mut self, buffer: &mut AudioBuffer, frames: usize);
    fn set_param(&mut self, param: u16, value: f32);
    /// Clear internal state such as filter memory and tails.
    fn reset(&mut self);
}

/// A sound source driven by note and automation events.
pub trait InstrumentProcessor: Send {
    fn info(&self) -> &MachineInfo;
    fn init(&mut self, sample_rate: u32);
    fn note_on(&mut self, note: u8, velocity: u8);
    fn note_off(&mut self, note: u8);
    /// Release every sounding note.
    fn all_notes_off(&mut self);
    fn set_param(&mut self, param: u16, value: f32);
    /// Add frames `start..end` of output into `output`.
    fn render(&mut self, output: &mut AudioBuffer, start: usize, end: usize);
    /// Silence immediately and forget all voice state.
    fn reset(&mut self);
}
