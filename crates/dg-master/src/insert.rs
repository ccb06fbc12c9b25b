//! Control-side model of one mixer insert.

use dg_engine::{InsertView, SendView, MAX_SENDS};
use dg_ir::InsertId;

use crate::analyser::SpectrumAnalyser;
use crate::chain::EffectChain;

/// Gains at or below this read as silence.
pub const MIN_GAIN_DB: f32 = -96.0;
pub const MAX_GAIN_DB: f32 = 24.0;

/// A post-fader send to another insert.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SendLevel {
    pub dest: InsertId,
    pub level: f32,
}

pub struct MixerInsert {
    pub id: InsertId,
    /// Render-side slot; fixed for the insert's lifetime.
    pub slot: usize,
    pub gain_db: f32,
    pub pan: f32,
    pub bypassed: bool,
    pub muted: bool,
    pub solo: bool,
    pub sends: Vec<SendLevel>,
    pub chain: EffectChain,
    /// Created on first spectrum read.
    pub analyser: Option<SpectrumAnalyser>,
}

impl MixerInsert {
    pub fn new(id: InsertId, slot: usize) -> Self {
        Self {
            id,
            slot,
            gain_db: 0.0,
            pan: 0.0,
            bypassed: false,
            muted: false,
            solo: false,
            sends: Vec::new(),
            chain: EffectChain::new(),
            analyser: None,
        }
    }

    pub fn gain(&self) -> f32 {
        db_to_gain(self.gain_db)
    }

    /// Set or clear (`level == 0`) a send. Returns false if a new send would
    /// exceed the per-insert limit.
    pub fn set_send(&mut self, dest: InsertId, level: f32) -> bool {
        match self.sends.iter().position(|s| s.dest == dest) {
            Some(i) if level <= 0.0 => {
                self.sends.remove(i);
            }
            Some(i) => self.sends[i].level = level,
            None if level <= 0.0 => {}
            None if self.sends.len() >= MAX_SENDS => return false,
            None => self.sends.push(SendLevel { dest, level }),
        }
        true
    }

    /// Render-facing view. Sends to inserts `slot_of` cannot place are
    /// left out.
    pub fn view(&self, slot_of: impl Fn(InsertId) -> Option<usize>) -> InsertView {
        let mut view = InsertView::new(self.id);
        view.gain = self.gain();
        view.pan = self.pan;
        view.bypassed = self.bypassed;
        view.muted = self.muted;
        view.solo = self.solo;
        view.chain = self.chain.view();
        view.sends = self
            .sends
            .iter()
            .filter_map(|s| slot_of(s.dest).map(|dest| SendView { dest, level: s.level }))
            .take(MAX_SENDS)
            .collect();
        view
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    if db <= MIN_GAIN_DB {
        0.0
    } else {
        10f32.powf(db / 20.0)
    }
}
