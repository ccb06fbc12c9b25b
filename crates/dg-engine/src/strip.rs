//! Render-side insert strip: effect chain, bypass, gain, pan, metering.

use core::ops::Range;

use arrayvec::ArrayVec;
use dg_ir::{pan_gains, AudioBuffer, EffectId, InsertId};
use ringbuf::traits::Producer;
use ringbuf::HeapProd;

use crate::graph_state::{InsertView, MAX_CHAIN};
use crate::machine::EffectProcessor;
use crate::meter::MeterBank;
use crate::ramp::ParamRamp;

/// An installed effect.
pub struct ChainUnit {
    pub id: EffectId,
    pub unit: Box<dyn EffectProcessor>,
}

/// What `InsertStrip::process` needs to know about its surroundings.
pub struct StripContext<'a> {
    pub slot: usize,
    pub block_start: u64,
    pub threshold: f32,
    pub meters: &'a MeterBank,
}

/// Result of processing one block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StripOutcome {
    /// Input or output rose above the silence threshold.
    pub signal: bool,
    /// The strip was asleep and skipped all work.
    pub slept: bool,
    /// The analysis tap could not take the whole block.
    pub tap_overrun: bool,
}

pub struct InsertStrip {
    id: InsertId,
    /// Summed input; processed in place and read back as the output.
    bus: AudioBuffer,
    /// Dry copy for bypass crossfades; mono scratch for the tap otherwise.
    dry: AudioBuffer,
    units: Vec<ChainUnit>,
    /// Chain order as last synced from the topology.
    order: ArrayVec<EffectId, MAX_CHAIN>,
    /// Index into `units` for each `order` position; `None` until installed.
    resolved: ArrayVec<Option<usize>, MAX_CHAIN>,
    gain: ParamRamp,
    left: ParamRamp,
    right: ParamRamp,
    /// 1.0 runs the chain, 0.0 bypasses it.
    wet: ParamRamp,
    synced: bool,
    rebuilds: u32,
    tap: Option<HeapProd<f32>>,
    sample_rate: u32,
}

impl InsertStrip {
    pub fn new(id: InsertId, block_size: usize, sample_rate: u32, ramp_samples: u32) -> Self {
        let (l, r) = pan_gains(0.0);
        Self {
            id,
            bus: AudioBuffer::stereo(block_size),
            dry: AudioBuffer::stereo(block_size),
            units: Vec::with_capacity(MAX_CHAIN),
            order: ArrayVec::new(),
            resolved: ArrayVec::new(),
            gain: ParamRamp::new(1.0, ramp_samples),
            left: ParamRamp::new(l, ramp_samples),
            right: ParamRamp::new(r, ramp_samples),
            wet: ParamRamp::new(1.0, ramp_samples),
            synced: false,
            rebuilds: 0,
            tap: None,
            sample_rate,
        }
    }

    pub fn id(&self) -> InsertId {
        self.id
    }

    pub fn bus(&self) -> &AudioBuffer {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut AudioBuffer {
        &mut self.bus
    }

    /// Chain segments rebuilt since creation.
    pub fn rebuild_count(&self) -> u32 {
        self.rebuilds
    }

    /// Effect ids in processing order.
    pub fn chain(&self) -> &[EffectId] {
        &self.order
    }

    /// Apply a committed view: ramp targets, bypass and chain order.
    /// Returns the chain positions that had to be re-resolved, if any.
    pub fn sync(&mut self, view: &InsertView) -> Option<Range<usize>> {
        let (l, r) = pan_gains(view.pan);
        let wet = if view.bypassed { 0.0 } else { 1.0 };
        if self.synced {
            self.gain.set_target(view.gain);
            self.left.set_target(l);
            self.right.set_target(r);
            self.wet.set_target(wet);
        } else {
            self.gain.jump(view.gain);
            self.left.jump(l);
            self.right.jump(r);
            self.wet.jump(wet);
            self.synced = true;
        }
        self.sync_chain(&view.chain)
    }

    fn sync_chain(&mut self, chain: &[EffectId]) -> Option<Range<usize>> {
        if self.order.as_slice() == chain {
            return None;
        }
        let old_len = self.order.len();
        let new_len = chain.len();
        let prefix = self.order.iter().zip(chain).take_while(|(a, b)| a == b).count();
        let max_suffix = old_len.min(new_len) - prefix;
        let suffix = self
            .order
            .iter()
            .rev()
            .zip(chain.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();

        let mut resolved = ArrayVec::new();
        for (pos, id) in chain.iter().enumerate() {
            let r = if pos < prefix {
                self.resolved[pos]
            } else if pos >= new_len - suffix {
                self.resolved[pos + old_len - new_len]
            } else {
                self.units.iter().position(|u| u.id == *id)
            };
            resolved.push(r);
        }
        self.order.clear();
        // `chain` comes from an ArrayVec of the same capacity.
        let _ = self.order.try_extend_from_slice(chain);
        self.resolved = resolved;
        self.rebuilds += 1;
        Some(prefix..new_len - suffix)
    }

    /// Take ownership of an effect. A full strip hands it back.
    pub fn install(
        &mut self,
        id: EffectId,
        mut unit: Box<dyn EffectProcessor>,
    ) -> Result<(), Box<dyn EffectProcessor>> {
        if self.units.len() == self.units.capacity() {
            return Err(unit);
        }
        unit.init(self.sample_rate);
        let index = self.units.len();
        self.units.push(ChainUnit { id, unit });
        for (pos, order_id) in self.order.iter().enumerate() {
            if *order_id == id {
                self.resolved[pos] = Some(index);
            }
        }
        Ok(())
    }

    /// Give up an effect; its chain position passes audio through until the
    /// next topology drops it.
    pub fn retire(&mut self, id: EffectId) -> Option<Box<dyn EffectProcessor>> {
        let index = self.units.iter().position(|u| u.id == id)?;
        let last = self.units.len() - 1;
        let removed = self.units.swap_remove(index);
        for r in &mut self.resolved {
            if *r == Some(index) {
                *r = None;
            } else if *r == Some(last) {
                *r = Some(index);
            }
        }
        Some(removed.unit)
    }

    pub fn set_effect_param(&mut self, id: EffectId, param: u16, value: f32) -> bool {
        match self.units.iter_mut().find(|u| u.id == id) {
            Some(u) => {
                u.unit.set_param(param, value);
                true
            }
            None => false,
        }
    }

    /// Swap in an analysis tap, returning the previous one.
    pub fn attach_tap(&mut self, tap: HeapProd<f32>) -> Option<HeapProd<f32>> {
        self.tap.replace(tap)
    }

    /// Clear effect tails.
    pub fn reset_effects(&mut self) {
        for u in &mut self.units {
            u.unit.reset();
        }
    }

    /// Process the first `frames` frames of the bus in place.
    pub fn process(&mut self, frames: usize, ctx: &StripContext<'_>) -> StripOutcome {
        let frames = frames.min(self.bus.frames() as usize);
        let mut outcome = StripOutcome::default();
        let input_peak = self.bus.peak(frames);

        if ctx.meters.is_sleeping(ctx.slot) {
            if input_peak > ctx.threshold {
                ctx.meters.wake(ctx.slot, ctx.block_start);
            } else {
                self.bus.silence_range(0, frames);
                outcome.slept = true;
                return outcome;
            }
        }

        self.run_chain(frames);
        self.apply_gain_pan(frames);

        let peak_l = self.bus.channel_peak(0, frames);
        let peak_r = self.bus.channel_peak(1, frames);
        ctx.meters.record_peak(ctx.slot, peak_l, peak_r);
        outcome.signal = input_peak > ctx.threshold || peak_l.max(peak_r) > ctx.threshold;
        if outcome.signal {
            ctx.meters.mark_signal(ctx.slot, ctx.block_start + frames as u64);
        }
        outcome.tap_overrun = self.feed_tap(frames);
        outcome
    }

    fn run_chain(&mut self, frames: usize) {
        let wet_settled = self.wet.is_settled();
        if wet_settled && self.wet.value() == 0.0 {
            return;
        }
        let crossfade = !wet_settled;
        if crossfade {
            self.dry.copy_from(&self.bus);
        }
        for r in self.resolved.iter().flatten() {
            if let Some(u) = self.units.get_mut(*r) {
                u.unit.process(&mut self.bus, frames);
            }
        }
        if crossfade {
            let (wet_l, wet_r) = self.bus.stereo_mut();
            let dry_l = self.dry.channel(0);
            let dry_r = self.dry.channel(1);
            for i in 0..frames {
                let w = self.wet.next();
                wet_l[i] = dry_l[i] + (wet_l[i] - dry_l[i]) * w;
                if let Some(s) = wet_r.get_mut(i) {
                    *s = dry_r[i] + (*s - dry_r[i]) * w;
                }
            }
        }
    }

    fn apply_gain_pan(&mut self, frames: usize) {
        let (l, r) = self.bus.stereo_mut();
        for i in 0..frames {
            let g = self.gain.next();
            l[i] *= g * self.left.next();
            let gr = g * self.right.next();
            if let Some(s) = r.get_mut(i) {
                *s *= gr;
            }
        }
    }

    /// Push a mono mix of the block into the tap. True if it overran.
    fn feed_tap(&mut self, frames: usize) -> bool {
        let Some(tap) = self.tap.as_mut() else {
            return false;
        };
        let mono = self.dry.channel_mut(0);
        let l = self.bus.channel(0);
        let r = self.bus.channel(1);
        for i in 0..frames {
            mono[i] = 0.5 * (l[i] + r[i]);
        }
        tap.push_slice(&mono[..frames]) < frames
    }
}
