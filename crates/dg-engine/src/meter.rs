//! Per-insert meters and sleep flags shared between render and control.
//!
//! Peaks are stored as `f32` bit patterns; for non-negative floats the bit
//! pattern orders like the value, so `fetch_max` accumulates a peak without
//! a compare-and-swap loop.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

#[derive(Debug, Default)]
struct SlotMeter {
    peak_left: AtomicU32,
    peak_right: AtomicU32,
    last_signal_sample: AtomicU64,
    sleeping: AtomicBool,
    wakes: AtomicU32,
}

#[derive(Debug)]
pub struct MeterBank {
    slots: Box<[SlotMeter]>,
}

impl MeterBank {
    pub fn new(slots: usize) -> Self {
        Self { slots: (0..slots).map(|_| SlotMeter::default()).collect() }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Fold a block peak into the slot's running peak.
    pub fn record_peak(&self, slot: usize, left: f32, right: f32) {
        if let Some(m) = self.slots.get(slot) {
            m.peak_left.fetch_max(left.abs().to_bits(), Ordering::Relaxed);
            m.peak_right.fetch_max(right.abs().to_bits(), Ordering::Relaxed);
        }
    }

    /// Read and reset the running peak.
    pub fn take_peak(&self, slot: usize) -> (f32, f32) {
        match self.slots.get(slot) {
            Some(m) => (
                f32::from_bits(m.peak_left.swap(0, Ordering::Relaxed)),
                f32::from_bits(m.peak_right.swap(0, Ordering::Relaxed)),
            ),
            None => (0.0, 0.0),
        }
    }

    pub fn mark_signal(&self, slot: usize, sample: u64) {
        if let Some(m) = self.slots.get(slot) {
            m.last_signal_sample.store(sample, Ordering::Relaxed);
        }
    }

    pub fn last_signal(&self, slot: usize) -> u64 {
        self.slots.get(slot).map_or(0, |m| m.last_signal_sample.load(Ordering::Relaxed))
    }

    pub fn is_sleeping(&self, slot: usize) -> bool {
        self.slots.get(slot).is_some_and(|m| m.sleeping.load(Ordering::Acquire))
    }

    /// Put a slot to sleep. Clears its peak so it reads as "no signal".
    pub fn sleep(&self, slot: usize) {
        if let Some(m) = self.slots.get(slot) {
            m.sleeping.store(true, Ordering::Release);
            m.peak_left.store(0, Ordering::Relaxed);
            m.peak_right.store(0, Ordering::Relaxed);
        }
    }

    /// Wake a slot and restart its idle timer at `sample`.
    pub fn wake(&self, slot: usize, sample: u64) {
        if let Some(m) = self.slots.get(slot) {
            m.last_signal_sample.store(sample, Ordering::Relaxed);
            if m.sleeping.swap(false, Ordering::AcqRel) {
                m.wakes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Times the slot has been woken, by either side.
    pub fn wake_count(&self, slot: usize) -> u32 {
        self.slots.get(slot).map_or(0, |m| m.wakes.load(Ordering::Relaxed))
    }

    /// Forget everything about a slot before it is reused.
    pub fn reset(&self, slot: usize, sample: u64) {
        if let Some(m) = self.slots.get(slot) {
            m.peak_left.store(0, Ordering::Relaxed);
            m.peak_right.store(0, Ordering::Relaxed);
            m.last_signal_sample.store(sample, Ordering::Relaxed);
            m.sleeping.store(false, Ordering::Release);
        }
    }
}
