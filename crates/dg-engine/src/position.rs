//! Lock-free position publication from the render path.
//!
//! A sequence lock over a handful of atomics: the writer bumps the sequence
//! to odd, stores the payload, then bumps it to even. Readers copy the
//! payload and retry if the sequence was odd or moved while they read.
//! The writer never waits.

use std::sync::atomic::{fence, AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dg_ir::{pack_bbt, unpack_bbt, BarBeatTick, PositionSnapshot};

#[derive(Debug, Default)]
struct Shared {
    seq: AtomicU64,
    step_bits: AtomicU64,
    bbt: AtomicU64,
    sample_time: AtomicU64,
    playing: AtomicBool,
}

/// Create a connected writer/reader pair.
pub fn position_channel() -> (PositionWriter, PositionReader) {
    let shared = Arc::new(Shared::default());
    shared.bbt.store(pack_bbt(BarBeatTick::default()), Ordering::Relaxed);
    (
        PositionWriter { shared: Arc::clone(&shared), seq: 0 },
        PositionReader { shared },
    )
}

/// Render-side end. Exactly one exists per channel.
#[derive(Debug)]
pub struct PositionWriter {
    shared: Arc<Shared>,
    seq: u64,
}

impl PositionWriter {
    /// Publish the position at the end of a block.
    pub fn publish(&mut self, step: f64, is_playing: bool, sample_time: u64) {
        let s = &self.shared;
        s.seq.store(self.seq + 1, Ordering::Relaxed);
        fence(Ordering::Release);
        s.step_bits.store(step.to_bits(), Ordering::Relaxed);
        s.bbt.store(pack_bbt(BarBeatTick::from_steps(step)), Ordering::Relaxed);
        s.sample_time.store(sample_time, Ordering::Relaxed);
        s.playing.store(is_playing, Ordering::Relaxed);
        self.seq += 2;
        s.seq.store(self.seq, Ordering::Release);
    }

    /// Number of snapshots published so far.
    pub fn version(&self) -> u64 {
        self.seq / 2
    }
}

/// Control-side end. Cheap to clone; readers never block the writer.
#[derive(Clone, Debug)]
pub struct PositionReader {
    shared: Arc<Shared>,
}

impl PositionReader {
    /// One read attempt; `None` if it overlapped a publish.
    pub fn try_snapshot(&self) -> Option<PositionSnapshot> {
        let s = &self.shared;
        let before = s.seq.load(Ordering::Acquire);
        if before & 1 == 1 {
            return None;
        }
        let step = f64::from_bits(s.step_bits.load(Ordering::Relaxed));
        let bar_beat_tick = unpack_bbt(s.bbt.load(Ordering::Relaxed));
        let sample_time = s.sample_time.load(Ordering::Relaxed);
        let is_playing = s.playing.load(Ordering::Relaxed);
        fence(Ordering::Acquire);
        let after = s.seq.load(Ordering::Relaxed);
        (before == after).then_some(PositionSnapshot {
            step,
            bar_beat_tick,
            is_playing,
            version: before / 2,
            sample_time,
        })
    }

    /// Copy the latest consistent snapshot, retrying across torn reads.
    pub fn snapshot(&self) -> PositionSnapshot {
        loop {
            if let Some(snapshot) = self.try_snapshot() {
                return snapshot;
            }
            std::hint::spin_loop();
        }
    }

    /// Version of the latest completed publish.
    pub fn version(&self) -> u64 {
        self.shared.seq.load(Ordering::Acquire) / 2
    }
}
