//! Published playback position.

use crate::time::BarBeatTick;

/// A consistent view of the playback position as of one rendered block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PositionSnapshot {
    pub step: f64,
    pub bar_beat_tick: BarBeatTick,
    pub is_playing: bool,
    /// Number of blocks published so far; 0 before the first block.
    pub version: u64,
    /// Render clock at the end of the block.
    pub sample_time: u64,
}
