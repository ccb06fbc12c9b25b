//! Error types returned at the engine's command boundary.

use thiserror::Error;

/// A transport or clock command carried an inconsistent value.
///
/// The command is rejected and no state changes.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum ClockError {
    #[error("bpm {0} is outside (0, 999]")]
    InvalidBpm(f64),
    #[error("position {0} is not a finite, non-negative step")]
    InvalidPosition(f64),
    #[error("loop {start}..{end} is shorter than a tick, negative or not finite")]
    InvalidLoop { start: f64, end: f64 },
}

/// The control to render command ring refused a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("render command queue is full ({capacity} slots)")]
    Full { capacity: usize },
    #[error("not enough room for a batch of {needed} commands ({free} free)")]
    NoRoom { needed: usize, free: usize },
}

/// A scheduling pass was abandoned. Nothing from the pass was dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("pattern revision {found} is inconsistent (last good revision {last})")]
    DataIntegrity { found: u64, last: u64 },
    #[error("pattern changed during every one of {attempts} scheduling attempts")]
    Stale { attempts: u32 },
    #[error(transparent)]
    Queue(#[from] QueueError),
}
