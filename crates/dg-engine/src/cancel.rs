//! Cancellation marks for dispatched events.
//!
//! The scheduler cancels an event by writing its serial into a slot; the
//! render path checks the slot when the event comes due and executes a
//! cancelled event as a no-op. Nothing is removed from any queue.
//!
//! Slots are indexed by `serial % capacity`, so a mark is only reliable
//! while fewer than `capacity` newer serials are in flight. The capacity is
//! sized from the render queue plus the command ring.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug)]
pub struct CancelBoard {
    slots: Box<[AtomicU64]>,
}

impl CancelBoard {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1).next_power_of_two();
        Self { slots: (0..capacity).map(|_| AtomicU64::new(0)).collect() }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    fn slot(&self, serial: u64) -> &AtomicU64 {
        &self.slots[(serial as usize) & (self.slots.len() - 1)]
    }

    /// Mark `serial` cancelled.
    pub fn cancel(&self, serial: u64) {
        // Stored +1 so that an untouched slot never matches serial 0.
        self.slot(serial).store(serial.wrapping_add(1), Ordering::Release);
    }

    pub fn is_cancelled(&self, serial: u64) -> bool {
        self.slot(serial).load(Ordering::Acquire) == serial.wrapping_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_board_cancels_nothing() {
        let board = CancelBoard::new(8);
        assert!((0..32).all(|s| !board.is_cancelled(s)));
    }

    #[test]
    fn cancel_marks_only_that_serial() {
        let board = CancelBoard::new(8);
        board.cancel(3);
        assert!(board.is_cancelled(3));
        assert!(!board.is_cancelled(11));
        assert!(!board.is_cancelled(4));
    }

    #[test]
    fn newer_serial_reuses_slot() {
        let board = CancelBoard::new(8);
        board.cancel(3);
        board.cancel(11);
        assert!(!board.is_cancelled(3));
        assert!(board.is_cancelled(11));
    }

    #[test]
    fn capacity_rounds_to_power_of_two() {
        assert_eq!(CancelBoard::new(3000).capacity(), 4096);
    }
}
