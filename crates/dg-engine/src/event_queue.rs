//! Bounded queue of dated events on the render path.

use core::ops::Range;

use dg_ir::ScheduledEvent;

/// Maximum number of pending events the render path holds.
pub const QUEUE_CAPACITY: usize = 1024;

/// Events sorted by `(target_sample, serial)`.
///
/// Storage is a fixed-capacity vector, so pushing never allocates. Events
/// are consumed through a cursor that advances without removing elements;
/// `compact` drops the consumed prefix once per block.
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    events: heapless::Vec<ScheduledEvent, QUEUE_CAPACITY>,
    /// Next event index to process.
    cursor: usize,
}

impl EventQueue {
    pub fn new() -> Self {
        Self { events: heapless::Vec::new(), cursor: 0 }
    }

    /// Insert in order. Events sharing a sample keep dispatch order.
    /// A full queue hands the event back.
    pub fn push(&mut self, event: ScheduledEvent) -> Result<(), ScheduledEvent> {
        if self.events.is_full() {
            return Err(event);
        }
        let key = event.sort_key();
        let pos = self.events[self.cursor..].partition_point(|e| e.sort_key() <= key) + self.cursor;
        self.events.insert(pos, event)
    }

    /// Sample of the next unconsumed event.
    pub fn next_time(&self) -> Option<u64> {
        self.events.get(self.cursor).map(|e| e.target_sample)
    }

    /// Return the index range of events due at or before `sample` and
    /// advance the cursor past them.
    pub fn drain_until(&mut self, sample: u64) -> Range<usize> {
        let start = self.cursor;
        while self.cursor < self.events.len() {
            if self.events[self.cursor].target_sample <= sample {
                self.cursor += 1;
            } else {
                break;
            }
        }
        start..self.cursor
    }

    /// Get an event by index (for use with `drain_until` ranges).
    pub fn get(&self, index: usize) -> Option<&ScheduledEvent> {
        self.events.get(index)
    }

    /// Drop consumed events, keeping the unconsumed tail in order.
    pub fn compact(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let consumed = self.cursor;
        self.events.rotate_left(consumed);
        self.events.truncate(self.events.len() - consumed);
        self.cursor = 0;
    }

    pub fn clear(&mut self) {
        self.events.clear();
        self.cursor = 0;
    }

    /// Number of unconsumed events.
    pub fn pending(&self) -> usize {
        self.events.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.pending() == 0
    }
}
