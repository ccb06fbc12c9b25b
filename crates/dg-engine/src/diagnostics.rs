//! Render-path diagnostics.
//!
//! The render path never logs or returns errors into the audio callback.
//! It records a `Diagnostic` into a bounded ring instead; the control tick
//! drains the ring and logs each entry.

use core::fmt;

use dg_ir::{InstrumentId, InsertId};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Diagnostic {
    /// The render queue was full; the event was dropped.
    QueueOverflow { serial: u64 },
    /// An event executed after its target sample.
    LateEvent { serial: u64, late_by: u64 },
    /// An event named an instrument that is not installed.
    UnknownInstrument { instrument: InstrumentId },
    /// A command named an insert slot that holds nothing.
    EmptyInsertSlot { slot: usize },
    /// A slot index beyond the configured capacity.
    SlotOutOfRange { slot: usize },
    /// The garbage ring was full; a retired object was leaked.
    GarbageOverflow,
    /// More timeline updates arrived in one block than can be held.
    TimelineBacklog,
    /// An analysis tap was full; samples were skipped.
    TapOverrun { insert: InsertId },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::QueueOverflow { serial } => {
                write!(f, "render queue full, dropped event #{serial}")
            }
            Diagnostic::LateEvent { serial, late_by } => {
                write!(f, "event #{serial} ran {late_by} samples late")
            }
            Diagnostic::UnknownInstrument { instrument } => {
                write!(f, "event for {instrument}, which is not installed")
            }
            Diagnostic::EmptyInsertSlot { slot } => write!(f, "insert slot {slot} is empty"),
            Diagnostic::SlotOutOfRange { slot } => write!(f, "slot {slot} is out of range"),
            Diagnostic::GarbageOverflow => write!(f, "garbage ring full, object leaked"),
            Diagnostic::TimelineBacklog => write!(f, "timeline updates backed up, oldest dropped"),
            Diagnostic::TapOverrun { insert } => write!(f, "analysis tap of {insert} overran"),
        }
    }
}

/// Create a sink/drain pair holding up to `capacity` diagnostics.
pub fn diagnostics_ring(capacity: usize) -> (DiagnosticsSink, DiagnosticsDrain) {
    let (producer, consumer) = HeapRb::<Diagnostic>::new(capacity.max(1)).split();
    (DiagnosticsSink { producer, dropped: 0 }, DiagnosticsDrain { consumer })
}

/// Render-side end.
pub struct DiagnosticsSink {
    producer: HeapProd<Diagnostic>,
    dropped: u64,
}

impl DiagnosticsSink {
    /// Record a diagnostic; counts it as dropped if the ring is full.
    pub fn record(&mut self, diagnostic: Diagnostic) {
        if self.producer.try_push(diagnostic).is_err() {
            self.dropped += 1;
        }
    }

    /// Diagnostics lost to a full ring.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Control-side end.
pub struct DiagnosticsDrain {
    consumer: HeapCons<Diagnostic>,
}

impl DiagnosticsDrain {
    /// Hand every pending diagnostic to `f`; returns how many there were.
    pub fn drain(&mut self, mut f: impl FnMut(Diagnostic)) -> usize {
        let mut n = 0;
        while let Some(d) = self.consumer.try_pop() {
            f(d);
            n += 1;
        }
        n
    }
}
