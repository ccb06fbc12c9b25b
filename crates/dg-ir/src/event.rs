//! Dated commands executed by the render path.

use crate::ids::InstrumentId;

/// What a scheduled event does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    NoteOn,
    NoteOff,
    Automation,
}

impl EventKind {
    /// Execution priority among events dated to the same sample: a release
    /// runs before automation, automation before a new attack.
    pub fn tie_rank(self) -> u8 {
        match self {
            EventKind::NoteOff => 0,
            EventKind::Automation => 1,
            EventKind::NoteOn => 2,
        }
    }
}

/// Event data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EventPayload {
    Note { note: u8, velocity: u8 },
    Automation { param: u16, value: f32 },
}

/// A command dated to an absolute sample on the render clock.
///
/// `serial` is unique per scheduler and increases in dispatch order; it
/// breaks ties between events on the same sample and is the handle used
/// to cancel the event before it executes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScheduledEvent {
    pub kind: EventKind,
    pub target_sample: u64,
    pub instrument: InstrumentId,
    pub payload: EventPayload,
    pub serial: u64,
}

impl ScheduledEvent {
    pub fn note_on(target_sample: u64, instrument: InstrumentId, note: u8, velocity: u8) -> Self {
        Self {
            kind: EventKind::NoteOn,
            target_sample,
            instrument,
            payload: EventPayload::Note { note, velocity },
            serial: 0,
        }
    }

    pub fn note_off(target_sample: u64, instrument: InstrumentId, note: u8) -> Self {
        Self {
            kind: EventKind::NoteOff,
            target_sample,
            instrument,
            payload: EventPayload::Note { note, velocity: 0 },
            serial: 0,
        }
    }

    pub fn automation(target_sample: u64, instrument: InstrumentId, param: u16, value: f32) -> Self {
        Self {
            kind: EventKind::Automation,
            target_sample,
            instrument,
            payload: EventPayload::Automation { param, value },
            serial: 0,
        }
    }

    /// Stamp the dispatch serial.
    pub fn with_serial(mut self, serial: u64) -> Self {
        self.serial = serial;
        self
    }

    /// Ordering key: sample first, then dispatch order.
    pub fn sort_key(&self) -> (u64, u64) {
        (self.target_sample, self.serial)
    }
}
