//! Transport state and the events published on every transition.

use crate::time::LoopRange;

/// Play state of the transport.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PlayState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Authoritative transport state, owned by the transport state machine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransportState {
    pub state: PlayState,
    /// Position in steps at `last_update_sample`.
    pub position_steps: f64,
    pub bpm: f64,
    pub loop_enabled: bool,
    pub loop_range: LoopRange,
    /// Render sample at which the last transition took effect.
    pub last_update_sample: u64,
}

impl TransportState {
    pub fn new(bpm: f64) -> Self {
        Self {
            state: PlayState::Stopped,
            position_steps: 0.0,
            bpm,
            loop_enabled: false,
            loop_range: LoopRange::default(),
            last_update_sample: 0,
        }
    }

    /// The loop region if looping is enabled.
    pub fn active_loop(&self) -> Option<LoopRange> {
        self.loop_enabled.then_some(self.loop_range)
    }

    pub fn notice(&self) -> TransportNotice {
        TransportNotice {
            position: self.position_steps,
            state: self.state,
            bpm: self.bpm,
            loop_enabled: self.loop_enabled,
            loop_range: self.loop_range,
        }
    }
}

/// State published to subscribers after a transition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransportNotice {
    pub position: f64,
    pub state: PlayState,
    pub bpm: f64,
    pub loop_enabled: bool,
    pub loop_range: LoopRange,
}

/// Closed set of transport transitions delivered to subscribers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TransportEvent {
    Started(TransportNotice),
    Paused(TransportNotice),
    Resumed(TransportNotice),
    Stopped(TransportNotice),
    Jumped(TransportNotice),
    TempoChanged(TransportNotice),
    LoopChanged(TransportNotice),
}

impl TransportEvent {
    /// The resulting state carried by every event.
    pub fn notice(&self) -> &TransportNotice {
        match self {
            TransportEvent::Started(n)
            | TransportEvent::Paused(n)
            | TransportEvent::Resumed(n)
            | TransportEvent::Stopped(n)
            | TransportEvent::Jumped(n)
            | TransportEvent::TempoChanged(n)
            | TransportEvent::LoopChanged(n) => n,
        }
    }
}
