//! Transport state machine: the single authority for play state, tempo,
//! loop and position.
//!
//! ```text
//! Stopped --play--> Playing --pause--> Paused --resume--> Playing
//! {Playing, Paused} --stop--> Stopped
//! any --jump_to_step(n)--> same state at n
//! ```
//!
//! Every method takes the render sample at which it takes effect and
//! returns the resulting state. A command that changes nothing returns the
//! state without an event or timeline change.

use dg_ir::{LoopRange, PlayState, TransportEvent, TransportNotice, TransportState};

use crate::clock::{validate_bpm, validate_loop, validate_step, TimeBase};
use crate::command::TimelineUpdate;
use crate::error::ClockError;
use crate::timeline::Timeline;

/// How already dispatched events relate to a timeline change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reschedule {
    /// Events from the change on are void; start over from the new anchor.
    Restart,
    /// Tempo change: events before the change keep their samples, later
    /// positions move with the new tempo.
    Retempo,
    /// Loop change: events from the change on are void, open notes end.
    Reshape,
}

/// Result of a transport command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transition {
    pub notice: TransportNotice,
    /// `None` when the command was a no-op.
    pub event: Option<TransportEvent>,
    pub timeline: Option<(Reschedule, TimelineUpdate)>,
}

#[derive(Clone, Debug)]
pub struct TransportStateMachine {
    timebase: TimeBase,
    state: TransportState,
    timeline: Timeline,
}

impl TransportStateMachine {
    pub fn new(timebase: TimeBase, bpm: f64) -> Result<Self, ClockError> {
        let bpm = validate_bpm(bpm)?;
        Ok(Self {
            timebase,
            state: TransportState::new(bpm),
            timeline: Timeline::stopped(0.0, bpm, None),
        })
    }

    pub fn state(&self) -> &TransportState {
        &self.state
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn is_playing(&self) -> bool {
        self.state.state == PlayState::Playing
    }

    /// Live position at a render sample.
    pub fn position_at(&self, sample: u64) -> f64 {
        self.timeline.step_at_sample(&self.timebase, sample)
    }

    /// Start playback. From `Paused` this resumes.
    pub fn play(&mut self, now: u64) -> Transition {
        match self.state.state {
            PlayState::Playing => self.unchanged(),
            PlayState::Paused => self.resume(now),
            PlayState::Stopped => {
                self.set_timeline(now, self.state.position_steps, true);
                self.state.state = PlayState::Playing;
                self.changed(TransportEvent::Started, Reschedule::Restart, now, false, false)
            }
        }
    }

    /// Freeze at the current position. In-flight notes are released.
    pub fn pause(&mut self, now: u64) -> Transition {
        if self.state.state != PlayState::Playing {
            return self.unchanged();
        }
        let position = self.position_at(now);
        self.set_timeline(now, position, false);
        self.state.state = PlayState::Paused;
        self.changed(TransportEvent::Paused, Reschedule::Restart, now, true, false)
    }

    /// Continue from the frozen position.
    pub fn resume(&mut self, now: u64) -> Transition {
        if self.state.state != PlayState::Paused {
            return self.unchanged();
        }
        self.set_timeline(now, self.state.position_steps, true);
        self.state.state = PlayState::Playing;
        self.changed(TransportEvent::Resumed, Reschedule::Restart, now, false, false)
    }

    /// Stop and return to the loop start, or to 0 without a loop.
    pub fn stop(&mut self, now: u64) -> Transition {
        if self.state.state == PlayState::Stopped {
            return self.unchanged();
        }
        let home = self.state.active_loop().map_or(0.0, |lp| lp.start);
        self.set_timeline(now, home, false);
        self.state.state = PlayState::Stopped;
        self.changed(TransportEvent::Stopped, Reschedule::Restart, now, true, true)
    }

    /// Move to step `n` in the current state.
    pub fn jump_to_step(&mut self, step: f64, now: u64) -> Result<Transition, ClockError> {
        let step = validate_step(step)?;
        let running = self.is_playing();
        self.set_timeline(now, step, running);
        Ok(self.changed(TransportEvent::Jumped, Reschedule::Restart, now, true, true))
    }

    /// Change tempo from `at` on. `at` should be the first sample not yet
    /// covered by dispatched events, so nothing already dispatched moves.
    pub fn set_bpm(&mut self, bpm: f64, at: u64) -> Result<Transition, ClockError> {
        let bpm = validate_bpm(bpm)?;
        if bpm == self.state.bpm {
            return Ok(self.unchanged());
        }
        self.state.bpm = bpm;
        if self.is_playing() {
            self.timeline = self.timeline.rebased(&self.timebase, at, bpm);
            self.state.position_steps = self.timeline.anchor_step();
        } else {
            let position = self.state.position_steps;
            self.timeline = Timeline::new(at, position, bpm, self.state.active_loop(), false);
        }
        Ok(self.changed(TransportEvent::TempoChanged, Reschedule::Retempo, at, false, false))
    }

    /// Set loop bounds and enable or disable looping. Enabling a loop while
    /// positioned past its end wraps into the loop.
    pub fn set_loop(
        &mut self,
        start: f64,
        end: f64,
        enabled: bool,
        now: u64,
    ) -> Result<Transition, ClockError> {
        let range: LoopRange = validate_loop(start, end)?;
        if range == self.state.loop_range && enabled == self.state.loop_enabled {
            return Ok(self.unchanged());
        }
        let position = self.position_at(now);
        self.state.loop_range = range;
        self.state.loop_enabled = enabled;
        let running = self.is_playing();
        self.set_timeline(now, position, running);
        Ok(self.changed(TransportEvent::LoopChanged, Reschedule::Reshape, now, false, false))
    }

    fn set_timeline(&mut self, at: u64, step: f64, running: bool) {
        self.timeline = Timeline::new(at, step, self.state.bpm, self.state.active_loop(), running);
        self.state.position_steps = self.timeline.anchor_step();
    }

    fn unchanged(&self) -> Transition {
        Transition { notice: self.state.notice(), event: None, timeline: None }
    }

    fn changed(
        &mut self,
        make: fn(TransportNotice) -> TransportEvent,
        reschedule: Reschedule,
        at: u64,
        release_notes: bool,
        flush: bool,
    ) -> Transition {
        self.state.last_update_sample = at;
        let notice = self.state.notice();
        let update = TimelineUpdate { at_sample: at, timeline: self.timeline, release_notes, flush };
        Transition { notice, event: Some(make(notice)), timeline: Some((reschedule, update)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB: TimeBase = TimeBase::new(48_000);

    fn machine() -> TransportStateMachine {
        TransportStateMachine::new(TB, 120.0).unwrap()
    }

    #[test]
    fn starts_stopped_at_zero() {
        let t = machine();
        assert_eq!(t.state().state, PlayState::Stopped);
        assert_eq!(t.state().position_steps, 0.0);
    }

    #[test]
    fn play_pause_resume_keeps_position() {
        let mut t = machine();
        assert!(matches!(t.play(0).event, Some(TransportEvent::Started(_))));
        let paused = t.pause(12_000);
        assert_eq!(paused.notice.position, 2.0);
        assert_eq!(paused.notice.state, PlayState::Paused);
        assert!(paused.timeline.is_some_and(|(_, u)| u.release_notes && !u.flush));

        // Time passing while paused does not move the position.
        assert_eq!(t.position_at(96_000), 2.0);
        let resumed = t.resume(100_000);
        assert!(matches!(resumed.event, Some(TransportEvent::Resumed(_))));
        assert_eq!(t.position_at(106_000), 3.0);
    }

    #[test]
    fn no_op_commands_emit_nothing() {
        let mut t = machine();
        assert_eq!(t.stop(0).event, None);
        assert_eq!(t.pause(0).event, None);
        assert_eq!(t.resume(0).event, None);
        t.play(0);
        let again = t.play(10);
        assert_eq!(again.event, None);
        assert_eq!(again.timeline, None);
        assert_eq!(again.notice.state, PlayState::Playing);
    }

    #[test]
    fn stop_returns_to_loop_start() {
        let mut t = machine();
        t.set_loop(8.0, 16.0, true, 0).unwrap();
        t.jump_to_step(10.0, 0).unwrap();
        t.play(0);
        let stopped = t.stop(30_000);
        assert_eq!(stopped.notice.position, 8.0);
        assert!(stopped.timeline.is_some_and(|(_, u)| u.flush));
    }

    #[test]
    fn stop_without_loop_returns_to_zero() {
        let mut t = machine();
        t.play(0);
        assert_eq!(t.stop(60_000).notice.position, 0.0);
    }

    #[test]
    fn invalid_values_leave_state_unchanged() {
        let mut t = machine();
        let before = *t.state();
        assert_eq!(t.set_bpm(0.0, 0), Err(ClockError::InvalidBpm(0.0)));
        assert!(t.set_bpm(1200.0, 0).is_err());
        assert!(t.jump_to_step(-1.0, 0).is_err());
        assert!(t.set_loop(16.0, 8.0, true, 0).is_err());
        assert_eq!(
            t.set_loop(0.0, 1e-7, true, 0).unwrap_err(),
            ClockError::InvalidLoop { start: 0.0, end: 1e-7 }
        );
        assert_eq!(*t.state(), before);
    }

    #[test]
    fn tempo_change_keeps_past_positions() {
        let mut t = machine();
        t.play(0);
        let change = t.set_bpm(60.0, 24_000).unwrap();
        assert_eq!(change.notice.bpm, 60.0);
        assert_eq!(change.notice.position, 4.0);
        assert_eq!(t.position_at(24_000 + 12_000), 5.0);
        assert!(matches!(change.timeline, Some((Reschedule::Retempo, _))));
    }

    #[test]
    fn enabling_loop_past_end_wraps_into_loop() {
        let mut t = machine();
        t.jump_to_step(20.0, 0).unwrap();
        let change = t.set_loop(0.0, 16.0, true, 0).unwrap();
        assert_eq!(change.notice.position, 4.0);
        assert!(change.notice.loop_enabled);
    }

    #[test]
    fn jump_while_playing_stays_playing() {
        let mut t = machine();
        t.play(0);
        let jumped = t.jump_to_step(32.0, 6000).unwrap();
        assert_eq!(jumped.notice.state, PlayState::Playing);
        assert_eq!(t.position_at(12_000), 33.0);
    }
}
