//! Look-ahead scheduler: turns pattern data into dated render events.
//!
//! Every control tick covers `[horizon, now + lookahead)` of render samples
//! and dispatches the notes and automation points that fall in it. The
//! window is split on sample boundaries, so an event lands in exactly one
//! tick. NoteOffs travel with their NoteOn.
//!
//! Dispatched events are remembered until they have executed. When the
//! pattern changes while playing, the remembered events whose source
//! changed are cancelled on the [`CancelBoard`] and the changed span of
//! `[now, horizon)` is scheduled again. Nothing before `now` is touched.
//! A tick that arrives after the horizon has already played reports the
//! uncovered span instead of dispatching it late.
//!
//! A pass is built off to the side and sent as one batch; if the pattern
//! revision moved while building, the pass is thrown away and rebuilt.

use std::sync::Arc;

use dg_ir::{AutomationKey, InstrumentId, NoteKey, Pattern, ScheduledEvent, StepRange};
use log::{debug, warn};

use crate::cancel::CancelBoard;
use crate::clock::TimeBase;
use crate::command::{CommandSender, RenderCommand, TimelineUpdate};
use crate::error::ScheduleError;
use crate::pattern_store::PatternStore;
use crate::timeline::{Pass, Timeline};
use crate::transport::Reschedule;

/// Scheduling passes attempted before a racing pattern is reported stale.
const STALE_ATTEMPTS: u32 = 3;

/// Tempo-adaptive look-ahead: `min_lookahead_ms` at or below `slow_bpm`,
/// `max_lookahead_ms` at or above `fast_bpm`, linear in between.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    pub min_lookahead_ms: f64,
    pub max_lookahead_ms: f64,
    pub slow_bpm: f64,
    pub fast_bpm: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { min_lookahead_ms: 60.0, max_lookahead_ms: 120.0, slow_bpm: 80.0, fast_bpm: 140.0 }
    }
}

impl SchedulerConfig {
    pub fn lookahead_ms(&self, bpm: f64) -> f64 {
        if bpm <= self.slow_bpm || self.fast_bpm <= self.slow_bpm {
            self.min_lookahead_ms
        } else if bpm >= self.fast_bpm {
            self.max_lookahead_ms
        } else {
            let t = (bpm - self.slow_bpm) / (self.fast_bpm - self.slow_bpm);
            self.min_lookahead_ms + t * (self.max_lookahead_ms - self.min_lookahead_ms)
        }
    }
}

/// What one tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    pub dispatched: usize,
    pub cancelled: usize,
    pub horizon: u64,
    /// Render samples `[from, to)` that played before the tick could cover
    /// them. Nothing due in that span was dispatched.
    pub skipped: Option<(u64, u64)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Dated {
    serial: u64,
    sample: u64,
}

/// A dispatched note, from its NoteOn until its NoteOff has executed.
#[derive(Clone, Copy, Debug)]
struct Voice {
    key: NoteKey,
    step: f64,
    note: u8,
    instrument: InstrumentId,
    timeline: Timeline,
    pass: Pass,
    on: Dated,
    off: Dated,
}

impl Voice {
    /// Release sample for a note ending at `end_step`, cut at the pass end.
    /// Always at least one sample after the attack, so a note too short to
    /// span a sample still gets its NoteOff after its NoteOn.
    fn release_at(&self, timebase: &TimeBase, end_step: f64) -> u64 {
        let end = end_step.min(self.pass.end_step);
        self.timeline.sample_at_u(timebase, self.pass.u_of(end)).max(self.on.sample + 1)
    }
}

#[derive(Clone, Copy, Debug)]
struct Cue {
    key: AutomationKey,
    at: Dated,
}

/// Events reference each other by their index in `events` until serials
/// are assigned at commit.
#[derive(Default)]
struct Plan {
    events: Vec<ScheduledEvent>,
    voices: Vec<(Voice, usize, usize)>,
    cues: Vec<(AutomationKey, usize)>,
    /// Existing voices whose NoteOff is replaced: (NoteOn serial, new off).
    reended: Vec<(u64, usize)>,
    retired_voices: Vec<u64>,
    retired_cues: Vec<u64>,
    cancels: Vec<u64>,
}

impl Plan {
    fn push(&mut self, event: ScheduledEvent) -> usize {
        self.events.push(event);
        self.events.len() - 1
    }

    fn retire_voice(&mut self, voice: &Voice, at: u64) {
        if voice.on.sample >= at {
            self.cancels.push(voice.on.serial);
        }
        if voice.off.sample >= at {
            self.cancels.push(voice.off.serial);
        }
        self.retired_voices.push(voice.on.serial);
    }

    fn retire_cue(&mut self, cue: &Cue) {
        self.cancels.push(cue.at.serial);
        self.retired_cues.push(cue.at.serial);
    }
}

pub struct EventScheduler {
    timebase: TimeBase,
    config: SchedulerConfig,
    cancel: Arc<CancelBoard>,
    timeline: Timeline,
    /// Timelines replaced by tempo changes, still covering samples before
    /// the current anchor.
    history: Vec<Timeline>,
    /// Every sample before this is covered by dispatched events.
    horizon: u64,
    pattern: Option<Arc<Pattern>>,
    voices: Vec<Voice>,
    cues: Vec<Cue>,
    next_serial: u64,
}

impl EventScheduler {
    pub fn new(timebase: TimeBase, config: SchedulerConfig, cancel: Arc<CancelBoard>) -> Self {
        Self {
            timebase,
            config,
            cancel,
            timeline: Timeline::stopped(0.0, 120.0, None),
            history: Vec::new(),
            horizon: 0,
            pattern: None,
            voices: Vec::new(),
            cues: Vec::new(),
            next_serial: 1,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn horizon(&self) -> u64 {
        self.horizon
    }

    /// Notes dispatched and not yet released.
    pub fn active_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn lookahead_samples(&self) -> u64 {
        self.timebase.ms_to_samples(self.config.lookahead_ms(self.timeline.bpm()))
    }

    /// Switch to a new timeline and send it to the render path along with
    /// whatever the change voids or shortens.
    pub fn retime(
        &mut self,
        reschedule: Reschedule,
        update: TimelineUpdate,
        commands: &mut CommandSender,
    ) -> Result<(), ScheduleError> {
        let at = update.at_sample;
        let mut plan = Plan::default();
        match reschedule {
            Reschedule::Restart => {
                for voice in &self.voices {
                    plan.retire_voice(voice, at);
                }
                for cue in self.cues.iter().filter(|c| c.at.sample >= at) {
                    plan.retire_cue(cue);
                }
            }
            Reschedule::Retempo => {}
            Reschedule::Reshape => {
                let first = update.timeline.pass(0);
                let pass_end = first
                    .end_step
                    .is_finite()
                    .then(|| update.timeline.sample_at_u(&self.timebase, first.end_u()));
                for voice in &self.voices {
                    if voice.on.sample >= at {
                        plan.retire_voice(voice, at);
                    } else if let Some(end) = pass_end.filter(|&e| e < voice.off.sample) {
                        if voice.off.sample >= at {
                            plan.cancels.push(voice.off.serial);
                            let off = plan.push(ScheduledEvent::note_off(
                                end.max(at),
                                voice.instrument,
                                voice.note,
                            ));
                            plan.reended.push((voice.on.serial, off));
                        }
                    }
                }
                for cue in self.cues.iter().filter(|c| c.at.sample >= at) {
                    plan.retire_cue(cue);
                }
            }
        }

        let cancelled = plan.cancels.len();
        self.commit(plan, Some(RenderCommand::Timeline(update)), commands)?;
        match reschedule {
            Reschedule::Retempo => {
                self.history.push(self.timeline);
                self.horizon = self.horizon.max(at);
            }
            Reschedule::Restart | Reschedule::Reshape => {
                self.history.clear();
                self.horizon = at;
            }
        }
        self.timeline = update.timeline;
        debug!("{reschedule:?} at sample {at}: {cancelled} events cancelled");
        Ok(())
    }

    /// One control tick at render sample `now`.
    pub fn tick(
        &mut self,
        now: u64,
        store: &PatternStore,
        commands: &mut CommandSender,
    ) -> Result<TickReport, ScheduleError> {
        self.forget_executed(now);
        let skipped =
            (self.timeline.is_running() && self.horizon < now).then_some((self.horizon, now));

        let mut attempts = 0;
        loop {
            attempts += 1;
            let snapshot = store.snapshot();
            self.check_integrity(&snapshot)?;
            let (plan, horizon) = self.plan_tick(now, &snapshot);
            if store.revision() != snapshot.revision() {
                if attempts >= STALE_ATTEMPTS {
                    warn!("pattern changed during {attempts} scheduling attempts, skipping tick");
                    return Err(ScheduleError::Stale { attempts });
                }
                debug!("pattern revision moved during scheduling, retrying");
                continue;
            }

            let report = TickReport {
                dispatched: plan.events.len(),
                cancelled: plan.cancels.len(),
                horizon,
                skipped,
            };
            self.commit(plan, None, commands)?;
            self.pattern = Some(snapshot);
            self.horizon = horizon;
            if let Some((from, to)) = skipped {
                warn!("control tick fell behind: samples {from}..{to} were never scheduled");
            }
            if report.dispatched > 0 || report.cancelled > 0 {
                debug!(
                    "tick at {now}: {} dispatched, {} cancelled, horizon {}",
                    report.dispatched, report.cancelled, report.horizon
                );
            }
            return Ok(report);
        }
    }

    fn check_integrity(&self, snapshot: &Pattern) -> Result<(), ScheduleError> {
        let last = self.pattern.as_ref().map_or(0, |p| p.revision());
        if snapshot.revision() < last || !snapshot.is_consistent() {
            return Err(ScheduleError::DataIntegrity { found: snapshot.revision(), last });
        }
        Ok(())
    }

    fn forget_executed(&mut self, now: u64) {
        self.voices.retain(|v| v.off.sample >= now);
        self.cues.retain(|c| c.at.sample >= now);
        while self.history.first().is_some() && self.anchor_after(0) <= now {
            self.history.remove(0);
        }
    }

    /// Anchor sample of the timeline following `history[index]`.
    fn anchor_after(&self, index: usize) -> u64 {
        self.history.get(index + 1).unwrap_or(&self.timeline).anchor_sample()
    }

    fn plan_tick(&self, now: u64, snapshot: &Pattern) -> (Plan, u64) {
        let mut plan = Plan::default();
        if let Some(old) = self.pattern.as_deref() {
            if old.revision() != snapshot.revision() {
                if let Some(dirty) = snapshot.dirty_range_since(old) {
                    self.plan_edit(now, old, snapshot, dirty, &mut plan);
                }
            }
        }

        if !self.timeline.is_running() {
            return (plan, self.horizon);
        }
        let from = self.horizon.max(now);
        let to = now + self.lookahead_samples();
        if to <= from {
            return (plan, self.horizon);
        }
        self.plan_window(&self.timeline, from, to, snapshot, None, &mut plan);
        (plan, to)
    }

    /// Cancel what an edit invalidated and schedule its replacement.
    fn plan_edit(&self, now: u64, old: &Pattern, new: &Pattern, dirty: StepRange, plan: &mut Plan) {
        for voice in &self.voices {
            let after = new.note(voice.key);
            if old.note(voice.key) == after {
                continue;
            }
            if voice.on.sample >= now {
                plan.retire_voice(voice, now);
                continue;
            }
            // Sounding: only the release can still change.
            let release = match after {
                Some(n)
                    if n.step == voice.step
                        && n.note == voice.note
                        && n.instrument == voice.instrument =>
                {
                    voice.release_at(&self.timebase, n.end())
                }
                _ => voice.on.sample,
            }
            .max(now);
            if release != voice.off.sample {
                plan.cancels.push(voice.off.serial);
                let off = plan.push(ScheduledEvent::note_off(release, voice.instrument, voice.note));
                plan.reended.push((voice.on.serial, off));
            }
        }
        for cue in &self.cues {
            if old.point(cue.key) != new.point(cue.key) {
                plan.retire_cue(cue);
            }
        }

        if !self.timeline.is_running() || self.horizon <= now {
            return;
        }
        let mut segments = Vec::with_capacity(self.history.len() + 1);
        for (i, timeline) in self.history.iter().enumerate() {
            segments.push((timeline, timeline.anchor_sample(), self.anchor_after(i)));
        }
        segments.push((&self.timeline, self.timeline.anchor_sample(), u64::MAX));
        for (timeline, start, end) in segments {
            let from = start.max(now);
            let to = end.min(self.horizon);
            if from < to {
                self.plan_window(timeline, from, to, new, Some(dirty), plan);
            }
        }
    }

    /// Schedule everything of `pattern` whose sample lies in `[from, to)`,
    /// optionally only sources starting inside `only`.
    fn plan_window(
        &self,
        timeline: &Timeline,
        from: u64,
        to: u64,
        pattern: &Pattern,
        only: Option<StepRange>,
        plan: &mut Plan,
    ) {
        let tb = &self.timebase;
        let margin = 1.0 / tb.samples_per_step(timeline.bpm());
        let u_lo = timeline.u_at_sample(tb, from) - margin;
        let u_hi = timeline.u_at_sample(tb, to) + margin;
        let wanted = |step: f64| only.map_or(true, |r| step >= r.start && step <= r.end);

        for pass in timeline.passes(u_lo, u_hi) {
            let lo = pass.step_of(u_lo).max(pass.start_step);
            let hi = pass.step_of(u_hi).min(pass.end_step);

            for note in pattern.notes_starting_in(lo, hi) {
                if !wanted(note.step) {
                    continue;
                }
                let on = timeline.sample_at_u(tb, pass.u_of(note.step));
                if on < from || on >= to || self.has_voice(note.key, on, plan) {
                    continue;
                }
                let mut voice = Voice {
                    key: note.key,
                    step: note.step,
                    note: note.note,
                    instrument: note.instrument,
                    timeline: *timeline,
                    pass,
                    on: Dated { serial: 0, sample: on },
                    off: Dated { serial: 0, sample: on },
                };
                voice.off.sample = voice.release_at(tb, note.end());
                let on_idx =
                    plan.push(ScheduledEvent::note_on(on, note.instrument, note.note, note.velocity));
                let off_idx =
                    plan.push(ScheduledEvent::note_off(voice.off.sample, note.instrument, note.note));
                plan.voices.push((voice, on_idx, off_idx));
            }

            for point in pattern.automation_in(lo, hi) {
                if !wanted(point.step) {
                    continue;
                }
                let at = timeline.sample_at_u(tb, pass.u_of(point.step));
                if at < from || at >= to || self.has_cue(point.key, at, plan) {
                    continue;
                }
                let idx = plan.push(ScheduledEvent::automation(
                    at,
                    point.instrument,
                    point.param,
                    point.value,
                ));
                plan.cues.push((point.key, idx));
            }
        }
    }

    fn has_voice(&self, key: NoteKey, on: u64, plan: &Plan) -> bool {
        self.voices.iter().any(|v| {
            v.key == key && v.on.sample == on && !plan.retired_voices.contains(&v.on.serial)
        })
    }

    fn has_cue(&self, key: AutomationKey, at: u64, plan: &Plan) -> bool {
        self.cues.iter().any(|c| {
            c.key == key && c.at.sample == at && !plan.retired_cues.contains(&c.at.serial)
        })
    }

    /// Send a plan as one batch, then record it. Nothing is recorded or
    /// cancelled when the batch does not fit.
    fn commit(
        &mut self,
        plan: Plan,
        lead: Option<RenderCommand>,
        commands: &mut CommandSender,
    ) -> Result<(), ScheduleError> {
        let Plan { events, voices, cues, reended, retired_voices, retired_cues, cancels } = plan;

        let mut order: Vec<usize> = (0..events.len()).collect();
        order.sort_by_key(|&i| (events[i].target_sample, events[i].kind.tie_rank(), i));
        let mut serials = vec![0u64; events.len()];
        for (rank, &i) in order.iter().enumerate() {
            serials[i] = self.next_serial + rank as u64;
        }

        let batch: Vec<RenderCommand> = lead
            .into_iter()
            .chain(order.iter().map(|&i| RenderCommand::Event(events[i].with_serial(serials[i]))))
            .collect();
        commands.send_batch(batch.into_iter())?;
        self.next_serial += events.len() as u64;

        for serial in cancels {
            self.cancel.cancel(serial);
        }
        self.voices.retain(|v| !retired_voices.contains(&v.on.serial));
        self.cues.retain(|c| !retired_cues.contains(&c.at.serial));
        let dated = |i: usize| Dated { serial: serials[i], sample: events[i].target_sample };
        for (on_serial, off) in reended {
            if let Some(voice) = self.voices.iter_mut().find(|v| v.on.serial == on_serial) {
                voice.off = dated(off);
            }
        }
        for (mut voice, on, off) in voices {
            voice.on = dated(on);
            voice.off = dated(off);
            self.voices.push(voice);
        }
        for (key, idx) in cues {
            self.cues.push(Cue { key, at: dated(idx) });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{MAX_BPM, MIN_LOOP_STEPS};
    use dg_ir::{AutomationPoint, EventKind, EventPayload, LoopRange, NoteEvent, PatternEdit};
    use ringbuf::traits::{Consumer, Observer, Split};
    use ringbuf::{HeapCons, HeapRb};

    const TB: TimeBase = TimeBase::new(48_000);

    struct Rig {
        scheduler: EventScheduler,
        tx: CommandSender,
        rx: HeapCons<RenderCommand>,
        cancel: Arc<CancelBoard>,
    }

    fn rig(capacity: usize) -> Rig {
        let (prod, rx) = HeapRb::<RenderCommand>::new(capacity).split();
        let cancel = Arc::new(CancelBoard::new(4096));
        let scheduler = EventScheduler::new(TB, SchedulerConfig::default(), Arc::clone(&cancel));
        Rig { scheduler, tx: CommandSender::new(prod), rx, cancel }
    }

    impl Rig {
        fn start(&mut self, timeline: Timeline) {
            let update = TimelineUpdate {
                at_sample: timeline.anchor_sample(),
                timeline,
                release_notes: false,
                flush: false,
            };
            self.scheduler.retime(Reschedule::Restart, update, &mut self.tx).unwrap();
        }

        fn events(&mut self) -> Vec<ScheduledEvent> {
            let mut out = Vec::new();
            while let Some(cmd) = self.rx.try_pop() {
                if let RenderCommand::Event(e) = cmd {
                    out.push(e);
                }
            }
            out
        }
    }

    fn note(key: u32, step: f64, length: f64, pitch: u8) -> NoteEvent {
        NoteEvent {
            key: NoteKey(key),
            step,
            length,
            note: pitch,
            velocity: 100,
            instrument: InstrumentId(0),
        }
    }

    fn store(notes: Vec<NoteEvent>) -> PatternStore {
        PatternStore::new(Pattern::from_parts(notes, vec![]))
    }

    #[test]
    fn lookahead_follows_tempo() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.lookahead_ms(60.0), 60.0);
        assert_eq!(cfg.lookahead_ms(80.0), 60.0);
        assert_eq!(cfg.lookahead_ms(110.0), 90.0);
        assert_eq!(cfg.lookahead_ms(140.0), 120.0);
        assert_eq!(cfg.lookahead_ms(300.0), 120.0);
    }

    #[test]
    fn four_step_note_at_120_bpm() {
        let mut rig = rig(64);
        let store = store(vec![note(1, 0.0, 4.0, 60)]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();

        let events = rig.events();
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].kind, events[0].target_sample), (EventKind::NoteOn, 0));
        assert_eq!((events[1].kind, events[1].target_sample), (EventKind::NoteOff, 24_000));
        assert!(events[0].serial < events[1].serial);
    }

    #[test]
    fn windows_never_dispatch_twice() {
        let mut rig = rig(256);
        let notes = (0..32).map(|i| note(i, i as f64 * 0.5, 0.25, 60)).collect();
        let store = store(notes);
        rig.start(Timeline::new(0, 0.0, 133.0, None, true));
        let mut ons = Vec::new();
        for tick in 0..200u64 {
            rig.scheduler.tick(tick * 480, &store, &mut rig.tx).unwrap();
            ons.extend(rig.events().into_iter().filter(|e| e.kind == EventKind::NoteOn));
        }
        assert_eq!(ons.len(), 32);
        assert!(ons.windows(2).all(|w| w[0].target_sample < w[1].target_sample));
    }

    #[test]
    fn loop_restart_is_prescheduled_on_the_boundary() {
        // Loop 0..64 at 160 BPM from step 60: the boundary is 4 steps away.
        let mut rig = rig(256);
        let store = store(vec![note(1, 0.0, 1.0, 60), note(2, 60.0, 8.0, 64)]);
        rig.start(Timeline::new(0, 60.0, 160.0, Some(LoopRange::new(0.0, 64.0)), true));

        let mut restart = None;
        for tick in 0..40u64 {
            let now = tick * 480;
            rig.scheduler.tick(now, &store, &mut rig.tx).unwrap();
            for e in rig.events() {
                let pitch = match e.payload {
                    EventPayload::Note { note, .. } => note,
                    EventPayload::Automation { .. } => continue,
                };
                if e.kind == EventKind::NoteOn && pitch == 60 {
                    restart.get_or_insert((e.target_sample, now));
                }
                if e.kind == EventKind::NoteOff && pitch == 64 {
                    // Cut at the loop end.
                    assert_eq!(e.target_sample, 18_000);
                }
            }
        }
        let (sample, dispatched_at) = restart.unwrap();
        assert!(sample.abs_diff(18_000) <= 1);
        assert!(dispatched_at < 18_000);
    }

    #[test]
    fn release_sorts_before_attack_on_the_same_sample() {
        let mut rig = rig(64);
        // 160 BPM: 4500 samples per step, 5760 samples of look-ahead.
        let store = store(vec![note(1, 0.0, 1.0, 60), note(2, 1.0, 1.0, 60)]);
        rig.start(Timeline::new(0, 0.0, 160.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        let at_4500: Vec<EventKind> = rig
            .events()
            .into_iter()
            .filter(|e| e.target_sample == 4500)
            .map(|e| e.kind)
            .collect();
        assert_eq!(at_4500, vec![EventKind::NoteOff, EventKind::NoteOn]);
    }

    #[test]
    fn tiny_note_releases_after_its_own_attack() {
        let mut rig = rig(64);
        let store = store(vec![note(1, 0.5, 1e-6, 60)]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        let events = rig.events();
        assert_eq!(events.len(), 2);
        assert_eq!((events[0].kind, events[0].target_sample), (EventKind::NoteOn, 3000));
        assert_eq!((events[1].kind, events[1].target_sample), (EventKind::NoteOff, 3001));
        assert!(events[0].serial < events[1].serial);
    }

    #[test]
    fn note_cut_on_its_start_sample_still_releases_after_attack() {
        // Starts a hair before the loop end, so the cut rounds onto the
        // attack sample (12000).
        let mut rig = rig(64);
        let store = store(vec![note(1, 2.0 - 1e-6, 4.0, 60)]);
        rig.start(Timeline::new(0, 0.0, 120.0, Some(LoopRange::new(0.0, 2.0)), true));
        let mut events = Vec::new();
        for now in [0, 4800, 9600] {
            rig.scheduler.tick(now, &store, &mut rig.tx).unwrap();
            events.extend(rig.events());
        }
        let on = events.iter().find(|e| e.kind == EventKind::NoteOn).unwrap();
        let off = events.iter().find(|e| e.kind == EventKind::NoteOff).unwrap();
        assert_eq!(on.target_sample, 12_000);
        assert_eq!(off.target_sample, 12_001);
        assert!(off.serial > on.serial);
    }

    #[test]
    fn shortest_loop_keeps_a_tick_bounded() {
        // 999 BPM: about 30 samples per loop pass, 5760 samples of look-ahead.
        let mut rig = rig(1024);
        let store = store(vec![note(1, 0.0, 1.0, 60)]);
        let lp = crate::clock::validate_loop(0.0, MIN_LOOP_STEPS).unwrap();
        rig.start(Timeline::new(0, 0.0, MAX_BPM, Some(lp), true));
        let report = rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        assert!(report.dispatched > 0);
        assert!(report.dispatched <= 2 * (5760 / 29 + 2), "{}", report.dispatched);
        let events = rig.events();
        assert!(events.windows(2).all(|w| w[0].target_sample <= w[1].target_sample));
    }

    #[test]
    fn stalled_tick_reports_the_span_it_could_not_cover() {
        let mut rig = rig(64);
        let store = store(vec![note(1, 1.0, 0.25, 60), note(2, 3.5, 0.25, 62)]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        let first = rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        assert_eq!(first.skipped, None);
        assert_eq!(first.horizon, 4800);

        let late = rig.scheduler.tick(20_000, &store, &mut rig.tx).unwrap();
        assert_eq!(late.skipped, Some((4800, 20_000)));
        let ons: Vec<u64> = rig
            .events()
            .into_iter()
            .filter(|e| e.kind == EventKind::NoteOn)
            .map(|e| e.target_sample)
            .collect();
        assert_eq!(ons, vec![21_000]);

        let next = rig.scheduler.tick(20_480, &store, &mut rig.tx).unwrap();
        assert_eq!(next.skipped, None);
    }

    #[test]
    fn note_added_inside_window_is_scheduled() {
        let mut rig = rig(64);
        let store = store(vec![]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        assert_eq!(rig.scheduler.horizon(), 4800);

        store.edit(&[
            PatternEdit::AddNote(note(1, 0.5, 1.0, 60)),
            // Already played past.
            PatternEdit::AddNote(note(2, 0.25, 1.0, 62)),
        ]);
        rig.scheduler.tick(2400, &store, &mut rig.tx).unwrap();
        let ons: Vec<u64> = rig
            .events()
            .into_iter()
            .filter(|e| e.kind == EventKind::NoteOn)
            .map(|e| e.target_sample)
            .collect();
        assert_eq!(ons, vec![3000]);
    }

    #[test]
    fn removed_note_is_cancelled() {
        let mut rig = rig(64);
        let store = store(vec![note(1, 0.5, 1.0, 60)]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        let serials: Vec<u64> = rig.events().iter().map(|e| e.serial).collect();

        store.edit(&[PatternEdit::RemoveNote(NoteKey(1))]);
        let report = rig.scheduler.tick(1000, &store, &mut rig.tx).unwrap();
        assert_eq!(report.cancelled, 2);
        assert!(serials.iter().all(|&s| rig.cancel.is_cancelled(s)));
        assert!(rig.events().iter().all(|e| e.kind != EventKind::NoteOn));
    }

    #[test]
    fn shortening_a_sounding_note_moves_its_release() {
        let mut rig = rig(64);
        let store = store(vec![note(1, 0.0, 4.0, 60)]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        let old_off = rig.events()[1];

        store.edit(&[PatternEdit::ResizeNote { key: NoteKey(1), length: 1.0 }]);
        rig.scheduler.tick(1000, &store, &mut rig.tx).unwrap();
        assert!(rig.cancel.is_cancelled(old_off.serial));
        let events = rig.events();
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].kind, events[0].target_sample), (EventKind::NoteOff, 6000));
    }

    #[test]
    fn removing_a_sounding_note_releases_now() {
        let mut rig = rig(64);
        let store = store(vec![note(1, 0.0, 4.0, 60)]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        rig.events();

        store.edit(&[PatternEdit::RemoveNote(NoteKey(1))]);
        rig.scheduler.tick(1000, &store, &mut rig.tx).unwrap();
        let events = rig.events();
        assert_eq!((events[0].kind, events[0].target_sample), (EventKind::NoteOff, 1000));
    }

    #[test]
    fn tempo_change_keeps_dispatched_events() {
        let mut rig = rig(64);
        let store = store(vec![note(1, 0.0, 4.0, 60), note(2, 1.0, 1.0, 62)]);
        let timeline = Timeline::new(0, 0.0, 120.0, None, true);
        rig.start(timeline);
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        let first = rig.events();
        assert_eq!(first.len(), 2);

        let at = rig.scheduler.horizon();
        let rebased = timeline.rebased(&TB, at, 60.0);
        let update = TimelineUpdate { at_sample: at, timeline: rebased, release_notes: false, flush: false };
        rig.scheduler.retime(Reschedule::Retempo, update, &mut rig.tx).unwrap();
        rig.scheduler.tick(4800, &store, &mut rig.tx).unwrap();

        assert!(first.iter().all(|e| !rig.cancel.is_cancelled(e.serial)));
        let on = rig.events().into_iter().find(|e| e.kind == EventKind::NoteOn).unwrap();
        // Step 0.8 at 4800, then 0.2 steps at 12000 samples per step.
        assert_eq!(on.target_sample, 7200);
    }

    #[test]
    fn restart_cancels_everything_pending() {
        let mut rig = rig(64);
        let store = store(vec![note(1, 0.0, 4.0, 60), note(2, 0.5, 1.0, 62)]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        let events = rig.events();

        let stop = TimelineUpdate {
            at_sample: 1000,
            timeline: Timeline::stopped(0.0, 120.0, None),
            release_notes: true,
            flush: true,
        };
        rig.scheduler.retime(Reschedule::Restart, stop, &mut rig.tx).unwrap();
        for e in &events {
            assert_eq!(rig.cancel.is_cancelled(e.serial), e.target_sample >= 1000);
        }
        assert_eq!(rig.scheduler.active_voices(), 0);
        let report = rig.scheduler.tick(2000, &store, &mut rig.tx).unwrap();
        assert_eq!(report.dispatched, 0);
    }

    #[test]
    fn shrinking_the_loop_cuts_sounding_notes_at_the_new_end() {
        let mut rig = rig(64);
        let store = store(vec![note(1, 0.0, 16.0, 60)]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        let off = rig.events()[1];
        assert_eq!(off.target_sample, 96_000);

        let reshaped = Timeline::new(3000, 0.5, 120.0, Some(LoopRange::new(0.0, 4.0)), true);
        let update = TimelineUpdate { at_sample: 3000, timeline: reshaped, release_notes: false, flush: false };
        rig.scheduler.retime(Reschedule::Reshape, update, &mut rig.tx).unwrap();
        assert!(rig.cancel.is_cancelled(off.serial));
        let events = rig.events();
        assert_eq!((events[0].kind, events[0].target_sample), (EventKind::NoteOff, 24_000));
    }

    #[test]
    fn automation_is_dispatched_in_window() {
        let mut rig = rig(64);
        let point = AutomationPoint {
            key: AutomationKey(1),
            step: 0.5,
            instrument: InstrumentId(2),
            param: 0,
            value: 0.5,
        };
        let store = PatternStore::new(Pattern::from_parts(vec![], vec![point]));
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        rig.scheduler.tick(0, &store, &mut rig.tx).unwrap();
        let events = rig.events();
        assert_eq!(events.len(), 1);
        assert_eq!((events[0].kind, events[0].target_sample), (EventKind::Automation, 3000));
    }

    #[test]
    fn batch_that_does_not_fit_dispatches_nothing() {
        let mut rig = rig(2);
        let store = store(vec![note(1, 0.0, 1.0, 60), note(2, 0.25, 1.0, 62)]);
        rig.start(Timeline::new(0, 0.0, 120.0, None, true));
        let err = rig.scheduler.tick(0, &store, &mut rig.tx).unwrap_err();
        assert!(matches!(err, ScheduleError::Queue(_)));
        assert_eq!(rig.scheduler.horizon(), 0);
        assert_eq!(rig.scheduler.active_voices(), 0);

        let (prod, rx) = HeapRb::<RenderCommand>::new(16).split();
        let mut roomy = CommandSender::new(prod);
        let report = rig.scheduler.tick(0, &store, &mut roomy).unwrap();
        assert_eq!(report.dispatched, 4);
        assert_eq!(rx.occupied_len(), 4);
    }

    #[test]
    fn revision_going_backwards_is_a_data_integrity_error() {
        let mut rig = rig(64);
        let mut newer = Pattern::new();
        newer.stamp(5);
        rig.scheduler.tick(0, &PatternStore::new(newer), &mut rig.tx).unwrap();
        let err = rig.scheduler.tick(10, &PatternStore::default(), &mut rig.tx).unwrap_err();
        assert_eq!(err, ScheduleError::DataIntegrity { found: 1, last: 5 });
    }
}
