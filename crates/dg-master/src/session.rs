//! The control context.
//!
//! A `Session` owns everything on the control side of one engine: the
//! transport, the scheduler, the pattern store, the mixer model, routing,
//! connection supervision and the registries. Application code creates one
//! at its root and drives it with `tick_at`; the matching `Engine` goes to
//! the audio callback (or to an offline renderer).
//!
//! All mutations happen here, on one thread. The render path only sees the
//! command ring and whole topology revisions published by `commit`.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;

use dg_engine::machines::Passthrough;
use dg_engine::{
    EffectProcessor, Engine, EngineLink, EventScheduler, InsertStrip, InstrumentUnit,
    PatternStore, RenderCommand, ScheduleError, TickReport, Transition, TransportStateMachine,
    MAX_CHAIN, MAX_SENDS,
};
use dg_ir::{
    EffectDescriptor, EffectId, InsertId, InstrumentDescriptor, InstrumentId, PatternEdit,
    PositionSnapshot, StepRange, TransportEvent, TransportNotice, TransportState,
};
use log::{debug, info, warn};

use crate::analyser::SpectrumAnalyser;
use crate::chain::EffectSlot;
use crate::config::EngineConfig;
use crate::error::{ConnectionError, EffectError, EngineError};
use crate::insert::{MixerInsert, MAX_GAIN_DB, MIN_GAIN_DB};
use crate::mixer::Mixer;
use crate::project::{
    InsertState, MixerState, ProjectState, RouteState, SendState, TransportSettings,
};
use crate::registry::{
    BuiltinEffects, BuiltinRegistry, EffectRegistry, InstrumentRegistry, ResourceState,
};
use crate::routing::{AudioLink, RouteChange, RoutingGraph};
use crate::subscribers::{SubscriptionId, Subscribers};
use crate::supervisor::{Attempt, ConnectionStatus, ConnectionSupervisor};

/// One insert parameter change.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InsertParam {
    /// Clamped to [-96, +24] dB; -96 dB and below is silence.
    GainDb(f32),
    /// Clamped to [-1, 1].
    Pan(f32),
    Mute(bool),
    Solo(bool),
    /// Post-fader send level; 0 removes the send.
    Send { dest: InsertId, level: f32 },
}

/// Result of `insert_effect`.
#[derive(Debug)]
pub struct EffectInsertion {
    pub id: EffectId,
    /// Chain positions whose wiring changed.
    pub segment: Range<usize>,
    /// Set when the effect could not be created; its position passes audio
    /// through.
    pub failure: Option<EffectError>,
}

/// What one control tick did.
#[derive(Debug, Default)]
pub struct TickSummary {
    pub garbage: usize,
    pub diagnostics: usize,
    pub established: usize,
    pub failed: usize,
    pub schedule: Option<TickReport>,
    pub schedule_error: Option<ScheduleError>,
    pub slept: usize,
    pub analysed: usize,
}

struct InstrumentEntry {
    descriptor: InstrumentDescriptor,
    slot: usize,
    /// The output has been handed to the render path.
    installed: bool,
}

/// Wires instrument routes into a staged route table.
struct StagedRoutes<'a> {
    routes: &'a mut Vec<Option<usize>>,
    instruments: &'a BTreeMap<InstrumentId, InstrumentEntry>,
    mixer: &'a Mixer,
}

impl AudioLink for StagedRoutes<'_> {
    fn link(&mut self, instrument: InstrumentId, insert: InsertId) -> Result<(), String> {
        let entry = self
            .instruments
            .get(&instrument)
            .filter(|e| e.installed)
            .ok_or_else(|| format!("output of {instrument} is not installed"))?;
        let slot = self.mixer.slot_of(insert).ok_or_else(|| format!("{insert} does not exist"))?;
        let route = self
            .routes
            .get_mut(entry.slot)
            .ok_or_else(|| format!("instrument slot {} out of range", entry.slot))?;
        *route = Some(slot);
        Ok(())
    }

    fn unlink(&mut self, instrument: InstrumentId, _insert: InsertId) {
        if let Some(entry) = self.instruments.get(&instrument) {
            if let Some(route) = self.routes.get_mut(entry.slot) {
                *route = None;
            }
        }
    }
}

pub struct Session {
    config: EngineConfig,
    link: EngineLink,
    transport: TransportStateMachine,
    scheduler: EventScheduler,
    patterns: Arc<PatternStore>,
    mixer: Mixer,
    routing: RoutingGraph,
    supervisor: ConnectionSupervisor,
    instruments: BTreeMap<InstrumentId, InstrumentEntry>,
    registry: Box<dyn InstrumentRegistry>,
    effects: Box<dyn EffectRegistry>,
    subscribers: Subscribers,
    /// Control clock, advanced by `tick_at`.
    elapsed: Duration,
    revision: u64,
}

impl Session {
    /// Create a session and the engine it controls.
    pub fn new(
        config: EngineConfig,
        registry: Box<dyn InstrumentRegistry>,
        effects: Box<dyn EffectRegistry>,
    ) -> Result<(Session, Engine), EngineError> {
        config.validate()?;
        let (engine, link) = Engine::new(config.engine_settings());
        let timebase = link.settings.timebase();
        let transport = TransportStateMachine::new(timebase, config.initial_bpm)?;
        let scheduler =
            EventScheduler::new(timebase, config.scheduler_config(), Arc::clone(&link.cancel));
        let session = Session {
            mixer: Mixer::new(link.settings.max_inserts),
            supervisor: ConnectionSupervisor::new(config.retry_policy()),
            config,
            link,
            transport,
            scheduler,
            patterns: Arc::new(PatternStore::default()),
            routing: RoutingGraph::new(),
            instruments: BTreeMap::new(),
            registry,
            effects,
            subscribers: Subscribers::new(),
            elapsed: Duration::ZERO,
            revision: 0,
        };
        Ok((session, engine))
    }

    /// A session over the built-in instruments and effects.
    pub fn with_builtins(config: EngineConfig) -> Result<(Session, Engine), EngineError> {
        Self::new(config, Box::new(BuiltinRegistry::new()), Box::new(BuiltinEffects))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Render clock as of the last published block.
    pub fn render_now(&self) -> u64 {
        self.link.position.snapshot().sample_time
    }

    // --- Transport ---

    pub fn transport_state(&self) -> &TransportState {
        self.transport.state()
    }

    pub fn play(&mut self) -> Result<TransportNotice, EngineError> {
        let now = self.render_now();
        let backup = self.transport.clone();
        let transition = self.transport.play(now);
        self.apply_transition(backup, transition)
    }

    pub fn pause(&mut self) -> Result<TransportNotice, EngineError> {
        let now = self.render_now();
        let backup = self.transport.clone();
        let transition = self.transport.pause(now);
        self.apply_transition(backup, transition)
    }

    pub fn resume(&mut self) -> Result<TransportNotice, EngineError> {
        let now = self.render_now();
        let backup = self.transport.clone();
        let transition = self.transport.resume(now);
        self.apply_transition(backup, transition)
    }

    pub fn stop(&mut self) -> Result<TransportNotice, EngineError> {
        let now = self.render_now();
        let backup = self.transport.clone();
        let transition = self.transport.stop(now);
        self.apply_transition(backup, transition)
    }

    pub fn jump_to_step(&mut self, step: f64) -> Result<TransportNotice, EngineError> {
        let now = self.render_now();
        let backup = self.transport.clone();
        let transition = self.transport.jump_to_step(step, now)?;
        self.apply_transition(backup, transition)
    }

    /// Change tempo. Events already handed to the render path keep their
    /// samples; the new tempo applies from the end of the dispatched window.
    pub fn set_bpm(&mut self, bpm: f64) -> Result<TransportNotice, EngineError> {
        let at = self.render_now().max(self.scheduler.horizon());
        let backup = self.transport.clone();
        let transition = self.transport.set_bpm(bpm, at)?;
        self.apply_transition(backup, transition)
    }

    pub fn set_loop(
        &mut self,
        start: f64,
        end: f64,
        enabled: bool,
    ) -> Result<TransportNotice, EngineError> {
        let now = self.render_now();
        let backup = self.transport.clone();
        let transition = self.transport.set_loop(start, end, enabled, now)?;
        self.apply_transition(backup, transition)
    }

    fn apply_transition(
        &mut self,
        backup: TransportStateMachine,
        transition: Transition,
    ) -> Result<TransportNotice, EngineError> {
        if let Some((reschedule, update)) = transition.timeline {
            if let Err(err) = self.scheduler.retime(reschedule, update, &mut self.link.commands) {
                self.transport = backup;
                return Err(err.into());
            }
        }
        if let Some(event) = transition.event {
            let notice = event.notice();
            info!(
                "transport {}: {:?} at step {:.2}, {} bpm",
                event_name(&event),
                notice.state,
                notice.position,
                notice.bpm
            );
            self.subscribers.notify(&event);
            self.schedule_now();
        }
        Ok(transition.notice)
    }

    pub fn position_snapshot(&self) -> PositionSnapshot {
        self.link.position.snapshot()
    }

    /// Observe transport transitions. No-op commands are not reported.
    pub fn subscribe(
        &mut self,
        callback: impl FnMut(&TransportEvent) + Send + 'static,
    ) -> SubscriptionId {
        self.subscribers.subscribe(Box::new(callback))
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    // --- Patterns ---

    pub fn patterns(&self) -> &Arc<PatternStore> {
        &self.patterns
    }

    /// Apply edits as one revision and reschedule what they touched at once.
    pub fn edit_pattern(&mut self, edits: &[PatternEdit]) -> Option<StepRange> {
        let touched = self.patterns.edit(edits)?;
        self.schedule_now();
        Some(touched)
    }

    fn schedule_now(&mut self) -> Option<TickReport> {
        let now = self.render_now();
        match self.scheduler.tick(now, &self.patterns, &mut self.link.commands) {
            Ok(report) => Some(report),
            Err(err) => {
                warn!("scheduling deferred to next tick: {err}");
                None
            }
        }
    }

    // --- Inserts ---

    pub fn inserts(&self) -> impl Iterator<Item = &MixerInsert> + '_ {
        self.mixer.iter()
    }

    pub fn insert(&self, id: InsertId) -> Option<&MixerInsert> {
        self.mixer.get(id)
    }

    /// Create an insert with the lowest free id.
    pub fn create_insert(&mut self) -> Result<InsertId, EngineError> {
        let id = self.mixer.next_free_id();
        self.create_insert_with_id(id)?;
        Ok(id)
    }

    pub fn create_insert_with_id(&mut self, id: InsertId) -> Result<(), EngineError> {
        let slot = self.mixer.create(id)?.slot;
        let settings = &self.link.settings;
        let strip = Box::new(InsertStrip::new(
            id,
            settings.block_size,
            settings.sample_rate,
            settings.ramp_samples(),
        ));
        if let Err(err) = self.link.commands.send(RenderCommand::InstallInsert { slot, strip }) {
            self.mixer.remove(id);
            return Err(err.into());
        }
        debug!("created {id} in slot {slot}");
        self.commit()
    }

    /// Delete an insert with its effect chain and analyser. Sends into it
    /// are dropped. Fails while an instrument is routed or connecting to it.
    pub fn remove_insert(&mut self, id: InsertId) -> Result<(), EngineError> {
        let slot = self.mixer.slot_of(id).ok_or(EngineError::UnknownInsert(id))?;
        let user = self.instruments.keys().copied().find(|&instrument| {
            self.routing.edge(instrument) == Some(id)
                || matches!(
                    self.supervisor.status(instrument),
                    Some(ConnectionStatus::Pending { insert, .. }) if *insert == id
                )
        });
        if let Some(instrument) = user {
            return Err(EngineError::InsertInUse { insert: id, instrument });
        }
        self.link.commands.send(RenderCommand::RemoveInsert { slot })?;
        self.mixer.remove(id);
        for insert in self.mixer.iter_mut() {
            insert.set_send(id, 0.0);
        }
        debug!("removed {id} from slot {slot}");
        self.commit()
    }

    pub fn set_insert_param(&mut self, id: InsertId, param: InsertParam) -> Result<(), EngineError> {
        let insert = self.mixer.insert_or_err(id)?;
        match param {
            InsertParam::GainDb(db) => {
                if db.is_nan() {
                    return Err(EngineError::InvalidParam { name: "gain_db", value: db });
                }
                insert.gain_db = db.clamp(MIN_GAIN_DB, MAX_GAIN_DB);
            }
            InsertParam::Pan(pan) => {
                if !pan.is_finite() {
                    return Err(EngineError::InvalidParam { name: "pan", value: pan });
                }
                insert.pan = pan.clamp(-1.0, 1.0);
            }
            InsertParam::Mute(muted) => insert.muted = muted,
            InsertParam::Solo(solo) => insert.solo = solo,
            InsertParam::Send { dest, level } => return self.set_send(id, dest, level),
        }
        self.commit()
    }

    fn set_send(&mut self, id: InsertId, dest: InsertId, level: f32) -> Result<(), EngineError> {
        if !(level.is_finite() && level >= 0.0) {
            return Err(EngineError::InvalidParam { name: "send level", value: level });
        }
        if dest == id {
            return Err(EngineError::RoutingCycle { unsorted: 1 });
        }
        if !self.mixer.contains(dest) {
            return Err(EngineError::UnknownInsert(dest));
        }
        let insert = self.mixer.insert_or_err(id)?;
        let previous = insert.sends.clone();
        if !insert.set_send(dest, level) {
            return Err(EngineError::Capacity { what: "sends", max: MAX_SENDS });
        }
        let result = self.commit();
        if result.is_err() {
            if let Some(insert) = self.mixer.get_mut(id) {
                insert.sends = previous;
            }
        }
        result
    }

    /// Route around the effect chain, keeping its state. Never rebuilds
    /// the chain.
    pub fn set_bypass(&mut self, id: InsertId, bypassed: bool) -> Result<(), EngineError> {
        let insert = self.mixer.insert_or_err(id)?;
        if insert.bypassed == bypassed {
            return Ok(());
        }
        insert.bypassed = bypassed;
        self.commit()
    }

    pub fn set_master_gain(&mut self, gain: f32) -> Result<(), EngineError> {
        if !(gain.is_finite() && gain >= 0.0) {
            return Err(EngineError::InvalidParam { name: "master gain", value: gain });
        }
        self.mixer.master_gain = gain;
        self.commit()
    }

    // --- Effects ---

    /// Insert an effect at `index` (clamped to the end of the chain). If the
    /// registry cannot create it, the position passes audio through and the
    /// failure is reported in the result.
    pub fn insert_effect(
        &mut self,
        insert: InsertId,
        descriptor: EffectDescriptor,
        index: usize,
    ) -> Result<EffectInsertion, EngineError> {
        let target = self.mixer.insert_or_err(insert)?;
        if target.chain.is_full() {
            return Err(EngineError::Capacity { what: "effects", max: MAX_CHAIN });
        }
        let slot = target.slot;
        let (unit, failure) = match self.effects.create_effect(&descriptor) {
            Ok(unit) => (unit, None),
            Err(err) => {
                warn!("{insert}: {err}; passing audio through");
                (Box::new(Passthrough) as Box<dyn EffectProcessor>, Some(err))
            }
        };
        let passthrough = failure.is_some();
        let target = self.mixer.insert_or_err(insert)?;
        let (id, segment) = target
            .chain
            .insert(EffectSlot { descriptor, passthrough }, index)
            .ok_or(EngineError::Capacity { what: "effects", max: MAX_CHAIN })?;
        let install = RenderCommand::InstallEffect { slot, effect: id, unit };
        if let Err(err) = self.link.commands.send(install) {
            target.chain.remove(id);
            return Err(err.into());
        }
        self.commit()?;
        Ok(EffectInsertion { id, segment, failure })
    }

    /// Remove an effect; returns the (empty) chain range where it was.
    pub fn remove_effect(
        &mut self,
        insert: InsertId,
        effect: EffectId,
    ) -> Result<Range<usize>, EngineError> {
        let target = self.mixer.insert_or_err(insert)?;
        if !target.chain.contains(effect) {
            return Err(EngineError::UnknownEffect { insert });
        }
        let slot = target.slot;
        self.link.commands.send(RenderCommand::RetireEffect { slot, effect })?;
        let segment = self
            .mixer
            .insert_or_err(insert)?
            .chain
            .remove(effect)
            .map(|(_, segment)| segment)
            .ok_or(EngineError::UnknownEffect { insert })?;
        self.commit()?;
        Ok(segment)
    }

    /// Move an effect. `Ok(None)` when it already sits at `new_index`.
    pub fn reorder_effect(
        &mut self,
        insert: InsertId,
        effect: EffectId,
        new_index: usize,
    ) -> Result<Option<Range<usize>>, EngineError> {
        let target = self.mixer.insert_or_err(insert)?;
        if !target.chain.contains(effect) {
            return Err(EngineError::UnknownEffect { insert });
        }
        match target.chain.reorder(effect, new_index) {
            Some(segment) => {
                self.commit()?;
                Ok(Some(segment))
            }
            None => Ok(None),
        }
    }

    pub fn set_effect_param(
        &mut self,
        insert: InsertId,
        effect: EffectId,
        param: u16,
        value: f32,
    ) -> Result<(), EngineError> {
        let target = self.mixer.insert_or_err(insert)?;
        let slot = target.slot;
        let entry = target.chain.get_mut(effect).ok_or(EngineError::UnknownEffect { insert })?;
        entry.descriptor.set_param(param, value);
        if !entry.passthrough {
            self.link.commands.send(RenderCommand::SetEffectParam { slot, effect, param, value })?;
        }
        Ok(())
    }

    // --- Instruments and routing ---

    /// Create an instrument and start connecting it to its target insert,
    /// creating the insert first if needed. An instrument without a target
    /// gets a new insert of its own. Returns the target insert.
    pub fn add_instrument(
        &mut self,
        id: InstrumentId,
        descriptor: InstrumentDescriptor,
    ) -> Result<InsertId, EngineError> {
        if self.instruments.contains_key(&id) {
            return Err(EngineError::InstrumentExists(id));
        }
        let max = self.link.settings.max_instruments;
        let slot = (0..max)
            .find(|s| !self.instruments.values().any(|e| e.slot == *s))
            .ok_or(EngineError::Capacity { what: "instruments", max })?;

        self.registry.create_instrument(id, &descriptor, self.elapsed)?;
        let target = match descriptor.target_insert {
            Some(target) if self.mixer.contains(target) => Ok(target),
            Some(target) => self.create_insert_with_id(target).map(|_| target),
            None => self.create_insert(),
        };
        let target = match target {
            Ok(target) => target,
            Err(err) => {
                self.registry.release(id);
                return Err(err);
            }
        };
        self.instruments.insert(id, InstrumentEntry { descriptor, slot, installed: false });
        self.supervisor.request(id, target, self.elapsed);
        self.poll_connections();
        Ok(target)
    }

    /// Delete an instrument: unwire it, drop any pending connection and
    /// retire its output from the render path. Its insert stays. Pattern
    /// notes that name it are left alone.
    pub fn remove_instrument(&mut self, id: InstrumentId) -> Result<(), EngineError> {
        let entry = self.instruments.get(&id).ok_or(EngineError::UnknownInstrument(id))?;
        if entry.installed {
            self.link.commands.send(RenderCommand::RemoveInstrument { slot: entry.slot })?;
        }
        let mut routes = self.current_routes();
        let mut staged = StagedRoutes {
            routes: &mut routes,
            instruments: &self.instruments,
            mixer: &self.mixer,
        };
        let unrouted = self.routing.disconnect(id, &mut staged);
        self.supervisor.forget(id);
        self.registry.release(id);
        self.instruments.remove(&id);
        match unrouted {
            Some(insert) => info!("removed {id}, unrouted from {insert}"),
            None => info!("removed {id}"),
        }
        if unrouted.is_some() {
            self.publish(routes)?;
        }
        Ok(())
    }

    pub fn instrument_descriptor(&self, id: InstrumentId) -> Option<&InstrumentDescriptor> {
        self.instruments.get(&id).map(|e| &e.descriptor)
    }

    /// The insert `instrument` is currently wired into.
    pub fn route_of(&self, instrument: InstrumentId) -> Option<InsertId> {
        self.routing.edge(instrument)
    }

    pub fn routes(&self) -> impl Iterator<Item = (InstrumentId, InsertId)> + '_ {
        self.routing.edges()
    }

    pub fn connection_status(&self, instrument: InstrumentId) -> Option<&ConnectionStatus> {
        self.supervisor.status(instrument)
    }

    /// Route an instrument into an insert. Reapplying the current route is
    /// a no-op. A connection still waiting for its output is retargeted; a
    /// failed one is retried from scratch.
    pub fn route_instrument(
        &mut self,
        instrument: InstrumentId,
        insert: InsertId,
    ) -> Result<RouteChange, EngineError> {
        if !self.instruments.contains_key(&instrument) {
            return Err(EngineError::UnknownInstrument(instrument));
        }
        if !self.mixer.contains(insert) {
            return Err(EngineError::UnknownInsert(insert));
        }
        match self.supervisor.status(instrument).cloned() {
            Some(ConnectionStatus::Established { .. }) => match self.wire(instrument, insert) {
                Ok(change) => {
                    self.supervisor.retarget(instrument, insert);
                    Ok(change)
                }
                Err(err) => {
                    let now = self.elapsed;
                    self.supervisor.request(instrument, insert, now);
                    self.supervisor.record(instrument, Attempt::Failed(err.clone()), now);
                    Err(err.into())
                }
            },
            Some(ConnectionStatus::Pending { insert: pending, .. }) if pending == insert => {
                Ok(RouteChange::Unchanged)
            }
            Some(ConnectionStatus::Pending { .. }) => {
                self.supervisor.retarget(instrument, insert);
                Ok(RouteChange::Rerouted { from: None })
            }
            Some(ConnectionStatus::Failed(_)) | None => {
                self.supervisor.request(instrument, insert, self.elapsed);
                self.poll_connections();
                match self.supervisor.status(instrument) {
                    Some(ConnectionStatus::Failed(err)) => Err(err.clone().into()),
                    _ => Ok(RouteChange::Rerouted { from: None }),
                }
            }
        }
    }

    fn poll_connections(&mut self) -> (usize, usize) {
        let now = self.elapsed;
        let mut established = 0;
        let mut failed = 0;
        for (instrument, insert) in self.supervisor.due(now) {
            let outcome = self.attempt_connection(instrument, insert, now);
            match self.supervisor.record(instrument, outcome, now) {
                Some(ConnectionStatus::Established { .. }) => established += 1,
                Some(ConnectionStatus::Failed(_)) => failed += 1,
                _ => {}
            }
        }
        (established, failed)
    }

    fn attempt_connection(
        &mut self,
        instrument: InstrumentId,
        insert: InsertId,
        now: Duration,
    ) -> Attempt {
        let Some(entry) = self.instruments.get(&instrument) else {
            let reason = "instrument was removed".to_string();
            return Attempt::Failed(ConnectionError::LinkFailed { instrument, reason });
        };
        if !entry.installed {
            let slot = entry.slot;
            match self.registry.state(instrument, now) {
                ResourceState::Uninitialized => return Attempt::NotReady,
                ResourceState::Failed => {
                    return Attempt::Failed(ConnectionError::ResourceFailed(instrument))
                }
                ResourceState::Ready => {}
            }
            let Some(output) = self.registry.take_output(instrument, now) else {
                return Attempt::NotReady;
            };
            let unit = Box::new(InstrumentUnit::new(instrument, output, &self.link.settings));
            let install = RenderCommand::InstallInstrument { slot, unit };
            if let Err(err) = self.link.commands.send(install) {
                let reason = err.to_string();
                return Attempt::Failed(ConnectionError::LinkFailed { instrument, reason });
            }
            if let Some(entry) = self.instruments.get_mut(&instrument) {
                entry.installed = true;
            }
        }
        match self.wire(instrument, insert) {
            Ok(_) => Attempt::Established,
            Err(err) => Attempt::Failed(err),
        }
    }

    /// Wire `instrument` into `insert` and publish the result. A failed link
    /// still publishes the unwiring of the old edge.
    fn wire(
        &mut self,
        instrument: InstrumentId,
        insert: InsertId,
    ) -> Result<RouteChange, ConnectionError> {
        let mut routes = self.current_routes();
        let mut staged = StagedRoutes {
            routes: &mut routes,
            instruments: &self.instruments,
            mixer: &self.mixer,
        };
        let result = self.routing.route(instrument, insert, &mut staged);
        if result != Ok(RouteChange::Unchanged) {
            self.publish(routes).map_err(|err| ConnectionError::LinkFailed {
                instrument,
                reason: err.to_string(),
            })?;
        }
        result.map_err(|reason| {
            warn!("linking {instrument} to {insert} failed: {reason}");
            ConnectionError::LinkFailed { instrument, reason }
        })
    }

    // --- Meters, analysis and sleep ---

    /// Block peaks (left, right) since the last read. Sleeping inserts
    /// read as silent.
    pub fn insert_levels(&self, id: InsertId) -> Result<(f32, f32), EngineError> {
        let slot = self.mixer.slot_of(id).ok_or(EngineError::UnknownInsert(id))?;
        if self.link.meters.is_sleeping(slot) {
            return Ok((0.0, 0.0));
        }
        Ok(self.link.meters.take_peak(slot))
    }

    /// Magnitude spectrum of the insert's output. The analyser is created
    /// on first read, so the first call returns an all-zero spectrum. A
    /// sleeping insert reads as all zeros, like its levels.
    pub fn insert_spectrum(&mut self, id: InsertId) -> Result<&[f32], EngineError> {
        let sleeping = self.is_sleeping(id)?;
        let fft_size = self.config.fft_size;
        let insert = self.mixer.insert_or_err(id)?;
        if insert.analyser.is_none() {
            let (analyser, tap) = SpectrumAnalyser::new(fft_size);
            let slot = insert.slot;
            self.link.commands.send(RenderCommand::AttachTap { slot, tap })?;
            debug!("attached spectrum analyser to {id}");
            insert.analyser = Some(analyser);
        }
        match insert.analyser.as_mut() {
            Some(analyser) => {
                if sleeping {
                    analyser.clear();
                } else {
                    analyser.update();
                }
                Ok(analyser.magnitudes())
            }
            None => Ok(&[]),
        }
    }

    pub fn is_sleeping(&self, id: InsertId) -> Result<bool, EngineError> {
        let slot = self.mixer.slot_of(id).ok_or(EngineError::UnknownInsert(id))?;
        Ok(self.link.meters.is_sleeping(slot))
    }

    pub fn sleep_insert(&mut self, id: InsertId) -> Result<(), EngineError> {
        let slot = self.mixer.slot_of(id).ok_or(EngineError::UnknownInsert(id))?;
        self.link.meters.sleep(slot);
        Ok(())
    }

    pub fn wake_insert(&mut self, id: InsertId) -> Result<(), EngineError> {
        let slot = self.mixer.slot_of(id).ok_or(EngineError::UnknownInsert(id))?;
        self.link.meters.wake(slot, self.render_now());
        Ok(())
    }

    // --- Control tick ---

    /// One control tick at control time `elapsed`: reclaim render garbage,
    /// log render diagnostics, retry connections, schedule the look-ahead
    /// window, put idle inserts to sleep and refresh analysers.
    pub fn tick_at(&mut self, elapsed: Duration) -> TickSummary {
        self.elapsed = self.elapsed.max(elapsed);
        let mut summary = TickSummary {
            garbage: self.link.garbage.collect(),
            diagnostics: self.link.diagnostics.drain(|d| warn!("render: {d}")),
            ..TickSummary::default()
        };

        (summary.established, summary.failed) = self.poll_connections();

        let now = self.render_now();
        match self.scheduler.tick(now, &self.patterns, &mut self.link.commands) {
            Ok(report) => summary.schedule = Some(report),
            Err(err) => {
                warn!("scheduling tick skipped: {err}");
                summary.schedule_error = Some(err);
            }
        }

        let idle = self.link.settings.timebase().ms_to_samples(self.config.idle_timeout_ms as f64);
        let meters = &self.link.meters;
        for insert in self.mixer.iter_mut() {
            if meters.is_sleeping(insert.slot) {
                continue;
            }
            if now.saturating_sub(meters.last_signal(insert.slot)) >= idle {
                meters.sleep(insert.slot);
                debug!("{} idle, sleeping", insert.id);
                summary.slept += 1;
                continue;
            }
            if let Some(analyser) = insert.analyser.as_mut() {
                if analyser.update() {
                    summary.analysed += 1;
                }
            }
        }
        summary
    }

    // --- Project state ---

    /// Persistable state: transport settings, mixer and routing.
    pub fn project(&self) -> ProjectState {
        let t = self.transport.state();
        ProjectState {
            transport: TransportSettings {
                bpm: t.bpm,
                loop_start: t.loop_range.start,
                loop_end: t.loop_range.end,
                loop_enabled: t.loop_enabled,
            },
            mixer: MixerState {
                inserts: self
                    .mixer
                    .iter()
                    .map(|i| InsertState {
                        id: i.id,
                        gain_db: i.gain_db,
                        pan: i.pan,
                        bypassed: i.bypassed,
                        muted: i.muted,
                        solo: i.solo,
                        effects: i.chain.descriptors().cloned().collect(),
                        sends: i
                            .sends
                            .iter()
                            .map(|s| SendState { dest: s.dest, level: s.level })
                            .collect(),
                    })
                    .collect(),
                master_gain: self.mixer.master_gain,
            },
            routing: self
                .routing
                .edges()
                .map(|(instrument, insert)| RouteState { instrument, insert })
                .collect(),
        }
    }

    /// Bring transport settings, inserts and routes in line with `project`.
    /// Missing inserts are created; effect chains are replaced. Inserts the
    /// project does not mention are left alone, and routes for instruments
    /// that do not exist are skipped.
    pub fn apply_project(&mut self, project: &ProjectState) -> Result<(), EngineError> {
        let t = &project.transport;
        self.set_bpm(t.bpm)?;
        self.set_loop(t.loop_start, t.loop_end, t.loop_enabled)?;
        self.set_master_gain(project.mixer.master_gain)?;

        for state in &project.mixer.inserts {
            if !self.mixer.contains(state.id) {
                self.create_insert_with_id(state.id)?;
            }
        }
        for state in &project.mixer.inserts {
            let id = state.id;
            self.set_insert_param(id, InsertParam::GainDb(state.gain_db))?;
            self.set_insert_param(id, InsertParam::Pan(state.pan))?;
            self.set_insert_param(id, InsertParam::Mute(state.muted))?;
            self.set_insert_param(id, InsertParam::Solo(state.solo))?;
            self.set_bypass(id, state.bypassed)?;

            let existing: Vec<EffectId> =
                self.mixer.get(id).map(|i| i.chain.order().to_vec()).unwrap_or_default();
            for effect in existing {
                self.remove_effect(id, effect)?;
            }
            for (index, descriptor) in state.effects.iter().enumerate() {
                self.insert_effect(id, descriptor.clone(), index)?;
            }
            // Old sends go before new ones are added, or the mix of both
            // could form a cycle.
            if let Some(insert) = self.mixer.get_mut(id) {
                insert.sends.clear();
            }
        }
        self.commit()?;
        for state in &project.mixer.inserts {
            for send in &state.sends {
                self.set_send(state.id, send.dest, send.level)?;
            }
        }

        for route in &project.routing {
            if !self.instruments.contains_key(&route.instrument) {
                warn!("project routes unknown {}, skipped", route.instrument);
                continue;
            }
            self.route_instrument(route.instrument, route.insert)?;
        }
        Ok(())
    }

    // --- Topology ---

    /// Instrument routes as the routing graph records them.
    fn current_routes(&self) -> Vec<Option<usize>> {
        let mut routes = vec![None; self.link.settings.max_instruments];
        for (instrument, insert) in self.routing.edges() {
            if let (Some(entry), Some(slot)) =
                (self.instruments.get(&instrument), self.mixer.slot_of(insert))
            {
                if let Some(route) = routes.get_mut(entry.slot) {
                    *route = Some(slot);
                }
            }
        }
        routes
    }

    /// Publish the current mixer and routing as the next topology revision.
    fn commit(&mut self) -> Result<(), EngineError> {
        let routes = self.current_routes();
        self.publish(routes)
    }

    /// Nothing is published if sends form a cycle.
    fn publish(&mut self, routes: Vec<Option<usize>>) -> Result<(), EngineError> {
        let topology = self.mixer.topology(routes, self.revision + 1)?;
        self.revision += 1;
        self.link.publish(topology);
        Ok(())
    }

    /// Topology revisions published so far.
    pub fn topology_revision(&self) -> u64 {
        self.revision
    }
}

fn event_name(event: &TransportEvent) -> &'static str {
    match event {
        TransportEvent::Started(_) => "started",
        TransportEvent::Paused(_) => "paused",
        TransportEvent::Resumed(_) => "resumed",
        TransportEvent::Stopped(_) => "stopped",
        TransportEvent::Jumped(_) => "jumped",
        TransportEvent::TempoChanged(_) => "tempo changed",
        TransportEvent::LoopChanged(_) => "loop changed",
    }
}
