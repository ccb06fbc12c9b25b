//! The render engine.
//!
//! `Engine` lives on the audio thread. Once per block it drains control
//! commands, applies due timeline changes, picks up the latest committed
//! topology, renders instruments in segments split at event times, runs the
//! insert strips in send order and sums them into the master bus. It never
//! locks and, after setup, never allocates: every container is sized at
//! construction and everything it lets go of is handed back to the control
//! path through the garbage ring.

use std::sync::Arc;

use arc_swap::{ArcSwap, Guard};
use arrayvec::ArrayVec;
use dg_ir::{AudioBuffer, EventKind, EventPayload, InstrumentId, ScheduledEvent};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::cancel::CancelBoard;
use crate::clock::TimeBase;
use crate::command::{CommandSender, Garbage, GarbageCollector, RenderCommand, TimelineUpdate};
use crate::diagnostics::{diagnostics_ring, Diagnostic, DiagnosticsSink};
use crate::event_queue::EventQueue;
use crate::graph_state::MixerTopology;
use crate::link::{EngineLink, EngineSettings};
use crate::machine::InstrumentProcessor;
use crate::meter::MeterBank;
use crate::position::{position_channel, PositionWriter};
use crate::strip::{InsertStrip, StripContext};
use crate::timeline::Timeline;

/// Timeline changes held at once; older ones are superseded anyway.
const MAX_PENDING_TIMELINES: usize = 8;

/// An installed instrument and its private output bus.
pub struct InstrumentUnit {
    id: InstrumentId,
    processor: Box<dyn InstrumentProcessor>,
    buffer: AudioBuffer,
}

impl InstrumentUnit {
    pub fn new(
        id: InstrumentId,
        mut processor: Box<dyn InstrumentProcessor>,
        settings: &EngineSettings,
    ) -> Self {
        processor.init(settings.sample_rate);
        Self { id, processor, buffer: AudioBuffer::stereo(settings.block_size) }
    }

    pub fn id(&self) -> InstrumentId {
        self.id
    }
}

/// The main render engine.
pub struct Engine {
    settings: EngineSettings,
    timebase: TimeBase,
    commands: HeapCons<RenderCommand>,
    garbage: HeapProd<Garbage>,
    diagnostics: DiagnosticsSink,
    position: PositionWriter,
    published: Arc<ArcSwap<MixerTopology>>,
    /// Revision in use; kept alive here so dropping it never frees memory
    /// on the render path.
    topology: Arc<MixerTopology>,
    strips_dirty: bool,
    cancel: Arc<CancelBoard>,
    meters: Arc<MeterBank>,
    queue: EventQueue,
    timeline: Timeline,
    pending: ArrayVec<TimelineUpdate, MAX_PENDING_TIMELINES>,
    instruments: Vec<Option<Box<InstrumentUnit>>>,
    strips: Vec<Option<Box<InsertStrip>>>,
    master: AudioBuffer,
    scratch: AudioBuffer,
    master_peak: f32,
    sample_time: u64,
}

impl Engine {
    /// Build an engine and the control-side handles connected to it.
    pub fn new(settings: EngineSettings) -> (Engine, EngineLink) {
        let block_size = settings.block_size.clamp(1, u16::MAX as usize);
        let settings = EngineSettings { block_size, ..settings };

        let (cmd_tx, cmd_rx) = HeapRb::<RenderCommand>::new(settings.command_capacity.max(1)).split();
        // Room for every object the engine can hold at once.
        let garbage_capacity = settings.command_capacity.max(1) + settings.max_inserts * 4 + 16;
        let (garbage_tx, garbage_rx) = HeapRb::<Garbage>::new(garbage_capacity).split();
        let (diag_tx, diag_rx) = diagnostics_ring(settings.diagnostics_capacity);
        let (position_tx, position_rx) = position_channel();

        let topology = Arc::new(MixerTopology::empty(settings.max_inserts, settings.max_instruments));
        let published = Arc::new(ArcSwap::new(Arc::clone(&topology)));
        let cancel = Arc::new(CancelBoard::new(settings.cancel_capacity()));
        let meters = Arc::new(MeterBank::new(settings.max_inserts));
        let timebase = settings.timebase();

        let engine = Engine {
            settings,
            timebase,
            commands: cmd_rx,
            garbage: garbage_tx,
            diagnostics: diag_tx,
            position: position_tx,
            published: Arc::clone(&published),
            topology,
            strips_dirty: false,
            cancel: Arc::clone(&cancel),
            meters: Arc::clone(&meters),
            queue: EventQueue::new(),
            timeline: Timeline::stopped(0.0, 120.0, None),
            pending: ArrayVec::new(),
            instruments: (0..settings.max_instruments).map(|_| None).collect(),
            strips: (0..settings.max_inserts).map(|_| None).collect(),
            master: AudioBuffer::stereo(block_size),
            scratch: AudioBuffer::stereo(block_size),
            master_peak: 0.0,
            sample_time: 0,
        };
        let link = EngineLink {
            settings,
            commands: CommandSender::new(cmd_tx),
            garbage: GarbageCollector::new(garbage_rx),
            diagnostics: diag_rx,
            position: position_rx,
            topology: published,
            cancel,
            meters,
        };
        (engine, link)
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Render clock: samples rendered so far.
    pub fn sample_time(&self) -> u64 {
        self.sample_time
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    /// Events waiting in the render queue.
    pub fn pending_events(&self) -> usize {
        self.queue.pending()
    }

    /// Peak of the master bus in the last block.
    pub fn master_peak(&self) -> f32 {
        self.master_peak
    }

    /// Render one block into `output` (stereo, planar). Renders at most
    /// `block_size` frames; the rest of `output` is left untouched.
    pub fn process_block(&mut self, output: &mut AudioBuffer) {
        let frames = (output.frames() as usize).min(self.settings.block_size);
        #[cfg(feature = "alloc_check")]
        assert_no_alloc::assert_no_alloc(|| self.render(frames));
        #[cfg(not(feature = "alloc_check"))]
        self.render(frames);
        output.copy_from(&self.master);
    }

    /// Fill an interleaved device buffer with `channels` samples per frame.
    pub fn render_interleaved(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);
        let block = self.settings.block_size;
        for chunk in out.chunks_mut(block * channels) {
            let frames = chunk.len() / channels;
            self.render(frames);
            self.master.write_interleaved(chunk, channels, frames);
        }
    }

    fn render(&mut self, frames: usize) {
        let frames = frames.min(self.settings.block_size);
        let block_start = self.sample_time;
        let block_end = block_start + frames as u64;

        self.drain_commands();
        self.apply_due_timelines(block_end);
        self.refresh_topology();

        for unit in self.instruments.iter_mut().flatten() {
            unit.buffer.silence();
        }
        for strip in self.strips.iter_mut().flatten() {
            strip.bus_mut().silence();
        }

        let mut cursor = 0usize;
        while let Some(due) = self.queue.next_time() {
            if due >= block_end {
                break;
            }
            let offset = due.saturating_sub(block_start) as usize;
            if offset > cursor {
                self.render_instruments(cursor, offset);
                cursor = offset;
            }
            let range = self.queue.drain_until(due);
            for i in range {
                if let Some(event) = self.queue.get(i).copied() {
                    self.execute(event, block_start, frames);
                }
            }
        }
        self.render_instruments(cursor, frames);
        self.queue.compact();

        self.mix(frames, block_start);

        self.sample_time = block_end;
        let step = self.timeline.step_at_sample(&self.timebase, block_end);
        self.position.publish(step, self.timeline.is_running(), block_end);
    }

    fn drain_commands(&mut self) {
        while let Some(command) = self.commands.try_pop() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::Event(event) => {
                if let Err(event) = self.queue.push(event) {
                    self.diagnostics.record(Diagnostic::QueueOverflow { serial: event.serial });
                }
            }
            RenderCommand::Timeline(update) => {
                if self.pending.is_full() {
                    self.pending.remove(0);
                    self.diagnostics.record(Diagnostic::TimelineBacklog);
                }
                let at = self.pending.partition_point(|p| p.at_sample <= update.at_sample);
                self.pending.insert(at, update);
            }
            RenderCommand::InstallInstrument { slot, unit } => match self.instruments.get_mut(slot) {
                Some(entry) => {
                    if let Some(old) = entry.replace(unit) {
                        self.retire(Garbage::Instrument(old));
                    }
                }
                None => {
                    self.diagnostics.record(Diagnostic::SlotOutOfRange { slot });
                    self.retire(Garbage::Instrument(unit));
                }
            },
            RenderCommand::RemoveInstrument { slot } => {
                if let Some(old) = self.instruments.get_mut(slot).and_then(Option::take) {
                    self.retire(Garbage::Instrument(old));
                }
            }
            RenderCommand::InstallInsert { slot, strip } => match self.strips.get_mut(slot) {
                Some(entry) => {
                    let old = entry.replace(strip);
                    self.meters.reset(slot, self.sample_time);
                    self.strips_dirty = true;
                    if let Some(old) = old {
                        self.retire(Garbage::Strip(old));
                    }
                }
                None => {
                    self.diagnostics.record(Diagnostic::SlotOutOfRange { slot });
                    self.retire(Garbage::Strip(strip));
                }
            },
            RenderCommand::RemoveInsert { slot } => {
                if let Some(old) = self.strips.get_mut(slot).and_then(Option::take) {
                    self.retire(Garbage::Strip(old));
                }
            }
            RenderCommand::InstallEffect { slot, effect, unit } => {
                match self.strips.get_mut(slot).and_then(Option::as_mut) {
                    Some(strip) => {
                        if let Err(unit) = strip.install(effect, unit) {
                            self.retire(Garbage::Effect(unit));
                        }
                    }
                    None => {
                        self.diagnostics.record(Diagnostic::EmptyInsertSlot { slot });
                        self.retire(Garbage::Effect(unit));
                    }
                }
            }
            RenderCommand::RetireEffect { slot, effect } => {
                let unit = self
                    .strips
                    .get_mut(slot)
                    .and_then(Option::as_mut)
                    .and_then(|strip| strip.retire(effect));
                if let Some(unit) = unit {
                    self.retire(Garbage::Effect(unit));
                }
            }
            RenderCommand::SetEffectParam { slot, effect, param, value } => {
                if let Some(strip) = self.strips.get_mut(slot).and_then(Option::as_mut) {
                    strip.set_effect_param(effect, param, value);
                }
            }
            RenderCommand::AttachTap { slot, tap } => {
                match self.strips.get_mut(slot).and_then(Option::as_mut) {
                    Some(strip) => {
                        if let Some(old) = strip.attach_tap(tap) {
                            self.retire(Garbage::Tap(old));
                        }
                    }
                    None => {
                        self.diagnostics.record(Diagnostic::EmptyInsertSlot { slot });
                        self.retire(Garbage::Tap(tap));
                    }
                }
            }
        }
    }

    /// Apply every pending timeline change dated before the end of this
    /// block; the latest one wins, release and flush requests accumulate.
    fn apply_due_timelines(&mut self, block_end: u64) {
        let due = self.pending.partition_point(|p| p.at_sample < block_end);
        if due == 0 {
            return;
        }
        let mut release = false;
        let mut flush = false;
        for update in &self.pending[..due] {
            self.timeline = update.timeline;
            release |= update.release_notes;
            flush |= update.flush;
        }
        self.pending.drain(..due);

        if release || flush {
            for unit in self.instruments.iter_mut().flatten() {
                unit.processor.all_notes_off();
                if flush {
                    unit.processor.reset();
                }
            }
        }
        if flush {
            for strip in self.strips.iter_mut().flatten() {
                strip.reset_effects();
            }
        }
    }

    fn refresh_topology(&mut self) {
        let latest = self.published.load();
        if latest.revision != self.topology.revision {
            let old = core::mem::replace(&mut self.topology, Guard::into_inner(latest));
            self.retire(Garbage::Topology(old));
            self.strips_dirty = true;
        } else {
            drop(latest);
        }
        if self.strips_dirty {
            self.strips_dirty = false;
            for (slot, strip) in self.strips.iter_mut().enumerate() {
                if let (Some(strip), Some(view)) = (strip.as_mut(), self.topology.insert(slot)) {
                    if view.id == strip.id() {
                        strip.sync(view);
                    }
                }
            }
        }
    }

    fn render_instruments(&mut self, start: usize, end: usize) {
        if start >= end {
            return;
        }
        for unit in self.instruments.iter_mut().flatten() {
            unit.processor.render(&mut unit.buffer, start, end);
        }
    }

    fn execute(&mut self, event: ScheduledEvent, block_start: u64, frames: usize) {
        if self.cancel.is_cancelled(event.serial) {
            return;
        }
        let late_by = block_start.saturating_sub(event.target_sample);
        if late_by > frames as u64 {
            self.diagnostics.record(Diagnostic::LateEvent { serial: event.serial, late_by });
        }
        let Some(unit) = self
            .instruments
            .iter_mut()
            .flatten()
            .find(|u| u.id == event.instrument)
        else {
            self.diagnostics.record(Diagnostic::UnknownInstrument { instrument: event.instrument });
            return;
        };
        match (event.kind, event.payload) {
            (EventKind::NoteOn, EventPayload::Note { note, velocity }) => {
                unit.processor.note_on(note, velocity)
            }
            (EventKind::NoteOff, EventPayload::Note { note, .. }) => unit.processor.note_off(note),
            (EventKind::Automation, EventPayload::Automation { param, value }) => {
                unit.processor.set_param(param, value)
            }
            _ => {}
        }
    }

    fn mix(&mut self, frames: usize, block_start: u64) {
        let Self {
            settings,
            topology,
            instruments,
            strips,
            master,
            scratch,
            meters,
            diagnostics,
            ..
        } = self;

        for (slot, unit) in instruments.iter().enumerate() {
            let (Some(unit), Some(dest)) = (unit, topology.route(slot)) else {
                continue;
            };
            if let Some(strip) = strips.get_mut(dest).and_then(Option::as_mut) {
                strip.bus_mut().mix_from(&unit.buffer);
            }
        }

        master.silence();
        for &slot in &topology.order {
            let Some(view) = topology.insert(slot) else {
                continue;
            };
            let Some(strip) = strips.get_mut(slot).and_then(Option::as_mut) else {
                continue;
            };
            if strip.id() != view.id {
                continue;
            }
            let ctx = StripContext {
                slot,
                block_start,
                threshold: settings.silence_threshold,
                meters: &**meters,
            };
            let outcome = strip.process(frames, &ctx);
            if outcome.tap_overrun {
                diagnostics.record(Diagnostic::TapOverrun { insert: view.id });
            }
            if outcome.slept {
                continue;
            }
            if !view.sends.is_empty() {
                scratch.copy_from(strip.bus());
            }
            if topology.reaches_master(slot) {
                master.mix_from(strip.bus());
            }
            for send in &view.sends {
                if let Some(dest) = strips.get_mut(send.dest).and_then(Option::as_mut) {
                    dest.bus_mut().mix_from_scaled(scratch, send.level);
                }
            }
        }

        master.apply_gain(topology.master_gain);
        self.master_peak = self.master.peak(frames);
    }

    fn retire(&mut self, garbage: Garbage) {
        if let Err(garbage) = self.garbage.try_push(garbage) {
            self.diagnostics.record(Diagnostic::GarbageOverflow);
            // Freeing here would touch the allocator on the audio thread.
            core::mem::forget(garbage);
        }
    }
}
