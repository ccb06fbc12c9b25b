//! Render and scheduling throughput.
//!
//! Run with: cargo bench -p dg-engine

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use dg_engine::machines::{create_effect, create_instrument};
use dg_engine::{
    CommandSender, Engine, EngineLink, EngineSettings, EventScheduler, InsertStrip, InsertView,
    InstrumentUnit, PatternStore, RenderCommand, Reschedule, SchedulerConfig, Timeline,
    TimelineUpdate,
};
use dg_ir::{AudioBuffer, EffectId, InsertId, InstrumentId, NoteEvent, NoteKey, Pattern};
use slotmap::SlotMap;

fn demo_pattern() -> Pattern {
    let notes = (0..64u32)
        .map(|i| NoteEvent {
            key: NoteKey(i),
            step: i as f64,
            length: 0.5,
            note: 48 + (i % 12) as u8,
            velocity: 100,
            instrument: InstrumentId(0),
        })
        .collect();
    Pattern::from_parts(notes, vec![])
}

/// An engine with one sine instrument routed through a two-effect insert.
fn wired_engine() -> (Engine, EngineLink) {
    let settings = EngineSettings::default();
    let (engine, mut link) = Engine::new(settings);

    let mut keys: SlotMap<EffectId, ()> = SlotMap::with_key();
    let mut view = InsertView::new(InsertId(0));
    let mut strip =
        Box::new(InsertStrip::new(InsertId(0), settings.block_size, settings.sample_rate, 480));
    for kind in ["lowpass", "gain"] {
        let id = keys.insert(());
        if let Some(unit) = create_effect(kind) {
            let _ = strip.install(id, unit);
        }
        view.chain.push(id);
    }

    let mut topology = (*link.committed()).clone();
    topology.revision += 1;
    topology.inserts[0] = Some(view);
    topology.routes[0] = Some(0);
    let _ = topology.finalize();
    link.publish(topology);

    if let Some(sine) = create_instrument("sine") {
        let unit = Box::new(InstrumentUnit::new(InstrumentId(0), sine, &settings));
        let _ = link.commands.send(RenderCommand::InstallInstrument { slot: 0, unit });
    }
    let _ = link.commands.send(RenderCommand::InstallInsert { slot: 0, strip });
    (engine, link)
}

fn start(scheduler: &mut EventScheduler, commands: &mut CommandSender, bpm: f64) {
    let timeline = Timeline::new(0, 0.0, bpm, None, true);
    let update = TimelineUpdate { at_sample: 0, timeline, release_notes: false, flush: false };
    let _ = scheduler.retime(Reschedule::Restart, update, commands);
}

fn bench_process_block(c: &mut Criterion) {
    let (mut engine, mut link) = wired_engine();
    let store = PatternStore::new(demo_pattern());
    let mut scheduler = EventScheduler::new(
        link.settings.timebase(),
        SchedulerConfig::default(),
        Arc::clone(&link.cancel),
    );
    start(&mut scheduler, &mut link.commands, 140.0);
    let mut out = AudioBuffer::stereo(link.settings.block_size);

    c.bench_function("process_block_256", |b| {
        b.iter(|| {
            let _ = scheduler.tick(engine.sample_time(), &store, &mut link.commands);
            engine.process_block(&mut out);
            link.garbage.collect();
            black_box(engine.master_peak())
        })
    });
}

fn bench_scheduler_tick(c: &mut Criterion) {
    let settings = EngineSettings::default();
    let store = PatternStore::new(demo_pattern());

    c.bench_function("scheduler_window", |b| {
        b.iter_batched(
            || {
                let (engine, mut link) = Engine::new(settings);
                let mut scheduler = EventScheduler::new(
                    settings.timebase(),
                    SchedulerConfig::default(),
                    Arc::clone(&link.cancel),
                );
                start(&mut scheduler, &mut link.commands, 140.0);
                (scheduler, engine, link)
            },
            |(mut scheduler, _engine, mut link)| {
                black_box(scheduler.tick(0, &store, &mut link.commands).ok())
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_process_block, bench_scheduler_tick);
criterion_main!(benches);
