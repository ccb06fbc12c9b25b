//! End-to-end scenarios: session on the control side, engine rendering
//! offline, output checked as the user would hear it.

use std::io::Cursor;

use dg_master::offline::{wav_bytes, OfflineRenderer};
use dg_master::{
    EngineConfig, InsertParam, InstrumentDescriptor, InstrumentId, NoteEvent, NoteKey,
    PatternEdit, ProjectState, Session,
};

/// 120 BPM at 48 kHz.
const STEP: usize = 6000;

fn renderer() -> OfflineRenderer {
    let (session, engine) = Session::with_builtins(EngineConfig::default()).unwrap();
    OfflineRenderer::new(session, engine)
}

fn note(key: u32, step: f64, length: f64, instrument: InstrumentId) -> PatternEdit {
    PatternEdit::AddNote(NoteEvent {
        key: NoteKey(key),
        step,
        length,
        note: 57,
        velocity: 127,
        instrument,
    })
}

/// Peak of the interleaved frames in `[from, to)`.
fn peak(samples: &[f32], from: usize, to: usize) -> f32 {
    samples[from * 2..to * 2].iter().fold(0.0f32, |m, s| m.max(s.abs()))
}

#[test]
fn loop_replays_pattern() {
    let mut r = renderer();
    let s = r.session_mut();
    let id = InstrumentId(0);
    s.add_instrument(id, InstrumentDescriptor::new("sine")).unwrap();
    s.edit_pattern(&[note(1, 0.0, 1.0, id)]);
    s.set_loop(0.0, 4.0, true).unwrap();
    s.play().unwrap();

    let out = r.render_frames(4 * STEP + 2 * STEP);
    assert!(peak(&out, 0, STEP - 500) > 0.1, "first pass silent");
    assert_eq!(peak(&out, 2 * STEP, 4 * STEP - 100), 0.0, "note rang past its end");
    assert!(peak(&out, 4 * STEP + 200, 5 * STEP - 500) > 0.1, "loop did not replay");
}

#[test]
fn pause_holds_position_and_resume_continues() {
    let mut r = renderer();
    r.session_mut().play().unwrap();
    r.render_frames(2 * STEP);
    r.session_mut().pause().unwrap();
    let held = r.session().position_snapshot().step;
    r.render_frames(2 * STEP);
    let after_pause = r.session().position_snapshot();
    assert!(!after_pause.is_playing);
    assert!((after_pause.step - held).abs() < 1e-6);

    r.session_mut().resume().unwrap();
    r.render_frames(STEP);
    let resumed = r.session().position_snapshot().step;
    assert!(resumed > held + 0.9 && resumed < held + 1.1, "{held} -> {resumed}");
}

#[test]
fn tempo_change_speeds_up_position() {
    let mut r = renderer();
    r.session_mut().play().unwrap();
    r.render_frames(STEP);
    r.session_mut().set_bpm(240.0).unwrap();
    r.render_frames(8 * STEP);
    let step = r.session().position_snapshot().step;
    // At 120 BPM this would be about 9 steps; 240 BPM doubles the rate once
    // the already-dispatched window has played out.
    assert!(step > 14.0, "step {step}");
    assert_eq!(r.session().transport_state().bpm, 240.0);
}

#[test]
fn send_feeds_bus_insert() {
    let mut r = renderer();
    let s = r.session_mut();
    let id = InstrumentId(0);
    let source = s.add_instrument(id, InstrumentDescriptor::new("sine")).unwrap();
    let bus = s.create_insert().unwrap();
    s.set_insert_param(source, InsertParam::Send { dest: bus, level: 0.5 }).unwrap();
    s.edit_pattern(&[note(1, 0.0, 4.0, id)]);
    s.play().unwrap();
    r.render_frames(STEP);

    let (source_l, _) = r.session().insert_levels(source).unwrap();
    let (bus_l, bus_r) = r.session().insert_levels(bus).unwrap();
    assert!(source_l > 0.1);
    assert!(bus_l > 0.02 && bus_r > 0.02);
    assert!(bus_l < source_l);
}

#[test]
fn stop_releases_sound_and_rewinds() {
    let mut r = renderer();
    let id = InstrumentId(0);
    r.session_mut().add_instrument(id, InstrumentDescriptor::new("sine")).unwrap();
    r.session_mut().edit_pattern(&[note(1, 0.0, 32.0, id)]);
    r.session_mut().play().unwrap();
    assert!(peak(&r.render_frames(STEP), 0, STEP) > 0.1);

    r.session_mut().stop().unwrap();
    r.render_frames(2048);
    let tail = r.render_frames(STEP);
    assert_eq!(peak(&tail, 0, STEP), 0.0);
    assert!(r.session().position_snapshot().step.abs() < 1e-9);
}

#[test]
fn offline_render_exports_wav() {
    let mut r = renderer();
    let id = InstrumentId(0);
    r.session_mut().add_instrument(id, InstrumentDescriptor::new("sine")).unwrap();
    r.session_mut().edit_pattern(&[note(1, 0.0, 2.0, id)]);
    r.session_mut().play().unwrap();
    let samples = r.render_seconds(0.5);

    let bytes = wav_bytes(&samples, r.sample_rate()).unwrap();
    let mut reader = hound::WavReader::new(Cursor::new(bytes)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, 48_000);
    assert_eq!(spec.bits_per_sample, 16);
    let decoded: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
    assert_eq!(decoded.len(), samples.len());
    assert!(decoded.iter().any(|s| s.unsigned_abs() > 3000));
}

#[test]
fn project_file_restores_mixer() {
    let mut a = renderer();
    let s = a.session_mut();
    let id = InstrumentId(0);
    let insert = s.add_instrument(id, InstrumentDescriptor::new("sine")).unwrap();
    s.set_insert_param(insert, InsertParam::GainDb(-12.0)).unwrap();
    s.set_insert_param(insert, InsertParam::Mute(true)).unwrap();
    s.set_bpm(100.0).unwrap();

    let path = std::env::temp_dir().join(format!("dawg-scenario-{}.json", std::process::id()));
    a.session().project().save(&path).unwrap();
    let project = ProjectState::load(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    let mut b = renderer();
    let s = b.session_mut();
    s.add_instrument(id, InstrumentDescriptor::new("sine")).unwrap();
    s.apply_project(&project).unwrap();
    s.edit_pattern(&[note(1, 0.0, 4.0, id)]);
    s.play().unwrap();
    // Restored mute keeps the insert off the master bus.
    assert_eq!(peak(&b.render_frames(STEP), 0, STEP), 0.0);
    assert_eq!(b.session().project(), a.session().project());
}
