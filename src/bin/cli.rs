//! dawg CLI: play a demo pattern on the default device, or render it to WAV.
//!
//! Usage:
//!   cargo run --bin dg-cli
//!   cargo run --bin dg-cli -- --bpm 140 --seconds 8
//!   cargo run --bin dg-cli -- --wav output.wav

use std::error::Error;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use dg_master::offline::{write_wav_file, OfflineRenderer};
use dg_master::runtime::Runtime;
use dg_master::{
    BuiltinEffects, BuiltinRegistry, EffectDescriptor, EngineConfig, InsertParam,
    InstrumentDescriptor, InstrumentId, NoteEvent, NoteKey, PatternEdit, Session,
};

#[derive(Parser)]
#[command(name = "dg-cli", version, about = "Headless dawg transport and mixer")]
struct Cli {
    /// Engine config (TOML); defaults apply to anything left out
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Tempo in beats per minute
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,

    /// How long to play or render
    #[arg(long, default_value_t = 4.0)]
    seconds: f64,

    /// Loop the 16-step demo pattern
    #[arg(long = "loop")]
    looped: bool,

    /// Render offline to this WAV file instead of playing
    #[arg(long)]
    wav: Option<PathBuf>,
}

const LEAD: InstrumentId = InstrumentId(0);
const BASS: InstrumentId = InstrumentId(1);

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    config.initial_bpm = cli.bpm;

    match &cli.wav {
        Some(path) => render_to_wav(config, cli, path),
        None => play_audio(config, cli),
    }
}

/// Two sine instruments, one through a lowpass, with a send to a shared bus.
fn build_demo(session: &mut Session, looped: bool) -> Result<(), Box<dyn Error>> {
    let lead = session.add_instrument(LEAD, InstrumentDescriptor::new("sine"))?;
    let bass = session.add_instrument(BASS, InstrumentDescriptor::new("sine"))?;
    let bus = session.create_insert()?;

    session.insert_effect(bass, EffectDescriptor::new("lowpass").with_param(0, 800.0), 0)?;
    session.insert_effect(bus, EffectDescriptor::new("gain").with_param(0, 0.5), 0)?;
    session.set_insert_param(lead, InsertParam::Pan(-0.3))?;
    session.set_insert_param(lead, InsertParam::Send { dest: bus, level: 0.4 })?;

    session.edit_pattern(&demo_pattern());
    if looped {
        session.set_loop(0.0, 16.0, true)?;
    }
    Ok(())
}

fn demo_pattern() -> Vec<PatternEdit> {
    let arp = [60u8, 64, 67, 72];
    let lead = (0..16u32).map(|i| NoteEvent {
        key: NoteKey(i),
        step: i as f64,
        length: 0.5,
        note: arp[i as usize % arp.len()],
        velocity: 100,
        instrument: LEAD,
    });
    let bass = (0..4u32).map(|i| NoteEvent {
        key: NoteKey(100 + i),
        step: i as f64 * 4.0,
        length: 3.0,
        note: 36,
        velocity: 120,
        instrument: BASS,
    });
    lead.chain(bass).map(PatternEdit::AddNote).collect()
}

fn play_audio(config: EngineConfig, cli: &Cli) -> Result<(), Box<dyn Error>> {
    let mut runtime =
        Runtime::start(config, Box::new(BuiltinRegistry::new()), Box::new(BuiltinEffects))?;
    println!("Output at {} Hz", runtime.sample_rate());
    {
        let mut session = runtime.lock().ok_or("session lock poisoned")?;
        build_demo(&mut session, cli.looped)?;
        session.play()?;
    }
    println!("Playing...");

    let started = Instant::now();
    let length = Duration::from_secs_f64(cli.seconds.max(0.0));
    while started.elapsed() < length {
        if let Some(session) = runtime.lock() {
            let pos = session.position_snapshot();
            print!(
                "\rStep: {:7.2} | {} | {:>9} samples",
                pos.step, pos.bar_beat_tick, pos.sample_time
            );
            let _ = std::io::stdout().flush();
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    if let Some(mut session) = runtime.lock() {
        session.stop()?;
    }
    runtime.stop();
    println!("\rDone.{:40}", "");
    Ok(())
}

fn render_to_wav(config: EngineConfig, cli: &Cli, path: &Path) -> Result<(), Box<dyn Error>> {
    let (session, engine) = Session::with_builtins(config)?;
    let mut renderer = OfflineRenderer::new(session, engine);
    build_demo(renderer.session_mut(), cli.looped)?;
    renderer.session_mut().play()?;

    let sample_rate = renderer.sample_rate();
    println!("Rendering {:.1}s to {} at {} Hz...", cli.seconds, path.display(), sample_rate);
    let samples = renderer.render_seconds(cli.seconds);
    write_wav_file(path, &samples, sample_rate)?;

    let pos = renderer.session().position_snapshot();
    println!("Rendered {} frames, ended at {}", samples.len() / 2, pos.bar_beat_tick);
    Ok(())
}
