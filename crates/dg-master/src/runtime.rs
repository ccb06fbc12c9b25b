//! Realtime runtime: the engine on the audio device, the session on a
//! control thread ticking at the configured interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Instant;

use dg_audio::{AudioOutput, CpalOutput};
use log::{info, warn};

use crate::config::EngineConfig;
use crate::error::RuntimeError;
use crate::registry::{EffectRegistry, InstrumentRegistry};
use crate::session::Session;

pub struct Runtime {
    session: Arc<Mutex<Session>>,
    output: CpalOutput,
    stop_signal: Arc<AtomicBool>,
    control: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Open the default device, build the session for its sample rate and
    /// start both threads.
    pub fn start(
        mut config: EngineConfig,
        registry: Box<dyn InstrumentRegistry>,
        effects: Box<dyn EffectRegistry>,
    ) -> Result<Self, RuntimeError> {
        let mut output = CpalOutput::open()?;
        config.sample_rate = output.sample_rate();
        let tick = config.tick_interval();
        let (session, engine) = Session::new(config, registry, effects)?;
        output.run(engine)?;

        let session = Arc::new(Mutex::new(session));
        let stop_signal = Arc::new(AtomicBool::new(false));
        let control = {
            let session = Arc::clone(&session);
            let stop = Arc::clone(&stop_signal);
            std::thread::Builder::new().name("dg-control".into()).spawn(move || {
                let started = Instant::now();
                while !stop.load(Ordering::Relaxed) {
                    match session.lock() {
                        Ok(mut s) => {
                            s.tick_at(started.elapsed());
                        }
                        Err(_) => {
                            warn!("session lock poisoned, control thread exiting");
                            break;
                        }
                    }
                    std::thread::sleep(tick);
                }
            })?
        };
        info!("runtime started, control tick every {} ms", tick.as_millis());
        Ok(Self { session, output, stop_signal, control: Some(control) })
    }

    pub fn session(&self) -> Arc<Mutex<Session>> {
        Arc::clone(&self.session)
    }

    /// Lock the session for a batch of operations. `None` if a panic
    /// poisoned it.
    pub fn lock(&self) -> Option<MutexGuard<'_, Session>> {
        self.session.lock().ok()
    }

    pub fn sample_rate(&self) -> u32 {
        self.output.sample_rate()
    }

    /// Stop the control thread and silence the device.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Relaxed);
        if let Some(handle) = self.control.take() {
            let _ = handle.join();
        }
        if let Err(err) = self.output.stop() {
            warn!("stopping audio output: {err}");
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}
