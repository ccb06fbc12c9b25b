//! Engine construction parameters and the control-side handles to a
//! running engine.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::cancel::CancelBoard;
use crate::clock::TimeBase;
use crate::command::{CommandSender, GarbageCollector};
use crate::diagnostics::DiagnosticsDrain;
use crate::event_queue::QUEUE_CAPACITY;
use crate::graph_state::MixerTopology;
use crate::meter::MeterBank;
use crate::position::PositionReader;

/// Fixed parameters of one engine instance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineSettings {
    pub sample_rate: u32,
    /// Frames per render block.
    pub block_size: usize,
    pub max_inserts: usize,
    pub max_instruments: usize,
    /// Slots in the control to render command ring.
    pub command_capacity: usize,
    /// Absolute level below which a bus counts as silent.
    pub silence_threshold: f32,
    /// Length of gain, pan and bypass ramps.
    pub ramp_ms: f64,
    pub diagnostics_capacity: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: dg_ir::BLOCK_SIZE,
            max_inserts: 64,
            max_instruments: 128,
            command_capacity: 2048,
            silence_threshold: 1e-4,
            ramp_ms: 10.0,
            diagnostics_capacity: 256,
        }
    }
}

impl EngineSettings {
    pub fn timebase(&self) -> TimeBase {
        TimeBase::new(self.sample_rate)
    }

    pub fn ramp_samples(&self) -> u32 {
        self.timebase().ms_to_samples(self.ramp_ms).max(1) as u32
    }

    /// Cancel slots needed to cover every event that can be in flight.
    pub fn cancel_capacity(&self) -> usize {
        2 * (QUEUE_CAPACITY + self.command_capacity)
    }
}

/// Control-side handles to an engine.
pub struct EngineLink {
    pub settings: EngineSettings,
    pub commands: CommandSender,
    pub garbage: GarbageCollector,
    pub diagnostics: DiagnosticsDrain,
    pub position: PositionReader,
    pub topology: Arc<ArcSwap<MixerTopology>>,
    pub cancel: Arc<CancelBoard>,
    pub meters: Arc<MeterBank>,
}

impl EngineLink {
    /// The topology revision currently published.
    pub fn committed(&self) -> Arc<MixerTopology> {
        self.topology.load_full()
    }

    /// Publish a finished topology.
    pub fn publish(&self, topology: MixerTopology) {
        self.topology.store(Arc::new(topology));
    }
}
