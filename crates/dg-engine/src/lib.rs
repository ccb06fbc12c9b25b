//! Real-time core for dawg.
//!
//! The render side (`Engine`) turns dated events and a committed mixer
//! topology into audio without locking or allocating. The control side
//! (`EventScheduler`, `TransportStateMachine`, `PatternStore`) decides what
//! gets rendered and when, and talks to the engine only through the rings
//! and shared snapshots in `EngineLink`.

mod cancel;
mod clock;
mod command;
mod diagnostics;
mod error;
mod event_queue;
mod graph_state;
mod link;
mod machine;
pub mod machines;
mod meter;
mod mixer;
mod pattern_store;
mod position;
mod ramp;
pub mod scheduler;
mod strip;
mod timeline;
pub mod transport;

pub use cancel::CancelBoard;
pub use clock::{validate_bpm, validate_loop, validate_step, TimeBase, MAX_BPM, MIN_LOOP_STEPS};
pub use command::{CommandSender, Garbage, GarbageCollector, RenderCommand, TimelineUpdate};
pub use diagnostics::{diagnostics_ring, Diagnostic, DiagnosticsDrain, DiagnosticsSink};
pub use error::{ClockError, QueueError, ScheduleError};
pub use event_queue::{EventQueue, QUEUE_CAPACITY};
pub use graph_state::{
    topological_sort, CycleError, InsertView, MixerTopology, SendView, MAX_CHAIN, MAX_SENDS,
};
pub use link::{EngineLink, EngineSettings};
pub use machine::{EffectProcessor, InstrumentProcessor, MachineInfo, MachineType, ParamInfo};
pub use meter::MeterBank;
pub use mixer::{Engine, InstrumentUnit};
pub use pattern_store::PatternStore;
pub use position::{position_channel, PositionReader, PositionWriter};
pub use ramp::ParamRamp;
pub use scheduler::{EventScheduler, SchedulerConfig, TickReport};
pub use strip::InsertStrip;
pub use timeline::{Pass, Timeline};
pub use transport::{Reschedule, Transition, TransportStateMachine};
