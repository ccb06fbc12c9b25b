//! Headless control context for dawg.
//!
//! `Session` is the one object application code talks to: transport,
//! patterns, mixer inserts and effect chains, instrument routing with
//! connection supervision, meters and spectra, project state. It drives an
//! `Engine` that runs either on the audio device (`runtime`) or offline in
//! lockstep (`offline`).

mod analyser;
mod chain;
mod config;
mod error;
mod insert;
mod mixer;
pub mod offline;
mod project;
mod registry;
mod routing;
pub mod runtime;
mod session;
mod subscribers;
mod supervisor;

pub use analyser::SpectrumAnalyser;
pub use chain::{EffectChain, EffectSlot};
pub use config::{EngineConfig, LookaheadConfig, RetryConfig};
pub use error::{
    ConfigError, ConnectionError, EffectError, EngineError, ExportError, ProjectError,
    RegistryError, RuntimeError,
};
pub use insert::{db_to_gain, MixerInsert, SendLevel, MAX_GAIN_DB, MIN_GAIN_DB};
pub use mixer::Mixer;
pub use project::{InsertState, MixerState, ProjectState, RouteState, SendState, TransportSettings};
pub use registry::{
    BuiltinEffects, BuiltinRegistry, EffectRegistry, InstrumentRegistry, ResourceState,
};
pub use routing::{AudioLink, RouteChange, RoutingGraph};
pub use session::{EffectInsertion, InsertParam, Session, TickSummary};
pub use subscribers::{SubscriptionId, Subscribers, TransportCallback};
pub use supervisor::{Attempt, ConnectionStatus, ConnectionSupervisor, RetryPolicy};

// Re-export common types so callers don't need dg-ir/dg-engine directly.
pub use dg_engine::{Engine, EngineSettings, PatternStore, TimeBase};
pub use dg_ir::{
    EffectDescriptor, EffectId, InsertId, InstrumentDescriptor, InstrumentId, NoteEvent, NoteKey,
    Pattern, PatternEdit, PlayState, PositionSnapshot, TransportEvent, TransportNotice,
};
