//! Error types returned by session operations.

use dg_engine::{ClockError, CycleError, QueueError, ScheduleError};
use dg_ir::{InsertId, InstrumentId};
use thiserror::Error;

/// Umbrella error for everything a `Session` operation can reject.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Clock(#[from] ClockError),
    #[error("unknown {0}")]
    UnknownInsert(InsertId),
    #[error("unknown {0}")]
    UnknownInstrument(InstrumentId),
    #[error("unknown effect on {insert}")]
    UnknownEffect { insert: InsertId },
    #[error("{0} already exists")]
    InsertExists(InsertId),
    #[error("instrument {0} already exists")]
    InstrumentExists(InstrumentId),
    #[error("{insert} is still the target of {instrument}")]
    InsertInUse { insert: InsertId, instrument: InstrumentId },
    #[error("sends would form a feedback cycle through {unsorted} inserts")]
    RoutingCycle { unsorted: usize },
    #[error(transparent)]
    Queue(#[from] QueueError),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("invalid {name}: {value}")]
    InvalidParam { name: &'static str, value: f32 },
    #[error("too many {what} (max {max})")]
    Capacity { what: &'static str, max: usize },
}

impl From<CycleError> for EngineError {
    fn from(err: CycleError) -> Self {
        EngineError::RoutingCycle { unsorted: err.unsorted }
    }
}

/// Why an instrument could not be connected to its insert.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConnectionError {
    #[error("output of {instrument} not ready after {attempts} attempts")]
    ResourceNotReady { instrument: InstrumentId, attempts: u32 },
    #[error("output of {0} failed to initialize")]
    ResourceFailed(InstrumentId),
    #[error("linking {instrument} failed: {reason}")]
    LinkFailed { instrument: InstrumentId, reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("no instrument type named {0:?}")]
    UnknownKind(String),
    #[error("{0} is already registered")]
    Duplicate(InstrumentId),
}

/// Effect instantiation failed. The insert stays passed through.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EffectError {
    #[error("no effect type named {0:?}")]
    UnknownKind(String),
    #[error("effect {kind:?} failed to initialize: {reason}")]
    Failed { kind: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project io: {0}")]
    Io(#[from] std::io::Error),
    #[error("project json: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Audio(#[from] dg_audio::AudioError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("control thread: {0}")]
    Thread(#[from] std::io::Error),
}
