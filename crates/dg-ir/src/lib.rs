//! Shared data types for the dawg transport and mixer core.
//!
//! Everything here is plain data: identifiers, step-based musical time,
//! pattern contents and edits, dated render events, transport state and
//! the audio buffer the render path fills. The control path and the render
//! path both depend on this crate; neither behaviour nor threading lives
//! here.
//!
//! Designed to be `no_std` compatible with the `alloc` crate.

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod audio_buffer;
mod descriptor;
mod edit;
mod event;
mod ids;
mod pattern;
mod position;
mod time;
mod transport;

pub use audio_buffer::{pan_gains, AudioBuffer, BLOCK_SIZE, MAX_CHANNELS, STEREO};
pub use descriptor::{EffectDescriptor, InstrumentDescriptor, ParamValue, TypeName};
pub use edit::PatternEdit;
pub use event::{EventKind, EventPayload, ScheduledEvent};
pub use ids::{AutomationKey, EffectId, InsertId, InstrumentId, NoteKey};
pub use pattern::{AutomationPoint, NoteEvent, Pattern, StepRange};
pub use position::PositionSnapshot;
pub use time::{
    pack_bbt, unpack_bbt, BarBeatTick, LoopRange, BEATS_PER_BAR, STEPS_PER_BAR, STEPS_PER_BEAT,
    TICKS_PER_BEAT, TICKS_PER_STEP,
};
pub use transport::{PlayState, TransportEvent, TransportNotice, TransportState};
