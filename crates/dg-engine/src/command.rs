//! Commands sent from the control path to the render path, and retired
//! objects sent back.
//!
//! Boxed units travel through the rings already constructed, so the render
//! path never allocates to install them. Whatever the render path removes
//! goes back through the garbage ring and is dropped on the control path.

use std::sync::Arc;

use dg_ir::{EffectId, ScheduledEvent};
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::{HeapCons, HeapProd};

use crate::error::QueueError;
use crate::graph_state::MixerTopology;
use crate::machine::EffectProcessor;
use crate::mixer::InstrumentUnit;
use crate::strip::InsertStrip;
use crate::timeline::Timeline;

/// Replace the render timeline at a sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimelineUpdate {
    pub at_sample: u64,
    pub timeline: Timeline,
    /// Release all sounding notes when applied.
    pub release_notes: bool,
    /// Reset instrument and effect state (tails) when applied.
    pub flush: bool,
}

pub enum RenderCommand {
    Event(ScheduledEvent),
    Timeline(TimelineUpdate),
    InstallInstrument { slot: usize, unit: Box<InstrumentUnit> },
    RemoveInstrument { slot: usize },
    InstallInsert { slot: usize, strip: Box<InsertStrip> },
    RemoveInsert { slot: usize },
    InstallEffect { slot: usize, effect: EffectId, unit: Box<dyn EffectProcessor> },
    RetireEffect { slot: usize, effect: EffectId },
    SetEffectParam { slot: usize, effect: EffectId, param: u16, value: f32 },
    AttachTap { slot: usize, tap: HeapProd<f32> },
}

impl core::fmt::Debug for RenderCommand {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            RenderCommand::Event(e) => f.debug_tuple("Event").field(e).finish(),
            RenderCommand::Timeline(t) => f.debug_tuple("Timeline").field(t).finish(),
            RenderCommand::InstallInstrument { slot, .. } => {
                f.debug_struct("InstallInstrument").field("slot", slot).finish()
            }
            RenderCommand::RemoveInstrument { slot } => {
                f.debug_struct("RemoveInstrument").field("slot", slot).finish()
            }
            RenderCommand::InstallInsert { slot, .. } => {
                f.debug_struct("InstallInsert").field("slot", slot).finish()
            }
            RenderCommand::RemoveInsert { slot } => {
                f.debug_struct("RemoveInsert").field("slot", slot).finish()
            }
            RenderCommand::InstallEffect { slot, effect, .. } => f
                .debug_struct("InstallEffect")
                .field("slot", slot)
                .field("effect", effect)
                .finish(),
            RenderCommand::RetireEffect { slot, effect } => f
                .debug_struct("RetireEffect")
                .field("slot", slot)
                .field("effect", effect)
                .finish(),
            RenderCommand::SetEffectParam { slot, effect, param, value } => f
                .debug_struct("SetEffectParam")
                .field("slot", slot)
                .field("effect", effect)
                .field("param", param)
                .field("value", value)
                .finish(),
            RenderCommand::AttachTap { slot, .. } => {
                f.debug_struct("AttachTap").field("slot", slot).finish()
            }
        }
    }
}

/// Objects the render path no longer owns.
pub enum Garbage {
    Instrument(Box<InstrumentUnit>),
    Strip(Box<InsertStrip>),
    Effect(Box<dyn EffectProcessor>),
    Tap(HeapProd<f32>),
    Topology(Arc<MixerTopology>),
}

/// Control-side end of the command ring.
pub struct CommandSender {
    producer: HeapProd<RenderCommand>,
}

impl CommandSender {
    pub(crate) fn new(producer: HeapProd<RenderCommand>) -> Self {
        Self { producer }
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity().get()
    }

    /// Free slots in the ring.
    pub fn free(&self) -> usize {
        self.producer.vacant_len()
    }

    /// Send one command; a full ring drops it.
    pub fn send(&mut self, command: RenderCommand) -> Result<(), QueueError> {
        self.send_or_return(command)
            .map_err(|_| QueueError::Full { capacity: self.capacity() })
    }

    /// Send one command; a full ring hands it back.
    pub fn send_or_return(&mut self, command: RenderCommand) -> Result<(), RenderCommand> {
        self.producer.try_push(command)
    }

    /// Send all commands or none.
    pub fn send_batch(
        &mut self,
        commands: impl ExactSizeIterator<Item = RenderCommand>,
    ) -> Result<(), QueueError> {
        let needed = commands.len();
        let free = self.free();
        if needed > free {
            return Err(QueueError::NoRoom { needed, free });
        }
        for command in commands {
            // Single producer: the room checked above cannot shrink.
            if self.producer.try_push(command).is_err() {
                return Err(QueueError::Full { capacity: self.capacity() });
            }
        }
        Ok(())
    }
}

/// Control-side end of the garbage ring.
pub struct GarbageCollector {
    consumer: HeapCons<Garbage>,
}

impl GarbageCollector {
    pub(crate) fn new(consumer: HeapCons<Garbage>) -> Self {
        Self { consumer }
    }

    /// Drop everything the render path has retired; returns the count.
    pub fn collect(&mut self) -> usize {
        let mut n = 0;
        while let Some(garbage) = self.consumer.try_pop() {
            drop(garbage);
            n += 1;
        }
        n
    }
}
