//! Control-side effect chain of one insert.
//!
//! Effects are addressed by a stable `EffectId`; the chain keeps their
//! processing order separately. Every edit reports the contiguous range of
//! chain positions whose wiring changed, which is all the render side has
//! to re-resolve.

use core::ops::Range;

use arrayvec::ArrayVec;
use dg_engine::MAX_CHAIN;
use dg_ir::{EffectDescriptor, EffectId};
use slotmap::SlotMap;

/// One effect in the chain.
#[derive(Clone, Debug, PartialEq)]
pub struct EffectSlot {
    pub descriptor: EffectDescriptor,
    /// Instantiation failed; the position passes audio through.
    pub passthrough: bool,
}

#[derive(Clone, Debug, Default)]
pub struct EffectChain {
    slots: SlotMap<EffectId, EffectSlot>,
    order: Vec<EffectId>,
    rebuilds: u32,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.order.len() >= MAX_CHAIN
    }

    /// Effect ids in processing order.
    pub fn order(&self) -> &[EffectId] {
        &self.order
    }

    pub fn contains(&self, id: EffectId) -> bool {
        self.slots.contains_key(id)
    }

    pub fn get(&self, id: EffectId) -> Option<&EffectSlot> {
        self.slots.get(id)
    }

    pub fn get_mut(&mut self, id: EffectId) -> Option<&mut EffectSlot> {
        self.slots.get_mut(id)
    }

    pub fn position(&self, id: EffectId) -> Option<usize> {
        self.order.iter().position(|e| *e == id)
    }

    /// Descriptors in processing order.
    pub fn descriptors(&self) -> impl Iterator<Item = &EffectDescriptor> + '_ {
        self.order.iter().filter_map(|id| self.slots.get(*id)).map(|s| &s.descriptor)
    }

    /// Chain edits that changed the wiring since creation.
    pub fn rebuilds(&self) -> u32 {
        self.rebuilds
    }

    /// The order as the render side stores it.
    pub fn view(&self) -> ArrayVec<EffectId, MAX_CHAIN> {
        self.order.iter().copied().take(MAX_CHAIN).collect()
    }

    /// Insert at `index`, clamped to the end. `None` if the chain is full.
    pub fn insert(
        &mut self,
        slot: EffectSlot,
        index: usize,
    ) -> Option<(EffectId, Range<usize>)> {
        if self.is_full() {
            return None;
        }
        let index = index.min(self.order.len());
        let id = self.slots.insert(slot);
        self.order.insert(index, id);
        self.rebuilds += 1;
        Some((id, index..index + 1))
    }

    /// Remove an effect. The returned range is empty: the positions on both
    /// sides of the gap are joined.
    pub fn remove(&mut self, id: EffectId) -> Option<(EffectSlot, Range<usize>)> {
        let index = self.position(id)?;
        let slot = self.slots.remove(id)?;
        self.order.remove(index);
        self.rebuilds += 1;
        Some((slot, index..index))
    }

    /// Move an effect to `new_index`, clamped to the last position.
    /// `None` if the effect is unknown or already there.
    pub fn reorder(&mut self, id: EffectId, new_index: usize) -> Option<Range<usize>> {
        let from = self.position(id)?;
        let to = new_index.min(self.order.len() - 1);
        if from == to {
            return None;
        }
        let moved = self.order.remove(from);
        self.order.insert(to, moved);
        self.rebuilds += 1;
        Some(from.min(to)..from.max(to) + 1)
    }
}
