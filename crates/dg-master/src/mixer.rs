//! The set of mixer inserts and their render slots.

use std::collections::BTreeMap;

use dg_engine::{CycleError, MixerTopology};
use dg_ir::InsertId;

use crate::error::EngineError;
use crate::insert::MixerInsert;

pub struct Mixer {
    inserts: BTreeMap<InsertId, MixerInsert>,
    /// Occupant of each render slot.
    slots: Vec<Option<InsertId>>,
    pub master_gain: f32,
}

impl Mixer {
    pub fn new(max_inserts: usize) -> Self {
        Self { inserts: BTreeMap::new(), slots: vec![None; max_inserts], master_gain: 1.0 }
    }

    pub fn len(&self) -> usize {
        self.inserts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
    }

    pub fn contains(&self, id: InsertId) -> bool {
        self.inserts.contains_key(&id)
    }

    pub fn get(&self, id: InsertId) -> Option<&MixerInsert> {
        self.inserts.get(&id)
    }

    pub fn get_mut(&mut self, id: InsertId) -> Option<&mut MixerInsert> {
        self.inserts.get_mut(&id)
    }

    pub fn insert_or_err(&mut self, id: InsertId) -> Result<&mut MixerInsert, EngineError> {
        self.inserts.get_mut(&id).ok_or(EngineError::UnknownInsert(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = &MixerInsert> + '_ {
        self.inserts.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MixerInsert> + '_ {
        self.inserts.values_mut()
    }

    pub fn slot_of(&self, id: InsertId) -> Option<usize> {
        self.inserts.get(&id).map(|i| i.slot)
    }

    /// Lowest id not in use.
    pub fn next_free_id(&self) -> InsertId {
        let mut next = 0;
        for id in self.inserts.keys() {
            if id.0 != next {
                break;
            }
            next += 1;
        }
        InsertId(next)
    }

    /// Add an insert in the first free slot.
    pub fn create(&mut self, id: InsertId) -> Result<&mut MixerInsert, EngineError> {
        if self.inserts.contains_key(&id) {
            return Err(EngineError::InsertExists(id));
        }
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(EngineError::Capacity { what: "inserts", max: self.slots.len() })?;
        self.slots[slot] = Some(id);
        Ok(self.inserts.entry(id).or_insert_with(|| MixerInsert::new(id, slot)))
    }

    /// Drop an insert and free its slot.
    pub fn remove(&mut self, id: InsertId) -> Option<MixerInsert> {
        let insert = self.inserts.remove(&id)?;
        if let Some(slot) = self.slots.get_mut(insert.slot) {
            *slot = None;
        }
        Some(insert)
    }

    /// Build the render view with the given instrument routes.
    pub fn topology(
        &self,
        routes: Vec<Option<usize>>,
        revision: u64,
    ) -> Result<MixerTopology, CycleError> {
        let mut topology = MixerTopology::empty(self.slots.len(), routes.len());
        topology.revision = revision;
        topology.routes = routes;
        topology.master_gain = self.master_gain;
        for insert in self.inserts.values() {
            topology.inserts[insert.slot] = Some(insert.view(|dest| self.slot_of(dest)));
        }
        topology.finalize()?;
        Ok(topology)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_and_slots_are_assigned() {
        let mut mixer = Mixer::new(4);
        assert_eq!(mixer.next_free_id(), InsertId(0));
        mixer.create(InsertId(0)).unwrap();
        mixer.create(InsertId(2)).unwrap();
        assert_eq!(mixer.next_free_id(), InsertId(1));
        assert_eq!(mixer.slot_of(InsertId(2)), Some(1));
        assert!(matches!(mixer.create(InsertId(2)), Err(EngineError::InsertExists(_))));

        mixer.remove(InsertId(0));
        assert_eq!(mixer.create(InsertId(5)).unwrap().slot, 0);
    }

    #[test]
    fn capacity_is_enforced() {
        let mut mixer = Mixer::new(1);
        mixer.create(InsertId(0)).unwrap();
        assert!(matches!(
            mixer.create(InsertId(1)),
            Err(EngineError::Capacity { what: "inserts", max: 1 })
        ));
    }

    #[test]
    fn send_cycles_are_rejected() {
        let mut mixer = Mixer::new(4);
        mixer.create(InsertId(0)).unwrap().set_send(InsertId(1), 0.5);
        mixer.create(InsertId(1)).unwrap();
        let topology = mixer.topology(vec![None; 2], 1).unwrap();
        assert_eq!(topology.order, [0, 1]);

        mixer.get_mut(InsertId(1)).unwrap().set_send(InsertId(0), 0.5);
        assert!(mixer.topology(vec![None; 2], 2).is_err());
    }
}
