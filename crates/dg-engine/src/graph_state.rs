//! Committed mixer topology observed by the render path.
//!
//! The control path builds a complete `MixerTopology` off to the side and
//! publishes it with one atomic pointer swap. The render path only ever
//! sees whole revisions.

use arrayvec::ArrayVec;
use dg_ir::{EffectId, InsertId};

/// Maximum effects in one insert chain.
pub const MAX_CHAIN: usize = 16;

/// Maximum sends from one insert.
pub const MAX_SENDS: usize = 8;

/// A post-fader send into another insert.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SendView {
    pub dest: usize,
    pub level: f32,
}

/// Render-facing parameters of one insert.
#[derive(Clone, Debug, PartialEq)]
pub struct InsertView {
    pub id: InsertId,
    /// Linear gain.
    pub gain: f32,
    pub pan: f32,
    pub bypassed: bool,
    pub muted: bool,
    pub solo: bool,
    pub chain: ArrayVec<EffectId, MAX_CHAIN>,
    pub sends: ArrayVec<SendView, MAX_SENDS>,
}

impl InsertView {
    pub fn new(id: InsertId) -> Self {
        Self {
            id,
            gain: 1.0,
            pan: 0.0,
            bypassed: false,
            muted: false,
            solo: false,
            chain: ArrayVec::new(),
            sends: ArrayVec::new(),
        }
    }
}

/// Sends between inserts form a cycle through the given number of inserts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CycleError {
    pub unsorted: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MixerTopology {
    pub revision: u64,
    /// Insert parameters by slot.
    pub inserts: Vec<Option<InsertView>>,
    /// Destination insert slot by instrument slot.
    pub routes: Vec<Option<usize>>,
    /// Occupied insert slots, every send source before its destination.
    pub order: Vec<usize>,
    pub master_gain: f32,
    pub any_solo: bool,
}

impl MixerTopology {
    pub fn empty(max_inserts: usize, max_instruments: usize) -> Self {
        Self {
            revision: 0,
            inserts: vec![None; max_inserts],
            routes: vec![None; max_instruments],
            order: Vec::new(),
            master_gain: 1.0,
            any_solo: false,
        }
    }

    pub fn insert(&self, slot: usize) -> Option<&InsertView> {
        self.inserts.get(slot).and_then(Option::as_ref)
    }

    pub fn route(&self, instrument_slot: usize) -> Option<usize> {
        self.routes.get(instrument_slot).copied().flatten()
    }

    /// True if the insert's output is summed into the master bus.
    pub fn reaches_master(&self, slot: usize) -> bool {
        self.insert(slot)
            .is_some_and(|v| !v.muted && (!self.any_solo || v.solo))
    }

    /// Recompute derived fields. Fails if sends form a cycle.
    pub fn finalize(&mut self) -> Result<(), CycleError> {
        self.order = topological_sort(&self.inserts)?;
        self.any_solo = self.inserts.iter().flatten().any(|v| v.solo);
        Ok(())
    }
}

/// Topological sort via Kahn's algorithm over send edges.
///
/// Returns occupied slots ordered so that every send source appears before
/// its destination. Sends to empty slots are ignored.
pub fn topological_sort(inserts: &[Option<InsertView>]) -> Result<Vec<usize>, CycleError> {
    let n = inserts.len();
    let occupied = |slot: usize| inserts.get(slot).is_some_and(Option::is_some);

    let mut in_degree = vec![0u32; n];
    for view in inserts.iter().flatten() {
        for send in &view.sends {
            if occupied(send.dest) {
                in_degree[send.dest] += 1;
            }
        }
    }

    // Seed with zero in-degree slots, highest first so pops come out ascending.
    let mut queue: Vec<usize> = (0..n)
        .rev()
        .filter(|&slot| occupied(slot) && in_degree[slot] == 0)
        .collect();

    let total = (0..n).filter(|&slot| occupied(slot)).count();
    let mut result = Vec::with_capacity(total);

    while let Some(slot) = queue.pop() {
        result.push(slot);
        if let Some(view) = &inserts[slot] {
            for send in &view.sends {
                if occupied(send.dest) {
                    in_degree[send.dest] -= 1;
                    if in_degree[send.dest] == 0 {
                        queue.push(send.dest);
                    }
                }
            }
        }
    }

    if result.len() < total {
        return Err(CycleError { unsorted: total - result.len() });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(id: u32, sends: &[usize]) -> Option<InsertView> {
        let mut v = InsertView::new(InsertId(id));
        for &dest in sends {
            v.sends.push(SendView { dest, level: 0.5 });
        }
        Some(v)
    }

    #[test]
    fn independent_inserts_sort_ascending() {
        let inserts = vec![view(0, &[]), None, view(2, &[]), view(3, &[])];
        assert_eq!(topological_sort(&inserts), Ok(vec![0, 2, 3]));
    }

    #[test]
    fn send_source_precedes_destination() {
        // 0 -> 2 -> 1
        let inserts = vec![view(0, &[2]), view(1, &[]), view(2, &[1])];
        let order = topological_sort(&inserts).unwrap();
        let pos = |s| order.iter().position(|&x| x == s).unwrap();
        assert!(pos(0) < pos(2));
        assert!(pos(2) < pos(1));
    }

    #[test]
    fn cycle_is_reported() {
        let inserts = vec![view(0, &[1]), view(1, &[0]), view(2, &[])];
        assert_eq!(topological_sort(&inserts), Err(CycleError { unsorted: 2 }));
    }

    #[test]
    fn sends_to_empty_slots_are_ignored() {
        let inserts = vec![view(0, &[5]), None];
        assert_eq!(topological_sort(&inserts), Ok(vec![0]));
    }

    #[test]
    fn solo_limits_master_inputs() {
        let mut topo = MixerTopology::empty(3, 1);
        topo.inserts[0] = view(0, &[]);
        topo.inserts[1] = view(1, &[]);
        if let Some(v) = topo.inserts[1].as_mut() {
            v.solo = true;
        }
        topo.finalize().unwrap();
        assert!(topo.any_solo);
        assert!(!topo.reaches_master(0));
        assert!(topo.reaches_master(1));
        assert!(!topo.reaches_master(2));
    }
}
