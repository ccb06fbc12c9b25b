//! Instrument-to-insert routing edges.
//!
//! The graph records an edge only after the link that wires it succeeded,
//! so every recorded edge is wired. Re-routing unwires the old edge first.

use std::collections::BTreeMap;

use dg_ir::{InsertId, InstrumentId};

/// Wires and unwires edges in the audio graph.
pub trait AudioLink {
    fn link(&mut self, instrument: InstrumentId, insert: InsertId) -> Result<(), String>;
    fn unlink(&mut self, instrument: InstrumentId, insert: InsertId);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteChange {
    Unchanged,
    /// Newly routed, or moved away from `from`.
    Rerouted { from: Option<InsertId> },
}

#[derive(Clone, Debug, Default)]
pub struct RoutingGraph {
    edges: BTreeMap<InstrumentId, InsertId>,
}

impl RoutingGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn edge(&self, instrument: InstrumentId) -> Option<InsertId> {
        self.edges.get(&instrument).copied()
    }

    pub fn edges(&self) -> impl Iterator<Item = (InstrumentId, InsertId)> + '_ {
        self.edges.iter().map(|(i, d)| (*i, *d))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Route `instrument` into `insert`. Reapplying the current route does
    /// nothing. If linking the new edge fails the instrument is left
    /// unrouted.
    pub fn route(
        &mut self,
        instrument: InstrumentId,
        insert: InsertId,
        link: &mut dyn AudioLink,
    ) -> Result<RouteChange, String> {
        let from = self.edge(instrument);
        if from == Some(insert) {
            return Ok(RouteChange::Unchanged);
        }
        if let Some(old) = from {
            link.unlink(instrument, old);
            self.edges.remove(&instrument);
        }
        link.link(instrument, insert)?;
        self.edges.insert(instrument, insert);
        Ok(RouteChange::Rerouted { from })
    }

    pub fn disconnect(&mut self, instrument: InstrumentId, link: &mut dyn AudioLink) -> Option<InsertId> {
        let old = self.edges.remove(&instrument)?;
        link.unlink(instrument, old);
        Some(old)
    }
}
