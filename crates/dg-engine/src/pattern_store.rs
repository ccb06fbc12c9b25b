//! Versioned, copy-on-write pattern storage.
//!
//! Readers take an `Arc` snapshot that never changes under them. Writers
//! clone the current pattern, apply their edits to the copy and publish it
//! with the next revision stamp.

use std::sync::Arc;

use arc_swap::ArcSwap;
use dg_ir::{Pattern, PatternEdit, StepRange};

#[derive(Debug)]
pub struct PatternStore {
    current: ArcSwap<Pattern>,
}

impl PatternStore {
    pub fn new(mut pattern: Pattern) -> Self {
        pattern.stamp(pattern.revision().max(1));
        Self { current: ArcSwap::from_pointee(pattern) }
    }

    /// Immutable view of the current revision.
    pub fn snapshot(&self) -> Arc<Pattern> {
        self.current.load_full()
    }

    pub fn revision(&self) -> u64 {
        self.current.load().revision()
    }

    /// Apply `edits` as one revision. Returns the touched span, or `None`
    /// (and publishes nothing) when no edit changed anything.
    pub fn edit(&self, edits: &[PatternEdit]) -> Option<StepRange> {
        let mut touched = None;
        self.current.rcu(|current| {
            let mut next = Pattern::clone(current);
            touched = edits.iter().fold(None, |acc: Option<StepRange>, edit| {
                match (acc, next.apply(edit)) {
                    (Some(a), Some(b)) => Some(a.union(b)),
                    (a, b) => a.or(b),
                }
            });
            if touched.is_some() {
                next.stamp(current.revision() + 1);
                Arc::new(next)
            } else {
                Arc::clone(current)
            }
        });
        touched
    }

    /// Replace the whole pattern.
    pub fn replace(&self, mut pattern: Pattern) {
        self.current.rcu(|current| {
            pattern.stamp(current.revision() + 1);
            Arc::new(pattern.clone())
        });
    }
}

impl Default for PatternStore {
    fn default() -> Self {
        Self::new(Pattern::new())
    }
}
