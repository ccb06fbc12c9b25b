//! Pattern data: notes and automation points on the step grid.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::edit::PatternEdit;
use crate::ids::{AutomationKey, InstrumentId, NoteKey};

/// A note in a pattern.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NoteEvent {
    pub key: NoteKey,
    /// Start position in steps.
    pub step: f64,
    /// Length in steps (> 0).
    pub length: f64,
    pub note: u8,
    pub velocity: u8,
    pub instrument: InstrumentId,
}

impl NoteEvent {
    /// Step at which the note releases.
    pub fn end(&self) -> f64 {
        self.step + self.length
    }

    fn is_valid(&self) -> bool {
        self.step.is_finite() && self.step >= 0.0 && self.length.is_finite() && self.length > 0.0
    }
}

/// A parameter value set at a step.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AutomationPoint {
    pub key: AutomationKey,
    pub step: f64,
    pub instrument: InstrumentId,
    pub param: u16,
    pub value: f32,
}

impl AutomationPoint {
    fn is_valid(&self) -> bool {
        self.step.is_finite() && self.step >= 0.0 && self.value.is_finite()
    }
}

/// An inclusive span of steps touched by an edit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepRange {
    pub start: f64,
    pub end: f64,
}

impl StepRange {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start: start.min(end), end: start.max(end) }
    }

    pub fn point(step: f64) -> Self {
        Self { start: step, end: step }
    }

    /// Smallest range covering both.
    pub fn union(self, other: StepRange) -> StepRange {
        StepRange { start: self.start.min(other.start), end: self.end.max(other.end) }
    }

    fn merge(acc: Option<StepRange>, next: StepRange) -> Option<StepRange> {
        Some(match acc {
            Some(range) => range.union(next),
            None => next,
        })
    }
}

/// Notes and automation, each kept sorted by `(step, key)`.
///
/// A pattern is immutable once published; edits are applied to a copy
/// which receives the next revision stamp.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Pattern {
    revision: u64,
    notes: Vec<NoteEvent>,
    automation: Vec<AutomationPoint>,
}

impl Pattern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a pattern from unsorted parts. Invalid entries are dropped.
    pub fn from_parts(notes: Vec<NoteEvent>, automation: Vec<AutomationPoint>) -> Self {
        let mut pattern = Self::default();
        for note in notes {
            pattern.apply(&PatternEdit::AddNote(note));
        }
        for point in automation {
            pattern.apply(&PatternEdit::AddAutomation(point));
        }
        pattern
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Set the revision stamp. Used by the store that publishes the pattern.
    pub fn stamp(&mut self, revision: u64) {
        self.revision = revision;
    }

    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn automation(&self) -> &[AutomationPoint] {
        &self.automation
    }

    pub fn note(&self, key: NoteKey) -> Option<&NoteEvent> {
        self.notes.iter().find(|n| n.key == key)
    }

    pub fn point(&self, key: AutomationKey) -> Option<&AutomationPoint> {
        self.automation.iter().find(|p| p.key == key)
    }

    /// Notes whose start lies in `[from, to)`.
    pub fn notes_starting_in(&self, from: f64, to: f64) -> &[NoteEvent] {
        let lo = self.notes.partition_point(|n| n.step < from);
        let hi = self.notes.partition_point(|n| n.step < to).max(lo);
        &self.notes[lo..hi]
    }

    /// Automation points in `[from, to)`.
    pub fn automation_in(&self, from: f64, to: f64) -> &[AutomationPoint] {
        let lo = self.automation.partition_point(|p| p.step < from);
        let hi = self.automation.partition_point(|p| p.step < to).max(lo);
        &self.automation[lo..hi]
    }

    /// Step where the last note ends (0 for an empty pattern).
    pub fn end_step(&self) -> f64 {
        self.notes.iter().fold(0.0, |end, n| f64::max(end, n.end()))
    }

    /// Sorted order holds and every entry has finite, in-range values.
    pub fn is_consistent(&self) -> bool {
        let notes_sorted = self
            .notes
            .windows(2)
            .all(|w| (w[0].step, w[0].key) <= (w[1].step, w[1].key));
        let points_sorted = self
            .automation
            .windows(2)
            .all(|w| (w[0].step, w[0].key) <= (w[1].step, w[1].key));
        notes_sorted
            && points_sorted
            && self.notes.iter().all(NoteEvent::is_valid)
            && self.automation.iter().all(AutomationPoint::is_valid)
    }

    /// Apply one edit in place and return the span of steps it touched.
    ///
    /// Returns `None` when the edit changed nothing: an unknown key, or a
    /// note/point with non-finite, negative or zero-length timing.
    pub fn apply(&mut self, edit: &PatternEdit) -> Option<StepRange> {
        match *edit {
            PatternEdit::AddNote(note) => {
                if !note.is_valid() {
                    return None;
                }
                let old = self.take_note(note.key);
                self.insert_note(note);
                StepRange::merge(old.map(note_span), note_span(note))
            }
            PatternEdit::RemoveNote(key) => self.take_note(key).map(note_span),
            PatternEdit::MoveNote { key, step } => {
                let old = *self.note(key)?;
                let moved = NoteEvent { step, ..old };
                if !moved.is_valid() {
                    return None;
                }
                self.take_note(key);
                self.insert_note(moved);
                Some(note_span(old).union(note_span(moved)))
            }
            PatternEdit::ResizeNote { key, length } => {
                let old = *self.note(key)?;
                let resized = NoteEvent { length, ..old };
                if !resized.is_valid() {
                    return None;
                }
                self.take_note(key);
                self.insert_note(resized);
                Some(note_span(old).union(note_span(resized)))
            }
            PatternEdit::AddAutomation(point) => {
                if !point.is_valid() {
                    return None;
                }
                let old = self.take_point(point.key);
                let at = self.automation.partition_point(|p| (p.step, p.key) < (point.step, point.key));
                self.automation.insert(at, point);
                StepRange::merge(old.map(|p| StepRange::point(p.step)), StepRange::point(point.step))
            }
            PatternEdit::RemoveAutomation(key) => {
                self.take_point(key).map(|p| StepRange::point(p.step))
            }
            PatternEdit::Clear => {
                let span = self
                    .notes
                    .iter()
                    .map(|n| note_span(*n))
                    .chain(self.automation.iter().map(|p| StepRange::point(p.step)))
                    .fold(None, StepRange::merge);
                self.notes.clear();
                self.automation.clear();
                span
            }
        }
    }

    /// Span of steps whose contents differ between `older` and `self`.
    pub fn dirty_range_since(&self, older: &Pattern) -> Option<StepRange> {
        let mut dirty = None;

        let old_notes: BTreeMap<NoteKey, &NoteEvent> =
            older.notes.iter().map(|n| (n.key, n)).collect();
        let mut seen = BTreeMap::new();
        for note in &self.notes {
            seen.insert(note.key, ());
            match old_notes.get(&note.key) {
                Some(old) if *old == note => {}
                Some(old) => {
                    dirty = StepRange::merge(dirty, note_span(**old).union(note_span(*note)));
                }
                None => dirty = StepRange::merge(dirty, note_span(*note)),
            }
        }
        for old in &older.notes {
            if !seen.contains_key(&old.key) {
                dirty = StepRange::merge(dirty, note_span(*old));
            }
        }

        let old_points: BTreeMap<AutomationKey, &AutomationPoint> =
            older.automation.iter().map(|p| (p.key, p)).collect();
        let mut seen = BTreeMap::new();
        for point in &self.automation {
            seen.insert(point.key, ());
            match old_points.get(&point.key) {
                Some(old) if *old == point => {}
                Some(old) => {
                    dirty = StepRange::merge(
                        dirty,
                        StepRange::point(old.step).union(StepRange::point(point.step)),
                    );
                }
                None => dirty = StepRange::merge(dirty, StepRange::point(point.step)),
            }
        }
        for old in &older.automation {
            if !seen.contains_key(&old.key) {
                dirty = StepRange::merge(dirty, StepRange::point(old.step));
            }
        }
        dirty
    }

    fn take_note(&mut self, key: NoteKey) -> Option<NoteEvent> {
        let idx = self.notes.iter().position(|n| n.key == key)?;
        Some(self.notes.remove(idx))
    }

    fn insert_note(&mut self, note: NoteEvent) {
        let at = self.notes.partition_point(|n| (n.step, n.key) < (note.step, note.key));
        self.notes.insert(at, note);
    }

    fn take_point(&mut self, key: AutomationKey) -> Option<AutomationPoint> {
        let idx = self.automation.iter().position(|p| p.key == key)?;
        Some(self.automation.remove(idx))
    }
}

fn note_span(note: NoteEvent) -> StepRange {
    StepRange::new(note.step, note.end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(key: u32, step: f64, length: f64) -> NoteEvent {
        NoteEvent {
            key: NoteKey(key),
            step,
            length,
            note: 60,
            velocity: 100,
            instrument: InstrumentId(1),
        }
    }

    #[test]
    fn notes_stay_sorted_by_step() {
        let pattern = Pattern::from_parts(
            alloc::vec![note(1, 8.0, 1.0), note(2, 0.0, 1.0), note(3, 4.0, 1.0)],
            alloc::vec![],
        );
        let steps: Vec<f64> = pattern.notes().iter().map(|n| n.step).collect();
        assert_eq!(steps, alloc::vec![0.0, 4.0, 8.0]);
        assert!(pattern.is_consistent());
    }

    #[test]
    fn notes_starting_in_is_half_open() {
        let pattern = Pattern::from_parts(
            alloc::vec![note(1, 0.0, 1.0), note(2, 4.0, 1.0), note(3, 8.0, 1.0)],
            alloc::vec![],
        );
        let hits: Vec<u32> = pattern.notes_starting_in(4.0, 8.0).iter().map(|n| n.key.0).collect();
        assert_eq!(hits, alloc::vec![2]);
        assert!(pattern.notes_starting_in(9.0, 2.0).is_empty());
    }

    #[test]
    fn move_reports_old_and_new_span() {
        let mut pattern = Pattern::from_parts(alloc::vec![note(1, 2.0, 2.0)], alloc::vec![]);
        let range = pattern.apply(&PatternEdit::MoveNote { key: NoteKey(1), step: 10.0 });
        assert_eq!(range, Some(StepRange::new(2.0, 12.0)));
        assert_eq!(pattern.note(NoteKey(1)).map(|n| n.step), Some(10.0));
    }

    #[test]
    fn invalid_edits_change_nothing() {
        let mut pattern = Pattern::from_parts(alloc::vec![note(1, 2.0, 2.0)], alloc::vec![]);
        assert_eq!(pattern.apply(&PatternEdit::ResizeNote { key: NoteKey(1), length: 0.0 }), None);
        assert_eq!(pattern.apply(&PatternEdit::RemoveNote(NoteKey(9))), None);
        assert_eq!(pattern.apply(&PatternEdit::AddNote(note(2, f64::NAN, 1.0))), None);
        assert_eq!(pattern.notes().len(), 1);
    }

    #[test]
    fn re_adding_a_key_replaces_the_note() {
        let mut pattern = Pattern::from_parts(alloc::vec![note(1, 2.0, 1.0)], alloc::vec![]);
        let range = pattern.apply(&PatternEdit::AddNote(note(1, 6.0, 1.0)));
        assert_eq!(range, Some(StepRange::new(2.0, 7.0)));
        assert_eq!(pattern.notes().len(), 1);
    }

    #[test]
    fn dirty_range_covers_changed_notes_only() {
        let older = Pattern::from_parts(
            alloc::vec![note(1, 0.0, 1.0), note(2, 8.0, 2.0), note(3, 20.0, 1.0)],
            alloc::vec![],
        );
        let mut newer = older.clone();
        newer.apply(&PatternEdit::ResizeNote { key: NoteKey(2), length: 4.0 });
        newer.apply(&PatternEdit::RemoveNote(NoteKey(3)));
        assert_eq!(newer.dirty_range_since(&older), Some(StepRange::new(8.0, 21.0)));
        assert_eq!(older.dirty_range_since(&older), None);
    }
}
