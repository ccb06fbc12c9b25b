//! Edit commands for mutating pattern data during playback.

use crate::ids::{AutomationKey, NoteKey};
use crate::pattern::{AutomationPoint, NoteEvent};

/// An edit applied to a pattern by the pattern store.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PatternEdit {
    /// Add a note, replacing any note with the same key.
    AddNote(NoteEvent),
    RemoveNote(NoteKey),
    MoveNote { key: NoteKey, step: f64 },
    ResizeNote { key: NoteKey, length: f64 },
    /// Add an automation point, replacing any point with the same key.
    AddAutomation(AutomationPoint),
    RemoveAutomation(AutomationKey),
    /// Remove every note and automation point.
    Clear,
}
