//! Persisted session state: transport settings, mixer and routing.
//!
//! Playback state, pattern data and meters are not persisted.

use std::path::Path;

use dg_ir::{EffectDescriptor, InsertId, InstrumentId};
use serde::{Deserialize, Serialize};

use crate::error::ProjectError;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProjectState {
    pub transport: TransportSettings,
    pub mixer: MixerState,
    #[serde(default)]
    pub routing: Vec<RouteState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransportSettings {
    pub bpm: f64,
    pub loop_start: f64,
    pub loop_end: f64,
    pub loop_enabled: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MixerState {
    #[serde(default)]
    pub inserts: Vec<InsertState>,
    #[serde(default = "unity")]
    pub master_gain: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InsertState {
    pub id: InsertId,
    pub gain_db: f32,
    pub pan: f32,
    pub bypassed: bool,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    /// In processing order.
    #[serde(default)]
    pub effects: Vec<EffectDescriptor>,
    #[serde(default)]
    pub sends: Vec<SendState>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SendState {
    pub dest: InsertId,
    pub level: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteState {
    pub instrument: InstrumentId,
    pub insert: InsertId,
}

fn unity() -> f32 {
    1.0
}

impl ProjectState {
    pub fn to_json(&self) -> Result<String, ProjectError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ProjectError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ProjectError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProjectError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_json_fills_defaults() {
        let text = r#"{
            "transport": { "bpm": 128.0, "loop_start": 0.0, "loop_end": 32.0, "loop_enabled": true },
            "mixer": { "inserts": [ { "id": 0, "gain_db": -3.0, "pan": 0.25, "bypassed": false,
                "effects": [ { "kind": "lowpass", "params": [ { "id": 0, "value": 900.0 } ] } ] } ] }
        }"#;
        let project = ProjectState::from_json(text).unwrap();
        assert_eq!(project.mixer.master_gain, 1.0);
        assert!(project.routing.is_empty());
        let insert = &project.mixer.inserts[0];
        assert!(!insert.muted);
        assert_eq!(insert.effects[0].kind.as_str(), "lowpass");
        assert_eq!(insert.effects[0].param(0), Some(900.0));
    }

    #[test]
    fn saved_file_loads_back() {
        let project = ProjectState {
            transport: TransportSettings {
                bpm: 90.0,
                loop_start: 4.0,
                loop_end: 20.0,
                loop_enabled: false,
            },
            mixer: MixerState { inserts: vec![], master_gain: 0.5 },
            routing: vec![RouteState { instrument: InstrumentId(3), insert: InsertId(1) }],
        };
        let path = std::env::temp_dir().join(format!("dg-project-{}.json", std::process::id()));
        project.save(&path).unwrap();
        let loaded = ProjectState::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded, project);
    }

    #[test]
    fn garbage_is_a_json_error() {
        assert!(matches!(ProjectState::from_json("{"), Err(ProjectError::Json(_))));
    }
}
