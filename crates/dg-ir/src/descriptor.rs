//! Descriptors the registries use to create effect and instrument units.

use alloc::vec::Vec;
use arrayvec::ArrayString;

use crate::ids::InsertId;

/// Short, fixed-capacity unit type name ("gain", "lowpass", "sine", ...).
pub type TypeName = ArrayString<32>;

/// One parameter assignment.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ParamValue {
    pub id: u16,
    pub value: f32,
}

/// Everything needed to recreate an effect unit: type and parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EffectDescriptor {
    pub kind: TypeName,
    #[cfg_attr(feature = "serde", serde(default))]
    pub params: Vec<ParamValue>,
}

impl EffectDescriptor {
    /// Descriptor for `kind`; names longer than [`TypeName`] holds are cut.
    pub fn new(kind: &str) -> Self {
        Self { kind: type_name(kind), params: Vec::new() }
    }

    pub fn with_param(mut self, id: u16, value: f32) -> Self {
        self.set_param(id, value);
        self
    }

    /// Set or replace one parameter.
    pub fn set_param(&mut self, id: u16, value: f32) {
        match self.params.iter_mut().find(|p| p.id == id) {
            Some(p) => p.value = value,
            None => self.params.push(ParamValue { id, value }),
        }
    }

    pub fn param(&self, id: u16) -> Option<f32> {
        self.params.iter().find(|p| p.id == id).map(|p| p.value)
    }
}

/// Everything needed to create an instrument.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstrumentDescriptor {
    pub kind: TypeName,
    /// Insert the instrument should play into; created on demand.
    pub target_insert: Option<InsertId>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub params: Vec<ParamValue>,
}

impl InstrumentDescriptor {
    pub fn new(kind: &str) -> Self {
        Self { kind: type_name(kind), target_insert: None, params: Vec::new() }
    }

    pub fn routed_to(mut self, insert: InsertId) -> Self {
        self.target_insert = Some(insert);
        self
    }

    pub fn with_param(mut self, id: u16, value: f32) -> Self {
        self.params.push(ParamValue { id, value });
        self
    }
}

fn type_name(kind: &str) -> TypeName {
    let mut name = TypeName::new();
    for c in kind.chars() {
        if name.try_push(c).is_err() {
            break;
        }
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_names_are_cut_on_char_boundary() {
        let d = EffectDescriptor::new("ééééééééééééééééééééé");
        assert!(d.kind.len() <= 32);
        assert!(d.kind.chars().all(|c| c == 'é'));
    }

    #[test]
    fn set_param_replaces_existing() {
        let mut d = EffectDescriptor::new("gain").with_param(0, 0.5);
        d.set_param(0, 0.25);
        assert_eq!(d.params.len(), 1);
        assert_eq!(d.param(0), Some(0.25));
        assert_eq!(d.param(7), None);
    }
}
