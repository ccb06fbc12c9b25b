//! Instrument and effect registries.
//!
//! The session never constructs processors itself. Instruments come from an
//! `InstrumentRegistry`, whose outputs may take a while to become usable;
//! readiness is an explicit per-instrument state the connection supervisor
//! polls. Effects come from an `EffectRegistry` and are ready at once or
//! not at all.

use std::collections::BTreeMap;
use std::time::Duration;

use dg_engine::machines;
use dg_engine::{EffectProcessor, InstrumentProcessor};
use dg_ir::{EffectDescriptor, InstrumentDescriptor, InstrumentId};

use crate::error::{EffectError, RegistryError};

/// Readiness of an instrument's output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceState {
    Uninitialized,
    Ready,
    Failed,
}

pub trait InstrumentRegistry: Send {
    /// Start creating an instrument. Its output may not be ready yet.
    fn create_instrument(
        &mut self,
        id: InstrumentId,
        descriptor: &InstrumentDescriptor,
        now: Duration,
    ) -> Result<(), RegistryError>;

    /// Readiness of `id`'s output at `now`. Unknown ids read as `Failed`.
    fn state(&mut self, id: InstrumentId, now: Duration) -> ResourceState;

    /// Hand over a ready output. Returns `None` before it is ready or after
    /// it has been taken.
    fn take_output(
        &mut self,
        id: InstrumentId,
        now: Duration,
    ) -> Option<Box<dyn InstrumentProcessor>>;

    fn release(&mut self, id: InstrumentId);
}

pub trait EffectRegistry: Send {
    fn create_effect(
        &mut self,
        descriptor: &EffectDescriptor,
    ) -> Result<Box<dyn EffectProcessor>, EffectError>;
}

struct Pending {
    ready_at: Duration,
    output: Option<Box<dyn InstrumentProcessor>>,
}

/// Registry over the built-in instruments. Outputs become ready
/// `startup_delay` after creation.
#[derive(Default)]
pub struct BuiltinRegistry {
    startup_delay: Duration,
    entries: BTreeMap<InstrumentId, Pending>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_startup_delay(delay: Duration) -> Self {
        Self { startup_delay: delay, entries: BTreeMap::new() }
    }
}

impl InstrumentRegistry for BuiltinRegistry {
    fn create_instrument(
        &mut self,
        id: InstrumentId,
        descriptor: &InstrumentDescriptor,
        now: Duration,
    ) -> Result<(), RegistryError> {
        if self.entries.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        let mut output = machines::create_instrument(&descriptor.kind)
            .ok_or_else(|| RegistryError::UnknownKind(descriptor.kind.to_string()))?;
        for p in &descriptor.params {
            output.set_param(p.id, p.value);
        }
        self.entries.insert(id, Pending { ready_at: now + self.startup_delay, output: Some(output) });
        Ok(())
    }

    fn state(&mut self, id: InstrumentId, now: Duration) -> ResourceState {
        match self.entries.get(&id) {
            Some(p) if now >= p.ready_at => ResourceState::Ready,
            Some(_) => ResourceState::Uninitialized,
            None => ResourceState::Failed,
        }
    }

    fn take_output(
        &mut self,
        id: InstrumentId,
        now: Duration,
    ) -> Option<Box<dyn InstrumentProcessor>> {
        let entry = self.entries.get_mut(&id)?;
        if now < entry.ready_at {
            return None;
        }
        entry.output.take()
    }

    fn release(&mut self, id: InstrumentId) {
        self.entries.remove(&id);
    }
}

/// Registry over the built-in effects; parameters are applied on creation.
#[derive(Debug, Default)]
pub struct BuiltinEffects;

impl EffectRegistry for BuiltinEffects {
    fn create_effect(
        &mut self,
        descriptor: &EffectDescriptor,
    ) -> Result<Box<dyn EffectProcessor>, EffectError> {
        let mut unit = machines::create_effect(&descriptor.kind)
            .ok_or_else(|| EffectError::UnknownKind(descriptor.kind.to_string()))?;
        for p in &descriptor.params {
            unit.set_param(p.id, p.value);
        }
        Ok(unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_ready_after_delay() {
        let mut reg = BuiltinRegistry::with_startup_delay(Duration::from_millis(150));
        let id = InstrumentId(1);
        reg.create_instrument(id, &InstrumentDescriptor::new("sine"), Duration::ZERO).unwrap();
        assert_eq!(reg.state(id, Duration::from_millis(100)), ResourceState::Uninitialized);
        assert!(reg.take_output(id, Duration::from_millis(100)).is_none());
        assert_eq!(reg.state(id, Duration::from_millis(150)), ResourceState::Ready);
        assert!(reg.take_output(id, Duration::from_millis(150)).is_some());
        assert!(reg.take_output(id, Duration::from_millis(200)).is_none());
    }

    #[test]
    fn unknown_instrument_kind_is_rejected() {
        let mut reg = BuiltinRegistry::new();
        let piano = InstrumentDescriptor::new("piano");
        let err = reg.create_instrument(InstrumentId(1), &piano, Duration::ZERO);
        assert_eq!(err, Err(RegistryError::UnknownKind("piano".into())));
        assert_eq!(reg.state(InstrumentId(1), Duration::ZERO), ResourceState::Failed);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut reg = BuiltinRegistry::new();
        let d = InstrumentDescriptor::new("sine");
        reg.create_instrument(InstrumentId(1), &d, Duration::ZERO).unwrap();
        assert_eq!(
            reg.create_instrument(InstrumentId(1), &d, Duration::ZERO),
            Err(RegistryError::Duplicate(InstrumentId(1)))
        );
    }

    #[test]
    fn effects_resolve_by_kind() {
        let mut fx = BuiltinEffects;
        assert!(fx.create_effect(&EffectDescriptor::new("lowpass").with_param(0, 800.0)).is_ok());
        assert!(matches!(
            fx.create_effect(&EffectDescriptor::new("reverb")),
            Err(EffectError::UnknownKind(_))
        ));
    }
}
