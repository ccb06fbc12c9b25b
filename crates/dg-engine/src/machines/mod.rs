//! Built-in machine implementations.

mod gain;
mod lowpass;
mod passthrough;
mod sine;

pub use gain::GainEffect;
pub use lowpass::LowpassFilter;
pub use passthrough::Passthrough;
pub use sine::SineInstrument;

use crate::machine::{EffectProcessor, InstrumentProcessor};

/// Create a built-in effect by type name.
pub fn create_effect(kind: &str) -> Option<Box<dyn EffectProcessor>> {
    Some(match kind {
        "gain" => Box::new(GainEffect::new()),
        "lowpass" => Box::new(LowpassFilter::new()),
        "passthrough" => Box::new(Passthrough),
        _ => return None,
    })
}

/// Create a built-in instrument by type name.
pub fn create_instrument(kind: &str) -> Option<Box<dyn InstrumentProcessor>> {
    match kind {
        "sine" => Some(Box::new(SineInstrument::new())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_names_resolve() {
        assert_eq!(create_effect("lowpass").map(|e| e.info().name), Some("Lowpass"));
        assert!(create_instrument("sine").is_some());
    }

    #[test]
    fn unknown_names_do_not() {
        assert!(create_effect("reverb").is_none());
        assert!(create_instrument("piano").is_none());
    }
}
