//! Tempo and sample-rate conversions between steps and samples.

use dg_ir::{LoopRange, STEPS_PER_BEAT, TICKS_PER_STEP};

use crate::error::ClockError;

/// Highest accepted tempo.
pub const MAX_BPM: f64 = 999.0;

/// Shortest accepted loop: one tick. Keeps the number of loop passes in a
/// look-ahead window small at any tempo.
pub const MIN_LOOP_STEPS: f64 = 1.0 / TICKS_PER_STEP as f64;

/// Converts between musical steps and samples at a fixed sample rate.
///
/// Stateless apart from the sample rate: the tempo is passed on every call,
/// so a tempo change only affects conversions made after it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeBase {
    sample_rate: u32,
}

impl TimeBase {
    pub const fn new(sample_rate: u32) -> Self {
        Self { sample_rate }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Length of one step in (fractional) samples.
    pub fn samples_per_step(&self, bpm: f64) -> f64 {
        self.sample_rate as f64 * 60.0 / (bpm * STEPS_PER_BEAT as f64)
    }

    /// Sample offset of `step`, rounded to the nearest sample.
    pub fn step_to_samples(&self, step: f64, bpm: f64) -> u64 {
        let samples = step * self.samples_per_step(bpm);
        if samples.is_finite() && samples > 0.0 {
            samples.round() as u64
        } else {
            0
        }
    }

    /// Exact step position of a sample offset.
    pub fn samples_to_step(&self, samples: u64, bpm: f64) -> f64 {
        samples as f64 / self.samples_per_step(bpm)
    }

    /// Duration in milliseconds as a sample count, rounded.
    pub fn ms_to_samples(&self, ms: f64) -> u64 {
        let samples = ms * self.sample_rate as f64 / 1000.0;
        if samples.is_finite() && samples > 0.0 {
            samples.round() as u64
        } else {
            0
        }
    }
}

/// Accept a tempo in `(0, 999]`.
pub fn validate_bpm(bpm: f64) -> Result<f64, ClockError> {
    if bpm.is_finite() && bpm > 0.0 && bpm <= MAX_BPM {
        Ok(bpm)
    } else {
        Err(ClockError::InvalidBpm(bpm))
    }
}

/// Accept a finite, non-negative step position.
pub fn validate_step(step: f64) -> Result<f64, ClockError> {
    if step.is_finite() && step >= 0.0 {
        Ok(step)
    } else {
        Err(ClockError::InvalidPosition(step))
    }
}

/// Accept a loop with finite, non-negative bounds at least
/// [`MIN_LOOP_STEPS`] long.
pub fn validate_loop(start: f64, end: f64) -> Result<LoopRange, ClockError> {
    let range = LoopRange::new(start, end);
    if range.is_valid() && range.len() >= MIN_LOOP_STEPS {
        Ok(range)
    } else {
        Err(ClockError::InvalidLoop { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_per_step_at_120() {
        let tb = TimeBase::new(48_000);
        assert_eq!(tb.samples_per_step(120.0), 6000.0);
        assert_eq!(tb.step_to_samples(4.0, 120.0), 24_000);
    }

    #[test]
    fn round_trip_within_one_sample() {
        let tb = TimeBase::new(44_100);
        for &bpm in &[0.5, 33.3, 97.0, 120.0, 173.25, 999.0] {
            for &s in &[0u64, 1, 441, 22_050, 1_234_567, 98_765_431] {
                let back = tb.step_to_samples(tb.samples_to_step(s, bpm), bpm);
                assert!(back.abs_diff(s) <= 1, "bpm {bpm}: {s} -> {back}");
            }
        }
    }

    #[test]
    fn negative_steps_clamp_to_zero() {
        let tb = TimeBase::new(48_000);
        assert_eq!(tb.step_to_samples(-2.0, 120.0), 0);
    }

    #[test]
    fn bpm_bounds() {
        assert!(validate_bpm(999.0).is_ok());
        assert!(validate_bpm(0.001).is_ok());
        assert_eq!(validate_bpm(0.0), Err(ClockError::InvalidBpm(0.0)));
        assert!(validate_bpm(999.5).is_err());
        assert!(validate_bpm(f64::NAN).is_err());
    }

    #[test]
    fn loop_must_be_non_empty() {
        assert!(validate_loop(0.0, 64.0).is_ok());
        assert!(validate_loop(8.0, 8.0).is_err());
        assert!(validate_loop(-1.0, 8.0).is_err());
        assert!(validate_loop(0.0, f64::INFINITY).is_err());
    }

    #[test]
    fn loop_shorter_than_a_tick_is_rejected() {
        assert_eq!(
            validate_loop(0.0, 1e-7),
            Err(ClockError::InvalidLoop { start: 0.0, end: 1e-7 })
        );
        assert!(validate_loop(3.0, 3.01).is_err());
        assert!(validate_loop(0.0, MIN_LOOP_STEPS).is_ok());
        assert!(validate_loop(3.0, 3.5).is_ok());
    }

    #[test]
    fn ms_to_samples_rounds() {
        let tb = TimeBase::new(48_000);
        assert_eq!(tb.ms_to_samples(10.0), 480);
        assert_eq!(tb.ms_to_samples(-5.0), 0);
    }
}
