//! Step-based musical time.
//!
//! Steps are the universal time coordinate: a pattern places notes on a
//! step grid, the transport reports its position in (fractional) steps and
//! the clock converts steps to samples. Bar/beat/tick is a display view of
//! the same position.

/// Steps in one beat (sixteenth-note grid).
pub const STEPS_PER_BEAT: u32 = 4;

/// Beats in one bar.
pub const BEATS_PER_BAR: u32 = 4;

/// Steps in one bar.
pub const STEPS_PER_BAR: u32 = STEPS_PER_BEAT * BEATS_PER_BAR;

/// Tick resolution of one beat (PPQ).
pub const TICKS_PER_BEAT: u32 = 96;

/// Ticks in one step.
pub const TICKS_PER_STEP: u32 = TICKS_PER_BEAT / STEPS_PER_BEAT;

/// A position as bar, beat and tick.
///
/// Bar and beat are 1-based, tick is 0-based, so step 0 reads `1.1.0`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BarBeatTick {
    pub bar: u32,
    pub beat: u16,
    pub tick: u16,
}

impl Default for BarBeatTick {
    fn default() -> Self {
        Self { bar: 1, beat: 1, tick: 0 }
    }
}

impl BarBeatTick {
    /// Bar/beat/tick of a step position. Negative or non-finite input
    /// reads as the origin; fractional ticks are truncated.
    pub fn from_steps(step: f64) -> Self {
        if !step.is_finite() || step <= 0.0 {
            return Self::default();
        }
        let total_ticks = (step * TICKS_PER_STEP as f64) as u64;
        let ticks_per_bar = (TICKS_PER_BEAT * BEATS_PER_BAR) as u64;
        let bar = total_ticks / ticks_per_bar;
        let within_bar = total_ticks % ticks_per_bar;
        Self {
            bar: (bar + 1).min(u32::MAX as u64) as u32,
            beat: (within_bar / TICKS_PER_BEAT as u64 + 1) as u16,
            tick: (within_bar % TICKS_PER_BEAT as u64) as u16,
        }
    }

    /// Step position of this bar/beat/tick.
    pub fn to_steps(self) -> f64 {
        let bars = self.bar.saturating_sub(1) as f64 * STEPS_PER_BAR as f64;
        let beats = self.beat.saturating_sub(1) as f64 * STEPS_PER_BEAT as f64;
        bars + beats + self.tick as f64 / TICKS_PER_STEP as f64
    }
}

impl core::fmt::Display for BarBeatTick {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}.{}.{:02}", self.bar, self.beat, self.tick)
    }
}

/// Pack a BarBeatTick into a u64: bar << 32 | beat << 16 | tick.
pub fn pack_bbt(t: BarBeatTick) -> u64 {
    ((t.bar as u64) << 32) | ((t.beat as u64) << 16) | t.tick as u64
}

/// Unpack a u64 produced by [`pack_bbt`].
pub fn unpack_bbt(packed: u64) -> BarBeatTick {
    BarBeatTick {
        bar: (packed >> 32) as u32,
        beat: ((packed >> 16) & 0xFFFF) as u16,
        tick: (packed & 0xFFFF) as u16,
    }
}

/// A half-open loop region `[start, end)` in steps.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoopRange {
    pub start: f64,
    pub end: f64,
}

impl LoopRange {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Loop length in steps.
    pub fn len(&self) -> f64 {
        self.end - self.start
    }

    /// True when `start < end` and both bounds are finite and non-negative.
    pub fn is_valid(&self) -> bool {
        self.start.is_finite()
            && self.end.is_finite()
            && self.start >= 0.0
            && self.start < self.end
    }

    pub fn contains(&self, step: f64) -> bool {
        step >= self.start && step < self.end
    }

    /// Fold a position at or past `end` back into the loop, keeping the
    /// overshoot modulo the loop length. Positions before `end` are
    /// returned unchanged.
    pub fn wrap(&self, step: f64) -> f64 {
        if step < self.end || !self.is_valid() {
            return step;
        }
        let overshoot = step - self.end;
        self.start + overshoot % self.len()
    }
}

impl Default for LoopRange {
    fn default() -> Self {
        Self::new(0.0, STEPS_PER_BAR as f64 * 4.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_reads_one_one_zero() {
        assert_eq!(BarBeatTick::from_steps(0.0), BarBeatTick { bar: 1, beat: 1, tick: 0 });
        assert_eq!(BarBeatTick::from_steps(-3.0), BarBeatTick::default());
        assert_eq!(BarBeatTick::from_steps(f64::NAN), BarBeatTick::default());
    }

    #[test]
    fn steps_map_to_bars_and_beats() {
        assert_eq!(BarBeatTick::from_steps(4.0), BarBeatTick { bar: 1, beat: 2, tick: 0 });
        assert_eq!(BarBeatTick::from_steps(16.0), BarBeatTick { bar: 2, beat: 1, tick: 0 });
        assert_eq!(BarBeatTick::from_steps(17.5), BarBeatTick { bar: 2, beat: 1, tick: 36 });
    }

    #[test]
    fn bbt_to_steps_inverts_from_steps() {
        let bbt = BarBeatTick::from_steps(37.25);
        assert!((bbt.to_steps() - 37.25).abs() < 1e-9);
    }

    #[test]
    fn pack_unpack_bbt() {
        let t = BarBeatTick { bar: 12, beat: 3, tick: 95 };
        assert_eq!(unpack_bbt(pack_bbt(t)), t);
    }

    #[test]
    fn wrap_keeps_overshoot() {
        let lp = LoopRange::new(8.0, 16.0);
        assert_eq!(lp.wrap(12.0), 12.0);
        assert_eq!(lp.wrap(16.0), 8.0);
        assert_eq!(lp.wrap(17.5), 9.5);
        assert_eq!(lp.wrap(33.0), 9.0);
    }

    #[test]
    fn invalid_loop_does_not_wrap() {
        let lp = LoopRange::new(4.0, 4.0);
        assert!(!lp.is_valid());
        assert_eq!(lp.wrap(9.0), 9.0);
    }

    #[test]
    fn display_pads_ticks() {
        assert_eq!(
            alloc::format!("{}", BarBeatTick { bar: 3, beat: 2, tick: 7 }),
            "3.2.07"
        );
    }
}
