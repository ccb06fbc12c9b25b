//! Mapping between render samples and pattern steps for one tempo segment.
//!
//! A timeline is anchored at a render sample and a step. Between the two
//! sits an unwrapped musical axis `u` (steps elapsed since the anchor) that
//! grows without ever jumping back; the loop only affects how `u` maps back
//! to a pattern step. Samples are always computed as
//! `anchor_sample + round(u * samples_per_step)`, so a loop boundary lands
//! on the same sample no matter how many passes came before it.

use dg_ir::LoopRange;

use crate::clock::TimeBase;

/// One traversal of the pattern between two wrap points.
///
/// Pass 0 starts at the anchor step; every later pass covers the full loop.
/// Without a loop there is a single, unbounded pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Pass {
    pub index: u64,
    pub start_step: f64,
    /// Exclusive end; `f64::INFINITY` without a loop.
    pub end_step: f64,
    /// Value of `u` at `start_step`.
    pub base_u: f64,
}

impl Pass {
    pub fn u_of(&self, step: f64) -> f64 {
        self.base_u + (step - self.start_step)
    }

    pub fn step_of(&self, u: f64) -> f64 {
        self.start_step + (u - self.base_u)
    }

    pub fn end_u(&self) -> f64 {
        self.u_of(self.end_step)
    }

    pub fn contains_step(&self, step: f64) -> bool {
        step >= self.start_step && step < self.end_step
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timeline {
    anchor_sample: u64,
    anchor_step: f64,
    bpm: f64,
    loop_range: Option<LoopRange>,
    running: bool,
}

impl Timeline {
    /// A timeline starting at `anchor_step` on `anchor_sample`. An anchor at
    /// or past the loop end is folded back into the loop first.
    pub fn new(
        anchor_sample: u64,
        anchor_step: f64,
        bpm: f64,
        loop_range: Option<LoopRange>,
        running: bool,
    ) -> Self {
        let anchor_step = match loop_range {
            Some(lp) => lp.wrap(anchor_step),
            None => anchor_step,
        };
        Self { anchor_sample, anchor_step, bpm, loop_range, running }
    }

    /// A timeline frozen at `step`.
    pub fn stopped(step: f64, bpm: f64, loop_range: Option<LoopRange>) -> Self {
        Self::new(0, step, bpm, loop_range, false)
    }

    pub fn anchor_sample(&self) -> u64 {
        self.anchor_sample
    }

    pub fn anchor_step(&self) -> f64 {
        self.anchor_step
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    pub fn loop_range(&self) -> Option<LoopRange> {
        self.loop_range
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pass(&self, index: u64) -> Pass {
        match self.loop_range {
            None => Pass {
                index: 0,
                start_step: self.anchor_step,
                end_step: f64::INFINITY,
                base_u: 0.0,
            },
            Some(lp) if index == 0 => Pass {
                index: 0,
                start_step: self.anchor_step,
                end_step: lp.end,
                base_u: 0.0,
            },
            Some(lp) => Pass {
                index,
                start_step: lp.start,
                end_step: lp.end,
                base_u: (lp.end - self.anchor_step) + (index - 1) as f64 * lp.len(),
            },
        }
    }

    /// Index of the pass containing `u`.
    pub fn pass_index_at(&self, u: f64) -> u64 {
        let Some(lp) = self.loop_range else {
            return 0;
        };
        let first = lp.end - self.anchor_step;
        if u < first {
            0
        } else {
            1 + ((u - first) / lp.len()).floor() as u64
        }
    }

    /// Passes overlapping `[u_from, u_to)`, in order.
    pub fn passes(&self, u_from: f64, u_to: f64) -> impl Iterator<Item = Pass> + '_ {
        let empty = u_to <= u_from;
        let first = self.pass_index_at(u_from);
        let last = self.pass_index_at(u_to).max(first);
        (first..=last)
            .map(move |i| self.pass(i))
            .filter(move |p| !empty && p.base_u < u_to)
    }

    pub fn step_at_u(&self, u: f64) -> f64 {
        self.pass(self.pass_index_at(u)).step_of(u)
    }

    /// `u` at a render sample. Frozen timelines and samples before the
    /// anchor read as 0.
    pub fn u_at_sample(&self, timebase: &TimeBase, sample: u64) -> f64 {
        if !self.running || sample <= self.anchor_sample {
            0.0
        } else {
            timebase.samples_to_step(sample - self.anchor_sample, self.bpm)
        }
    }

    /// Render sample of `u`; negative `u` clamps to the anchor.
    pub fn sample_at_u(&self, timebase: &TimeBase, u: f64) -> u64 {
        self.anchor_sample + timebase.step_to_samples(u.max(0.0), self.bpm)
    }

    /// Pattern step played at a render sample.
    pub fn step_at_sample(&self, timebase: &TimeBase, sample: u64) -> f64 {
        self.step_at_u(self.u_at_sample(timebase, sample))
    }

    /// Re-anchor at `at_sample` with a new tempo; steps before `at_sample`
    /// keep the samples they had.
    pub fn rebased(&self, timebase: &TimeBase, at_sample: u64, bpm: f64) -> Self {
        let step = self.step_at_sample(timebase, at_sample);
        Self::new(at_sample, step, bpm, self.loop_range, self.running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB: TimeBase = TimeBase::new(48_000);

    #[test]
    fn no_loop_is_linear() {
        let tl = Timeline::new(1000, 8.0, 120.0, None, true);
        assert_eq!(tl.step_at_sample(&TB, 1000 + 6000), 9.0);
        assert_eq!(tl.sample_at_u(&TB, 2.0), 13_000);
        assert_eq!(tl.pass_index_at(1e9), 0);
    }

    #[test]
    fn frozen_timeline_stays_on_anchor() {
        let tl = Timeline::stopped(12.5, 120.0, None);
        assert_eq!(tl.step_at_sample(&TB, 123_456), 12.5);
    }

    #[test]
    fn loop_boundary_from_step_60_at_160_bpm() {
        // 4500 samples per step; 4 steps to the loop end.
        let tl = Timeline::new(0, 60.0, 160.0, Some(LoopRange::new(0.0, 64.0)), true);
        let pass1 = tl.pass(1);
        assert_eq!(pass1.base_u, 4.0);
        assert_eq!(tl.sample_at_u(&TB, pass1.u_of(0.0)), 18_000);
        assert_eq!(tl.step_at_sample(&TB, 18_000), 0.0);
        assert!(tl.step_at_sample(&TB, 17_999) > 63.9);
    }

    #[test]
    fn later_passes_do_not_drift() {
        let tl = Timeline::new(7, 0.0, 133.0, Some(LoopRange::new(0.0, 3.0)), true);
        let sps = TB.samples_per_step(133.0);
        for k in 1..2000u64 {
            let boundary = tl.sample_at_u(&TB, tl.pass(k).base_u);
            let exact = 7.0 + (k as f64 * 3.0) * sps;
            assert!((boundary as f64 - exact).abs() <= 0.5);
        }
    }

    #[test]
    fn anchor_past_loop_end_wraps() {
        let tl = Timeline::new(0, 70.0, 120.0, Some(LoopRange::new(0.0, 64.0)), true);
        assert_eq!(tl.anchor_step(), 6.0);
    }

    #[test]
    fn passes_cover_window() {
        let tl = Timeline::new(0, 6.0, 120.0, Some(LoopRange::new(0.0, 8.0)), true);
        let idx: Vec<u64> = tl.passes(1.0, 11.0).map(|p| p.index).collect();
        assert_eq!(idx, vec![0, 1, 2]);
        let idx: Vec<u64> = tl.passes(2.0, 10.0).map(|p| p.index).collect();
        assert_eq!(idx, vec![1]);
    }

    #[test]
    fn rebase_keeps_position() {
        let tl = Timeline::new(0, 0.0, 120.0, Some(LoopRange::new(0.0, 4.0)), true);
        let at = 30_000; // step 5.0 -> wrapped to 1.0
        let next = tl.rebased(&TB, at, 60.0);
        assert_eq!(next.anchor_sample(), at);
        assert_eq!(next.anchor_step(), 1.0);
        assert_eq!(next.step_at_sample(&TB, at + 12_000), 2.0);
    }
}
