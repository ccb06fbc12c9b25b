//! Linear parameter ramps for click-free changes.

/// A value that moves linearly to its target over a fixed number of samples.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParamRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
    length: u32,
}

impl ParamRamp {
    pub fn new(value: f32, length: u32) -> Self {
        Self { current: value, target: value, step: 0.0, remaining: 0, length: length.max(1) }
    }

    /// Start moving toward `target`. Re-targeting mid-ramp starts a fresh
    /// ramp from the current value.
    pub fn set_target(&mut self, target: f32) {
        if target == self.target {
            return;
        }
        self.target = target;
        self.remaining = self.length;
        self.step = (target - self.current) / self.length as f32;
    }

    /// Jump straight to `value`.
    pub fn jump(&mut self, value: f32) {
        self.current = value;
        self.target = value;
        self.remaining = 0;
        self.step = 0.0;
    }

    /// Value for the next sample.
    #[inline]
    pub fn next(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 { self.target } else { self.current + self.step };
        }
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaches_target_exactly_after_length() {
        let mut ramp = ParamRamp::new(0.0, 4);
        ramp.set_target(1.0);
        let values: Vec<f32> = (0..5).map(|_| ramp.next()).collect();
        assert_eq!(values, vec![0.25, 0.5, 0.75, 1.0, 1.0]);
        assert!(ramp.is_settled());
    }

    #[test]
    fn retarget_starts_from_current_value() {
        let mut ramp = ParamRamp::new(0.0, 4);
        ramp.set_target(1.0);
        ramp.next();
        ramp.next();
        ramp.set_target(0.0);
        assert!((ramp.next() - 0.375).abs() < 1e-6);
    }

    #[test]
    fn same_target_is_ignored() {
        let mut ramp = ParamRamp::new(0.5, 8);
        ramp.set_target(0.5);
        assert!(ramp.is_settled());
    }
}
