//! Small numeric and time helpers shared by the pipeline and the rule set.

use std::time::Instant;

/// Number of seconds in one hour.
pub const SECS_PER_HOUR: f64 = 3_600.0;

/// Hours elapsed from `a` to `b`, saturating at zero when `b` precedes `a`.
#[inline]
pub fn hours_between(a: Instant, b: Instant) -> f64 {
    b.saturating_duration_since(a).as_secs_f64() / SECS_PER_HOUR
}

/// Instant halfway between `a` and `b` (`a` when `b` is not later).
#[inline]
pub fn midpoint(a: Instant, b: Instant) -> Instant {
    a + b.saturating_duration_since(a) / 2
}

/// Clamp into the valve's [0, 1] open-rate range. NaN maps to 0.
#[inline]
pub fn clamp_unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

/// Round to the nearest multiple of `step`. A non-positive step returns `x` unchanged.
#[inline]
pub fn round_to_step(x: f64, step: f64) -> f64 {
    if step <= 0.0 || !step.is_finite() {
        return x;
    }
    let steps = (x / step).round();
    // Re-derive from the integer count so 0.1 steps print as 0.3, not 0.30000000000000004
    let decimals = (-step.log10()).ceil().max(0.0) as i32;
    let scale = 10f64.powi(decimals);
    (steps * step * scale).round() / scale
}

/// y = m·x + b
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Linear {
    pub m: f64,
    pub b: f64,
}

impl Linear {
    /// Line through two points `(x, y)`. The x coordinates must differ.
    pub fn through(p1: (f64, f64), p2: (f64, f64)) -> Self {
        let m = (p2.1 - p1.1) / (p2.0 - p1.0);
        Self { m, b: p1.1 - m * p1.0 }
    }

    #[inline]
    pub fn y(&self, x: f64) -> f64 {
        self.m * x + self.b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn linear_through_two_points() {
        let f = Linear::through((250.0, 0.7), (100.0, 0.0));
        assert!((f.y(100.0) - 0.0).abs() < 1e-9);
        assert!((f.y(250.0) - 0.7).abs() < 1e-9);
        assert!((f.y(175.0) - 0.35).abs() < 1e-9);
    }

    #[test]
    fn round_to_step_tenths() {
        assert_eq!(round_to_step(0.347, 0.1), 0.3);
        assert_eq!(round_to_step(0.36, 0.1), 0.4);
        assert_eq!(round_to_step(0.96, 0.1), 1.0);
        assert_eq!(round_to_step(0.0, 0.1), 0.0);
        assert_eq!(round_to_step(0.123, 0.0), 0.123);
    }

    #[test]
    fn midpoint_and_hours() {
        let t0 = Instant::now();
        let t1 = t0 + Duration::from_secs(3_600);
        assert_eq!(midpoint(t0, t1), t0 + Duration::from_secs(1_800));
        assert!((hours_between(t0, t1) - 1.0).abs() < 1e-12);
        assert_eq!(hours_between(t1, t0), 0.0);
    }

    #[test]
    fn clamp_unit_handles_nan() {
        assert_eq!(clamp_unit(f64::NAN), 0.0);
        assert_eq!(clamp_unit(1.7), 1.0);
        assert_eq!(clamp_unit(-0.2), 0.0);
    }
}
