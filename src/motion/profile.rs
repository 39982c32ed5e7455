//! Jerk-limited S-curve area formulas (spec §4.3, §4.4).
//!
//! Grounded in `motion::s_curve`'s jerk-phase math, completed — the teacher's
//! version stops after the first two phases ("Continue with remaining
//! phases... Implementation would be quite lengthy"). This models a
//! symmetric two-sub-phase ramp (concave half, convex half) with no
//! constant-acceleration plateau, which is closed-form integrable and
//! monotone in length at fixed jerk, satisfying spec §4.3's "or equivalent
//! closed-form" allowance for the Δv-vs-length relation.

/// One head or tail ramp between two velocities under a jerk bound.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JerkRamp {
    pub v_start: f64,
    pub v_end: f64,
    pub jerk: f64,
    pub half_time: f64,
    pub total_time: f64,
    pub length: f64,
}

impl JerkRamp {
    pub fn new(v_start: f64, v_end: f64, jerk: f64) -> Self {
        let dv = (v_end - v_start).abs();
        if dv < 1e-12 || jerk <= 0.0 {
            return Self { v_start, v_end, jerk: jerk.max(1e-9), half_time: 0.0, total_time: 0.0, length: 0.0 };
        }
        let half_time = (dv / jerk).sqrt();
        let total_time = 2.0 * half_time;
        // Average velocity over a symmetric ramp is the arithmetic mean of its
        // endpoints regardless of direction; length = avg_velocity * total_time.
        let length = (v_start + v_end) * half_time;
        Self { v_start, v_end, jerk, half_time, total_time, length }
    }

    /// Velocity at elapsed time `t` (seconds) into this ramp.
    pub fn velocity_at(&self, t: f64) -> f64 {
        if self.total_time <= 0.0 {
            return self.v_end;
        }
        let t = t.clamp(0.0, self.total_time);
        let rising = self.v_end >= self.v_start;
        let j = if rising { self.jerk } else { -self.jerk };
        if t <= self.half_time {
            self.v_start + 0.5 * j * t * t
        } else {
            let remaining = self.total_time - t;
            self.v_end - 0.5 * j * remaining * remaining
        }
    }

    /// Distance covered from the start of the ramp through elapsed time
    /// `t`, the exact integral of `velocity_at` (closed form; matches
    /// `self.length` at `t == total_time`).
    pub fn distance_at(&self, t: f64) -> f64 {
        if self.total_time <= 0.0 {
            return 0.0;
        }
        let t = t.clamp(0.0, self.total_time);
        let rising = self.v_end >= self.v_start;
        let j = if rising { self.jerk } else { -self.jerk };
        if t <= self.half_time {
            self.v_start * t + (j / 6.0) * t.powi(3)
        } else {
            let dist_half = self.v_start * self.half_time + (j / 6.0) * self.half_time.powi(3);
            let remaining = self.total_time - t;
            dist_half + self.v_end * (t - self.half_time) - (j / 6.0) * (self.half_time.powi(3) - remaining.powi(3))
        }
    }
}

/// The largest Δv achievable within `length` under jerk bound `jerk`,
/// starting and ending within the move (spec §4.3 `delta_vmax`).
pub fn delta_vmax(length: f64, jerk: f64) -> f64 {
    if length <= 0.0 || jerk <= 0.0 {
        return 0.0;
    }
    (length * length * jerk).cbrt()
}

/// Inverse of `delta_vmax`: the ramp length needed to change velocity by
/// `delta_v` under `jerk`.
pub fn length_for_delta_v(delta_v: f64, jerk: f64) -> f64 {
    if jerk <= 0.0 || delta_v <= 0.0 {
        return 0.0;
    }
    delta_v.powf(1.5) / jerk.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_vmax_and_length_are_inverses() {
        let jerk = 5_000_000.0;
        let dv = 120.0;
        let length = length_for_delta_v(dv, jerk);
        let recovered = delta_vmax(length, jerk);
        assert!((recovered - dv).abs() < 1e-6);
    }

    #[test]
    fn ramp_reaches_endpoints_exactly() {
        let ramp = JerkRamp::new(0.0, 100.0, 2_000_000.0);
        assert!((ramp.velocity_at(0.0) - 0.0).abs() < 1e-9);
        assert!((ramp.velocity_at(ramp.total_time) - 100.0).abs() < 1e-6);
    }

    #[test]
    fn ramp_midpoint_is_average_velocity() {
        let ramp = JerkRamp::new(10.0, 50.0, 1_000_000.0);
        let mid = ramp.velocity_at(ramp.half_time);
        assert!((mid - 30.0).abs() < 1e-6);
    }

    #[test]
    fn zero_length_ramp_for_equal_endpoints() {
        let ramp = JerkRamp::new(40.0, 40.0, 1_000_000.0);
        assert_eq!(ramp.length, 0.0);
        assert_eq!(ramp.total_time, 0.0);
    }

    #[test]
    fn distance_at_total_time_matches_length() {
        let ramp = JerkRamp::new(5.0, 80.0, 3_000_000.0);
        assert!((ramp.distance_at(ramp.total_time) - ramp.length).abs() < 1e-6);
    }

    #[test]
    fn distance_at_is_monotone_increasing() {
        let ramp = JerkRamp::new(0.0, 200.0, 4_000_000.0);
        let mut prev = 0.0;
        let mut t = 0.0;
        while t <= ramp.total_time {
            let d = ramp.distance_at(t);
            assert!(d + 1e-9 >= prev);
            prev = d;
            t += ramp.total_time / 20.0;
        }
    }
}
