//! Jerk-limited acceleration limits for groups of moves.
//!
//! An [`AccelGroup`] describes one acceleration (or deceleration) ramp that
//! may span several queued moves combined at a junction. The ramp-start
//! velocity lives in whichever group heads the chain; the math methods take
//! it as an explicit argument and the linkage is kept in [`GroupRef`]-typed
//! `start`/`next` fields resolved against the move queue.

use crate::EPSILON;

/// Which of a move's two ramps a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Accel,
    Decel,
}

/// Address of an accel group inside the move queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupRef {
    pub move_idx: usize,
    pub kind: GroupKind,
}

/// A group of moves accelerating (or decelerating) together.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccelGroup {
    pub accel_order: u32,
    pub max_accel: f64,
    pub min_accel: f64,
    pub max_jerk: f64,
    pub min_jerk_limit_time: f64,
    /// Total length covered by the ramp so far.
    pub combined_d: f64,
    /// Length the ramp consumes inside this move.
    pub accel_d: f64,
    pub accel_t: f64,
    pub accel_offset_t: f64,
    pub total_accel_t: f64,
    pub start_accel_v: f64,
    pub effective_accel: f64,
    pub max_start_v: f64,
    pub max_start_v2: f64,
    pub max_end_v2: f64,
    /// Head of the ramp chain; `None` means this group starts the ramp.
    pub start: Option<GroupRef>,
    /// Next member of the chain towards the group that closed the ramp.
    pub next: Option<GroupRef>,
}

impl AccelGroup {
    pub fn new(accel_order: u32, accel: f64, jerk: f64, min_jerk_limit_time: f64) -> AccelGroup {
        let mut min_accel = jerk * min_jerk_limit_time / 6.;
        if min_accel > accel {
            min_accel = accel;
        }
        AccelGroup {
            accel_order,
            max_accel: accel,
            min_accel,
            max_jerk: jerk,
            min_jerk_limit_time,
            ..AccelGroup::default()
        }
    }

    /// Monotonically lower the acceleration and jerk limits.
    pub fn limit_accel(&mut self, accel: f64, jerk: f64) {
        let accel = accel.max(0.);
        self.max_accel = self.max_accel.min(accel);
        self.max_jerk = self.max_jerk.min(jerk);
        let min_accel = self.max_jerk * self.min_jerk_limit_time / 6.;
        if self.min_accel > min_accel {
            self.min_accel = min_accel;
        }
        if self.min_accel > self.max_accel {
            self.min_accel = self.max_accel;
        }
    }

    pub fn set_max_start_v2(&mut self, start_v2: f64) {
        self.max_start_v2 = start_v2;
        self.max_start_v = start_v2.sqrt();
    }

    /// Velocity^2 reachable after traversing `combined_d` from the given
    /// ramp-start velocity.
    pub fn calc_max_v2(&self, start_v: f64, start_v2: f64) -> f64 {
        let dist = self.combined_d;
        // Check if accel is the limiting factor
        let max_accel_v2 = start_v2 + 2. * dist * self.max_accel;
        if self.accel_order == 2 {
            return max_accel_v2;
        }
        // Compute maximum achievable speed with limited kinematic jerk using
        // max(jerk) == 6 * accel / accel_time, which is exact for accel
        // order 4 and close for accel order 6. This leads to the cubic
        // (max_v^2 - start_v^2) * (max_v + start_v) / 2 == dist^2 * jerk / 3
        // solved with Cardano's formula.
        let a = 2. / 3. * start_v;
        let b = a * a * a;
        let c = dist * dist * self.max_jerk / 3.;
        let max_v = if b * 54. < c {
            // Return the max velocity which works for any start_v below the
            // threshold; the combine algorithm relies on monotonicity of
            // max_v(start_v).
            1.5 * (c * 0.5).powf(1. / 3.)
        } else {
            let d = (c * (c + 2. * b)).sqrt();
            let e = (b + c + d).powf(1. / 3.);
            if e < EPSILON {
                return start_v2;
            }
            e + a * a / e - start_v / 3.
        };
        let mut max_v2 = max_v * max_v;
        if max_accel_v2 < max_v2 {
            max_v2 = max_accel_v2;
        }
        let min_accel_v2 = start_v2 + 2. * dist * self.min_accel;
        if min_accel_v2 > max_v2 {
            max_v2 = min_accel_v2;
        }
        max_v2
    }

    /// Average acceleration over the ramp when cruising at `cruise_v`.
    pub fn calc_effective_accel(&self, cruise_v: f64, start_v: f64) -> f64 {
        if self.accel_order == 2 {
            return self.max_accel;
        }
        let mut effective_accel = (self.max_jerk * (cruise_v - start_v) / 6.).sqrt();
        if effective_accel > self.max_accel {
            effective_accel = self.max_accel;
        }
        if effective_accel < self.min_accel {
            effective_accel = self.min_accel;
        }
        effective_accel
    }

    /// Shortest ramp duration from `start_v` to `cruise_v`.
    pub fn calc_min_accel_time(&self, cruise_v: f64, start_v: f64) -> f64 {
        let delta_v = cruise_v - start_v;
        if delta_v.abs() < EPSILON {
            return 0.;
        }
        let mut min_accel_time = delta_v / self.max_accel;
        if self.accel_order > 2 {
            let accel_t = (6. * delta_v / self.max_jerk).sqrt();
            if accel_t > min_accel_time {
                min_accel_time = accel_t;
            }
        }
        if self.min_accel > 0. {
            let accel_t = delta_v / self.min_accel;
            if accel_t < min_accel_time {
                min_accel_time = accel_t;
            }
        }
        min_accel_time
    }

    /// Distance covered by the shortest ramp from `start_v` to `cruise_v`.
    pub fn calc_min_accel_dist(&self, cruise_v: f64, start_v: f64) -> f64 {
        if cruise_v <= start_v {
            return 0.;
        }
        let accel_t = self.calc_min_accel_time(cruise_v, start_v);
        (start_v + cruise_v) * 0.5 * accel_t
    }

    /// Time to traverse `combined_d` accelerating to `cruise_v` and cruising
    /// for the remainder.
    pub fn calc_min_accel_group_time(&self, cruise_v: f64, start_v: f64) -> f64 {
        if start_v >= cruise_v {
            // No acceleration possible - just cruising
            return self.combined_d / cruise_v;
        }
        let accel_t = self.calc_min_accel_time(cruise_v, start_v);
        let accel_d = (start_v + cruise_v) * 0.5 * accel_t;
        let cruise_t = (self.combined_d - accel_d) / cruise_v;
        accel_t + cruise_t
    }

    /// Highest end-velocity^2 from which the group can decelerate to any
    /// slower velocity over `combined_d`.
    pub fn calc_max_safe_v2(&self, start_v: f64, start_v2: f64) -> f64 {
        let dist = self.combined_d;
        let mut max_v2 = 2. * self.max_accel * dist + start_v2;
        if self.accel_order > 2 {
            // It is possible to accelerate from any velocity to this one over
            // the accumulated distance.
            let mut v2 = ((9. / 16.) * dist * dist * self.max_jerk).powf(2. / 3.);
            // That min v2 is achieved when accelerating from v2 / 9. If
            // start_v2 is smaller than that, the worst case is acceleration
            // from start_v2 itself.
            if start_v2 * 9. < v2 {
                v2 = self.calc_max_v2(start_v, start_v2);
            }
            max_v2 = max_v2.min(v2);
        }
        max_v2
    }

    /// Shortest distance over which deceleration from `cruise_v2` to any
    /// velocity in `[0, cruise_v2]` stays feasible.
    pub fn calc_min_safe_dist(&self, cruise_v2: f64) -> f64 {
        let mut min_dist = cruise_v2 / (2. * self.max_accel);
        if self.accel_order > 2 {
            let d = ((16. / 9.) * cruise_v2.powf(1.5) / self.max_jerk).sqrt();
            min_dist = min_dist.max(d);
        }
        min_dist
    }
}
