//! Kinematic filter smoothing cartesian XY movements.

use crate::kinematics::{range_integrate, AxisFlags, FilterError, StepperKinematics, DUMMY_T};
use crate::smoother::Smoother;
use crate::trapq::{Move, TrapQueue};

/// Replaces the commanded XY positions with their weighted average over a
/// sliding window, optionally adding velocity- and acceleration-proportional
/// compensation terms, before delegating to the wrapped hook.
pub struct SmoothAxis {
    orig: Box<dyn StepperKinematics>,
    x: Option<Smoother>,
    y: Option<Smoother>,
    x_damping_comp: f64,
    y_damping_comp: f64,
    x_accel_comp: f64,
    y_accel_comp: f64,
    scratch: Move,
}

impl SmoothAxis {
    pub fn new(orig: Box<dyn StepperKinematics>) -> Result<SmoothAxis, FilterError> {
        let flags = orig.active_flags();
        if !flags.has_x() && !flags.has_y() {
            return Err(FilterError::InactiveAxes);
        }
        Ok(SmoothAxis {
            orig,
            x: None,
            y: None,
            x_damping_comp: 0.,
            y_damping_comp: 0.,
            x_accel_comp: 0.,
            y_accel_comp: 0.,
            scratch: Move {
                move_t: 2. * DUMMY_T,
                ..Move::default()
            },
        })
    }

    /// Set the smoothing window widths; zero disables smoothing for an axis.
    pub fn set_smooth_time(&mut self, smooth_x: f64, smooth_y: f64) {
        self.x = (smooth_x > 0.).then(|| Smoother::new(smooth_x));
        self.y = (smooth_y > 0.).then(|| Smoother::new(smooth_y));
    }

    pub fn set_accel_comp(&mut self, accel_comp_x: f64, accel_comp_y: f64) {
        self.x_accel_comp = accel_comp_x;
        self.y_accel_comp = accel_comp_y;
    }

    pub fn set_damping_comp(&mut self, damping_comp_x: f64, damping_comp_y: f64) {
        self.x_damping_comp = damping_comp_x;
        self.y_damping_comp = damping_comp_y;
    }
}

impl StepperKinematics for SmoothAxis {
    fn calc_position(&mut self, tq: &TrapQueue, idx: usize, move_time: f64) -> f64 {
        if self.x.is_none() && self.y.is_none() {
            return self.orig.calc_position(tq, idx, move_time);
        }
        let flags = self.orig.active_flags();
        self.scratch.start_pos = tq.get(idx).get_coord(move_time);
        if flags.has_x() {
            if let Some(sm) = self.x {
                self.scratch.start_pos.x = range_integrate(
                    tq,
                    idx,
                    0,
                    move_time,
                    &sm,
                    self.x_damping_comp,
                    self.x_accel_comp,
                );
            }
        }
        if flags.has_y() {
            if let Some(sm) = self.y {
                self.scratch.start_pos.y = range_integrate(
                    tq,
                    idx,
                    1,
                    move_time,
                    &sm,
                    self.y_damping_comp,
                    self.y_accel_comp,
                );
            }
        }
        let scratch = self.scratch;
        self.orig.calc_position_at(&scratch, DUMMY_T)
    }

    fn calc_position_at(&mut self, m: &Move, move_time: f64) -> f64 {
        self.orig.calc_position_at(m, move_time)
    }

    fn active_flags(&self) -> AxisFlags {
        self.orig.active_flags()
    }

    fn scan_past(&self) -> f64 {
        self.scan_future()
    }

    fn scan_future(&self) -> f64 {
        let flags = self.orig.active_flags();
        let mut hst = 0.;
        if flags.has_x() {
            if let Some(sm) = self.x {
                hst = sm.hst;
            }
        }
        if flags.has_y() {
            if let Some(sm) = self.y {
                hst = hst.max(sm.hst);
            }
        }
        hst
    }
}
