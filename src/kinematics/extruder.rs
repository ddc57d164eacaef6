//! Extruder stepper with smoothed pressure advance.
//!
//! The extruder runs on its own trajectory queue with the extrusion distance
//! carried in the x slot. With pressure advance enabled the stepper follows
//! `position + pressure_advance * velocity` averaged over the smoothing
//! window; with `smooth_time == 0` it follows the raw position.

use crate::kinematics::{range_integrate, AxisFlags, StepperKinematics};
use crate::smoother::Smoother;
use crate::trapq::{Move, TrapQueue};

pub struct ExtruderStepper {
    pressure_advance: f64,
    smoother: Option<Smoother>,
}

impl Default for ExtruderStepper {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtruderStepper {
    pub fn new() -> ExtruderStepper {
        ExtruderStepper {
            pressure_advance: 0.,
            smoother: None,
        }
    }

    /// Configure pressure advance; `smooth_time == 0` disables the filter
    /// entirely.
    pub fn set_pressure_advance(&mut self, pressure_advance: f64, smooth_time: f64) {
        self.pressure_advance = pressure_advance;
        self.smoother = (smooth_time > 0.).then(|| Smoother::new(smooth_time));
    }
}

impl StepperKinematics for ExtruderStepper {
    fn calc_position(&mut self, tq: &TrapQueue, idx: usize, move_time: f64) -> f64 {
        match self.smoother {
            Some(sm) => range_integrate(tq, idx, 0, move_time, &sm, self.pressure_advance, 0.),
            None => tq.get(idx).axis_coord(0, move_time),
        }
    }

    fn calc_position_at(&mut self, m: &Move, move_time: f64) -> f64 {
        m.axis_coord(0, move_time)
    }

    fn active_flags(&self) -> AxisFlags {
        AxisFlags::new().with_x()
    }

    fn scan_past(&self) -> f64 {
        self.smoother.map(|sm| sm.hst).unwrap_or(0.)
    }

    fn scan_future(&self) -> f64 {
        self.scan_past()
    }
}
