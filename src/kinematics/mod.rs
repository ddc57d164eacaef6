//! Stepper kinematics hooks and the convolution filter chain.

use thiserror::Error;

use crate::smoother::Smoother;
use crate::trapq::{Move, TrapQueue};

pub mod cartesian;
pub mod extruder;
pub mod shaper;
pub mod smooth_axis;

pub use cartesian::{Axis, CartesianStepper};
pub use extruder::ExtruderStepper;
pub use shaper::{InputShaper, ShaperError, ShaperType};
pub use smooth_axis::SmoothAxis;

/// Sentinel time used when evaluating a synthesised move with pre-computed
/// coordinates; the scratch move spans `2 * DUMMY_T` so any smoothing window
/// around it stays inside.
pub(crate) const DUMMY_T: f64 = 500.0;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("wrapped kinematics is not active on any filtered axis")]
    InactiveAxes,
}

/// Bitset over the cartesian axes a stepper reacts to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisFlags(u8);

impl AxisFlags {
    const X: u8 = 1 << 0;
    const Y: u8 = 1 << 1;
    const Z: u8 = 1 << 2;

    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn with_x(mut self) -> Self {
        self.0 |= Self::X;
        self
    }

    pub const fn with_y(mut self) -> Self {
        self.0 |= Self::Y;
        self
    }

    pub const fn with_z(mut self) -> Self {
        self.0 |= Self::Z;
        self
    }

    pub const fn has_x(&self) -> bool {
        self.0 & Self::X != 0
    }

    pub const fn has_y(&self) -> bool {
        self.0 & Self::Y != 0
    }

    pub const fn has_z(&self) -> bool {
        self.0 & Self::Z != 0
    }

    pub fn has_axis(&self, axis: usize) -> bool {
        match axis {
            0 => self.has_x(),
            1 => self.has_y(),
            2 => self.has_z(),
            _ => false,
        }
    }
}

/// Per-stepper position polymorphism. Filters wrap another hook and forward
/// through [`StepperKinematics::calc_position_at`] with a synthesised move
/// carrying the filtered coordinates.
pub trait StepperKinematics {
    /// Position of this stepper at `move_time` within segment `idx` of the
    /// trajectory queue. Filters override this to look at neighbouring
    /// segments.
    fn calc_position(&mut self, tq: &TrapQueue, idx: usize, move_time: f64) -> f64 {
        let m = *tq.get(idx);
        self.calc_position_at(&m, move_time)
    }

    /// Position for a standalone move, used with synthesised scratch moves.
    fn calc_position_at(&mut self, m: &Move, move_time: f64) -> f64;

    fn active_flags(&self) -> AxisFlags;

    /// How far before a move the hook looks when generating steps.
    fn scan_past(&self) -> f64 {
        0.
    }

    /// How far after a move the hook looks when generating steps.
    fn scan_future(&self) -> f64 {
        0.
    }
}

/// Smooth one axis of the trajectory around `move_time` in segment `idx`:
/// the weighted integral of `pos + deriv_comp*pos' + accel_comp*pos''` over
/// the kernel window, with velocity-jump corrections for the twice
/// differentiated term. The result is already normalised.
pub(crate) fn range_integrate(
    tq: &TrapQueue,
    idx: usize,
    axis: usize,
    move_time: f64,
    sm: &Smoother,
    deriv_comp: f64,
    accel_comp: f64,
) -> f64 {
    let (mut i, start) = tq.find_move(idx, move_time - sm.hst);
    // Local time of the window centre within segment i.
    let mut center = start + sm.hst;
    let mut local_start = start;
    let mut res = 0.;
    let last = tq.len() - 1;
    loop {
        let m = tq.get(i);
        let axis_r = m.axes_r.axis(axis);
        let base = m.s.copy_scaled(axis_r);
        let mut work = base;
        let mut pos = m.start_pos.axis(axis);
        if deriv_comp != 0. {
            pos += work.add_deriv(&base, deriv_comp);
        }
        if accel_comp != 0. {
            pos += work.add_2nd_deriv(&base, accel_comp);
        }
        let local_end = if i == last {
            center + sm.hst
        } else {
            (center + sm.hst).min(m.move_t)
        };
        res += sm.integrate_weighted(pos, &work, local_start, local_end, -center);
        if accel_comp != 0. {
            res += accel_comp * sm.integrate_velocity_jumps(&base, local_start, local_end, -center);
        }
        if center + sm.hst <= local_end || i >= last {
            break;
        }
        center -= m.move_t;
        local_start = 0.;
        i += 1;
    }
    res * sm.inv_norm
}
