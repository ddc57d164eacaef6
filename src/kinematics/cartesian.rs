//! Cartesian kinematics - each stepper directly follows one axis.

use crate::kinematics::{AxisFlags, StepperKinematics};
use crate::trapq::Move;

/// Which axis a stepper controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// Parse axis from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "x" => Some(Axis::X),
            "y" => Some(Axis::Y),
            "z" => Some(Axis::Z),
            _ => None,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

pub struct CartesianStepper {
    axis: Axis,
}

impl CartesianStepper {
    pub fn new(axis: Axis) -> CartesianStepper {
        CartesianStepper { axis }
    }
}

impl StepperKinematics for CartesianStepper {
    fn calc_position_at(&mut self, m: &Move, move_time: f64) -> f64 {
        m.axis_coord(self.axis.index(), move_time)
    }

    fn active_flags(&self) -> AxisFlags {
        match self.axis {
            Axis::X => AxisFlags::new().with_x(),
            Axis::Y => AxisFlags::new().with_y(),
            Axis::Z => AxisFlags::new().with_z(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scurve::SCurve;
    use crate::trapq::Coord;

    #[test]
    fn follows_single_axis() {
        let mut kin = CartesianStepper::new(Axis::Y);
        let m = Move {
            print_time: 0.,
            move_t: 1.,
            start_pos: Coord {
                x: 10.,
                y: 20.,
                z: 30.,
            },
            axes_r: Coord {
                x: 0.,
                y: 1.,
                z: 0.,
            },
            s: SCurve::fill(2, 1., 0., 1., 5., 0., 0.),
        };
        assert_eq!(kin.calc_position_at(&m, 0.5), 22.5);
        assert!(kin.active_flags().has_y());
        assert!(!kin.active_flags().has_x());
    }
}
