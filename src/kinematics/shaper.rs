//! Input shapers cancelling resonance vibrations in the XY plane.
//!
//! The filtered position is the convolution of the trajectory with a small
//! set of delayed, amplitude-weighted impulses tuned for the damped spring
//! period of the axis.

use std::f64::consts::PI;

use thiserror::Error;

use crate::kinematics::{AxisFlags, FilterError, StepperKinematics, DUMMY_T};
use crate::trapq::{Move, TrapQueue};

const EI_SHAPER_VIB_TOL: f64 = 0.05;

#[derive(Debug, Error)]
pub enum ShaperError {
    #[error("unknown input shaper type {0:?}")]
    UnknownShaper(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaperType {
    Zv,
    Zvd,
    Zvdd,
    Zvddd,
    Ei,
    TwoHumpEi,
}

impl ShaperType {
    pub fn parse(s: &str) -> Result<ShaperType, ShaperError> {
        match s.to_lowercase().as_str() {
            "zv" => Ok(ShaperType::Zv),
            "zvd" => Ok(ShaperType::Zvd),
            "zvdd" => Ok(ShaperType::Zvdd),
            "zvddd" => Ok(ShaperType::Zvddd),
            "ei" => Ok(ShaperType::Ei),
            "2hump_ei" => Ok(ShaperType::TwoHumpEi),
            _ => Err(ShaperError::UnknownShaper(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShaperPulse {
    pub t: f64,
    pub a: f64,
}

// Per-half-period vibration decay of the damped spring.
fn calc_zv_k(damping_ratio: f64) -> f64 {
    if damping_ratio == 0. {
        return 1.;
    }
    (-damping_ratio * PI / (1. - damping_ratio * damping_ratio).sqrt()).exp()
}

/// Impulse train for the given shaper, tuned for the damped spring
/// half-period. Amplitudes always sum to 1.
pub fn shaper_pulses(
    shaper_type: ShaperType,
    half_period: f64,
    damping_ratio: f64,
) -> Vec<ShaperPulse> {
    match shaper_type {
        ShaperType::Zv => {
            let k = calc_zv_k(damping_ratio);
            let inv_d = 1. / (1. + k);
            vec![
                ShaperPulse { t: -0.5 * half_period, a: k * inv_d },
                ShaperPulse { t: 0.5 * half_period, a: inv_d },
            ]
        }
        ShaperType::Zvd => {
            let k = calc_zv_k(damping_ratio);
            let k2 = k * k;
            let inv_d = 1. / (k2 + 2. * k + 1.);
            vec![
                ShaperPulse { t: -half_period, a: k2 * inv_d },
                ShaperPulse { t: 0., a: 2. * k * inv_d },
                ShaperPulse { t: half_period, a: inv_d },
            ]
        }
        ShaperType::Zvdd => {
            let k = calc_zv_k(damping_ratio);
            let k2 = k * k;
            let k3 = k2 * k;
            let inv_d = 1. / (k3 + 3. * k2 + 3. * k + 1.);
            vec![
                ShaperPulse { t: -1.5 * half_period, a: k3 * inv_d },
                ShaperPulse { t: -0.5 * half_period, a: 3. * k2 * inv_d },
                ShaperPulse { t: 0.5 * half_period, a: 3. * k * inv_d },
                ShaperPulse { t: 1.5 * half_period, a: inv_d },
            ]
        }
        ShaperType::Zvddd => {
            let k = calc_zv_k(damping_ratio);
            let k2 = k * k;
            let k3 = k2 * k;
            let k4 = k3 * k;
            let inv_d = 1. / (k4 + 4. * k3 + 6. * k2 + 4. * k + 1.);
            vec![
                ShaperPulse { t: -2. * half_period, a: k4 * inv_d },
                ShaperPulse { t: -half_period, a: 4. * k3 * inv_d },
                ShaperPulse { t: 0., a: 6. * k2 * inv_d },
                ShaperPulse { t: half_period, a: 4. * k * inv_d },
                ShaperPulse { t: 2. * half_period, a: inv_d },
            ]
        }
        ShaperType::Ei => {
            let k = (-PI * damping_ratio).exp();
            let a2 = 2. * (1. - EI_SHAPER_VIB_TOL) / (1. + EI_SHAPER_VIB_TOL) * k;
            let a3 = k * k;
            let inv_d = 1. / (1. + a2 + a3);
            vec![
                ShaperPulse { t: -half_period, a: a3 * inv_d },
                ShaperPulse { t: 0., a: a2 * inv_d },
                ShaperPulse { t: half_period, a: inv_d },
            ]
        }
        ShaperType::TwoHumpEi => {
            let d_r = damping_ratio;
            let d_r2 = d_r * d_r;
            let d_r3 = d_r2 * d_r;

            // Coefficients calculated for 5% vibration tolerance
            let t1 = -0.75;
            let t2 = 0.49890 - 0.75 + 0.16270 * d_r - 0.54262 * d_r2 + 6.16180 * d_r3;
            let t3 = 0.99748 - 0.75 + 0.18382 * d_r - 1.58270 * d_r2 + 8.17120 * d_r3;
            let t4 = 1.49920 - 0.75 - 0.09297 * d_r - 0.28338 * d_r2 + 1.85710 * d_r3;

            let a1 = 0.16054 + 0.76699 * d_r + 2.26560 * d_r2 - 1.22750 * d_r3;
            let a2 = 0.33911 + 0.45081 * d_r - 2.58080 * d_r2 + 1.73650 * d_r3;
            let a3 = 0.34089 - 0.61533 * d_r - 0.68765 * d_r2 + 0.42261 * d_r3;
            let a4 = 0.15997 - 0.60246 * d_r + 1.00280 * d_r2 - 0.93145 * d_r3;

            // The amplitudes come from a polynomial expansion and can drift
            // slightly off unit sum; re-normalize to avoid print scaling.
            let inv_d = 1. / (a1 + a2 + a3 + a4);
            vec![
                ShaperPulse { t: -2. * half_period * t4, a: a4 * inv_d },
                ShaperPulse { t: -2. * half_period * t3, a: a3 * inv_d },
                ShaperPulse { t: -2. * half_period * t2, a: a2 * inv_d },
                ShaperPulse { t: -2. * half_period * t1, a: a1 * inv_d },
            ]
        }
    }
}

// Convolve the axis position with the impulse train, walking the segment
// list as pulse offsets cross segment boundaries.
fn convolve(
    tq: &TrapQueue,
    idx: usize,
    axis: usize,
    move_time: f64,
    pulses: &[ShaperPulse],
) -> f64 {
    let mut i = idx;
    let mut time = move_time + pulses[0].t;
    while time < 0. && i > 0 {
        i -= 1;
        time += tq.get(i).move_t;
    }
    let last = tq.len() - 1;
    let mut res = 0.;
    for (j, pulse) in pulses.iter().enumerate() {
        res += pulse.a * tq.get(i).axis_coord(axis, time);
        if j + 1 >= pulses.len() {
            break;
        }
        time += pulses[j + 1].t - pulse.t;
        while time > tq.get(i).move_t && i < last {
            time -= tq.get(i).move_t;
            i += 1;
        }
    }
    res
}

/// Input-shaper filter wrapping a base kinematics hook.
pub struct InputShaper {
    orig: Box<dyn StepperKinematics>,
    x_pulses: Vec<ShaperPulse>,
    y_pulses: Vec<ShaperPulse>,
    scratch: Move,
}

impl InputShaper {
    pub fn new(orig: Box<dyn StepperKinematics>) -> Result<InputShaper, FilterError> {
        let flags = orig.active_flags();
        if !flags.has_x() && !flags.has_y() {
            return Err(FilterError::InactiveAxes);
        }
        Ok(InputShaper {
            orig,
            x_pulses: Vec::new(),
            y_pulses: Vec::new(),
            scratch: Move {
                move_t: 2. * DUMMY_T,
                ..Move::default()
            },
        })
    }

    /// Configure the impulse trains for the wrapped hook's active axes from
    /// the damped spring period and damping ratio of each axis.
    pub fn set_shaper_params(
        &mut self,
        shaper_type: ShaperType,
        damped_spring_period_x: f64,
        damped_spring_period_y: f64,
        damping_ratio_x: f64,
        damping_ratio_y: f64,
    ) {
        let flags = self.orig.active_flags();
        if flags.has_x() {
            self.x_pulses =
                shaper_pulses(shaper_type, 0.5 * damped_spring_period_x, damping_ratio_x);
        }
        if flags.has_y() {
            self.y_pulses =
                shaper_pulses(shaper_type, 0.5 * damped_spring_period_y, damping_ratio_y);
        }
    }

    pub fn x_pulses(&self) -> &[ShaperPulse] {
        &self.x_pulses
    }

    pub fn y_pulses(&self) -> &[ShaperPulse] {
        &self.y_pulses
    }
}

impl StepperKinematics for InputShaper {
    fn calc_position(&mut self, tq: &TrapQueue, idx: usize, move_time: f64) -> f64 {
        if self.x_pulses.is_empty() && self.y_pulses.is_empty() {
            return self.orig.calc_position(tq, idx, move_time);
        }
        let flags = self.orig.active_flags();
        self.scratch.start_pos = tq.get(idx).get_coord(move_time);
        if flags.has_x() && !self.x_pulses.is_empty() {
            self.scratch.start_pos.x = convolve(tq, idx, 0, move_time, &self.x_pulses);
        }
        if flags.has_y() && !self.y_pulses.is_empty() {
            self.scratch.start_pos.y = convolve(tq, idx, 1, move_time, &self.y_pulses);
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
        let flags = self.orig.active_flags();
        let mut pre = 0.;
        if flags.has_x() {
            if let Some(p) = self.x_pulses.first() {
                pre = -p.t;
            }
        }
        if flags.has_y() {
            if let Some(p) = self.y_pulses.first() {
                pre = pre.max(-p.t);
            }
        }
        pre
    }

    fn scan_future(&self) -> f64 {
        let flags = self.orig.active_flags();
        let mut post = 0.;
        if flags.has_x() {
            if let Some(p) = self.x_pulses.last() {
                post = p.t;
            }
        }
        if flags.has_y() {
            if let Some(p) = self.y_pulses.last() {
                post = post.max(p.t);
            }
        }
        post
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_shapers_normalise_to_unit_sum() {
        let types = [
            ShaperType::Zv,
            ShaperType::Zvd,
            ShaperType::Zvdd,
            ShaperType::Zvddd,
            ShaperType::Ei,
            ShaperType::TwoHumpEi,
        ];
        for &ty in &types {
            for &zeta in &[0., 0.05, 0.1, 0.2] {
                let pulses = shaper_pulses(ty, 0.02, zeta);
                let total: f64 = pulses.iter().map(|p| p.a).sum();
                assert!(
                    (total - 1.).abs() < 1e-12,
                    "{:?} zeta={}: sum {}",
                    ty,
                    zeta,
                    total
                );
            }
        }
    }

    #[test]
    fn pulse_times_are_ascending() {
        for &ty in &[
            ShaperType::Zv,
            ShaperType::Zvd,
            ShaperType::Zvdd,
            ShaperType::Zvddd,
            ShaperType::Ei,
            ShaperType::TwoHumpEi,
        ] {
            let pulses = shaper_pulses(ty, 0.02, 0.1);
            for pair in pulses.windows(2) {
                assert!(pair[0].t < pair[1].t, "{:?}", ty);
            }
        }
    }

    #[test]
    fn zv_matches_reference_amplitudes() {
        // damping_ratio 0.1, damped_spring_period 0.04s
        let pulses = shaper_pulses(ShaperType::Zv, 0.02, 0.1);
        assert_eq!(pulses.len(), 2);
        let k = (-0.1 * PI / 0.99f64.sqrt()).exp();
        assert!((k - 0.7309).abs() < 1e-4);
        assert!((pulses[0].t + 0.01).abs() < 1e-12);
        assert!((pulses[1].t - 0.01).abs() < 1e-12);
        assert!((pulses[0].a - k / (1. + k)).abs() < 1e-12);
        assert!((pulses[1].a - 1. / (1. + k)).abs() < 1e-12);
        assert!((pulses[0].a - 0.4223).abs() < 1e-4);
        assert!((pulses[1].a - 0.5777).abs() < 1e-4);
    }

    #[test]
    fn parse_rejects_unknown_type() {
        assert!(ShaperType::parse("zvd").is_ok());
        assert!(ShaperType::parse("mzv").is_err());
    }
}
