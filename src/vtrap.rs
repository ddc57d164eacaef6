//! Velocity-trapezoid assembler.
//!
//! Collects the moves of one accel/cruise/decel trapezoid (a contiguous run
//! of the queue), fixes the peak cruise velocity and materialises per-move
//! ramp timing by inverting the combined ramp's S-curve.

use std::collections::VecDeque;

use crate::accel_group::{GroupKind, GroupRef};
use crate::moveq::{group, group_mut, PlanError, QMove};
use crate::scurve::SCurve;
use crate::EPSILON;

#[derive(Debug, Default)]
pub struct VTrap {
    /// Contiguous queue range covered by the trapezoid, valid when `len > 0`.
    lo: usize,
    hi: usize,
    len: usize,
    accel_head: Option<usize>,
    decel_head: Option<usize>,
}

impl VTrap {
    pub fn new() -> VTrap {
        VTrap::default()
    }

    pub fn decel_head(&self) -> Option<usize> {
        self.decel_head
    }

    fn push(&mut self, idx: usize) {
        if self.len == 0 {
            self.lo = idx;
        }
        self.hi = idx;
        self.len += 1;
    }

    pub fn add_as_accel(&mut self, idx: usize) {
        self.push(idx);
        self.accel_head = Some(idx);
    }

    pub fn add_as_decel(&mut self, idx: usize) {
        if self.decel_head.is_none() {
            self.decel_head = Some(idx);
        }
        if self.accel_head != Some(idx) {
            self.push(idx);
        }
    }

    /// Fix the peak cruise velocity, materialise ramp timings for every move
    /// of the trapezoid and clear the assembler. Returns the index of the
    /// last move covered.
    pub fn flush(&mut self, moves: &mut VecDeque<QMove>) -> Result<Option<usize>, PlanError> {
        if self.len == 0 {
            return Ok(None);
        }
        let Some(decel_head) = self.decel_head else {
            return Ok(None);
        };
        let peak_cruise_v2 = calc_trap_peak_v2(moves, self.accel_head, decel_head);
        set_trap_decel(moves, decel_head, self.hi, peak_cruise_v2)?;
        if let Some(accel_head) = self.accel_head {
            set_trap_accel(moves, accel_head, self.lo, peak_cruise_v2)?;
        }
        let last = self.hi;
        self.clear();
        Ok(Some(last))
    }

    pub fn clear(&mut self) {
        self.len = 0;
        self.accel_head = None;
        self.decel_head = None;
    }
}

// Peak velocity^2 of a trapezoid contained in a single move, found by
// bisection over the accel and decel ramp distances.
fn calc_move_peak_v2(moves: &VecDeque<QMove>, idx: usize) -> f64 {
    let m = &moves[idx];
    let accel = m.accel_group;
    let decel = m.decel_group;
    if accel.accel_order == 2 {
        let effective_accel = accel.max_accel.min(decel.max_accel);
        return (accel.max_start_v2 + decel.max_start_v2 + 2. * m.move_d * effective_accel) * 0.5;
    }
    let accel_start = resolve_start(moves, idx, GroupKind::Accel);
    let decel_start = resolve_start(moves, idx, GroupKind::Decel);
    let total_d = accel.combined_d + decel.combined_d - m.move_d;
    let mut high_v = accel.max_end_v2.max(decel.max_end_v2).sqrt();
    let mut low_v = 0.;
    while high_v - low_v > EPSILON {
        let guess_v = (high_v + low_v) * 0.5;
        let accel_d = accel.calc_min_accel_dist(guess_v, accel_start);
        let decel_d = decel.calc_min_accel_dist(guess_v, decel_start);
        if accel_d <= accel.combined_d && decel_d <= decel.combined_d && accel_d + decel_d <= total_d
        {
            low_v = guess_v;
        } else {
            high_v = guess_v;
        }
    }
    low_v * low_v
}

fn resolve_start(moves: &VecDeque<QMove>, idx: usize, kind: GroupKind) -> f64 {
    let r = GroupRef { move_idx: idx, kind };
    let g = group(moves, r);
    match g.start {
        Some(s) => group(moves, s).max_start_v,
        None => g.max_start_v,
    }
}

fn calc_trap_peak_v2(
    moves: &VecDeque<QMove>,
    accel_head: Option<usize>,
    decel_head: usize,
) -> f64 {
    if accel_head != Some(decel_head) {
        let dm = &moves[decel_head];
        let mut peak_v2 = dm.decel_group.max_end_v2.min(dm.junction_max_v2);
        if let Some(ah) = accel_head {
            peak_v2 = peak_v2.min(moves[ah].accel_group.max_end_v2);
        }
        return peak_v2;
    }
    let peak_v2 = calc_move_peak_v2(moves, decel_head);
    peak_v2.min(moves[decel_head].max_cruise_v2)
}

/// Materialise the ramp timing of one combined group at the given cruise
/// velocity. `time_offset_from_start` selects whether per-move offsets are
/// measured from the start or the end of the combined ramp.
pub(crate) fn set_accel(
    moves: &mut VecDeque<QMove>,
    target: GroupRef,
    cruise_v2: f64,
    time_offset_from_start: bool,
) -> Result<(), PlanError> {
    let combined = *group(moves, target);
    let start_ref = combined.start.unwrap_or(target);
    if group(moves, start_ref).max_start_v2 > cruise_v2 {
        group_mut(moves, start_ref).set_max_start_v2(cruise_v2);
    }
    let start_accel_v = group(moves, start_ref).max_start_v;
    let cruise_v = cruise_v2.sqrt();
    let avg_v = (cruise_v + start_accel_v) * 0.5;
    let combined_accel_t = combined.calc_min_accel_time(cruise_v, start_accel_v);
    let combined_accel_d = avg_v * combined_accel_t;
    if combined_accel_d > combined.combined_d + EPSILON {
        return Err(PlanError::AccelOverrun {
            needed: combined_accel_d,
            available: combined.combined_d,
        });
    }
    let effective_accel = combined.calc_effective_accel(cruise_v, start_accel_v);
    let s = SCurve::fill(
        combined.accel_order,
        combined_accel_t,
        0.,
        combined_accel_t,
        start_accel_v,
        effective_accel,
        0.,
    );
    let mut remaining_accel_t = combined_accel_t;
    let mut remaining_accel_d = combined_accel_d;
    let mut a = start_ref;
    loop {
        moves[a.move_idx].cruise_v = cruise_v;
        if remaining_accel_d > 0. {
            let move_d = moves[a.move_idx].move_d;
            let g = group_mut(moves, a);
            g.effective_accel = effective_accel;
            g.total_accel_t = combined_accel_t;
            g.accel_d = move_d.min(remaining_accel_d);
            g.start_accel_v = start_accel_v;
            let next_pos = g.accel_d + combined_accel_d - remaining_accel_d;
            if time_offset_from_start {
                g.accel_offset_t = combined_accel_t - remaining_accel_t;
                g.accel_t = s.get_time(next_pos) - g.accel_offset_t;
            } else {
                g.accel_offset_t = combined_accel_t - s.get_time(next_pos);
                g.accel_t = remaining_accel_t - g.accel_offset_t;
            }
            remaining_accel_t -= g.accel_t;
            remaining_accel_d -= move_d;
        }
        if a == target {
            break;
        }
        a = group(moves, a)
            .next
            .expect("broken ramp chain between start and target");
    }
    Ok(())
}

fn set_trap_decel(
    moves: &mut VecDeque<QMove>,
    decel_head: usize,
    hi: usize,
    mut cruise_v2: f64,
) -> Result<(), PlanError> {
    let mut m = decel_head;
    loop {
        let target = GroupRef {
            move_idx: m,
            kind: GroupKind::Decel,
        };
        set_accel(moves, target, cruise_v2, false)?;
        let start_idx = group(moves, target).start.map(|r| r.move_idx).unwrap_or(m);
        cruise_v2 = cruise_v2.min(moves[start_idx].decel_group.max_start_v2);
        if start_idx + 1 > hi {
            break;
        }
        m = start_idx + 1;
    }
    Ok(())
}

fn set_trap_accel(
    moves: &mut VecDeque<QMove>,
    accel_head: usize,
    lo: usize,
    mut cruise_v2: f64,
) -> Result<(), PlanError> {
    let mut m = accel_head;
    loop {
        let target = GroupRef {
            move_idx: m,
            kind: GroupKind::Accel,
        };
        set_accel(moves, target, cruise_v2, true)?;
        let start_idx = group(moves, target).start.map(|r| r.move_idx).unwrap_or(m);
        cruise_v2 = cruise_v2.min(moves[start_idx].accel_group.max_start_v2);
        if start_idx == 0 || start_idx - 1 < lo {
            break;
        }
        m = start_idx - 1;
    }
    Ok(())
}
