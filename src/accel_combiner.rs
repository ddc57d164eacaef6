//! Move combiner computing groups of moves that accelerate together.
//!
//! The combiner keeps a list of junction-point candidates, one per move that
//! could still head the current ramp. Candidates live in a reused `Vec` arena
//! that is reset whenever a ramp cannot be extended.

use std::collections::VecDeque;

use crate::accel_group::{AccelGroup, GroupRef};
use crate::moveq::{group, group_mut, QMove};
use crate::EPSILON;

/// Combined acceleration limits that must be respected from one junction
/// point; `accel` is the candidate's own ramp state (it heads itself).
#[derive(Debug, Clone, Copy)]
pub struct JunctionPoint {
    pub accel: AccelGroup,
    /// The real move group this candidate stands for.
    pub mref: GroupRef,
    pub min_start_time: f64,
    pub min_end_time: f64,
}

#[derive(Debug, Default)]
pub struct AccelCombiner {
    junctions: Vec<JunctionPoint>,
    junct_start_v2: f64,
    min_end_time: f64,
}

impl AccelCombiner {
    pub fn new() -> AccelCombiner {
        AccelCombiner::default()
    }

    /// Drop all candidates and restart ramps from `start_v2`.
    pub fn reset(&mut self, start_v2: f64) {
        self.junctions.clear();
        self.junct_start_v2 = start_v2;
        self.min_end_time = 0.;
    }

    /// Feed the next move's group into the combiner. On return the group
    /// holds the best reachable `max_end_v2`, the covered `combined_d` and a
    /// `start` link to the ramp's true head.
    pub fn process_next_accel(
        &mut self,
        moves: &mut VecDeque<QMove>,
        target: GroupRef,
        junction_max_v2: f64,
    ) {
        let ag = *group(moves, target);
        let qm = &moves[target.move_idx];
        let move_d = qm.move_d;
        let max_cruise_v2 = qm.max_cruise_v2;
        let accel_comp = qm.accel_comp;

        let mut new_jp = JunctionPoint {
            accel: ag,
            mref: target,
            min_start_time: 0.,
            min_end_time: 0.,
        };
        new_jp.accel.start = None;

        let mut start_v2 = junction_max_v2;
        let can_combine = if let Some(prev_jp) = self.junctions.last() {
            let prev_ref = prev_jp.mref;
            let prev_ag = *group(moves, prev_ref);
            let prev_move = &moves[prev_ref.move_idx];
            start_v2 = start_v2.min(prev_ag.max_end_v2).min(prev_move.max_cruise_v2);
            new_jp.min_start_time = self.min_end_time;
            let combinable = ag.accel_order != 2
                && prev_ag.accel_order == ag.accel_order
                && prev_move.accel_comp == accel_comp;
            group_mut(moves, prev_ref).next = Some(target);
            combinable
        } else {
            start_v2 = start_v2.min(self.junct_start_v2);
            false
        };
        new_jp.accel.set_max_start_v2(start_v2);
        if !can_combine {
            self.reset(start_v2);
        }

        // Pop every candidate that could only decelerate into this move.
        let accel_limit_v2 = start_v2.min(junction_max_v2);
        while let Some(last_jp) = self.junctions.last() {
            if last_jp.accel.max_start_v2 + EPSILON < accel_limit_v2 {
                // First point from which acceleration is possible
                break;
            }
            self.junctions.pop();
        }
        // Make sure retained ramps do not exceed junction_max_v2 here.
        for jp in &mut self.junctions {
            let junction_accel_limit =
                0.5 * (junction_max_v2 - jp.accel.max_start_v2) / jp.accel.combined_d;
            jp.accel
                .limit_accel(junction_accel_limit.min(ag.max_accel), ag.max_jerk);
        }

        // Add the current move to the list (with combined_d == 0 so far).
        self.junctions.push(new_jp);

        let mut best: Option<(usize, f64)> = None;
        for (i, jp) in self.junctions.iter_mut().enumerate() {
            // Choose the best acceleration option
            jp.accel.combined_d += move_d;
            jp.accel.max_end_v2 = jp
                .accel
                .calc_max_v2(jp.accel.max_start_v, jp.accel.max_start_v2);
            let cruise_v2 = jp.accel.max_end_v2.min(max_cruise_v2);
            jp.min_end_time = jp.min_start_time
                + jp.accel
                    .calc_min_accel_group_time(cruise_v2.sqrt(), jp.accel.max_start_v);
            match best {
                Some((_, best_time)) if best_time <= jp.min_end_time + EPSILON => {}
                _ => best = Some((i, jp.min_end_time)),
            }
        }
        let (best_idx, best_time) = best.expect("candidate list cannot be empty");
        self.min_end_time = best_time;
        let best_jp = &self.junctions[best_idx];
        let best_accel = best_jp.accel;
        let best_ref = best_jp.mref;

        let target_ag = group_mut(moves, target);
        target_ag.limit_accel(best_accel.max_accel, best_accel.max_jerk);
        target_ag.set_max_start_v2(start_v2);
        target_ag.max_end_v2 = best_accel.max_end_v2;
        target_ag.combined_d = best_accel.combined_d;
        // Point at the real accel group heading the ramp.
        target_ag.start = if best_ref == target { None } else { Some(best_ref) };
    }
}
