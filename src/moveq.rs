//! Look-ahead move queue and three-pass planner.
//!
//! Planning happens in three passes over the queued moves: a backward
//! smoothed pass picking peak-cruise envelopes from the softer smoothed
//! acceleration, a backward full-jerk pass filling deceleration groups, and
//! a forward pass assembling velocity trapezoids that are safe to flush.

use std::collections::VecDeque;
use std::time::Instant;

use thiserror::Error;

use crate::accel_combiner::AccelCombiner;
use crate::accel_group::{AccelGroup, GroupKind, GroupRef};
use crate::config::MoveLimits;
use crate::trapq::TrapAccelDecel;
use crate::vtrap::VTrap;
use crate::EPSILON;

/// Queue depth past which lazy planning without a flush limit falls back to
/// a locally-suboptimal partial flush to guarantee progress.
const MAX_QSIZE: usize = 64;

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("smoothed look-ahead pass failed: {0}")]
    SmoothedPass(&'static str),
    #[error("velocity jump from {prev:.6} to {next:.6} between emitted moves")]
    VelocityJump { prev: f64, next: f64 },
    #[error(
        "impossible move: start_v={start_v:.3} cruise_v={cruise_v:.3} end_v={end_v:.3} \
         accel_d={accel_d:.3} decel_d={decel_d:.3} over move_d={move_d:.3}"
    )]
    ImpossibleMove {
        start_v: f64,
        cruise_v: f64,
        end_v: f64,
        accel_d: f64,
        decel_d: f64,
        move_d: f64,
    },
    #[error("need {needed:.6} to accelerate, only {available:.6} combined")]
    AccelOverrun { needed: f64, available: f64 },
    #[error("no planned move to pop")]
    EmptyQueue,
    #[error("invalid acceleration order {0}; must be 2, 4 or 6")]
    InvalidAccelOrder(u32),
    #[error("move distance must be positive, got {0}")]
    InvalidDistance(f64),
}

/// One queued geometric move.
#[derive(Debug, Clone)]
pub struct QMove {
    pub(crate) id: u64,
    pub(crate) move_d: f64,
    pub(crate) cruise_v: f64,
    pub(crate) accel_comp: f64,
    pub(crate) max_cruise_v2: f64,
    pub(crate) junction_max_v2: f64,
    pub(crate) smooth_delta_v2: f64,
    pub(crate) max_smoothed_v2: f64,
    pub(crate) default_accel: AccelGroup,
    pub(crate) accel_group: AccelGroup,
    pub(crate) decel_group: AccelGroup,
    pub(crate) fallback_decel: Option<AccelGroup>,
}

pub(crate) fn group(moves: &VecDeque<QMove>, r: GroupRef) -> &AccelGroup {
    match r.kind {
        GroupKind::Accel => &moves[r.move_idx].accel_group,
        GroupKind::Decel => &moves[r.move_idx].decel_group,
    }
}

pub(crate) fn group_mut(moves: &mut VecDeque<QMove>, r: GroupRef) -> &mut AccelGroup {
    match r.kind {
        GroupKind::Accel => &mut moves[r.move_idx].accel_group,
        GroupKind::Decel => &mut moves[r.move_idx].decel_group,
    }
}

#[derive(Debug, Default)]
pub struct MoveQueue {
    moves: VecDeque<QMove>,
    combiner: AccelCombiner,
    prev_end_v2: f64,
    prev_move_end_v: f64,
    smoothed_pass_limit: Option<u64>,
    next_id: u64,
    planned: usize,
}

impl MoveQueue {
    pub fn new() -> MoveQueue {
        MoveQueue::default()
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Count of moves planned and ready for [`MoveQueue::next_move`].
    pub fn planned(&self) -> usize {
        self.planned
    }

    /// Discard all queued moves and return to the zero-velocity state.
    pub fn reset(&mut self) {
        self.moves.clear();
        self.combiner.reset(0.);
        self.prev_end_v2 = 0.;
        self.prev_move_end_v = 0.;
        self.smoothed_pass_limit = None;
        self.planned = 0;
    }

    /// Enqueue a geometric move of length `move_d` with the cornering cap
    /// `junction_max_v2` at its start junction.
    pub fn add_move(
        &mut self,
        move_d: f64,
        junction_max_v2: f64,
        limits: &MoveLimits,
    ) -> Result<(), PlanError> {
        if !matches!(limits.accel_order, 2 | 4 | 6) {
            return Err(PlanError::InvalidAccelOrder(limits.accel_order));
        }
        if !(move_d > 0.) {
            return Err(PlanError::InvalidDistance(move_d));
        }
        let default_accel = AccelGroup::new(
            limits.accel_order,
            limits.accel,
            limits.jerk,
            limits.min_jerk_limit_time,
        );
        let max_cruise_v2 = limits.velocity * limits.velocity;
        let max_smoothed_v2 = match self.moves.back() {
            Some(prev) => (prev.max_smoothed_v2 + prev.smooth_delta_v2)
                .min(junction_max_v2)
                .min(max_cruise_v2)
                .min(prev.max_cruise_v2),
            None => 0.,
        };
        let id = self.next_id;
        self.next_id += 1;
        self.moves.push_back(QMove {
            id,
            move_d,
            cruise_v: 0.,
            accel_comp: limits.accel_comp,
            max_cruise_v2,
            junction_max_v2,
            smooth_delta_v2: 2. * limits.smoothed_accel * move_d,
            max_smoothed_v2,
            default_accel,
            accel_group: default_accel,
            decel_group: default_accel,
            fallback_decel: None,
        });
        Ok(())
    }

    /// Plan queued moves. Returns the number of moves flushed from the head
    /// of the queue, ready for [`MoveQueue::next_move`]. In lazy mode only
    /// moves whose timing can no longer change are flushed and the count may
    /// be zero.
    pub fn plan(&mut self, lazy: bool) -> Result<usize, PlanError> {
        if self.moves.is_empty() {
            self.planned = 0;
            return Ok(0);
        }
        let started = Instant::now();
        let flush_limit = self.smoothed_pass(lazy)?;
        let end_idx = if lazy {
            match flush_limit {
                None => {
                    if self.moves.len() > MAX_QSIZE {
                        return self.partial_flush(started);
                    }
                    self.planned = 0;
                    return Ok(0);
                }
                Some(idx) => {
                    self.backward_pass();
                    let idx = self.safe_flush_scan(idx);
                    if idx == 0 {
                        if self.moves.len() > MAX_QSIZE {
                            return self.partial_flush(started);
                        }
                        self.planned = 0;
                        return Ok(0);
                    }
                    idx
                }
            }
        } else {
            self.backward_pass();
            self.moves.len()
        };
        let last_flushed = self.forward_pass(end_idx, !lazy)?;
        self.finish_plan(lazy, last_flushed, started)
    }

    fn finish_plan(
        &mut self,
        lazy: bool,
        last_flushed: Option<usize>,
        started: Instant,
    ) -> Result<usize, PlanError> {
        let flush_count = match last_flushed {
            Some(last) => {
                self.prev_end_v2 = self.moves[last].decel_group.max_start_v2;
                last + 1
            }
            None => 0,
        };
        self.planned = flush_count;
        tracing::debug!(
            lazy,
            qsize = self.moves.len(),
            flush_count,
            flush_time_us = started.elapsed().as_micros() as u64,
            "move queue planned"
        );
        Ok(flush_count)
    }

    /// Pop one planned move as a trapezoid descriptor, verifying velocity
    /// continuity with the previously emitted move.
    pub fn next_move(&mut self) -> Result<TrapAccelDecel, PlanError> {
        if self.planned == 0 || self.moves.is_empty() {
            return Err(PlanError::EmptyQueue);
        }
        let m = &self.moves[0];
        let accel = m.accel_group;
        let decel = m.decel_group;
        let cruise_v = m.cruise_v;
        let cruise_t = (m.move_d - accel.accel_d - decel.accel_d) / cruise_v;
        let start_v = if accel.accel_t > 0. {
            accel.start_accel_v + accel.effective_accel * accel.accel_offset_t
        } else {
            cruise_v - decel.effective_accel * decel.accel_offset_t
        };
        let end_v = if decel.accel_t > 0. || cruise_t > 0. {
            cruise_v - decel.effective_accel * (decel.accel_offset_t + decel.accel_t)
        } else {
            start_v + accel.effective_accel * accel.accel_t
        };
        if cruise_t < -EPSILON {
            return Err(PlanError::ImpossibleMove {
                start_v,
                cruise_v,
                end_v,
                accel_d: accel.accel_d,
                decel_d: decel.accel_d,
                move_d: m.move_d,
            });
        }
        if (self.prev_move_end_v - start_v).abs() > 1e-4 {
            return Err(PlanError::VelocityJump {
                prev: self.prev_move_end_v,
                next: start_v,
            });
        }
        let accel_decel = TrapAccelDecel {
            accel_order: accel.accel_order,
            accel_t: accel.accel_t,
            accel_offset_t: accel.accel_offset_t,
            total_accel_t: accel.total_accel_t,
            cruise_t: cruise_t.max(0.),
            decel_t: decel.accel_t,
            decel_offset_t: decel.accel_offset_t,
            total_decel_t: decel.total_accel_t,
            start_accel_v: accel.start_accel_v,
            cruise_v,
            effective_accel: accel.effective_accel,
            effective_decel: decel.effective_accel,
            accel_comp: m.accel_comp,
        };
        self.moves.pop_front();
        self.planned -= 1;
        self.prev_move_end_v = end_v;
        tracing::trace!(
            start_v,
            cruise_v,
            end_v,
            move_t = accel_decel.total_time(),
            "move emitted"
        );
        Ok(accel_decel)
    }

    // Backward smoothed pass: walk moves from last to first and determine
    // peak cruise velocities assuming the machine stops after the last move.
    // Returns the flush-limit move index in lazy mode.
    fn smoothed_pass(&mut self, lazy: bool) -> Result<Option<usize>, PlanError> {
        let n = self.moves.len();
        let stop_id = self.smoothed_pass_limit;
        let mut delayed = 0usize;
        let mut next_smoothed_v2 = 0.;
        let mut peak_cruise_v2 = 0.;
        let mut update_flush_limit = lazy;
        let mut flush_limit: Option<usize> = None;
        let mut i = n;
        while i > 0 {
            i -= 1;
            let reachable_smoothed_v2 = next_smoothed_v2 + self.moves[i].smooth_delta_v2;
            let smoothed_v2 = self.moves[i].max_smoothed_v2.min(reachable_smoothed_v2);
            if smoothed_v2 < reachable_smoothed_v2 {
                // It's possible for this move to accelerate
                if smoothed_v2 + self.moves[i].smooth_delta_v2 > next_smoothed_v2 || delayed > 0 {
                    // This move can decelerate, or it is a full accel move
                    // after a full decel move
                    if update_flush_limit && peak_cruise_v2 != 0. {
                        flush_limit = Some(i);
                        update_flush_limit = false;
                    }
                    peak_cruise_v2 = ((smoothed_v2 + reachable_smoothed_v2) * 0.5)
                        .min(self.moves[i].max_cruise_v2);
                }
                if !update_flush_limit && flush_limit != Some(i) {
                    for j in i..=i + delayed {
                        let m = &mut self.moves[j];
                        m.max_cruise_v2 = m.max_cruise_v2.min(peak_cruise_v2);
                        m.junction_max_v2 = m.junction_max_v2.min(peak_cruise_v2);
                    }
                    let after = i + delayed + 1;
                    if after >= n {
                        if lazy {
                            return Err(PlanError::SmoothedPass(
                                "smoothed peak velocity trapezoid open at the end of the queue",
                            ));
                        }
                    } else {
                        let m = &mut self.moves[after];
                        m.junction_max_v2 = m.junction_max_v2.min(peak_cruise_v2);
                    }
                }
                delayed = 0;
            } else {
                // Delay this move until peak_cruise_v2 is known
                delayed += 1;
            }
            if stop_id == Some(self.moves[i].id) {
                break;
            }
            next_smoothed_v2 = smoothed_v2;
        }
        if delayed > 0 {
            return Err(PlanError::SmoothedPass(
                "deferred moves left after the smoothed pass",
            ));
        }
        self.smoothed_pass_limit = flush_limit.map(|idx| self.moves[idx].id);
        if update_flush_limit {
            return Ok(None);
        }
        Ok(flush_limit)
    }

    // Backward full-jerk pass: reseed every move's groups and fill the
    // deceleration chains assuming a complete stop after the last move.
    fn backward_pass(&mut self) {
        self.combiner.reset(0.);
        let mut junction_max_v2 = 0.;
        for i in (0..self.moves.len()).rev() {
            let m = &mut self.moves[i];
            m.accel_group = m.default_accel;
            m.decel_group = m.default_accel;
            m.fallback_decel = None;
            let next_junction_max_v2 = m.junction_max_v2;
            self.combiner.process_next_accel(
                &mut self.moves,
                GroupRef {
                    move_idx: i,
                    kind: GroupKind::Decel,
                },
                junction_max_v2,
            );
            junction_max_v2 = next_junction_max_v2;
        }
    }

    // Find the earliest prefix that can safely decelerate even if the queue
    // is never extended, capturing per-move fallback deceleration plans on
    // the way. Returns the (possibly smaller) flush limit.
    fn safe_flush_scan(&mut self, mut flush_idx: usize) -> usize {
        let n = self.moves.len();
        for move_i in (0..=flush_idx).rev() {
            let mut safe_decel = self.moves[move_i].decel_group;
            safe_decel.combined_d = 0.;
            let mut found = false;
            let mut m = move_i;
            loop {
                let dg = self.moves[m].decel_group;
                safe_decel.combined_d += dg.combined_d;
                safe_decel.limit_accel(dg.max_accel, dg.max_jerk);
                let min_safe_dist = safe_decel.calc_min_safe_dist(safe_decel.max_end_v2);
                let start_ref = dg.start.unwrap_or(GroupRef {
                    move_idx: m,
                    kind: GroupKind::Decel,
                });
                let next = start_ref.move_idx + 1;
                if safe_decel.combined_d > min_safe_dist + EPSILON
                    && next < n
                    && self.moves[next].junction_max_v2
                        <= group(&self.moves, start_ref).max_start_v2
                {
                    // junction_max_v2 is actually reached at this junction,
                    // so deceleration from here on no longer depends on any
                    // moves queued later.
                    let mut fallback = safe_decel;
                    fallback.start = Some(start_ref);
                    self.moves[move_i].fallback_decel = Some(fallback);
                    found = true;
                    break;
                }
                if next >= n {
                    break;
                }
                m = next;
            }
            if !found {
                // This move's deceleration path never pins junction_max_v2
                // beyond the minimum safe distance; its timing may still
                // change when more moves arrive, so it cannot be flushed.
                flush_idx = move_i;
            }
        }
        flush_idx
    }

    // Forward pass: assemble trapezoids over moves [0, end_idx) and flush
    // those whose timing is final.
    fn forward_pass(
        &mut self,
        end_idx: usize,
        flush_tail: bool,
    ) -> Result<Option<usize>, PlanError> {
        let start_v2 = self.prev_end_v2;
        let first_decel_max_end = self.moves[0].decel_group.max_end_v2;
        if first_decel_max_end + EPSILON < start_v2 {
            tracing::warn!(
                committed_v2 = start_v2,
                max_end_v2 = first_decel_max_end,
                "impossible to reach the committed velocity, falling back to suboptimal plan"
            );
            let self_ref = GroupRef {
                move_idx: 0,
                kind: GroupKind::Decel,
            };
            let fallback = self.moves[0].fallback_decel;
            let decel = match fallback {
                Some(fb) => fb,
                None => self.moves[0].decel_group,
            };
            let start_ref = decel.start.unwrap_or(self_ref);
            // The current max_start_v2 of the fallback's head can only have
            // shrunk since it was captured.
            let decel_start_v2 = group(&self.moves, start_ref).max_start_v2;
            self.moves[0].decel_group = decel;
            self.moves[0].decel_group.max_end_v2 = start_v2;
            group_mut(&mut self.moves, start_ref).set_max_start_v2(start_v2.min(decel_start_v2));
        }

        let mut vt = VTrap::new();
        self.combiner.reset(start_v2);
        let mut prev_cruise_v2 = start_v2;
        let mut last_flushed: Option<usize> = None;
        let mut i = 0;
        'queue: while i < end_idx {
            let junction_max_v2 = self.moves[i].junction_max_v2.min(prev_cruise_v2);
            self.combiner.process_next_accel(
                &mut self.moves,
                GroupRef {
                    move_idx: i,
                    kind: GroupKind::Accel,
                },
                junction_max_v2,
            );
            let accel = self.moves[i].accel_group;
            let decel = self.moves[i].decel_group;
            let can_accelerate = decel.max_end_v2 > accel.max_start_v2 + EPSILON;
            if can_accelerate {
                // This move can accelerate
                if vt.decel_head().is_some() {
                    if let Some(last) = vt.flush(&mut self.moves)? {
                        last_flushed = Some(last);
                    }
                }
                vt.add_as_accel(i);
            }
            let must_decelerate = accel.max_end_v2 + EPSILON > decel.max_start_v2;
            if must_decelerate || !can_accelerate {
                // This move must decelerate after acceleration, or this is a
                // full decel move after a full accel move. Chain the moves of
                // the decel ramp.
                let decel_start_ref = decel.start.unwrap_or(GroupRef {
                    move_idx: i,
                    kind: GroupKind::Decel,
                });
                loop {
                    vt.add_as_decel(i);
                    if i == decel_start_ref.move_idx {
                        break;
                    }
                    i += 1;
                    if i >= end_idx {
                        break 'queue;
                    }
                }
                self.combiner
                    .reset(group(&self.moves, decel_start_ref).max_start_v2);
            }
            prev_cruise_v2 = self.moves[i].max_cruise_v2;
            i += 1;
        }
        if flush_tail && vt.decel_head().is_some() {
            if let Some(last) = vt.flush(&mut self.moves)? {
                last_flushed = Some(last);
            }
        }
        Ok(last_flushed)
    }

    // Starvation fallback: the queue outgrew MAX_QSIZE without producing a
    // flushable prefix. Commit to a locally-suboptimal but safe end velocity
    // at the first deceleration point and flush the prefix eagerly.
    fn partial_flush(&mut self, started: Instant) -> Result<usize, PlanError> {
        self.backward_pass();

        // Forward scan: find the first move that begins a decel after an
        // accel, collecting acceleration reachability on the way.
        self.combiner.reset(self.prev_end_v2);
        let mut prev_cruise_v2 = self.prev_end_v2;
        let mut candidate: Option<usize> = None;
        let mut seen_accel = false;
        for i in 0..self.moves.len() {
            let junction_max_v2 = self.moves[i].junction_max_v2.min(prev_cruise_v2);
            self.combiner.process_next_accel(
                &mut self.moves,
                GroupRef {
                    move_idx: i,
                    kind: GroupKind::Accel,
                },
                junction_max_v2,
            );
            let accel = self.moves[i].accel_group;
            let decel = self.moves[i].decel_group;
            let can_accelerate = decel.max_end_v2 > accel.max_start_v2 + EPSILON;
            let must_decelerate = accel.max_end_v2 + EPSILON > decel.max_start_v2;
            if seen_accel && (must_decelerate || !can_accelerate) {
                candidate = Some(i);
                break;
            }
            if can_accelerate {
                seen_accel = true;
            }
            prev_cruise_v2 = self.moves[i].max_cruise_v2;
        }
        let k = candidate.unwrap_or(0);

        // Pick a safe committed end velocity for the prefix from the
        // accumulated decel distance, clamped by what the accel side can
        // reach so the prefix trapezoid is guaranteed to close.
        let decel = self.moves[k].decel_group;
        let start_ref = decel.start.unwrap_or(GroupRef {
            move_idx: k,
            kind: GroupKind::Decel,
        });
        let start_group = *group(&self.moves, start_ref);
        let end_v2 = decel
            .calc_max_safe_v2(start_group.max_start_v, start_group.max_start_v2)
            .min(start_group.max_start_v2)
            .min(self.moves[k].accel_group.max_end_v2);
        tracing::warn!(
            qsize = self.moves.len(),
            prefix = k + 1,
            end_v2,
            "move queue starved, committing partial flush"
        );

        // Re-run the backward pass over the prefix with the committed end
        // velocity, then flush it eagerly.
        self.combiner.reset(end_v2);
        let mut junction_max_v2 = end_v2;
        for i in (0..=k).rev() {
            let m = &mut self.moves[i];
            m.accel_group = m.default_accel;
            m.decel_group = m.default_accel;
            m.fallback_decel = None;
            let next_junction_max_v2 = m.junction_max_v2;
            self.combiner.process_next_accel(
                &mut self.moves,
                GroupRef {
                    move_idx: i,
                    kind: GroupKind::Decel,
                },
                junction_max_v2,
            );
            junction_max_v2 = next_junction_max_v2;
        }
        let last_flushed = self.forward_pass(k + 1, true)?;
        self.finish_plan(true, last_flushed, started)
    }
}
