//! Time-indexed trajectory queue.
//!
//! Holds the emitted accel/cruise/decel segments in print-time order between
//! a head and a tail sentinel, fills time gaps with null moves, and answers
//! temporal queries for the kinematic filters.

use std::collections::VecDeque;

use crate::scurve::SCurve;

const NEVER_TIME: f64 = 9_999_999_999_999_999.9;
// Limit the first null move to improve numerical stability.
const MAX_NULL_MOVE: f64 = 1.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Coord {
    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    pub fn axis_mut(&mut self, axis: usize) -> &mut f64 {
        match axis {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => &mut self.z,
        }
    }
}

/// One trajectory segment: an S-curve along the unit direction `axes_r`
/// starting at `start_pos`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Move {
    pub print_time: f64,
    pub move_t: f64,
    pub start_pos: Coord,
    pub axes_r: Coord,
    pub s: SCurve,
}

impl Move {
    /// Distance moved at a time within the segment.
    pub fn get_distance(&self, move_time: f64) -> f64 {
        self.s.eval(move_time)
    }

    /// XYZ coordinates at a time within the segment.
    pub fn get_coord(&self, move_time: f64) -> Coord {
        let move_dist = self.get_distance(move_time);
        Coord {
            x: self.start_pos.x + self.axes_r.x * move_dist,
            y: self.start_pos.y + self.axes_r.y * move_dist,
            z: self.start_pos.z + self.axes_r.z * move_dist,
        }
    }

    pub fn axis_coord(&self, axis: usize, move_time: f64) -> f64 {
        self.start_pos.axis(axis) + self.axes_r.axis(axis) * self.get_distance(move_time)
    }
}

/// Timing descriptor of one planned move, as popped from the move queue.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapAccelDecel {
    pub accel_order: u32,
    pub accel_t: f64,
    pub accel_offset_t: f64,
    pub total_accel_t: f64,
    pub cruise_t: f64,
    pub decel_t: f64,
    pub decel_offset_t: f64,
    pub total_decel_t: f64,
    pub start_accel_v: f64,
    pub cruise_v: f64,
    pub effective_accel: f64,
    pub effective_decel: f64,
    pub accel_comp: f64,
}

impl TrapAccelDecel {
    /// Build a plain (non-combined) velocity trapezoid descriptor.
    pub fn fill_simple(
        accel_t: f64,
        cruise_t: f64,
        decel_t: f64,
        start_v: f64,
        cruise_v: f64,
        accel: f64,
        accel_order: u32,
    ) -> TrapAccelDecel {
        TrapAccelDecel {
            accel_order,
            accel_t,
            accel_offset_t: 0.,
            total_accel_t: accel_t,
            cruise_t,
            decel_t,
            decel_offset_t: 0.,
            total_decel_t: decel_t,
            start_accel_v: start_v,
            cruise_v,
            effective_accel: accel,
            effective_decel: accel,
            accel_comp: 0.,
        }
    }

    /// Total wall-clock duration of the move.
    pub fn total_time(&self) -> f64 {
        self.accel_t + self.cruise_t + self.decel_t
    }
}

pub struct TrapQueue {
    // Includes the head sentinel at index 0 and the tail sentinel at the end.
    moves: VecDeque<Move>,
}

impl Default for TrapQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TrapQueue {
    pub fn new() -> TrapQueue {
        let mut moves = VecDeque::new();
        moves.push_back(Move::default());
        moves.push_back(Move {
            print_time: NEVER_TIME,
            move_t: NEVER_TIME,
            ..Move::default()
        });
        TrapQueue { moves }
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.len() <= 2
    }

    /// Count of real segments (sentinels excluded).
    pub fn segment_count(&self) -> usize {
        self.moves.len() - 2
    }

    pub fn get(&self, idx: usize) -> &Move {
        &self.moves[idx]
    }

    /// Index of the first real segment, if any.
    pub fn first_segment(&self) -> Option<usize> {
        if self.is_empty() {
            None
        } else {
            Some(1)
        }
    }

    fn tail_idx(&self) -> usize {
        self.moves.len() - 1
    }

    /// Refresh the tail sentinel if a previous append left it stale.
    pub fn check_sentinels(&mut self) {
        let tail_idx = self.tail_idx();
        if self.moves[tail_idx].print_time != 0. {
            // Already up to date
            return;
        }
        if tail_idx == 1 {
            // No moves at all on this list
            self.moves[tail_idx].print_time = NEVER_TIME;
            return;
        }
        let last = self.moves[tail_idx - 1];
        let tail = &mut self.moves[tail_idx];
        tail.print_time = last.print_time + last.move_t;
        tail.start_pos = last.get_coord(last.move_t);
    }

    /// Add a segment in time order, filling any gap with a null move.
    pub fn add_move(&mut self, m: Move) {
        let tail_idx = self.tail_idx();
        let prev = self.moves[tail_idx - 1];
        if prev.print_time + prev.move_t < m.print_time {
            // Add a null move to fill the time gap
            let mut null_move = Move {
                start_pos: m.start_pos,
                ..Move::default()
            };
            if prev.print_time == 0. && m.print_time > MAX_NULL_MOVE {
                null_move.print_time = m.print_time - MAX_NULL_MOVE;
            } else {
                null_move.print_time = prev.print_time + prev.move_t;
            }
            null_move.move_t = m.print_time - null_move.print_time;
            self.moves.insert(tail_idx, null_move);
        }
        let tail_idx = self.tail_idx();
        self.moves.insert(tail_idx, m);
        // Mark the tail sentinel stale
        self.moves[tail_idx + 1].print_time = 0.;
    }

    /// Materialise up to three segments (accel, cruise, decel) for one
    /// planned move starting at `print_time`.
    pub fn append(
        &mut self,
        print_time: f64,
        start_pos: Coord,
        axes_r: Coord,
        accel_decel: &TrapAccelDecel,
    ) {
        let mut print_time = print_time;
        let mut start_pos = start_pos;
        if accel_decel.accel_t > 0. {
            let m = Move {
                print_time,
                move_t: accel_decel.accel_t,
                start_pos,
                axes_r,
                s: SCurve::fill(
                    accel_decel.accel_order,
                    accel_decel.accel_t,
                    accel_decel.accel_offset_t,
                    accel_decel.total_accel_t,
                    accel_decel.start_accel_v,
                    accel_decel.effective_accel,
                    accel_decel.accel_comp,
                ),
            };
            self.add_move(m);
            print_time += accel_decel.accel_t;
            start_pos = m.get_coord(accel_decel.accel_t);
        }
        if accel_decel.cruise_t > 0. {
            let m = Move {
                print_time,
                move_t: accel_decel.cruise_t,
                start_pos,
                axes_r,
                s: SCurve::fill(
                    2,
                    accel_decel.cruise_t,
                    0.,
                    accel_decel.cruise_t,
                    accel_decel.cruise_v,
                    0.,
                    0.,
                ),
            };
            self.add_move(m);
            print_time += accel_decel.cruise_t;
            start_pos = m.get_coord(accel_decel.cruise_t);
        }
        if accel_decel.decel_t > 0. {
            let m = Move {
                print_time,
                move_t: accel_decel.decel_t,
                start_pos,
                axes_r,
                s: SCurve::fill(
                    accel_decel.accel_order,
                    accel_decel.decel_t,
                    accel_decel.decel_offset_t,
                    accel_decel.total_decel_t,
                    accel_decel.cruise_v,
                    -accel_decel.effective_decel,
                    accel_decel.accel_comp,
                ),
            };
            self.add_move(m);
        }
    }

    /// Drop every segment ending at or before `print_time`, keeping the head
    /// sentinel current so queries just before the surviving segments still
    /// resolve.
    pub fn free_moves(&mut self, print_time: f64) {
        while self.moves.len() > 2 {
            let m = self.moves[1];
            if m.print_time + m.move_t > print_time {
                break;
            }
            self.moves.remove(1);
        }
        if self.moves.len() == 2 {
            let tail_idx = self.tail_idx();
            self.moves[tail_idx].print_time = NEVER_TIME;
            return;
        }
        let first = self.moves[1];
        let head = &mut self.moves[0];
        head.move_t = first.print_time;
        head.start_pos = first.start_pos;
    }

    /// Walk forward or backward from segment `idx` until the given local
    /// time falls inside a segment; returns the segment index and the time
    /// within it. Sentinels absorb out-of-range times.
    pub fn find_move(&self, mut idx: usize, mut time: f64) -> (usize, f64) {
        while time < 0. && idx > 0 {
            idx -= 1;
            time += self.moves[idx].move_t;
        }
        let last = self.tail_idx();
        while time > self.moves[idx].move_t && idx < last {
            time -= self.moves[idx].move_t;
            idx += 1;
        }
        (idx, time)
    }

    /// Integrate the axis position over `[start, end]` in the local time of
    /// segment `idx`, splitting at segment boundaries.
    pub fn integrate(&self, idx: usize, axis: usize, start: f64, end: f64) -> f64 {
        let (mut i, mut t0) = self.find_move(idx, start);
        let mut remaining = end - start;
        let mut res = 0.;
        loop {
            let m = &self.moves[i];
            let t1 = if i == self.tail_idx() {
                t0 + remaining
            } else {
                (t0 + remaining).min(m.move_t)
            };
            res += m.start_pos.axis(axis) * (t1 - t0)
                + m.axes_r.axis(axis) * (m.s.tn_antiderivative(0, t1) - m.s.tn_antiderivative(0, t0));
            remaining -= t1 - t0;
            if remaining <= 0. || i >= self.tail_idx() {
                break;
            }
            i += 1;
            t0 = 0.;
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_x() -> Coord {
        Coord {
            x: 1.0,
            ..Coord::default()
        }
    }

    #[test]
    fn appends_segments_and_updates_sentinel() {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel::fill_simple(0.1, 0.2, 0.1, 0., 10., 100., 2);
        tq.append(0.0, Coord::default(), unit_x(), &ad);
        assert_eq!(tq.segment_count(), 3);
        tq.check_sentinels();
        let tail = tq.get(tq.len() - 1);
        assert!((tail.print_time - 0.4).abs() < 1e-12);
        // end position: 0.5 + 2.0 + 0.5
        assert!((tail.start_pos.x - 3.0).abs() < 1e-9);
    }

    #[test]
    fn fills_gap_with_null_move() {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel::fill_simple(0., 0.5, 0., 10., 10., 0., 2);
        tq.append(0.0, Coord::default(), unit_x(), &ad);
        tq.append(2.0, Coord { x: 5., ..Coord::default() }, unit_x(), &ad);
        // cruise + null + cruise; the null move after a segment starting at
        // time zero is capped at MAX_NULL_MOVE
        assert_eq!(tq.segment_count(), 3);
        let null_move = tq.get(2);
        assert_eq!(null_move.print_time, 1.0);
        assert_eq!(null_move.move_t, 1.0);
        assert_eq!(null_move.s, SCurve::default());
    }

    #[test]
    fn caps_first_null_move() {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel::fill_simple(0., 0.5, 0., 10., 10., 0., 2);
        tq.append(5.0, Coord::default(), unit_x(), &ad);
        // First null move is length-capped at MAX_NULL_MOVE
        let null_move = tq.get(1);
        assert!((null_move.print_time - 4.0).abs() < 1e-12);
        assert!((null_move.move_t - 1.0).abs() < 1e-12);
    }

    #[test]
    fn time_ordering_is_preserved() {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel::fill_simple(0.05, 0.1, 0.05, 0., 20., 400., 2);
        let mut t = 0.;
        for _ in 0..5 {
            tq.append(t, Coord::default(), unit_x(), &ad);
            t += ad.total_time() + 0.01;
        }
        for i in 1..tq.len() - 1 {
            let prev = tq.get(i - 1);
            let cur = tq.get(i);
            assert!(prev.print_time + prev.move_t <= cur.print_time + 1e-12);
        }
    }

    #[test]
    fn free_moves_keeps_head_sentinel_current() {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel::fill_simple(0., 0.5, 0., 10., 10., 0., 2);
        tq.append(0.0, Coord::default(), unit_x(), &ad);
        tq.append(0.5, Coord { x: 5., ..Coord::default() }, unit_x(), &ad);
        tq.free_moves(0.5);
        assert_eq!(tq.segment_count(), 1);
        let head = tq.get(0);
        assert_eq!(head.move_t, 0.5);
        assert_eq!(head.start_pos.x, 5.);
        // Freeing everything resets the tail sentinel
        tq.free_moves(10.0);
        assert_eq!(tq.segment_count(), 0);
        assert_eq!(tq.get(1).print_time, NEVER_TIME);
    }

    #[test]
    fn find_move_walks_both_directions() {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel::fill_simple(0., 1.0, 0., 10., 10., 0., 2);
        tq.append(0.0, Coord::default(), unit_x(), &ad);
        tq.append(1.0, Coord { x: 10., ..Coord::default() }, unit_x(), &ad);
        let (idx, t) = tq.find_move(1, 1.5);
        assert_eq!(idx, 2);
        assert!((t - 0.5).abs() < 1e-12);
        let (idx, t) = tq.find_move(2, -0.25);
        assert_eq!(idx, 1);
        assert!((t - 0.75).abs() < 1e-12);
    }

    #[test]
    fn integrate_constant_velocity() {
        let mut tq = TrapQueue::new();
        let ad = TrapAccelDecel::fill_simple(0., 1.0, 0., 10., 10., 0., 2);
        tq.append(0.0, Coord::default(), unit_x(), &ad);
        tq.append(1.0, Coord { x: 10., ..Coord::default() }, unit_x(), &ad);
        // x(t) = 10 t; integral over [0.5, 1.5] = 10
        let res = tq.integrate(1, 0, 0.5, 1.5);
        assert!((res - 10.0).abs() < 1e-9, "{}", res);
    }
}
