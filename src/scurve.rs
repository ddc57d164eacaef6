//! Bézier-polynomial S-curve segments.
//!
//! A segment stores position relative to the ramp start as a polynomial in
//! local time with zero constant term. Orders 2, 4 and 6 correspond to
//! constant-acceleration, snap-less and snap-and-crackle-less profiles.

/// Polynomial position segment. `c1..c6` are the coefficients of `t..t^6`;
/// position at local time `t` is `t*(c1 + t*(c2 + ...))`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SCurve {
    pub c1: f64,
    pub c2: f64,
    pub c3: f64,
    pub c4: f64,
    pub c5: f64,
    pub c6: f64,
    /// Duration of the full ramp this segment was cut from; bounds the
    /// inverse (distance to time) search.
    pub total_accel_t: f64,
}

// Limit compensation to maintain velocity >= 0 (no movement backwards).
// 0.159 is the solution of the optimization problem for order 6: the largest
// compensation such that velocity stays non-negative for any accel_t. The
// order 4 bound is exactly 1/6.
fn max_accel_comp(accel_order: u32, accel_comp: f64, total_accel_t: f64) -> f64 {
    let t2 = total_accel_t * total_accel_t;
    let bound = if accel_order == 4 { t2 / 6. } else { t2 * 0.159 };
    accel_comp.min(bound)
}

fn fill_bezier2(s: &mut SCurve, start_accel_v: f64, effective_accel: f64, accel_offset_t: f64) {
    s.c2 = 0.5 * effective_accel;
    s.c1 = start_accel_v + effective_accel * accel_offset_t;
}

// Coefficients for a 4th order bezier position function
fn fill_bezier4(
    s: &mut SCurve,
    start_accel_v: f64,
    effective_accel: f64,
    total_accel_t: f64,
    accel_offset_t: f64,
    accel_comp: f64,
) {
    if total_accel_t == 0. {
        return;
    }
    let inv_accel_t = 1. / total_accel_t;
    let accel_div_accel_t = effective_accel * inv_accel_t;
    let accel_div_accel_t2 = accel_div_accel_t * inv_accel_t;
    s.c4 = -0.5 * accel_div_accel_t2;
    s.c3 = accel_div_accel_t;
    s.c2 = -6. * accel_div_accel_t2 * accel_comp;
    s.c1 = start_accel_v + 6. * accel_div_accel_t * accel_comp;

    let t = accel_offset_t;
    s.c1 += ((4. * s.c4 * t + 3. * s.c3) * t + 2. * s.c2) * t;
    s.c2 += (6. * s.c4 * t + 3. * s.c3) * t;
    s.c3 += 4. * s.c4 * t;
}

// Coefficients for a 6th order bezier position function
fn fill_bezier6(
    s: &mut SCurve,
    start_accel_v: f64,
    effective_accel: f64,
    total_accel_t: f64,
    accel_offset_t: f64,
    accel_comp: f64,
) {
    if total_accel_t == 0. {
        return;
    }
    let inv_accel_t = 1. / total_accel_t;
    let accel_div_accel_t2 = effective_accel * inv_accel_t * inv_accel_t;
    let accel_div_accel_t3 = accel_div_accel_t2 * inv_accel_t;
    let accel_div_accel_t4 = accel_div_accel_t3 * inv_accel_t;
    s.c6 = accel_div_accel_t4;
    s.c5 = -3. * accel_div_accel_t3;
    s.c4 = 2.5 * accel_div_accel_t2 + 30. * accel_div_accel_t4 * accel_comp;
    s.c3 = -60. * accel_div_accel_t3 * accel_comp;
    s.c2 = 30. * accel_div_accel_t2 * accel_comp;
    s.c1 = start_accel_v;

    let t = accel_offset_t;
    s.c1 += ((((6. * s.c6 * t + 5. * s.c5) * t + 4. * s.c4) * t + 3. * s.c3) * t + 2. * s.c2) * t;
    s.c2 += (((15. * s.c6 * t + 10. * s.c5) * t + 6. * s.c4) * t + 3. * s.c3) * t;
    s.c3 += ((20. * s.c6 * t + 10. * s.c5) * t + 4. * s.c4) * t;
    s.c4 += (15. * s.c6 * t + 5. * s.c5) * t;
    s.c5 += 6. * s.c6 * t;
}

impl SCurve {
    /// Build the polynomial for a slice of a ramp so that position is 0 and
    /// velocity is `start_accel_v` at the start of the full ramp, shifted by
    /// `accel_offset_t` into the local time of this slice.
    #[allow(clippy::too_many_arguments)]
    pub fn fill(
        accel_order: u32,
        _accel_t: f64,
        accel_offset_t: f64,
        total_accel_t: f64,
        start_accel_v: f64,
        effective_accel: f64,
        accel_comp: f64,
    ) -> SCurve {
        let mut s = SCurve {
            total_accel_t,
            ..SCurve::default()
        };
        match accel_order {
            4 => fill_bezier4(
                &mut s,
                start_accel_v,
                effective_accel,
                total_accel_t,
                accel_offset_t,
                max_accel_comp(4, accel_comp, total_accel_t),
            ),
            6 => fill_bezier6(
                &mut s,
                start_accel_v,
                effective_accel,
                total_accel_t,
                accel_offset_t,
                max_accel_comp(6, accel_comp, total_accel_t),
            ),
            _ => fill_bezier2(&mut s, start_accel_v, effective_accel, accel_offset_t),
        }
        s
    }

    /// Distance travelled at local time `t`.
    pub fn eval(&self, t: f64) -> f64 {
        t * (self.c1 + t * (self.c2 + t * (self.c3 + t * (self.c4 + t * (self.c5 + t * self.c6)))))
    }

    /// Velocity (formal derivative) at local time `t`.
    pub fn velocity(&self, t: f64) -> f64 {
        self.c1
            + t * (2. * self.c2
                + t * (3. * self.c3 + t * (4. * self.c4 + t * (5. * self.c5 + t * 6. * self.c6))))
    }

    /// Rewrite the coefficients so the segment represents the same physical
    /// polynomial evaluated at `t + offset_t`. Returns the constant
    /// displacement `s(offset_t)` shed in the process.
    pub fn offset(&mut self, offset_t: f64) -> f64 {
        let shed = self.eval(offset_t);
        let t = offset_t;
        self.c1 +=
            ((((6. * self.c6 * t + 5. * self.c5) * t + 4. * self.c4) * t + 3. * self.c3) * t
                + 2. * self.c2)
                * t;
        self.c2 += (((15. * self.c6 * t + 10. * self.c5) * t + 6. * self.c4) * t + 3. * self.c3) * t;
        self.c3 += ((20. * self.c6 * t + 10. * self.c5) * t + 4. * self.c4) * t;
        self.c4 += (15. * self.c6 * t + 5. * self.c5) * t;
        self.c5 += 6. * self.c6 * t;
        shed
    }

    /// Invert distance to local time by bisection over `[0, total_accel_t]`.
    /// Position must be monotone, which holds by construction while the
    /// compensation clamp is respected.
    pub fn get_time(&self, distance: f64) -> f64 {
        let mut low = 0.;
        let mut high = self.total_accel_t;
        if self.eval(high) <= distance {
            return high;
        }
        if self.eval(low) > distance {
            return low;
        }
        while high - low > 1e-9 {
            let guess_time = (high + low) * 0.5;
            if self.eval(guess_time) > distance {
                high = guess_time;
            } else {
                low = guess_time;
            }
        }
        (high + low) * 0.5
    }

    /// Copy with every coefficient multiplied by `r`; `total_accel_t` is
    /// preserved.
    pub fn copy_scaled(&self, r: f64) -> SCurve {
        SCurve {
            c1: self.c1 * r,
            c2: self.c2 * r,
            c3: self.c3 * r,
            c4: self.c4 * r,
            c5: self.c5 * r,
            c6: self.c6 * r,
            total_accel_t: self.total_accel_t,
        }
    }

    /// Add `r * src'(t)` into this polynomial. The derivative's constant term
    /// cannot be stored here and is returned for the caller's position
    /// offset.
    pub fn add_deriv(&mut self, src: &SCurve, r: f64) -> f64 {
        self.c1 += 2. * src.c2 * r;
        self.c2 += 3. * src.c3 * r;
        self.c3 += 4. * src.c4 * r;
        self.c4 += 5. * src.c5 * r;
        self.c5 += 6. * src.c6 * r;
        r * src.c1
    }

    /// Add `r * src''(t)` into this polynomial; returns the constant term.
    pub fn add_2nd_deriv(&mut self, src: &SCurve, r: f64) -> f64 {
        self.c1 += 6. * src.c3 * r;
        self.c2 += 12. * src.c4 * r;
        self.c3 += 20. * src.c5 * r;
        self.c4 += 30. * src.c6 * r;
        r * 2. * src.c2
    }

    /// Evaluate `integral(t^n * s(t) dt)` from 0 to `t`.
    pub fn tn_antiderivative(&self, n: u32, t: f64) -> f64 {
        let coeffs = [self.c1, self.c2, self.c3, self.c4, self.c5, self.c6];
        let mut res = 0.;
        let mut tp = t.powi(n as i32 + 2);
        for (i, c) in coeffs.iter().enumerate() {
            res += c * tp / (i as f64 + n as f64 + 2.);
            tp *= t;
        }
        res
    }
}
