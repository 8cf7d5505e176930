//! Semi-Lagrangian advection and the MacCormack correction.
//!
//! Cell centres sit on integer coordinates. The departure point of a cell is
//! traced back along the velocity field with an explicit Runge-Kutta
//! integrator of order 1 to 4 and the source is resampled there.

use crate::field::{Filter, Grid, Vec4};
use crate::kernel::Params;

fn velocity(vel: &Grid<'_>, pos: [f32; 2]) -> [f32; 2] {
    let v = vel.sample(pos, Filter::Linear);
    [v[0], v[1]]
}

fn offset(pos: [f32; 2], v: [f32; 2], s: f32) -> [f32; 2] {
    [pos[0] - s * v[0], pos[1] - s * v[1]]
}

/// Departure point of `pos` after integrating the velocity field back over `dt`.
pub fn backtrace(vel: &Grid<'_>, pos: [f32; 2], dt: f32, order: u32) -> [f32; 2] {
    let k1 = velocity(vel, pos);
    match order {
        0 | 1 => offset(pos, k1, dt),
        2 => {
            let k2 = velocity(vel, offset(pos, k1, 0.5 * dt));
            offset(pos, k2, dt)
        }
        3 => {
            // Ralston
            let k2 = velocity(vel, offset(pos, k1, 0.5 * dt));
            let k3 = velocity(vel, offset(pos, k2, 0.75 * dt));
            let v = [
                (2.0 * k1[0] + 3.0 * k2[0] + 4.0 * k3[0]) / 9.0,
                (2.0 * k1[1] + 3.0 * k2[1] + 4.0 * k3[1]) / 9.0,
            ];
            offset(pos, v, dt)
        }
        _ => {
            let k2 = velocity(vel, offset(pos, k1, 0.5 * dt));
            let k3 = velocity(vel, offset(pos, k2, 0.5 * dt));
            let k4 = velocity(vel, offset(pos, k3, dt));
            let v = [
                (k1[0] + 2.0 * k2[0] + 2.0 * k3[0] + k4[0]) / 6.0,
                (k1[1] + 2.0 * k2[1] + 2.0 * k3[1] + k4[1]) / 6.0,
            ];
            offset(pos, v, dt)
        }
    }
}

/// Inputs: velocity, source. Uses `dt`, `order`, `filter`.
pub fn advect_cell(vel: &Grid<'_>, src: &Grid<'_>, p: &Params, x: u32, y: u32) -> Vec4 {
    let from = backtrace(vel, [x as f32, y as f32], p.dt, p.order);
    src.sample(from, Filter::from_code(p.filter))
}

/// Inputs: velocity, original, forward estimate, backward estimate.
///
/// `corrected = fwd + 0.5 * (orig - bwd)`. Components leaving the range of
/// the four original cells around the departure point are pulled toward the
/// forward estimate by `revert`.
pub fn maccormack_cell(
    vel: &Grid<'_>,
    orig: &Grid<'_>,
    fwd: &Grid<'_>,
    bwd: &Grid<'_>,
    p: &Params,
    x: u32,
    y: u32,
) -> Vec4 {
    let (xi, yi) = (x as i32, y as i32);
    let o = orig.at(xi, yi);
    let a = fwd.at(xi, yi);
    let b = bwd.at(xi, yi);
    let mut out = [0.0; 4];
    for c in 0..4 {
        out[c] = a[c] + 0.5 * (o[c] - b[c]);
    }
    if p.revert <= 0.0 {
        return out;
    }

    let from = backtrace(vel, [x as f32, y as f32], p.dt, p.order);
    let footprint = orig.footprint(from);
    for c in 0..4 {
        let lo = footprint.iter().map(|v| v[c]).fold(f32::INFINITY, f32::min);
        let hi = footprint.iter().map(|v| v[c]).fold(f32::NEG_INFINITY, f32::max);
        if out[c] < lo || out[c] > hi {
            out[c] += (a[c] - out[c]) * p.revert;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uniform(w: u32, h: u32, v: Vec4) -> Vec<Vec4> {
        vec![v; (w * h) as usize]
    }

    fn g(data: &[Vec4]) -> Grid<'_> {
        Grid::new(data, 16, 16)
    }

    #[test]
    fn uniform_flow_backtrace_is_order_independent() {
        let data = uniform(16, 16, [1.5, -0.5, 0.0, 0.0]);
        let vel = Grid::new(&data, 16, 16);
        for order in 1..=4 {
            let from = backtrace(&vel, [8.0, 8.0], 2.0, order);
            assert!((from[0] - 5.0).abs() < 1e-5, "order {order}");
            assert!((from[1] - 9.0).abs() < 1e-5, "order {order}");
        }
    }

    #[test]
    fn advect_shifts_by_whole_cells() {
        let vel_data = uniform(16, 16, [1.0, 0.0, 0.0, 0.0]);
        let src_data: Vec<Vec4> = (0..256).map(|i| [(i % 16) as f32, 0.0, 0.0, 0.0]).collect();
        let vel = Grid::new(&vel_data, 16, 16);
        let src = Grid::new(&src_data, 16, 16);
        let p = Params { dt: 1.0, order: 1, ..Params::sized([16, 16]) };
        assert_eq!(advect_cell(&vel, &src, &p, 6, 3)[0], 5.0);
        // departure clamps at the left wall
        assert_eq!(advect_cell(&vel, &src, &p, 0, 3)[0], 0.0);
    }

    #[test]
    fn maccormack_without_limiter_is_the_raw_correction() {
        let zero = uniform(16, 16, [0.0; 4]);
        let o = uniform(16, 16, [4.0, 0.0, 0.0, 0.0]);
        let a = uniform(16, 16, [3.0, 0.0, 0.0, 0.0]);
        let b = uniform(16, 16, [2.0, 0.0, 0.0, 0.0]);
        let p = Params { revert: 0.0, ..Params::sized([16, 16]) };
        let out = maccormack_cell(&g(&zero), &g(&o), &g(&a), &g(&b), &p, 4, 4);
        assert_eq!(out[0], 4.0);
    }

    #[test]
    fn maccormack_limiter_reverts_overshoot() {
        let zero = uniform(16, 16, [0.0; 4]);
        let o = uniform(16, 16, [1.0, 0.0, 0.0, 0.0]);
        let a = uniform(16, 16, [1.0, 0.0, 0.0, 0.0]);
        let b = uniform(16, 16, [-1.0, 0.0, 0.0, 0.0]);
        let p = Params { revert: 1.0, dt: 0.1, ..Params::sized([16, 16]) };
        // raw correction would be 2.0, outside [1, 1]
        let out = maccormack_cell(&g(&zero), &g(&o), &g(&a), &g(&b), &p, 4, 4);
        assert_eq!(out[0], 1.0);
    }
}
