//! Divergence/curl, the Poisson relaxation kernels (plain and red-black) and
//! pressure projection.
//!
//! Neighbour reads clamp to the edge, i.e. pressure has a zero normal
//! gradient at the walls.

use crate::config::Stencil;
use crate::field::{Grid, Vec4};
use crate::kernel::Params;

/// Full-grid column of half-resolution cell `hx` in row `y` of colour `parity`
/// (0 = black, `(x + y)` even; 1 = red).
pub fn full_x(hx: u32, y: u32, parity: u32) -> u32 {
    2 * hx + ((y + parity) & 1)
}

fn is_edge(x: u32, y: u32, w: u32, h: u32) -> bool {
    x == 0 || y == 0 || x + 1 == w || y + 1 == h
}

/// Velocity divergence at `(x, y)` with the given stencil.
pub fn divergence(vel: &Grid<'_>, stencil: Stencil, x: u32, y: u32) -> f32 {
    let (x, y) = (x as i32, y as i32);
    let r = vel.at(x + 1, y);
    let t = vel.at(x, y + 1);
    match stencil {
        Stencil::Central => 0.5 * ((r[0] - vel.at(x - 1, y)[0]) + (t[1] - vel.at(x, y - 1)[1])),
        Stencil::Staggered => {
            let c = vel.at(x, y);
            (r[0] - c[0]) + (t[1] - c[1])
        }
    }
}

fn curl(vel: &Grid<'_>, x: i32, y: i32) -> f32 {
    let dv = vel.at(x + 1, y)[1] - vel.at(x - 1, y)[1];
    let du = vel.at(x, y + 1)[0] - vel.at(x, y - 1)[0];
    0.5 * (dv - du)
}

/// Pressure gradient at `(x, y)`; `p` is addressed in full-grid cells.
fn gradient(p: impl Fn(i32, i32) -> f32, stencil: Stencil, x: i32, y: i32) -> [f32; 2] {
    match stencil {
        Stencil::Central => [
            0.5 * (p(x + 1, y) - p(x - 1, y)),
            0.5 * (p(x, y + 1) - p(x, y - 1)),
        ],
        Stencil::Staggered => {
            let c = p(x, y);
            [c - p(x - 1, y), c - p(x, y - 1)]
        }
    }
}

/// Inputs: velocity. Output `(divergence, curl, 0, 0)`; the curl is always
/// centred.
pub fn divergence_curl_cell(vel: &Grid<'_>, p: &Params, x: u32, y: u32) -> Vec4 {
    let div = divergence(vel, Stencil::from_code(p.stencil), x, y);
    [div, curl(vel, x as i32, y as i32), 0.0, 0.0]
}

/// Inputs: pressure, divergence.
pub fn jacobi_cell(p: &Grid<'_>, div: &Grid<'_>, x: u32, y: u32) -> Vec4 {
    let (x, y) = (x as i32, y as i32);
    let sum = p.at(x - 1, y)[0] + p.at(x + 1, y)[0] + p.at(x, y - 1)[0] + p.at(x, y + 1)[0];
    [(sum - div.at(x, y)[0]) * 0.25, 0.0, 0.0, 0.0]
}

/// Inputs: velocity, pressure. Wall cells are zeroed.
pub fn project_cell(vel: &Grid<'_>, pressure: &Grid<'_>, p: &Params, x: u32, y: u32) -> Vec4 {
    if is_edge(x, y, vel.width, vel.height) {
        return [0.0; 4];
    }
    let (xi, yi) = (x as i32, y as i32);
    let [gx, gy] = gradient(|x, y| pressure.at(x, y)[0], Stencil::from_code(p.stencil), xi, yi);
    let v = vel.at(xi, yi);
    [v[0] - gx, v[1] - gy, v[2], v[3]]
}

/// Inputs: full-resolution velocity. Writes the divergence of the cells of
/// colour `parity` into a half-resolution field.
pub fn divergence_half_cell(vel: &Grid<'_>, p: &Params, hx: u32, y: u32) -> Vec4 {
    let x = full_x(hx, y, p.parity);
    [divergence(vel, Stencil::from_code(p.stencil), x, y), 0.0, 0.0, 0.0]
}

/// Inputs: own colour (previous), other colour (latest), own divergence.
pub fn jacobi_red_black_cell(
    own: &Grid<'_>,
    other: &Grid<'_>,
    div: &Grid<'_>,
    p: &Params,
    hx: u32,
    y: u32,
) -> Vec4 {
    let width = own.width as i32 * 2;
    let height = own.height as i32;
    let x = full_x(hx, y, p.parity) as i32;
    let y = y as i32;
    let centre = own.at(hx as i32, y)[0];
    let mut sum = 0.0;
    for (nx, ny) in [(x - 1, y), (x + 1, y), (x, y - 1), (x, y + 1)] {
        sum += if nx >= 0 && ny >= 0 && nx < width && ny < height {
            other.at(nx / 2, ny)[0]
        } else {
            centre
        };
    }
    [(sum - div.at(hx as i32, y)[0]) * 0.25, 0.0, 0.0, 0.0]
}

fn red_black_pressure(black: &Grid<'_>, red: &Grid<'_>, x: i32, y: i32) -> f32 {
    let cx = x.clamp(0, black.width as i32 * 2 - 1);
    let cy = y.clamp(0, black.height as i32 - 1);
    let half = if (cx + cy) & 1 == 0 { black } else { red };
    half.at(cx / 2, cy)[0]
}

/// Inputs: velocity, black pressure, red pressure.
pub fn project_red_black_cell(
    vel: &Grid<'_>,
    black: &Grid<'_>,
    red: &Grid<'_>,
    p: &Params,
    x: u32,
    y: u32,
) -> Vec4 {
    if is_edge(x, y, vel.width, vel.height) {
        return [0.0; 4];
    }
    let (xi, yi) = (x as i32, y as i32);
    let pressure = |x, y| red_black_pressure(black, red, x, y);
    let [gx, gy] = gradient(pressure, Stencil::from_code(p.stencil), xi, yi);
    let v = vel.at(xi, yi);
    [v[0] - gx, v[1] - gy, v[2], v[3]]
}

/// `|Laplacian(p) - div|` in the L2 norm, with the same clamped stencil the
/// relaxation kernels use.
pub fn residual_norm(pressure: &[Vec4], divergence: &[Vec4], width: u32, height: u32) -> f32 {
    let p = Grid::new(pressure, width, height);
    let mut sum = 0.0f64;
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let lap = p.at(x - 1, y)[0] + p.at(x + 1, y)[0] + p.at(x, y - 1)[0] + p.at(x, y + 1)[0]
                - 4.0 * p.at(x, y)[0];
            let r = (lap - divergence[(y as u32 * width + x as u32) as usize][0]) as f64;
            sum += r * r;
        }
    }
    sum.sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_layout_alternates_per_row() {
        assert_eq!(full_x(0, 0, 0), 0);
        assert_eq!(full_x(0, 1, 0), 1);
        assert_eq!(full_x(3, 0, 1), 7);
        assert_eq!(full_x(3, 1, 1), 6);
        for y in 0..4 {
            for hx in 0..4 {
                assert_eq!((full_x(hx, y, 0) + y) % 2, 0);
                assert_eq!((full_x(hx, y, 1) + y) % 2, 1);
            }
        }
    }

    #[test]
    fn linear_shear_has_divergence_and_curl() {
        // u = x, v = 0 -> div 1; u = 0, v = x -> curl 1
        let stretch: Vec<Vec4> = (0..64).map(|i| [(i % 8) as f32, 0.0, 0.0, 0.0]).collect();
        let shear: Vec<Vec4> = (0..64).map(|i| [0.0, (i % 8) as f32, 0.0, 0.0]).collect();
        for stencil in [Stencil::Central, Stencil::Staggered] {
            let p = Params { stencil: stencil.code(), ..Params::default() };
            let a = divergence_curl_cell(&Grid::new(&stretch, 8, 8), &p, 4, 4);
            let b = divergence_curl_cell(&Grid::new(&shear, 8, 8), &p, 4, 4);
            assert_eq!(a, [1.0, 0.0, 0.0, 0.0], "{stencil:?}");
            assert_eq!(b, [0.0, 1.0, 0.0, 0.0], "{stencil:?}");
        }
    }

    #[test]
    fn staggered_divergence_of_gradient_is_the_relaxation_laplacian() {
        let (w, h) = (8u32, 8u32);
        let pressure: Vec<Vec4> = (0..w * h)
            .map(|i| {
                let (x, y) = ((i % w) as f32, (i / w) as f32);
                [0.3 * x * x + x * y - 0.7 * y * y + (x * 1.3).sin(), 0.0, 0.0, 0.0]
            })
            .collect();
        let still = vec![[0.0; 4]; (w * h) as usize];
        let params = Params { stencil: Stencil::Staggered.code(), ..Params::default() };
        let pg = Grid::new(&pressure, w, h);
        let vg = Grid::new(&still, w, h);
        let projected: Vec<Vec4> = (0..w * h)
            .map(|i| project_cell(&vg, &pg, &params, i % w, i / w))
            .collect();
        let out = Grid::new(&projected, w, h);
        // cells whose +x/+y neighbours are not wall cells
        for y in 1..h - 2 {
            for x in 1..w - 2 {
                let (xi, yi) = (x as i32, y as i32);
                let lap = pg.at(xi - 1, yi)[0] + pg.at(xi + 1, yi)[0] + pg.at(xi, yi - 1)[0]
                    + pg.at(xi, yi + 1)[0]
                    - 4.0 * pg.at(xi, yi)[0];
                let div = divergence(&out, Stencil::Staggered, x, y);
                assert!((div + lap).abs() < 1e-4, "({x}, {y}): {div} vs {lap}");
            }
        }
    }

    #[test]
    fn projection_removes_a_linear_pressure_gradient() {
        let vel = vec![[2.0, 1.0, 0.0, 0.0]; 64];
        let p: Vec<Vec4> = (0..64).map(|i| [2.0 * (i % 8) as f32, 0.0, 0.0, 0.0]).collect();
        for stencil in [Stencil::Central, Stencil::Staggered] {
            let params = Params { stencil: stencil.code(), ..Params::default() };
            let out = project_cell(&Grid::new(&vel, 8, 8), &Grid::new(&p, 8, 8), &params, 3, 3);
            assert_eq!(out, [0.0, 1.0, 0.0, 0.0], "{stencil:?}");
            let wall = project_cell(&Grid::new(&vel, 8, 8), &Grid::new(&p, 8, 8), &params, 0, 3);
            assert_eq!(wall, [0.0; 4]);
        }
    }

    #[test]
    fn red_black_projection_matches_full_projection() {
        let (w, h) = (8u32, 8u32);
        let full: Vec<Vec4> = (0..w * h)
            .map(|i| {
                let (x, y) = ((i % w) as f32, (i / w) as f32);
                [x * x - 0.5 * y, 0.0, 0.0, 0.0]
            })
            .collect();
        let split = |parity: u32| -> Vec<Vec4> {
            let mut out = Vec::new();
            for y in 0..h {
                for hx in 0..w / 2 {
                    out.push(full[(y * w + full_x(hx, y, parity)) as usize]);
                }
            }
            out
        };
        let black = split(0);
        let red = split(1);
        let vel = vec![[0.5, 0.25, 0.0, 0.0]; (w * h) as usize];
        let vel = Grid::new(&vel, w, h);
        let black = Grid::new(&black, w / 2, h);
        let red = Grid::new(&red, w / 2, h);
        let p = Grid::new(&full, w, h);
        for stencil in [Stencil::Central, Stencil::Staggered] {
            let params = Params { stencil: stencil.code(), ..Params::default() };
            for y in 0..h {
                for x in 0..w {
                    assert_eq!(
                        project_red_black_cell(&vel, &black, &red, &params, x, y),
                        project_cell(&vel, &p, &params, x, y),
                        "{stencil:?} ({x}, {y})"
                    );
                }
            }
        }
    }
}
