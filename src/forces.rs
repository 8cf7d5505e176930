//! Local force injectors: vorticity confinement, buoyancy, and the
//! condensation/latent-heat pair driving the cloud recipe.

use crate::field::{Grid, Vec4};
use crate::kernel::Params;

/// Inputs: velocity, div/curl. Adds `dt * eps * (N x omega)` where `N` is the
/// normalised gradient of `|omega|`.
pub fn vorticity_cell(vel: &Grid<'_>, div_curl: &Grid<'_>, p: &Params, x: u32, y: u32) -> Vec4 {
    let (x, y) = (x as i32, y as i32);
    let w = div_curl.at(x, y)[1];
    let wl = div_curl.at(x - 1, y)[1].abs();
    let wr = div_curl.at(x + 1, y)[1].abs();
    let wb = div_curl.at(x, y - 1)[1].abs();
    let wt = div_curl.at(x, y + 1)[1].abs();
    let eta = [0.5 * (wr - wl), 0.5 * (wt - wb)];
    let len = (eta[0] * eta[0] + eta[1] * eta[1]).sqrt() + 1e-5;
    let n = [eta[0] / len, eta[1] / len];
    let f = [p.vorticity * n[1] * w, -p.vorticity * n[0] * w];
    let v = vel.at(x, y);
    [v[0] + p.dt * f[0], v[1] + p.dt * f[1], v[2], v[3]]
}

/// Inputs: velocity, temperature, density.
pub fn buoyancy_cell(
    vel: &Grid<'_>,
    temperature: &Grid<'_>,
    density: &Grid<'_>,
    p: &Params,
    x: u32,
    y: u32,
) -> Vec4 {
    let (x, y) = (x as i32, y as i32);
    let t = temperature.at(x, y)[0];
    let rho = density.at(x, y)[0];
    let v = vel.at(x, y);
    let lift = p.dt * (p.kappa * (t - p.t0) - p.sigma * rho);
    [v[0], v[1] + lift, v[2], v[3]]
}

/// Saturation vapour ratio at potential temperature `theta` in row `y`.
/// The air cools by `lapse_rate` per row.
pub fn saturation(theta: f32, y: u32, p: &Params) -> f32 {
    let t = theta - p.lapse_rate * y as f32;
    p.sat_vapor * (p.sat_exp * (t - p.t0)).exp()
}

/// Vapour turned into cloud water this step (negative when cloud evaporates).
/// Density channels: 0 = cloud water, 1 = vapour.
pub fn phase_change(density: Vec4, theta: f32, y: u32, p: &Params) -> f32 {
    let (cloud, vapor) = (density[0], density[1]);
    let excess = vapor - saturation(theta, y, p);
    if excess > 0.0 { excess } else { excess.max(-cloud) }
}

/// Inputs: density, temperature.
pub fn condense_cell(density: &Grid<'_>, temperature: &Grid<'_>, p: &Params, x: u32, y: u32) -> Vec4 {
    let d = density.at(x as i32, y as i32);
    let dq = phase_change(d, temperature.at(x as i32, y as i32)[0], y, p);
    [d[0] + dq, d[1] - dq, d[2], d[3]]
}

/// Inputs: temperature, density (pre-condensation).
pub fn latent_heat_cell(temperature: &Grid<'_>, density: &Grid<'_>, p: &Params, x: u32, y: u32) -> Vec4 {
    let t = temperature.at(x as i32, y as i32);
    let dq = phase_change(density.at(x as i32, y as i32), t[0], y, p);
    [t[0] + p.latent_heat * dq, t[1], t[2], t[3]]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(data: &[Vec4]) -> Grid<'_> {
        Grid::new(data, 4, 4)
    }

    #[test]
    fn buoyancy_lifts_hot_and_sinks_dense() {
        let vel = vec![[0.0; 4]; 16];
        let hot = vec![[25.0, 0.0, 0.0, 0.0]; 16];
        let dense = vec![[2.0, 0.0, 0.0, 0.0]; 16];
        let none = vec![[0.0; 4]; 16];
        let p = Params { dt: 0.5, kappa: 0.25, sigma: 0.1, t0: 15.0, ..Params::default() };
        let up = buoyancy_cell(&grid(&vel), &grid(&hot), &grid(&none), &p, 1, 1);
        assert!((up[1] - 0.5 * 0.25 * 10.0).abs() < 1e-6);
        assert_eq!(up[0], 0.0);
        let down = buoyancy_cell(&grid(&vel), &grid(&none), &grid(&dense), &p, 1, 1);
        assert!(down[1] < 0.0);
    }

    #[test]
    fn vorticity_is_inert_without_curl() {
        let vel = vec![[1.0, 2.0, 0.0, 0.0]; 16];
        let dc = vec![[0.0; 4]; 16];
        let p = Params { dt: 0.1, vorticity: 5.0, ..Params::default() };
        assert_eq!(vorticity_cell(&grid(&vel), &grid(&dc), &p, 2, 2), [1.0, 2.0, 0.0, 0.0]);
    }

    #[test]
    fn condensation_conserves_water_and_heats() {
        let p = Params {
            t0: 0.0,
            sat_vapor: 0.5,
            sat_exp: 0.0,
            latent_heat: 2.0,
            ..Params::default()
        };
        let density = vec![[0.1, 0.8, 0.0, 0.0]; 16];
        let temperature = vec![[10.0, 0.0, 0.0, 0.0]; 16];
        let d = condense_cell(&grid(&density), &grid(&temperature), &p, 1, 1);
        assert!((d[0] + d[1] - 0.9).abs() < 1e-6);
        assert!((d[1] - 0.5).abs() < 1e-6);
        let t = latent_heat_cell(&grid(&temperature), &grid(&density), &p, 1, 1);
        assert!((t[0] - (10.0 + 2.0 * 0.3)).abs() < 1e-5);
    }

    #[test]
    fn evaporation_is_bounded_by_cloud_water() {
        let p = Params { sat_vapor: 5.0, ..Params::default() };
        assert_eq!(phase_change([0.2, 0.0, 0.0, 0.0], 0.0, 0, &p), -0.2);
    }
}
