//! Localised additive perturbations ("splats") and the emitters that
//! produce them.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::field::{Grid, Vec4};
use crate::kernel::Params;
use crate::recipe::FieldName;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Falloff {
    #[default]
    Gaussian,
    Disc,
}

impl Falloff {
    fn code(self) -> u32 {
        match self {
            Falloff::Gaussian => 0,
            Falloff::Disc => 1,
        }
    }
}

/// Adds `color * intensity * w(|cell - pos|)` to `target`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Splat {
    pub target: FieldName,
    pub pos: [i32; 2],
    pub color: [f32; 3],
    #[serde(default = "default_intensity")]
    pub intensity: f32,
    #[serde(default = "default_radius")]
    pub radius: f32,
    #[serde(default)]
    pub falloff: Falloff,
}

fn default_intensity() -> f32 { 1.0 }
fn default_radius() -> f32 { 8.0 }

impl Splat {
    pub fn new(target: FieldName, pos: [i32; 2], color: [f32; 3], radius: f32) -> Self {
        Self {
            target,
            pos,
            color,
            intensity: default_intensity(),
            radius,
            falloff: Falloff::Gaussian,
        }
    }

    pub fn params(&self) -> Params {
        Params {
            spot_pos: self.pos,
            color: [self.color[0], self.color[1], self.color[2], 0.0],
            intensity: self.intensity,
            radius: self.radius,
            falloff: self.falloff.code(),
            ..Params::default()
        }
    }
}

/// Inputs: target field.
pub fn splat_cell(src: &Grid<'_>, p: &Params, x: u32, y: u32) -> Vec4 {
    let dx = x as f32 - p.spot_pos[0] as f32;
    let dy = y as f32 - p.spot_pos[1] as f32;
    let d2 = dx * dx + dy * dy;
    let r = p.radius.max(1e-3);
    let w = if p.falloff == 0 {
        (-d2 / (r * r)).exp()
    } else if d2 < r * r {
        1.0
    } else {
        0.0
    };
    let s = src.at(x as i32, y as i32);
    let k = p.intensity * w;
    [
        s[0] + p.color[0] * k,
        s[1] + p.color[1] * k,
        s[2] + p.color[2] * k,
        s[3] + p.color[3] * k,
    ]
}

/// A persistent source that injects splats every frame, like the smoke plume
/// at the bottom of the domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Emitter {
    pub pos: [i32; 2],
    #[serde(default = "default_plume_color")]
    pub density_color: [f32; 3],
    /// Temperature injected per frame, drawn uniformly from this range.
    #[serde(default = "default_plume_temperature")]
    pub temperature: [f32; 2],
    /// Horizontal velocity jitter, drawn uniformly from `[-jitter, jitter]`.
    #[serde(default = "default_plume_jitter")]
    pub jitter: f32,
    #[serde(default = "default_radius")]
    pub radius: f32,
}

fn default_plume_color() -> [f32; 3] { [0.12, 0.31, 0.7] }
fn default_plume_temperature() -> [f32; 2] { [10.0, 30.0] }
fn default_plume_jitter() -> f32 { 1.0 }

impl Emitter {
    pub fn plume(pos: [i32; 2]) -> Self {
        Self {
            pos,
            density_color: default_plume_color(),
            temperature: default_plume_temperature(),
            jitter: default_plume_jitter(),
            radius: default_radius(),
        }
    }

    /// This frame's splats, one per field the emitter feeds.
    pub fn emit(&self, rng: &mut impl Rng) -> [Splat; 3] {
        let [lo, hi] = self.temperature;
        let heat = if hi > lo { rng.gen_range(lo..hi) } else { lo };
        let push = if self.jitter > 0.0 {
            rng.gen_range(-self.jitter..self.jitter)
        } else {
            0.0
        };
        [
            Splat::new(FieldName::Density, self.pos, self.density_color, self.radius),
            Splat::new(FieldName::Temperature, self.pos, [heat, 0.0, 0.0], self.radius),
            Splat::new(FieldName::Velocity, self.pos, [push, 0.0, 0.0], self.radius),
        ]
    }
}

/// A random velocity impulse plus a matching dye splat somewhere in the grid.
pub fn random_pair(rng: &mut impl Rng, size: [u32; 2], radius: f32, force: f32) -> [Splat; 2] {
    let pos = [
        rng.gen_range(0..size[0] as i32),
        rng.gen_range(0..size[1] as i32),
    ];
    let angle = rng.gen_range(0.0..std::f32::consts::TAU);
    let color = [rng.r#gen::<f32>(), rng.r#gen::<f32>(), rng.r#gen::<f32>()];
    [
        Splat::new(FieldName::Velocity, pos, [force * angle.cos(), force * angle.sin(), 0.0], radius),
        Splat::new(FieldName::Density, pos, color, radius),
    ]
}
