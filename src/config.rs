//! Simulation configuration, supplied once at startup.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::kernel::LOCAL_TILE;
use crate::recipe::FieldName;
use crate::reduction::AdaptiveDt;
use crate::splat::Emitter;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationKind {
    /// Velocity and dye driven by splats only.
    #[default]
    Fluid,
    /// Dye and temperature with buoyancy and vorticity confinement.
    Smoke,
    /// Vapour/cloud water with latent heating.
    Clouds,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvectionScheme {
    SemiLagrangian,
    #[default]
    MacCormack,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureScheme {
    #[default]
    Jacobi,
    RedBlack,
}

/// Difference operators used for the projection divergence and gradient.
///
/// `Central` takes both as centred differences. Its div∘grad is the wide
/// (2h) Laplacian, not the compact one the relaxation solves, so a converged
/// solve still leaves divergence at the splat scale. `Staggered` pairs forward
/// divergence with backward gradient, whose composition is exactly the
/// compact Laplacian.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stencil {
    #[default]
    Central,
    Staggered,
}

impl Stencil {
    pub fn code(self) -> u32 {
        match self {
            Stencil::Central => 0,
            Stencil::Staggered => 1,
        }
    }

    pub fn from_code(code: u32) -> Self {
        if code == 1 { Stencil::Staggered } else { Stencil::Central }
    }
}

/// Whether vorticity/buoyancy act on the velocity before or after it is
/// advected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForceOrder {
    BeforeAdvection,
    AfterAdvection,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdvectionConfig {
    #[serde(default)]
    pub scheme: AdvectionScheme,
    #[serde(default = "default_rk_order")]
    pub rk_order: u32,
    /// Blend toward the plain estimate where MacCormack over/undershoots.
    #[serde(default = "default_revert")]
    pub revert: f32,
}

fn default_rk_order() -> u32 { 4 }
fn default_revert() -> f32 { 1.0 }

impl Default for AdvectionConfig {
    fn default() -> Self {
        Self {
            scheme: AdvectionScheme::default(),
            rk_order: default_rk_order(),
            revert: default_revert(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BuoyancyConfig {
    #[serde(default = "default_kappa")]
    pub kappa: f32,
    #[serde(default = "default_sigma")]
    pub sigma: f32,
    /// Ambient temperature.
    #[serde(default = "default_t0")]
    pub t0: f32,
}

fn default_kappa() -> f32 { 0.25 }
fn default_sigma() -> f32 { 0.1 }
fn default_t0() -> f32 { 15.0 }

impl Default for BuoyancyConfig {
    fn default() -> Self {
        Self {
            kappa: default_kappa(),
            sigma: default_sigma(),
            t0: default_t0(),
        }
    }
}

/// Constants of the cloud recipe's condensation model.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_latent_heat")]
    pub latent_heat: f32,
    /// Cooling per grid row.
    #[serde(default = "default_lapse_rate")]
    pub lapse_rate: f32,
    /// Saturation vapour ratio at the reference temperature.
    #[serde(default = "default_sat_vapor")]
    pub sat_vapor: f32,
    #[serde(default = "default_sat_exp")]
    pub sat_exp: f32,
    #[serde(default = "default_reference_temperature")]
    pub reference_temperature: f32,
    /// Rows of warm, moist air seeded at the bottom.
    #[serde(default = "default_ground_rows")]
    pub ground_rows: u32,
    #[serde(default = "default_ground_temperature")]
    pub ground_temperature: f32,
}

fn default_latent_heat() -> f32 { 2.0 }
fn default_lapse_rate() -> f32 { 0.05 }
fn default_sat_vapor() -> f32 { 0.6 }
fn default_sat_exp() -> f32 { 0.07 }
fn default_reference_temperature() -> f32 { 15.0 }
fn default_ground_rows() -> u32 { 6 }
fn default_ground_temperature() -> f32 { 20.0 }

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            latent_heat: default_latent_heat(),
            lapse_rate: default_lapse_rate(),
            sat_vapor: default_sat_vapor(),
            sat_exp: default_sat_exp(),
            reference_temperature: default_reference_temperature(),
            ground_rows: default_ground_rows(),
            ground_temperature: default_ground_temperature(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default = "default_size")]
    pub width: u32,
    #[serde(default = "default_size")]
    pub height: u32,
    #[serde(default)]
    pub kind: SimulationKind,
    #[serde(default = "default_dt")]
    pub dt: f32,
    #[serde(default = "default_pressure_iterations")]
    pub pressure_iterations: u32,
    #[serde(default)]
    pub pressure_scheme: PressureScheme,
    #[serde(default)]
    pub stencil: Stencil,
    #[serde(default)]
    pub advection: AdvectionConfig,
    /// Defaults to before advection for smoke, after for clouds.
    #[serde(default)]
    pub force_order: Option<ForceOrder>,
    #[serde(default)]
    pub buoyancy: BuoyancyConfig,
    /// Confinement strength; 0 disables the pass.
    #[serde(default = "default_vorticity")]
    pub vorticity: f32,
    #[serde(default)]
    pub clouds: CloudConfig,
    #[serde(default)]
    pub adaptive_dt: Option<AdaptiveDt>,
    /// Persistent sources; smoke gets a plume when this is left empty.
    #[serde(default)]
    pub emitters: Vec<Emitter>,
    #[serde(default = "default_splat_radius")]
    pub splat_radius: f32,
    /// Velocity per cell of pointer drag.
    #[serde(default = "default_splat_force")]
    pub splat_force: f32,
    #[serde(default = "default_visible")]
    pub visible: FieldName,
    #[serde(default)]
    pub seed: u64,
}

fn default_size() -> u32 { 256 }
fn default_dt() -> f32 { 0.1 }
fn default_pressure_iterations() -> u32 { 25 }
fn default_vorticity() -> f32 { 0.3 }
fn default_splat_radius() -> f32 { 8.0 }
fn default_splat_force() -> f32 { 10.0 }
fn default_visible() -> FieldName { FieldName::Density }

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: default_size(),
            height: default_size(),
            kind: SimulationKind::default(),
            dt: default_dt(),
            pressure_iterations: default_pressure_iterations(),
            pressure_scheme: PressureScheme::default(),
            stencil: Stencil::default(),
            advection: AdvectionConfig::default(),
            force_order: None,
            buoyancy: BuoyancyConfig::default(),
            vorticity: default_vorticity(),
            clouds: CloudConfig::default(),
            adaptive_dt: None,
            emitters: Vec::new(),
            splat_radius: default_splat_radius(),
            splat_force: default_splat_force(),
            visible: default_visible(),
            seed: 0,
        }
    }
}

impl SimConfig {
    pub fn new(kind: SimulationKind, width: u32, height: u32) -> Self {
        Self {
            kind,
            width,
            height,
            ..Self::default()
        }
    }

    pub fn size(&self) -> [u32; 2] {
        [self.width, self.height]
    }

    pub fn force_order(&self) -> ForceOrder {
        self.force_order.unwrap_or(match self.kind {
            SimulationKind::Clouds => ForceOrder::AfterAdvection,
            _ => ForceOrder::BeforeAdvection,
        })
    }

    /// The emitters in effect: the configured ones, or the default smoke
    /// plume near the bottom centre.
    pub fn effective_emitters(&self) -> Vec<Emitter> {
        if !self.emitters.is_empty() || self.kind != SimulationKind::Smoke {
            return self.emitters.clone();
        }
        let y = (self.height / 12).max(4) as i32;
        vec![Emitter::plume([(self.width / 2) as i32, y])]
    }

    /// Rejects anything the pipeline cannot run with. Called before any field
    /// is allocated.
    pub fn validate(&self) -> Result<()> {
        for (name, dim) in [("width", self.width), ("height", self.height)] {
            if dim == 0 || !dim.is_power_of_two() {
                return Err(SimError::config(format!("{name} {dim} is not a power of two")));
            }
            if dim % LOCAL_TILE != 0 {
                return Err(SimError::config(format!(
                    "{name} {dim} is not a multiple of the {LOCAL_TILE}-cell workgroup tile"
                )));
            }
        }
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(SimError::config(format!("dt {} must be positive", self.dt)));
        }
        if !(1..=500).contains(&self.pressure_iterations) {
            return Err(SimError::config(format!(
                "pressure_iterations {} outside 1..=500",
                self.pressure_iterations
            )));
        }
        if !(1..=4).contains(&self.advection.rk_order) {
            return Err(SimError::config(format!(
                "rk_order {} outside 1..=4",
                self.advection.rk_order
            )));
        }
        if !(0.0..=1.0).contains(&self.advection.revert) {
            return Err(SimError::config(format!(
                "revert {} outside [0, 1]",
                self.advection.revert
            )));
        }
        if self.vorticity < 0.0 || !self.vorticity.is_finite() {
            return Err(SimError::config("vorticity must be a finite, non-negative strength"));
        }
        if let Some(rule) = self.adaptive_dt {
            if !(rule.target_displacement > 0.0 && rule.epsilon >= 0.0) {
                return Err(SimError::config("adaptive_dt needs a positive target displacement"));
            }
        }
        if self.splat_radius <= 0.0 {
            return Err(SimError::config("splat_radius must be positive"));
        }
        Ok(())
    }
}
