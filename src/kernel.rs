//! Kernel identifiers and the shared uniform block every kernel reads.

use std::fmt;

use bytemuck::{Pod, Zeroable};

/// Workgroup edge length; grid dimensions must be multiples of it.
pub const LOCAL_TILE: u32 = 16;

pub fn workgroups(size: [u32; 2]) -> (u32, u32) {
    (size[0].div_ceil(LOCAL_TILE), size[1].div_ceil(LOCAL_TILE))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kernel {
    Clear,
    Splat,
    Advect,
    MacCormack,
    DivergenceCurl,
    Jacobi,
    Project,
    Vorticity,
    Buoyancy,
    Condense,
    LatentHeat,
    DivergenceHalf,
    JacobiRedBlack,
    ProjectRedBlack,
    ReduceMax,
}

impl Kernel {
    pub const ALL: [Kernel; 15] = [
        Kernel::Clear,
        Kernel::Splat,
        Kernel::Advect,
        Kernel::MacCormack,
        Kernel::DivergenceCurl,
        Kernel::Jacobi,
        Kernel::Project,
        Kernel::Vorticity,
        Kernel::Buoyancy,
        Kernel::Condense,
        Kernel::LatentHeat,
        Kernel::DivergenceHalf,
        Kernel::JacobiRedBlack,
        Kernel::ProjectRedBlack,
        Kernel::ReduceMax,
    ];

    /// Name used for shader files and labels.
    pub fn name(self) -> &'static str {
        match self {
            Kernel::Clear => "clear",
            Kernel::Splat => "splat",
            Kernel::Advect => "advect",
            Kernel::MacCormack => "maccormack",
            Kernel::DivergenceCurl => "divergence_curl",
            Kernel::Jacobi => "jacobi",
            Kernel::Project => "project",
            Kernel::Vorticity => "vorticity",
            Kernel::Buoyancy => "buoyancy",
            Kernel::Condense => "condense",
            Kernel::LatentHeat => "latent_heat",
            Kernel::DivergenceHalf => "divergence_half",
            Kernel::JacobiRedBlack => "jacobi_red_black",
            Kernel::ProjectRedBlack => "project_red_black",
            Kernel::ReduceMax => "reduce_max",
        }
    }

    /// Number of read-only fields bound before the output (bindings 1..=n).
    pub fn inputs(self) -> usize {
        match self {
            Kernel::Clear => 0,
            Kernel::Splat | Kernel::DivergenceCurl | Kernel::DivergenceHalf | Kernel::ReduceMax => 1,
            Kernel::Advect
            | Kernel::Jacobi
            | Kernel::Project
            | Kernel::Vorticity
            | Kernel::Condense
            | Kernel::LatentHeat => 2,
            Kernel::Buoyancy | Kernel::JacobiRedBlack | Kernel::ProjectRedBlack => 3,
            Kernel::MacCormack => 4,
        }
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Uniform block shared by all kernels (binding 0). Layout matches the WGSL
/// `Params` struct in `shaders.rs`; keep both in sync.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Params {
    pub out_size: [u32; 2],
    pub src_size: [u32; 2],
    pub spot_pos: [i32; 2],
    pub order: u32,
    pub parity: u32,
    pub color: [f32; 4],
    pub dt: f32,
    pub kappa: f32,
    pub sigma: f32,
    pub t0: f32,
    pub revert: f32,
    pub intensity: f32,
    pub radius: f32,
    pub vorticity: f32,
    pub falloff: u32,
    pub mode: u32,
    pub filter: u32,
    pub latent_heat: f32,
    pub lapse_rate: f32,
    pub sat_vapor: f32,
    pub sat_exp: f32,
    pub stencil: u32,
}

impl Params {
    /// A block sized for a same-resolution pass over `size`.
    pub fn sized(size: [u32; 2]) -> Self {
        Self {
            out_size: size,
            src_size: size,
            ..Self::zeroed()
        }
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::zeroed()
    }
}
