//! Grid-based 2D smoke and fluid stepping on a compute device.
//!
//! A [`Simulation`] owns a set of buffered grid fields and replays a
//! [`Recipe`] of operator dispatches every frame: splat injection,
//! semi-Lagrangian/MacCormack advection, vorticity confinement, buoyancy,
//! condensation, a Jacobi or red-black pressure solve and projection. The
//! same kernels run on [`WgpuDevice`] (WGSL compute) and on the rayon-backed
//! [`CpuDevice`] used for tests and headless runs.

pub mod advection;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod field;
pub mod forces;
pub mod input;
pub mod kernel;
pub mod pressure;
pub mod recipe;
pub mod reduction;
pub mod shaders;
pub mod simulation;
pub mod splat;

pub use config::{
    AdvectionConfig, AdvectionScheme, BuoyancyConfig, CloudConfig, ForceOrder, PressureScheme,
    SimConfig, SimulationKind, Stencil,
};
pub use device::{ComputeDevice, CpuDevice, WgpuDevice, describe_adapter};
pub use dispatch::Dispatcher;
pub use error::{Result, SimError};
pub use field::{FieldDesc, FieldId, FieldSet, Filter, Vec4};
pub use kernel::{Kernel, Params};
pub use recipe::{BufRef, FieldLayout, FieldName, Operator, Recipe, Step};
pub use reduction::{AdaptiveDt, MaxReducer};
pub use shaders::{BuiltinShaders, ShaderDir, ShaderSource};
pub use simulation::Simulation;
pub use splat::{Emitter, Falloff, Splat};
