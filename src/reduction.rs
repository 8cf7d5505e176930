//! Grid-wide maximum velocity magnitude via a halving pyramid, and the
//! CFL-like timestep rule built on it.

use serde::{Deserialize, Serialize};

use crate::dispatch::Dispatcher;
use crate::error::{Result, SimError};
use crate::field::{FieldDesc, FieldId, Filter, Grid, Vec4};
use crate::kernel::{Kernel, Params};

/// `mode` 0 reduces `|(c0, c1)|`, any other mode reduces channel 0.
pub fn reduce_max_cell(src: &Grid<'_>, p: &Params, x: u32, y: u32) -> Vec4 {
    let mut best = 0.0f32;
    for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
        let sx = 2 * x + dx;
        let sy = 2 * y + dy;
        if sx >= src.width || sy >= src.height {
            continue;
        }
        let c = src.at(sx as i32, sy as i32);
        let v = if p.mode == 0 {
            (c[0] * c[0] + c[1] * c[1]).sqrt()
        } else {
            c[0]
        };
        best = best.max(v);
    }
    [best, 0.0, 0.0, 0.0]
}

/// Reduction pyramid allocated once for a given grid size.
pub struct MaxReducer {
    levels: Vec<FieldId>,
}

impl MaxReducer {
    pub fn new(dispatcher: &mut Dispatcher, size: [u32; 2]) -> Result<Self> {
        let mut levels = Vec::new();
        let [mut w, mut h] = size;
        while w > 1 || h > 1 {
            w = w.div_ceil(2);
            h = h.div_ceil(2);
            levels.push(dispatcher.create_field(FieldDesc::new(w, h, Filter::Nearest))?);
        }
        Ok(Self { levels })
    }

    pub fn passes(&self) -> usize {
        self.levels.len()
    }

    /// Largest `|(u, v)|` in `field`. Stalls on the final readback.
    pub fn measure(&self, dispatcher: &mut Dispatcher, field: FieldId) -> Result<f32> {
        let mut src = field;
        for (i, &level) in self.levels.iter().enumerate() {
            let params = Params {
                mode: if i == 0 { 0 } else { 1 },
                ..Params::default()
            };
            dispatcher.run(Kernel::ReduceMax, &[src], level, &params)?;
            src = level;
        }
        if self.levels.is_empty() {
            // 1x1 grid
            let cell = dispatcher.read_back(field)?;
            return Ok(cell.first().map_or(0.0, |c| (c[0] * c[0] + c[1] * c[1]).sqrt()));
        }
        let out = dispatcher.read_back(src)?;
        out.first()
            .map(|c| c[0])
            .ok_or_else(|| SimError::Readback("empty reduction result".into()))
    }
}

/// Timestep rule: `dt = target_displacement / max_speed` once the flow moves.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveDt {
    /// Cells a parcel may travel per step.
    #[serde(default = "default_target_displacement")]
    pub target_displacement: f32,
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,
}

fn default_target_displacement() -> f32 { 5.0 }
fn default_epsilon() -> f32 { 1e-4 }

impl Default for AdaptiveDt {
    fn default() -> Self {
        Self {
            target_displacement: default_target_displacement(),
            epsilon: default_epsilon(),
        }
    }
}

impl AdaptiveDt {
    pub fn next_dt(&self, current: f32, max_speed: f32) -> f32 {
        if max_speed.is_finite() && max_speed > self.epsilon {
            self.target_displacement / max_speed
        } else {
            current
        }
    }
}
