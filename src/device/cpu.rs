use rayon::prelude::*;

use super::{ComputeDevice, Pass};
use crate::error::{Result, SimError};
use crate::field::{FieldDesc, FieldId, Grid, Vec4};
use crate::kernel::{Kernel, Params};
use crate::{advection, forces, pressure, reduction, splat};

struct HostField {
    desc: FieldDesc,
    data: Vec<Vec4>,
}

/// Host reference device. Kernels run row-parallel on the rayon pool and
/// finish before `dispatch` returns, so `barrier` has nothing to flush.
#[derive(Default)]
pub struct CpuDevice {
    fields: Vec<HostField>,
}

impl CpuDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn field(&self, id: FieldId) -> Result<&HostField> {
        self.fields.get(id.index()).ok_or(SimError::UnknownField(id))
    }
}

impl ComputeDevice for CpuDevice {
    fn name(&self) -> &str {
        "cpu/rayon"
    }

    fn create_field(&mut self, desc: FieldDesc) -> Result<FieldId> {
        let id = FieldId(self.fields.len() as u32);
        self.fields.push(HostField {
            desc,
            data: vec![[0.0; 4]; desc.cells()],
        });
        Ok(id)
    }

    fn desc(&self, id: FieldId) -> Result<FieldDesc> {
        Ok(self.field(id)?.desc)
    }

    fn upload(&mut self, id: FieldId, data: &[Vec4]) -> Result<()> {
        let field = self
            .fields
            .get_mut(id.index())
            .ok_or(SimError::UnknownField(id))?;
        if field.data.len() != data.len() {
            return Err(SimError::Device(format!(
                "upload of {} cells into a {}x{} field",
                data.len(),
                field.desc.width,
                field.desc.height
            )));
        }
        field.data.copy_from_slice(data);
        Ok(())
    }

    fn read_back(&mut self, id: FieldId) -> Result<Vec<Vec4>> {
        Ok(self.field(id)?.data.clone())
    }

    fn dispatch(&mut self, pass: &Pass<'_>) -> Result<()> {
        let out_index = pass.output.index();
        if out_index >= self.fields.len() {
            return Err(SimError::UnknownField(pass.output));
        }
        let mut out = std::mem::take(&mut self.fields[out_index].data);
        let out_desc = self.fields[out_index].desc;

        let result = (|| {
            let mut grids = Vec::with_capacity(pass.inputs.len());
            for &id in pass.inputs {
                let f = self.field(id)?;
                grids.push(Grid::new(&f.data, f.desc.width, f.desc.height));
            }
            let width = out_desc.width as usize;
            out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
                for (x, cell) in row.iter_mut().enumerate() {
                    *cell = evaluate(pass.kernel, &grids, pass.params, x as u32, y as u32);
                }
            });
            Ok(())
        })();

        self.fields[out_index].data = out;
        result
    }

    fn barrier(&mut self) -> Result<()> {
        Ok(())
    }
}

fn evaluate(kernel: Kernel, inputs: &[Grid<'_>], p: &Params, x: u32, y: u32) -> Vec4 {
    match kernel {
        Kernel::Clear => [0.0; 4],
        Kernel::Splat => splat::splat_cell(&inputs[0], p, x, y),
        Kernel::Advect => advection::advect_cell(&inputs[0], &inputs[1], p, x, y),
        Kernel::MacCormack => {
            advection::maccormack_cell(&inputs[0], &inputs[1], &inputs[2], &inputs[3], p, x, y)
        }
        Kernel::DivergenceCurl => pressure::divergence_curl_cell(&inputs[0], p, x, y),
        Kernel::Jacobi => pressure::jacobi_cell(&inputs[0], &inputs[1], x, y),
        Kernel::Project => pressure::project_cell(&inputs[0], &inputs[1], p, x, y),
        Kernel::Vorticity => forces::vorticity_cell(&inputs[0], &inputs[1], p, x, y),
        Kernel::Buoyancy => forces::buoyancy_cell(&inputs[0], &inputs[1], &inputs[2], p, x, y),
        Kernel::Condense => forces::condense_cell(&inputs[0], &inputs[1], p, x, y),
        Kernel::LatentHeat => forces::latent_heat_cell(&inputs[0], &inputs[1], p, x, y),
        Kernel::DivergenceHalf => pressure::divergence_half_cell(&inputs[0], p, x, y),
        Kernel::JacobiRedBlack => {
            pressure::jacobi_red_black_cell(&inputs[0], &inputs[1], &inputs[2], p, x, y)
        }
        Kernel::ProjectRedBlack => {
            pressure::project_red_black_cell(&inputs[0], &inputs[1], &inputs[2], p, x, y)
        }
        Kernel::ReduceMax => reduction::reduce_max_cell(&inputs[0], p, x, y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Filter;

    #[test]
    fn clear_zeroes_the_output() {
        let mut dev = CpuDevice::new();
        let desc = FieldDesc::new(16, 16, Filter::Nearest);
        let id = dev.create_field(desc).unwrap();
        dev.upload(id, &vec![[3.0; 4]; desc.cells()]).unwrap();
        let params = Params::sized(desc.size());
        dev.dispatch(&Pass {
            kernel: Kernel::Clear,
            inputs: &[],
            output: id,
            params: &params,
        })
        .unwrap();
        assert!(dev.read_back(id).unwrap().iter().all(|c| *c == [0.0; 4]));
    }

    #[test]
    fn upload_rejects_wrong_length() {
        let mut dev = CpuDevice::new();
        let id = dev.create_field(FieldDesc::new(16, 16, Filter::Linear)).unwrap();
        assert!(matches!(dev.upload(id, &[[0.0; 4]; 3]), Err(SimError::Device(_))));
    }
}
