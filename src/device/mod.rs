//! Compute devices: where fields live and kernels run.

mod cpu;
mod gpu;

pub use cpu::CpuDevice;
pub use gpu::{WgpuDevice, describe_adapter};

use crate::error::Result;
use crate::field::{FieldDesc, FieldId, Vec4};
use crate::kernel::{Kernel, Params};

/// One kernel invocation over the output field's extent.
#[derive(Clone, Copy, Debug)]
pub struct Pass<'a> {
    pub kernel: Kernel,
    pub inputs: &'a [FieldId],
    pub output: FieldId,
    pub params: &'a Params,
}

pub trait ComputeDevice {
    fn name(&self) -> &str;

    fn create_field(&mut self, desc: FieldDesc) -> Result<FieldId>;

    fn desc(&self, id: FieldId) -> Result<FieldDesc>;

    fn upload(&mut self, id: FieldId, data: &[Vec4]) -> Result<()>;

    /// Copies a field back to the host; waits for all submitted work.
    fn read_back(&mut self, id: FieldId) -> Result<Vec<Vec4>>;

    fn dispatch(&mut self, pass: &Pass<'_>) -> Result<()>;

    /// Makes every write dispatched so far visible to later dispatches.
    fn barrier(&mut self) -> Result<()>;
}
