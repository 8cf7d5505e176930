//! Kernel dispatch with write/read ordering checks.
//!
//! A field written by a dispatch stays "unpublished" until the next
//! `barrier()`. Binding an unpublished field as an input is an error: on a
//! real device that read would race the write.

use std::collections::HashSet;

use crate::device::{ComputeDevice, Pass};
use crate::error::{Result, SimError};
use crate::field::{FieldDesc, FieldId, Vec4};
use crate::kernel::{Kernel, Params};

pub struct Dispatcher {
    device: Box<dyn ComputeDevice>,
    unpublished: HashSet<FieldId>,
    dispatches: u64,
}

impl Dispatcher {
    pub fn new(device: Box<dyn ComputeDevice>) -> Self {
        Self {
            device,
            unpublished: HashSet::new(),
            dispatches: 0,
        }
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    /// Total kernel dispatches issued so far.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    pub fn create_field(&mut self, desc: FieldDesc) -> Result<FieldId> {
        self.device.create_field(desc)
    }

    /// Fills a field on the host from a per-cell generator and uploads it.
    pub fn fill(&mut self, id: FieldId, f: impl Fn(u32, u32) -> Vec4) -> Result<()> {
        let desc = self.device.desc(id)?;
        let mut data = Vec::with_capacity(desc.cells());
        for y in 0..desc.height {
            for x in 0..desc.width {
                data.push(f(x, y));
            }
        }
        self.upload(id, &data)
    }

    pub fn upload(&mut self, id: FieldId, data: &[Vec4]) -> Result<()> {
        self.barrier()?;
        self.device.upload(id, data)
    }

    /// Publishes pending writes, then copies the field to the host. Blocks
    /// until the device is idle.
    pub fn read_back(&mut self, id: FieldId) -> Result<Vec<Vec4>> {
        self.barrier()?;
        self.device.read_back(id)
    }

    /// Runs `kernel` with `inputs` bound to slots 1..=n and `output` to slot
    /// n+1. `out_size` and `src_size` are filled from the bound fields.
    pub fn dispatch(
        &mut self,
        kernel: Kernel,
        inputs: &[FieldId],
        output: FieldId,
        params: &Params,
    ) -> Result<()> {
        if inputs.len() != kernel.inputs() {
            return Err(SimError::Arity {
                kernel,
                expected: kernel.inputs(),
                got: inputs.len(),
            });
        }
        for &input in inputs {
            if input == output {
                return Err(SimError::Aliased { kernel, field: output });
            }
            if self.unpublished.contains(&input) {
                return Err(SimError::MissingBarrier { kernel, field: input });
            }
        }

        let out_desc = self.device.desc(output)?;
        let mut params = *params;
        params.out_size = out_desc.size();
        params.src_size = match inputs.first() {
            Some(&first) => self.device.desc(first)?.size(),
            None => out_desc.size(),
        };

        log::trace!("dispatch {kernel} {inputs:?} -> {output:?}");
        self.device.dispatch(&Pass {
            kernel,
            inputs,
            output,
            params: &params,
        })?;
        self.unpublished.insert(output);
        self.dispatches += 1;
        Ok(())
    }

    pub fn barrier(&mut self) -> Result<()> {
        if self.unpublished.is_empty() {
            return Ok(());
        }
        self.device.barrier()?;
        self.unpublished.clear();
        Ok(())
    }

    /// `dispatch` followed by `barrier`, the pattern every pipeline stage uses.
    pub fn run(
        &mut self,
        kernel: Kernel,
        inputs: &[FieldId],
        output: FieldId,
        params: &Params,
    ) -> Result<()> {
        self.dispatch(kernel, inputs, output, params)?;
        self.barrier()
    }
}
