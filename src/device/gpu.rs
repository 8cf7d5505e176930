use std::collections::HashMap;

use wgpu::util::DeviceExt;

use super::{ComputeDevice, Pass};
use crate::error::{Result, SimError};
use crate::field::{FieldDesc, FieldId, Vec4};
use crate::kernel::{Kernel, workgroups};
use crate::shaders::ShaderSource;

struct GpuField {
    desc: FieldDesc,
    buffer: wgpu::Buffer,
}

/// Fields as storage buffers, kernels as compute pipelines.
///
/// Dispatches are recorded into one pending encoder, one compute pass each;
/// `barrier` submits it.
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    name: String,
    pipelines: HashMap<Kernel, wgpu::ComputePipeline>,
    fields: Vec<GpuField>,
    encoder: Option<wgpu::CommandEncoder>,
}

async fn request_adapter() -> Result<wgpu::Adapter> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });
    instance
        .request_adapter(&wgpu::RequestAdapterOptions::default())
        .await
        .map_err(|e| SimError::Device(format!("no GPU adapter: {e}")))
}

/// `"<adapter name> (<backend>)"` of the adapter the device would use.
pub async fn describe_adapter() -> Result<String> {
    let info = request_adapter().await?.get_info();
    Ok(format!("{} ({:?})", info.name, info.backend))
}

impl WgpuDevice {
    /// Opens the default adapter and compiles every kernel from `shaders`.
    /// Any kernel that fails to load or validate aborts construction.
    pub async fn new(shaders: &dyn ShaderSource) -> Result<Self> {
        let adapter = request_adapter().await?;
        let info = adapter.get_info();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|e| SimError::Device(format!("request_device failed: {e}")))?;

        let mut pipelines = HashMap::new();
        for kernel in Kernel::ALL {
            let source = shaders.load(kernel)?;
            pipelines.insert(kernel, compile(&device, kernel, &source).await?);
        }
        let name = format!("{}/wgpu", info.name);
        log::info!("compiled {} kernels on {name} ({:?})", pipelines.len(), info.backend);

        Ok(Self {
            device,
            queue,
            name,
            pipelines,
            fields: Vec::new(),
            encoder: None,
        })
    }

    pub fn blocking(shaders: &dyn ShaderSource) -> Result<Self> {
        pollster::block_on(Self::new(shaders))
    }

    fn field(&self, id: FieldId) -> Result<&GpuField> {
        self.fields.get(id.index()).ok_or(SimError::UnknownField(id))
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(Some(encoder.finish()));
        }
    }
}

async fn compile(device: &wgpu::Device, kernel: Kernel, source: &str) -> Result<wgpu::ComputePipeline> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(kernel.name()),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });
    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(kernel.name()),
        layout: None,
        module: &module,
        entry_point: Some("main"),
        compilation_options: wgpu::PipelineCompilationOptions::default(),
        cache: None,
    });
    match device.pop_error_scope().await {
        Some(err) => Err(SimError::KernelLoad {
            kernel,
            message: err.to_string(),
        }),
        None => Ok(pipeline),
    }
}

fn buffer(fields: &[GpuField], id: FieldId) -> Result<&wgpu::Buffer> {
    fields
        .get(id.index())
        .map(|f| &f.buffer)
        .ok_or(SimError::UnknownField(id))
}

fn byte_len(desc: &FieldDesc) -> u64 {
    (desc.cells() * std::mem::size_of::<Vec4>()) as u64
}

/// Every field is bound whole as a storage buffer, so it must fit the
/// device's binding limit, not just its buffer limit.
fn check_binding_size(desc: &FieldDesc, limit: u64) -> Result<()> {
    let bytes = byte_len(desc);
    if bytes > limit {
        return Err(SimError::config(format!(
            "a {}x{} field needs {bytes} bytes, over the device's {limit}-byte storage binding limit",
            desc.width, desc.height
        )));
    }
    Ok(())
}

fn map_wait(device: &wgpu::Device, slice: &wgpu::BufferSlice<'_>) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |r| {
        let _ = tx.send(r);
    });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| SimError::Readback(format!("device poll failed: {e}")))?;
    rx.recv()
        .map_err(|_| SimError::Readback("map_async channel closed".into()))?
        .map_err(|e| SimError::Readback(e.to_string()))
}

impl ComputeDevice for WgpuDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_field(&mut self, desc: FieldDesc) -> Result<FieldId> {
        let limits = self.device.limits();
        let limit = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
        check_binding_size(&desc, limit)?;
        let id = FieldId(self.fields.len() as u32);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("field"),
            size: byte_len(&desc),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        self.fields.push(GpuField { desc, buffer });
        Ok(id)
    }

    fn desc(&self, id: FieldId) -> Result<FieldDesc> {
        Ok(self.field(id)?.desc)
    }

    fn upload(&mut self, id: FieldId, data: &[Vec4]) -> Result<()> {
        self.flush();
        let field = self.field(id)?;
        if data.len() != field.desc.cells() {
            return Err(SimError::Device(format!(
                "upload of {} cells into a {}x{} field",
                data.len(),
                field.desc.width,
                field.desc.height
            )));
        }
        self.queue.write_buffer(&field.buffer, 0, bytemuck::cast_slice(data));
        Ok(())
    }

    fn read_back(&mut self, id: FieldId) -> Result<Vec<Vec4>> {
        self.flush();
        let field = self.field(id)?;
        let bytes = byte_len(&field.desc);
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("field-read"),
            size: bytes,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&Default::default());
        encoder.copy_buffer_to_buffer(&field.buffer, 0, &staging, 0, bytes);
        self.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        map_wait(&self.device, &slice)?;
        let out = {
            let mapped = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, Vec4>(&mapped).to_vec()
        };
        staging.unmap();
        Ok(out)
    }

    fn dispatch(&mut self, pass: &Pass<'_>) -> Result<()> {
        let pipeline = self.pipelines.get(&pass.kernel).ok_or_else(|| SimError::KernelLoad {
            kernel: pass.kernel,
            message: "kernel was never compiled".into(),
        })?;
        let params = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("params"),
            contents: bytemuck::bytes_of(pass.params),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: params.as_entire_binding(),
        }];
        for (slot, &id) in pass.inputs.iter().chain([&pass.output]).enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: slot as u32 + 1,
                resource: buffer(&self.fields, id)?.as_entire_binding(),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(pass.kernel.name()),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let device = &self.device;
        let encoder = self
            .encoder
            .get_or_insert_with(|| device.create_command_encoder(&Default::default()));
        {
            let mut cpass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(pass.kernel.name()),
                timestamp_writes: None,
            });
            cpass.set_pipeline(pipeline);
            cpass.set_bind_group(0, &bind_group, &[]);
            let (x, y) = workgroups(pass.params.out_size);
            cpass.dispatch_workgroups(x, y, 1);
        }
        Ok(())
    }

    fn barrier(&mut self) -> Result<()> {
        self.flush();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Filter;

    #[test]
    fn fields_over_the_binding_limit_are_refused() {
        let limit = u64::from(wgpu::Limits::default().max_storage_buffer_binding_size);
        check_binding_size(&FieldDesc::new(2048, 2048, Filter::Linear), limit).unwrap();
        let err = check_binding_size(&FieldDesc::new(4096, 4096, Filter::Linear), limit).unwrap_err();
        assert!(matches!(err, SimError::Config(_)), "{err}");
        assert!(err.to_string().contains("4096x4096"), "{err}");
    }
}
