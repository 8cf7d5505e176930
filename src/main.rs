use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::{self, Read};
use std::path::PathBuf;

use smoke_sidecar::field::Grid;
use smoke_sidecar::pressure::divergence;
use smoke_sidecar::{
    BuiltinShaders, ComputeDevice, CpuDevice, FieldName, ShaderDir, ShaderSource, SimConfig,
    Simulation, Splat, Stencil, Vec4, WgpuDevice, describe_adapter,
};

#[derive(Debug, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
enum Request {
    Init {
        #[serde(default)]
        config: SimConfig,
        #[serde(default)]
        backend: Backend,
        #[serde(default)]
        shader_dir: Option<PathBuf>,
    },
    Step {
        #[serde(default)]
        config: SimConfig,
        #[serde(default = "default_frames")]
        frames: u32,
        #[serde(default)]
        splats: Vec<Splat>,
        #[serde(default)]
        random_splats: usize,
        #[serde(default)]
        backend: Backend,
        #[serde(default)]
        shader_dir: Option<PathBuf>,
    },
    Sweep {
        #[serde(default)]
        sizes: Vec<u32>,
        #[serde(default)]
        config: SimConfig,
        #[serde(default = "default_frames")]
        frames: u32,
        #[serde(default)]
        backend: Backend,
    },
    Probe {
        #[serde(default)]
        backend: Backend,
        #[serde(default)]
        shader_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum Backend {
    Cpu,
    #[default]
    Gpu,
}

fn default_frames() -> u32 { 10 }

#[derive(Debug, Serialize)]
struct InitResponse {
    ok: bool,
    backend: String,
    width: u32,
    height: u32,
    cells: u64,
    fields: usize,
    buffers: usize,
    recipe_steps: usize,
    elapsed_ms: f64,
}

#[derive(Debug, Serialize)]
struct StepResponse {
    ok: bool,
    backend: String,
    width: u32,
    height: u32,
    frames: u32,
    elapsed_ms: f64,
    fps: f64,
    dispatches: u64,
    avg_speed: f32,
    max_speed: f32,
    avg_divergence: f32,
    max_divergence: f32,
    output_total: f32,
    output_footprint: f32,
    dt_history: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct SweepResponse {
    ok: bool,
    backend: String,
    runs: Vec<StepResponse>,
}

#[derive(Debug, Serialize)]
struct ProbeResponse {
    ok: bool,
    backend: String,
    kernels: usize,
    elapsed_ms: f64,
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        let out = serde_json::json!({"ok": false, "error": format!("{err:#}")});
        println!(
            "{}",
            serde_json::to_string_pretty(&out).unwrap_or_else(|_| "{\"ok\":false}".into())
        );
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let req: Request = if input.trim().is_empty() {
        Request::Probe {
            backend: Backend::default(),
            shader_dir: None,
        }
    } else {
        serde_json::from_str(&input).context("invalid JSON request")?
    };

    match req {
        Request::Init {
            config,
            backend,
            shader_dir,
        } => {
            let resp = run_init(config, backend, shader_dir)?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::Step {
            config,
            frames,
            splats,
            random_splats,
            backend,
            shader_dir,
        } => {
            let device = open_device(backend, shader_dir)?;
            let resp = run_step(config, device, frames.max(1), splats, random_splats)?;
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::Sweep {
            sizes,
            config,
            frames,
            backend,
        } => {
            let fallback = vec![64, 128, 256, 512];
            let mut runs = Vec::new();
            for &n in if sizes.is_empty() { &fallback } else { &sizes } {
                let config = SimConfig {
                    width: n,
                    height: n,
                    ..config.clone()
                };
                let device = open_device(backend, None)?;
                runs.push(
                    run_step(config, device, frames.max(1), Vec::new(), 4)
                        .with_context(|| format!("sweep size {n}"))?,
                );
            }
            let ok = runs.iter().all(|r| r.ok);
            let backend = runs.first().map(|r| r.backend.clone()).unwrap_or_default();
            let resp = SweepResponse { ok, backend, runs };
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
        Request::Probe {
            backend,
            shader_dir,
        } => {
            let t0 = std::time::Instant::now();
            let (name, kernels) = match backend {
                Backend::Cpu => ("cpu/rayon".to_string(), smoke_sidecar::Kernel::ALL.len()),
                Backend::Gpu => {
                    let adapter = pollster::block_on(describe_adapter())?;
                    let device = WgpuDevice::blocking(shaders(shader_dir).as_ref())?;
                    (format!("{adapter} via {}", device.name()), smoke_sidecar::Kernel::ALL.len())
                }
            };
            let resp = ProbeResponse {
                ok: true,
                backend: name,
                kernels,
                elapsed_ms: t0.elapsed().as_secs_f64() * 1000.0,
            };
            println!("{}", serde_json::to_string_pretty(&resp)?);
        }
    }

    Ok(())
}

fn shaders(dir: Option<PathBuf>) -> Box<dyn ShaderSource> {
    match dir {
        Some(dir) => Box::new(ShaderDir::new(dir)),
        None => Box::new(BuiltinShaders),
    }
}

fn open_device(backend: Backend, shader_dir: Option<PathBuf>) -> Result<Box<dyn ComputeDevice>> {
    Ok(match backend {
        Backend::Cpu => Box::new(CpuDevice::new()),
        Backend::Gpu => Box::new(
            WgpuDevice::blocking(shaders(shader_dir).as_ref()).context("GPU device setup failed")?,
        ),
    })
}

fn run_init(config: SimConfig, backend: Backend, shader_dir: Option<PathBuf>) -> Result<InitResponse> {
    let t0 = std::time::Instant::now();
    let device = open_device(backend, shader_dir)?;
    let sim = Simulation::new(config, device).context("simulation setup failed")?;
    let cfg = sim.config();
    let names = [
        FieldName::Velocity,
        FieldName::Density,
        FieldName::Temperature,
        FieldName::DivCurl,
        FieldName::Pressure,
        FieldName::PressureBlack,
        FieldName::PressureRed,
        FieldName::DivBlack,
        FieldName::DivRed,
    ];
    let sets: Vec<_> = names.iter().filter_map(|&n| sim.field(n)).collect();
    Ok(InitResponse {
        ok: true,
        backend: sim.device_name().to_string(),
        width: cfg.width,
        height: cfg.height,
        cells: cfg.width as u64 * cfg.height as u64,
        fields: sets.len(),
        buffers: sets.iter().map(|s| s.buffer_count()).sum(),
        recipe_steps: sim.recipe().steps().len(),
        elapsed_ms: t0.elapsed().as_secs_f64() * 1000.0,
    })
}

fn run_step(
    config: SimConfig,
    device: Box<dyn ComputeDevice>,
    frames: u32,
    splats: Vec<Splat>,
    random_splats: usize,
) -> Result<StepResponse> {
    let mut sim = Simulation::new(config, device).context("simulation setup failed")?;
    for splat in splats {
        sim.queue_splat(splat)?;
    }
    sim.add_multiple_splats(random_splats);

    let t0 = std::time::Instant::now();
    let mut dt_history = Vec::with_capacity(frames as usize);
    for frame in 0..frames {
        sim.step().with_context(|| format!("frame {frame} failed"))?;
        dt_history.push(sim.dt());
    }
    let vel = sim.read_field(FieldName::Velocity)?;
    let output = sim.read_output()?;
    let elapsed = t0.elapsed().as_secs_f64();

    let (width, height) = (sim.config().width, sim.config().height);
    let (avg_speed, max_speed) = speed_stats(&vel);
    let (avg_divergence, max_divergence) = divergence_stats(&vel, width, height, sim.config().stencil);
    let output_total: f32 = output.iter().map(|c| c[0]).sum();
    let footprint = output.iter().filter(|c| c[0].abs() > 0.01).count();

    Ok(StepResponse {
        ok: true,
        backend: sim.device_name().to_string(),
        width,
        height,
        frames,
        elapsed_ms: elapsed * 1000.0,
        fps: if elapsed > 0.0 { frames as f64 / elapsed } else { 0.0 },
        dispatches: sim.dispatches(),
        avg_speed,
        max_speed,
        avg_divergence,
        max_divergence,
        output_total,
        output_footprint: footprint as f32 / output.len().max(1) as f32,
        dt_history,
    })
}

fn speed_stats(vel: &[Vec4]) -> (f32, f32) {
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    for v in vel {
        let s = (v[0] * v[0] + v[1] * v[1]).sqrt();
        sum += s;
        max = max.max(s);
    }
    (sum / vel.len().max(1) as f32, max)
}

/// Mean and max `|div|` over interior cells, measured with the stencil the
/// projection used; walls are excluded.
fn divergence_stats(vel: &[Vec4], width: u32, height: u32, stencil: Stencil) -> (f32, f32) {
    let grid = Grid::new(vel, width, height);
    let mut sum = 0.0f32;
    let mut max = 0.0f32;
    let mut n = 0usize;
    for y in 1..height.saturating_sub(1) {
        for x in 1..width.saturating_sub(1) {
            let d = divergence(&grid, stencil, x, y).abs();
            sum += d;
            max = max.max(d);
            n += 1;
        }
    }
    (sum / n.max(1) as f32, max)
}
