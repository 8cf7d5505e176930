//! WGSL kernel sources and where to load them from.
//!
//! Every kernel sees the same layout: the `Params` uniform at binding 0,
//! read-only inputs `in1..inN` at bindings 1..=N and the output at N+1.
//! The per-cell math mirrors the host reference kernels.

use std::path::PathBuf;

use crate::error::{Result, SimError};
use crate::kernel::Kernel;

pub trait ShaderSource {
    /// Complete WGSL module for `kernel`, entry point `main`.
    fn load(&self, kernel: Kernel) -> Result<String>;
}

/// The kernels compiled into the binary.
#[derive(Clone, Copy, Debug, Default)]
pub struct BuiltinShaders;

impl ShaderSource for BuiltinShaders {
    fn load(&self, kernel: Kernel) -> Result<String> {
        Ok(module(kernel))
    }
}

/// `<dir>/<kernel name>.wgsl` files, e.g. for iterating on a kernel without
/// rebuilding. A file replaces the whole module, prelude included.
#[derive(Clone, Debug)]
pub struct ShaderDir {
    dir: PathBuf,
}

impl ShaderDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ShaderSource for ShaderDir {
    fn load(&self, kernel: Kernel) -> Result<String> {
        let path = self.dir.join(format!("{}.wgsl", kernel.name()));
        std::fs::read_to_string(&path).map_err(|e| SimError::KernelLoad {
            kernel,
            message: format!("{}: {e}", path.display()),
        })
    }
}

/// Prelude plus body for `kernel`.
pub fn module(kernel: Kernel) -> String {
    let mut src = prelude(kernel.inputs());
    if matches!(kernel, Kernel::Advect | Kernel::MacCormack) {
        src.push_str(BACKTRACE);
    }
    src.push_str(body(kernel));
    src
}

const PARAMS: &str = r#"
struct Params {
    out_size: vec2<u32>,
    src_size: vec2<u32>,
    spot_pos: vec2<i32>,
    order: u32,
    parity: u32,
    color: vec4<f32>,
    dt: f32,
    kappa: f32,
    sigma: f32,
    t0: f32,
    revert: f32,
    intensity: f32,
    radius: f32,
    vorticity: f32,
    falloff: u32,
    mode: u32,
    filter_mode: u32,
    latent_heat: f32,
    lapse_rate: f32,
    sat_vapor: f32,
    sat_exp: f32,
    stencil: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
"#;

const INPUT: &str = r#"
@group(0) @binding($N) var<storage, read> in$N: array<vec4<f32>>;

fn at$N(p: vec2<i32>, size: vec2<u32>) -> vec4<f32> {
    let c = clamp(p, vec2<i32>(0), vec2<i32>(size) - vec2<i32>(1));
    return in$N[u32(c.y) * size.x + u32(c.x)];
}

fn sample$N(pos: vec2<f32>, size: vec2<u32>, filter_mode: u32) -> vec4<f32> {
    let q = clamp(pos, vec2<f32>(0.0), vec2<f32>(size) - vec2<f32>(1.0));
    if (filter_mode == 1u) {
        return at$N(vec2<i32>(floor(q + vec2<f32>(0.5))), size);
    }
    let base = floor(q);
    let f = q - base;
    let b = vec2<i32>(base);
    let a = at$N(b, size);
    let r = at$N(b + vec2<i32>(1, 0), size);
    let t = at$N(b + vec2<i32>(0, 1), size);
    let tr = at$N(b + vec2<i32>(1, 1), size);
    return mix(mix(a, r, f.x), mix(t, tr, f.x), f.y);
}
"#;

const OUTPUT: &str = r#"
@group(0) @binding($N) var<storage, read_write> out_field: array<vec4<f32>>;

fn store(p: vec2<u32>, v: vec4<f32>) {
    out_field[p.y * params.out_size.x + p.x] = v;
}

fn outside(p: vec2<u32>) -> bool {
    return p.x >= params.out_size.x || p.y >= params.out_size.y;
}

fn is_edge(p: vec2<u32>, size: vec2<u32>) -> bool {
    return p.x == 0u || p.y == 0u || p.x + 1u == size.x || p.y + 1u == size.y;
}
"#;

fn prelude(inputs: usize) -> String {
    let mut src = String::from(PARAMS);
    for n in 1..=inputs {
        src.push_str(&INPUT.replace("$N", &n.to_string()));
    }
    src.push_str(&OUTPUT.replace("$N", &(inputs + 1).to_string()));
    src
}

const BACKTRACE: &str = r#"
fn vel_at(pos: vec2<f32>) -> vec2<f32> {
    return sample1(pos, params.src_size, 0u).xy;
}

fn backtrace(pos: vec2<f32>, dt: f32) -> vec2<f32> {
    let k1 = vel_at(pos);
    if (params.order <= 1u) {
        return pos - dt * k1;
    }
    let k2 = vel_at(pos - 0.5 * dt * k1);
    if (params.order == 2u) {
        return pos - dt * k2;
    }
    if (params.order == 3u) {
        let k3 = vel_at(pos - 0.75 * dt * k2);
        return pos - dt * (2.0 * k1 + 3.0 * k2 + 4.0 * k3) / 9.0;
    }
    let k3 = vel_at(pos - 0.5 * dt * k2);
    let k4 = vel_at(pos - dt * k3);
    return pos - dt * (k1 + 2.0 * k2 + 2.0 * k3 + k4) / 6.0;
}
"#;

fn body(kernel: Kernel) -> &'static str {
    match kernel {
        Kernel::Clear => CLEAR,
        Kernel::Splat => SPLAT,
        Kernel::Advect => ADVECT,
        Kernel::MacCormack => MACCORMACK,
        Kernel::DivergenceCurl => DIVERGENCE_CURL,
        Kernel::Jacobi => JACOBI,
        Kernel::Project => PROJECT,
        Kernel::Vorticity => VORTICITY,
        Kernel::Buoyancy => BUOYANCY,
        Kernel::Condense => CONDENSE,
        Kernel::LatentHeat => LATENT_HEAT,
        Kernel::DivergenceHalf => DIVERGENCE_HALF,
        Kernel::JacobiRedBlack => JACOBI_RED_BLACK,
        Kernel::ProjectRedBlack => PROJECT_RED_BLACK,
        Kernel::ReduceMax => REDUCE_MAX,
    }
}

const CLEAR: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    store(gid.xy, vec4<f32>(0.0));
}
"#;

const SPLAT: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let p = vec2<i32>(gid.xy);
    let d = vec2<f32>(p - params.spot_pos);
    let d2 = dot(d, d);
    let r = max(params.radius, 1e-3);
    var w = 0.0;
    if (params.falloff == 0u) {
        w = exp(-d2 / (r * r));
    } else if (d2 < r * r) {
        w = 1.0;
    }
    store(gid.xy, at1(p, params.src_size) + params.color * (params.intensity * w));
}
"#;

const ADVECT: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let departure = backtrace(vec2<f32>(gid.xy), params.dt);
    store(gid.xy, sample2(departure, params.out_size, params.filter_mode));
}
"#;

const MACCORMACK: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let size = params.out_size;
    let p = vec2<i32>(gid.xy);
    let orig = at2(p, size);
    let fwd = at3(p, size);
    let bwd = at4(p, size);
    var corrected = fwd + 0.5 * (orig - bwd);
    if (params.revert > 0.0) {
        let departure = backtrace(vec2<f32>(gid.xy), params.dt);
        let q = clamp(departure, vec2<f32>(0.0), vec2<f32>(size) - vec2<f32>(1.0));
        let b = vec2<i32>(floor(q));
        let c0 = at2(b, size);
        let c1 = at2(b + vec2<i32>(1, 0), size);
        let c2 = at2(b + vec2<i32>(0, 1), size);
        let c3 = at2(b + vec2<i32>(1, 1), size);
        let lo = min(min(c0, c1), min(c2, c3));
        let hi = max(max(c0, c1), max(c2, c3));
        let clipped = (corrected < lo) | (corrected > hi);
        corrected = select(corrected, corrected + (fwd - corrected) * params.revert, clipped);
    }
    store(gid.xy, corrected);
}
"#;

const DIVERGENCE_CURL: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let p = vec2<i32>(gid.xy);
    let size = params.src_size;
    let l = at1(p - vec2<i32>(1, 0), size);
    let r = at1(p + vec2<i32>(1, 0), size);
    let b = at1(p - vec2<i32>(0, 1), size);
    let t = at1(p + vec2<i32>(0, 1), size);
    var div = 0.5 * ((r.x - l.x) + (t.y - b.y));
    if (params.stencil == 1u) {
        let c = at1(p, size);
        div = (r.x - c.x) + (t.y - c.y);
    }
    let curl = 0.5 * ((r.y - l.y) - (t.x - b.x));
    store(gid.xy, vec4<f32>(div, curl, 0.0, 0.0));
}
"#;

const JACOBI: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let p = vec2<i32>(gid.xy);
    let size = params.out_size;
    let sum = at1(p - vec2<i32>(1, 0), size).x + at1(p + vec2<i32>(1, 0), size).x
        + at1(p - vec2<i32>(0, 1), size).x + at1(p + vec2<i32>(0, 1), size).x;
    store(gid.xy, vec4<f32>((sum - at2(p, size).x) * 0.25, 0.0, 0.0, 0.0));
}
"#;

const PROJECT: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let size = params.out_size;
    if (is_edge(gid.xy, size)) {
        store(gid.xy, vec4<f32>(0.0));
        return;
    }
    let p = vec2<i32>(gid.xy);
    let l = at2(p - vec2<i32>(1, 0), size).x;
    let b = at2(p - vec2<i32>(0, 1), size).x;
    var g = 0.5 * vec2<f32>(at2(p + vec2<i32>(1, 0), size).x - l, at2(p + vec2<i32>(0, 1), size).x - b);
    if (params.stencil == 1u) {
        let c = at2(p, size).x;
        g = vec2<f32>(c - l, c - b);
    }
    let v = at1(p, size);
    store(gid.xy, vec4<f32>(v.xy - g, v.z, v.w));
}
"#;

const VORTICITY: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let p = vec2<i32>(gid.xy);
    let size = params.out_size;
    let w = at2(p, size).y;
    let wl = abs(at2(p - vec2<i32>(1, 0), size).y);
    let wr = abs(at2(p + vec2<i32>(1, 0), size).y);
    let wb = abs(at2(p - vec2<i32>(0, 1), size).y);
    let wt = abs(at2(p + vec2<i32>(0, 1), size).y);
    let eta = vec2<f32>(0.5 * (wr - wl), 0.5 * (wt - wb));
    let n = eta / (length(eta) + 1e-5);
    let f = params.vorticity * vec2<f32>(n.y * w, -n.x * w);
    let v = at1(p, size);
    store(gid.xy, vec4<f32>(v.xy + params.dt * f, v.z, v.w));
}
"#;

const BUOYANCY: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let p = vec2<i32>(gid.xy);
    let size = params.out_size;
    let t = at2(p, size).x;
    let rho = at3(p, size).x;
    let v = at1(p, size);
    let lift = params.dt * (params.kappa * (t - params.t0) - params.sigma * rho);
    store(gid.xy, vec4<f32>(v.x, v.y + lift, v.z, v.w));
}
"#;

const CONDENSE: &str = r#"
fn phase_change(d: vec4<f32>, theta: f32, y: u32) -> f32 {
    let t = theta - params.lapse_rate * f32(y);
    let excess = d.y - params.sat_vapor * exp(params.sat_exp * (t - params.t0));
    if (excess > 0.0) {
        return excess;
    }
    return max(excess, -d.x);
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let p = vec2<i32>(gid.xy);
    let d = at1(p, params.out_size);
    let dq = phase_change(d, at2(p, params.out_size).x, gid.y);
    store(gid.xy, vec4<f32>(d.x + dq, d.y - dq, d.z, d.w));
}
"#;

const LATENT_HEAT: &str = r#"
fn phase_change(d: vec4<f32>, theta: f32, y: u32) -> f32 {
    let t = theta - params.lapse_rate * f32(y);
    let excess = d.y - params.sat_vapor * exp(params.sat_exp * (t - params.t0));
    if (excess > 0.0) {
        return excess;
    }
    return max(excess, -d.x);
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let p = vec2<i32>(gid.xy);
    let t = at1(p, params.out_size);
    let dq = phase_change(at2(p, params.out_size), t.x, gid.y);
    store(gid.xy, vec4<f32>(t.x + params.latent_heat * dq, t.y, t.z, t.w));
}
"#;

const DIVERGENCE_HALF: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let size = params.src_size;
    let x = 2u * gid.x + ((gid.y + params.parity) & 1u);
    let p = vec2<i32>(i32(x), i32(gid.y));
    let l = at1(p - vec2<i32>(1, 0), size);
    let r = at1(p + vec2<i32>(1, 0), size);
    let b = at1(p - vec2<i32>(0, 1), size);
    let t = at1(p + vec2<i32>(0, 1), size);
    var div = 0.5 * ((r.x - l.x) + (t.y - b.y));
    if (params.stencil == 1u) {
        let c = at1(p, size);
        div = (r.x - c.x) + (t.y - c.y);
    }
    store(gid.xy, vec4<f32>(div, 0.0, 0.0, 0.0));
}
"#;

const JACOBI_RED_BLACK: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let hsize = params.out_size;
    let width = i32(hsize.x) * 2;
    let height = i32(hsize.y);
    let x = i32(2u * gid.x + ((gid.y + params.parity) & 1u));
    let y = i32(gid.y);
    let centre = at1(vec2<i32>(gid.xy), hsize).x;
    var sum = 0.0;
    var offsets = array<vec2<i32>, 4>(vec2<i32>(-1, 0), vec2<i32>(1, 0), vec2<i32>(0, -1), vec2<i32>(0, 1));
    for (var i = 0; i < 4; i++) {
        let n = vec2<i32>(x, y) + offsets[i];
        if (n.x >= 0 && n.y >= 0 && n.x < width && n.y < height) {
            sum += at2(vec2<i32>(n.x / 2, n.y), hsize).x;
        } else {
            sum += centre;
        }
    }
    let div = at3(vec2<i32>(gid.xy), hsize).x;
    store(gid.xy, vec4<f32>((sum - div) * 0.25, 0.0, 0.0, 0.0));
}
"#;

const PROJECT_RED_BLACK: &str = r#"
fn pressure(x: i32, y: i32) -> f32 {
    let hsize = vec2<u32>(params.out_size.x / 2u, params.out_size.y);
    let c = clamp(vec2<i32>(x, y), vec2<i32>(0), vec2<i32>(params.out_size) - vec2<i32>(1));
    let h = vec2<i32>(c.x / 2, c.y);
    if (((c.x + c.y) & 1) == 0) {
        return at2(h, hsize).x;
    }
    return at3(h, hsize).x;
}

@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let size = params.out_size;
    if (is_edge(gid.xy, size)) {
        store(gid.xy, vec4<f32>(0.0));
        return;
    }
    let p = vec2<i32>(gid.xy);
    let l = pressure(p.x - 1, p.y);
    let b = pressure(p.x, p.y - 1);
    var g = 0.5 * vec2<f32>(pressure(p.x + 1, p.y) - l, pressure(p.x, p.y + 1) - b);
    if (params.stencil == 1u) {
        let c = pressure(p.x, p.y);
        g = vec2<f32>(c - l, c - b);
    }
    let v = at1(p, size);
    store(gid.xy, vec4<f32>(v.xy - g, v.z, v.w));
}
"#;

const REDUCE_MAX: &str = r#"
@compute @workgroup_size(16, 16, 1)
fn main(@builtin(global_invocation_id) gid: vec3<u32>) {
    if (outside(gid.xy)) { return; }
    let size = params.src_size;
    var best = 0.0;
    for (var dy = 0u; dy < 2u; dy++) {
        for (var dx = 0u; dx < 2u; dx++) {
            let s = 2u * gid.xy + vec2<u32>(dx, dy);
            if (s.x < size.x && s.y < size.y) {
                let c = at1(vec2<i32>(s), size);
                var v = c.x;
                if (params.mode == 0u) {
                    v = length(c.xy);
                }
                best = max(best, v);
            }
        }
    }
    store(gid.xy, vec4<f32>(best, 0.0, 0.0, 0.0));
}
"#;
