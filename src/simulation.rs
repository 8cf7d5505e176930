//! The generic stepping loop: allocates the fields a configuration needs,
//! replays its recipe every frame and exposes the input/presenter surface.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{SimConfig, SimulationKind};
use crate::device::{ComputeDevice, CpuDevice};
use crate::dispatch::Dispatcher;
use crate::error::{Result, SimError};
use crate::field::{FieldId, FieldSet, Vec4};
use crate::input::Pointer;
use crate::kernel::{Kernel, Params};
use crate::recipe::{BufRef, FieldLayout, FieldName, Operator, Recipe, Step};
use crate::reduction::MaxReducer;
use crate::splat::{self, Emitter, Splat};

pub struct Simulation {
    config: SimConfig,
    dispatcher: Dispatcher,
    fields: BTreeMap<FieldName, FieldSet>,
    recipe: Recipe,
    reducer: MaxReducer,
    emitters: Vec<Emitter>,
    /// One-shot splats waiting for the next frame's source steps.
    queued: Vec<Splat>,
    /// This frame's splats; source steps drain the ones for their field.
    frame_splats: Vec<Splat>,
    pointer: Pointer,
    rng: StdRng,
    dt: f32,
    last_max_speed: Option<f32>,
    frame: u64,
}

impl Simulation {
    /// Validates `config`, allocates every field on `device` and checks the
    /// recipe. Nothing is allocated when the configuration is rejected.
    pub fn new(config: SimConfig, device: Box<dyn ComputeDevice>) -> Result<Self> {
        config.validate()?;
        let layout = FieldLayout::for_config(&config);
        let recipe = Recipe::for_config(&config);
        recipe.validate(&layout)?;
        if !layout.contains(config.visible) {
            return Err(SimError::config(format!(
                "visible field {} is not allocated for {:?}",
                config.visible, config.kind
            )));
        }

        let mut dispatcher = Dispatcher::new(device);
        let mut fields = BTreeMap::new();
        for (name, spec) in layout.iter() {
            let buffers = (0..spec.buffers)
                .map(|_| dispatcher.create_field(spec.desc))
                .collect::<Result<Vec<_>>>()?;
            fields.insert(name, FieldSet::new(buffers, spec.desc));
        }
        let reducer = MaxReducer::new(&mut dispatcher, config.size())?;

        log::info!(
            "{:?} simulation {}x{} on {}: {} fields, {} steps, {} reduction passes",
            config.kind,
            config.width,
            config.height,
            dispatcher.device_name(),
            fields.len(),
            recipe.steps().len(),
            reducer.passes()
        );

        let mut sim = Self {
            emitters: config.effective_emitters(),
            rng: StdRng::seed_from_u64(config.seed),
            dt: config.dt,
            config,
            dispatcher,
            fields,
            recipe,
            reducer,
            queued: Vec::new(),
            frame_splats: Vec::new(),
            pointer: Pointer::default(),
            last_max_speed: None,
            frame: 0,
        };
        sim.seed_initial_state()?;
        Ok(sim)
    }

    /// A simulation on the host reference device.
    pub fn cpu(config: SimConfig) -> Result<Self> {
        Self::new(config, Box::new(CpuDevice::new()))
    }

    fn seed_initial_state(&mut self) -> Result<()> {
        if self.config.kind != SimulationKind::Clouds {
            return Ok(());
        }
        let clouds = self.config.clouds;
        let ambient = self.config.buoyancy.t0;
        let ground = |y: u32| y < clouds.ground_rows;

        let density = self.set(FieldName::Density)?.current();
        self.dispatcher
            .fill(density, |_, y| if ground(y) { [0.0, 1.0, 0.0, 0.0] } else { [0.0; 4] })?;
        let temperature = self.set(FieldName::Temperature)?.current();
        self.dispatcher.fill(temperature, |_, y| {
            let t = if ground(y) { clouds.ground_temperature } else { ambient };
            [t, 0.0, 0.0, 0.0]
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Max speed measured for the most recent adaptive-dt update.
    pub fn last_max_speed(&self) -> Option<f32> {
        self.last_max_speed
    }

    pub fn device_name(&self) -> &str {
        self.dispatcher.device_name()
    }

    pub fn dispatches(&self) -> u64 {
        self.dispatcher.dispatches()
    }

    pub fn field(&self, name: FieldName) -> Option<&FieldSet> {
        self.fields.get(&name)
    }

    fn set(&self, name: FieldName) -> Result<&FieldSet> {
        self.fields
            .get(&name)
            .ok_or_else(|| SimError::config(format!("field {name} is not allocated")))
    }

    fn resolve(&self, r: BufRef) -> Result<FieldId> {
        Ok(self.set(r.field)?.slot(r.slot))
    }

    /// Handle of the visible field's current buffer, valid until the next step.
    pub fn output(&self) -> FieldId {
        self.fields[&self.config.visible].current()
    }

    pub fn read_output(&mut self) -> Result<Vec<Vec4>> {
        self.dispatcher.read_back(self.output())
    }

    pub fn read_field(&mut self, name: FieldName) -> Result<Vec<Vec4>> {
        let id = self.set(name)?.current();
        self.dispatcher.read_back(id)
    }

    /// Replaces the current contents of `name`.
    pub fn upload_field(&mut self, name: FieldName, data: &[Vec4]) -> Result<()> {
        let id = self.set(name)?.current();
        self.dispatcher.upload(id, data)
    }

    /// Largest velocity magnitude in the grid. Stalls on a readback.
    pub fn max_speed(&mut self) -> Result<f32> {
        let vel = self.set(FieldName::Velocity)?.current();
        self.reducer.measure(&mut self.dispatcher, vel)
    }

    /// Advances one frame: adaptive dt, this frame's splats, then every
    /// recipe step in order.
    pub fn step(&mut self) -> Result<()> {
        if let Some(rule) = self.config.adaptive_dt {
            let max = self.max_speed()?;
            if !max.is_finite() {
                log::warn!("frame {}: non-finite max speed {max}, keeping dt {}", self.frame, self.dt);
            }
            self.dt = rule.next_dt(self.dt, max);
            self.last_max_speed = Some(max);
        }

        self.frame_splats = std::mem::take(&mut self.queued);
        for emitter in &self.emitters {
            self.frame_splats.extend(emitter.emit(&mut self.rng));
        }

        let steps = std::mem::take(&mut self.recipe);
        let result = self.execute(steps.steps());
        self.recipe = steps;
        result?;

        // splats for fields this recipe has no source step for
        if !self.frame_splats.is_empty() {
            log::debug!("dropping {} splats with no source step", self.frame_splats.len());
            self.frame_splats.clear();
        }
        self.frame += 1;
        log::debug!("frame {} done, dt {:.4}", self.frame, self.dt);
        Ok(())
    }

    /// Runs the validated recipe steps in order. Each step is dispatched,
    /// published, then its commits advance the field sets.
    fn execute(&mut self, steps: &[Step]) -> Result<()> {
        for step in steps {
            if step.op == Operator::Sources {
                self.apply_sources(step.write.field)?;
                continue;
            }
            let inputs = step
                .reads
                .iter()
                .map(|&r| self.resolve(r))
                .collect::<Result<Vec<_>>>()?;
            let output = self.resolve(step.write)?;
            let params = self.params_for(step)?;
            self.dispatcher.run(step.op.kernel(), &inputs, output, &params)?;
            for c in &step.commit {
                if let Some(set) = self.fields.get_mut(&c.field) {
                    set.advance(c.slot);
                }
            }
        }
        Ok(())
    }

    fn apply_sources(&mut self, field: FieldName) -> Result<()> {
        let (mine, rest): (Vec<Splat>, Vec<Splat>) =
            std::mem::take(&mut self.frame_splats).into_iter().partition(|s| s.target == field);
        self.frame_splats = rest;
        for splat in mine {
            let set = self.set(field)?;
            let (src, dst) = (set.current(), set.next());
            self.dispatcher.run(Kernel::Splat, &[src], dst, &splat.params())?;
            if let Some(set) = self.fields.get_mut(&field) {
                set.swap();
            }
        }
        Ok(())
    }

    fn params_for(&self, step: &Step) -> Result<Params> {
        let cfg = &self.config;
        let mut p = Params {
            dt: self.dt,
            ..Params::default()
        };
        match step.op {
            Operator::Advect | Operator::AdvectForward | Operator::AdvectBackward | Operator::MacCormack => {
                p.order = cfg.advection.rk_order;
                p.revert = cfg.advection.revert;
                if let Some(src) = step.reads.get(1) {
                    p.filter = self.set(src.field)?.desc().filter.code();
                }
                if step.op == Operator::AdvectBackward {
                    p.dt = -self.dt;
                }
            }
            Operator::Vorticity => p.vorticity = cfg.vorticity,
            Operator::Buoyancy => {
                p.kappa = cfg.buoyancy.kappa;
                p.sigma = cfg.buoyancy.sigma;
                p.t0 = cfg.buoyancy.t0;
            }
            Operator::Condense | Operator::LatentHeat => {
                p.t0 = cfg.clouds.reference_temperature;
                p.latent_heat = cfg.clouds.latent_heat;
                p.lapse_rate = cfg.clouds.lapse_rate;
                p.sat_vapor = cfg.clouds.sat_vapor;
                p.sat_exp = cfg.clouds.sat_exp;
            }
            Operator::DivergenceHalf(parity) => {
                p.parity = parity.code();
                p.stencil = cfg.stencil.code();
            }
            Operator::RelaxRedBlack(parity) => p.parity = parity.code(),
            Operator::DivergenceCurl | Operator::Project | Operator::ProjectRedBlack => {
                p.stencil = cfg.stencil.code();
            }
            _ => {}
        }
        Ok(p)
    }

    /// Queues a splat for the next frame.
    pub fn queue_splat(&mut self, splat: Splat) -> Result<()> {
        if !splat.target.is_source() || !self.fields.contains_key(&splat.target) {
            return Err(SimError::config(format!(
                "splat target {} is not a source field of {:?}",
                splat.target, self.config.kind
            )));
        }
        self.queued.push(splat);
        Ok(())
    }

    pub fn queued_splats(&self) -> &[Splat] {
        &self.queued
    }

    pub fn pointer_press(&mut self, pos: [f32; 2]) {
        self.pointer.press(pos);
    }

    pub fn pointer_move(&mut self, pos: [f32; 2]) {
        self.pointer.moved(pos);
    }

    pub fn pointer_release(&mut self) {
        self.pointer.release();
    }

    /// Turns the pointer drag since the last call into a velocity splat
    /// proportional to the drag, plus a dye splat. Returns false when the
    /// pointer has not moved.
    pub fn add_splat(&mut self) -> bool {
        let Some(drag) = self.pointer.take_drag() else {
            return false;
        };
        let pos = [drag.pos[0].round() as i32, drag.pos[1].round() as i32];
        let force = self.config.splat_force;
        let radius = self.config.splat_radius;
        let color = [self.rng.r#gen::<f32>(), self.rng.r#gen::<f32>(), self.rng.r#gen::<f32>()];
        self.queued.push(Splat::new(
            FieldName::Velocity,
            pos,
            [drag.delta[0] * force, drag.delta[1] * force, 0.0],
            radius,
        ));
        self.queued.push(Splat::new(FieldName::Density, pos, color, radius));
        true
    }

    /// Queues `n` random impulse/dye pairs.
    pub fn add_multiple_splats(&mut self, n: usize) {
        let size = self.config.size();
        for _ in 0..n {
            let pair = splat::random_pair(
                &mut self.rng,
                size,
                self.config.splat_radius,
                self.config.splat_force * 10.0,
            );
            self.queued.extend(pair);
        }
    }

    /// Drops the most recently queued splat.
    pub fn remove_splat(&mut self) -> Option<Splat> {
        self.queued.pop()
    }
}
