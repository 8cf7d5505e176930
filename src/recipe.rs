//! Recipes: the ordered operator list that makes up one simulation step, and
//! the symbolic check that every step reads published data and every write
//! is committed.
//!
//! Steps refer to buffers as `(field, slot)` pairs relative to the field's
//! current read index, so a recipe is built once and replayed every frame.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{AdvectionScheme, ForceOrder, PressureScheme, SimConfig, SimulationKind};
use crate::error::{Result, SimError};
use crate::field::{FieldDesc, Filter};
use crate::kernel::Kernel;

/// Logical quantities a simulation can allocate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Velocity,
    Density,
    Temperature,
    DivCurl,
    Pressure,
    PressureBlack,
    PressureRed,
    DivBlack,
    DivRed,
}

impl FieldName {
    /// Fields splats may target.
    pub fn is_source(self) -> bool {
        matches!(self, FieldName::Velocity | FieldName::Density | FieldName::Temperature)
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Checkerboard colour of a red-black pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parity {
    /// `(x + y)` even.
    Black,
    Red,
}

impl Parity {
    pub fn code(self) -> u32 {
        match self {
            Parity::Black => 0,
            Parity::Red => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            Parity::Black => Parity::Red,
            Parity::Red => Parity::Black,
        }
    }

    fn pressure(self) -> FieldName {
        match self {
            Parity::Black => FieldName::PressureBlack,
            Parity::Red => FieldName::PressureRed,
        }
    }

    fn divergence(self) -> FieldName {
        match self {
            Parity::Black => FieldName::DivBlack,
            Parity::Red => FieldName::DivRed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    /// Applies every splat queued for the written field. Expanded at run time
    /// into one dispatch and swap per splat.
    Sources,
    Advect,
    /// MacCormack forward pass, `+dt`.
    AdvectForward,
    /// MacCormack backward pass, `-dt`, over the forward result.
    AdvectBackward,
    MacCormack,
    DivergenceCurl,
    Vorticity,
    Buoyancy,
    Condense,
    LatentHeat,
    ClearPressure,
    Jacobi,
    Project,
    DivergenceHalf(Parity),
    RelaxRedBlack(Parity),
    ProjectRedBlack,
}

impl Operator {
    pub fn kernel(self) -> Kernel {
        match self {
            Operator::Sources => Kernel::Splat,
            Operator::Advect | Operator::AdvectForward | Operator::AdvectBackward => Kernel::Advect,
            Operator::MacCormack => Kernel::MacCormack,
            Operator::DivergenceCurl => Kernel::DivergenceCurl,
            Operator::Vorticity => Kernel::Vorticity,
            Operator::Buoyancy => Kernel::Buoyancy,
            Operator::Condense => Kernel::Condense,
            Operator::LatentHeat => Kernel::LatentHeat,
            Operator::ClearPressure => Kernel::Clear,
            Operator::Jacobi => Kernel::Jacobi,
            Operator::Project => Kernel::Project,
            Operator::DivergenceHalf(_) => Kernel::DivergenceHalf,
            Operator::RelaxRedBlack(_) => Kernel::JacobiRedBlack,
            Operator::ProjectRedBlack => Kernel::ProjectRedBlack,
        }
    }

    pub fn parity(self) -> Option<Parity> {
        match self {
            Operator::DivergenceHalf(p) | Operator::RelaxRedBlack(p) => Some(p),
            _ => None,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parity() {
            Some(p) => write!(f, "{}[{p:?}]", self.kernel()),
            None => write!(f, "{:?}", self),
        }
    }
}

/// A buffer of a field, `slot` positions after its current read index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufRef {
    pub field: FieldName,
    pub slot: usize,
}

impl BufRef {
    pub fn current(field: FieldName) -> Self {
        Self { field, slot: 0 }
    }

    pub fn next(field: FieldName) -> Self {
        Self { field, slot: 1 }
    }

    pub fn slot(field: FieldName, slot: usize) -> Self {
        Self { field, slot }
    }
}

impl fmt::Display for BufRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.field, self.slot)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Step {
    pub op: Operator,
    pub reads: Vec<BufRef>,
    pub write: BufRef,
    /// Buffers promoted to current once the dispatch has been published.
    pub commit: Vec<BufRef>,
}

impl Step {
    pub fn new(op: Operator, reads: Vec<BufRef>, write: BufRef) -> Self {
        Self { op, reads, write, commit: Vec::new() }
    }

    /// Commits the step's own write.
    pub fn committed(mut self) -> Self {
        self.commit.push(self.write);
        self
    }

    pub fn committing(mut self, refs: impl IntoIterator<Item = BufRef>) -> Self {
        self.commit.extend(refs);
        self
    }
}

/// Allocation plan for one field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub desc: FieldDesc,
    pub buffers: usize,
}

/// Every field a configuration needs, with its size and buffer count.
#[derive(Clone, Debug, Default)]
pub struct FieldLayout {
    fields: BTreeMap<FieldName, FieldSpec>,
}

impl FieldLayout {
    pub fn for_config(config: &SimConfig) -> Self {
        let [w, h] = config.size();
        let advected = match config.advection.scheme {
            AdvectionScheme::SemiLagrangian => 2,
            AdvectionScheme::MacCormack => 4,
        };
        let mut layout = Self::default();
        let full = |filter| FieldDesc::new(w, h, filter);

        layout.insert(FieldName::Velocity, full(Filter::Linear), advected);
        layout.insert(FieldName::Density, full(Filter::Linear), advected);
        if config.kind != SimulationKind::Fluid {
            layout.insert(FieldName::Temperature, full(Filter::Linear), advected);
        }
        layout.insert(FieldName::DivCurl, full(Filter::Nearest), 1);
        match config.pressure_scheme {
            PressureScheme::Jacobi => {
                layout.insert(FieldName::Pressure, full(Filter::Nearest), 2);
            }
            PressureScheme::RedBlack => {
                let half = FieldDesc::new(w / 2, h, Filter::Nearest);
                layout.insert(FieldName::PressureBlack, half, 2);
                layout.insert(FieldName::PressureRed, half, 2);
                layout.insert(FieldName::DivBlack, half, 1);
                layout.insert(FieldName::DivRed, half, 1);
            }
        }
        layout
    }

    pub fn insert(&mut self, name: FieldName, desc: FieldDesc, buffers: usize) {
        self.fields.insert(name, FieldSpec { desc, buffers });
    }

    pub fn get(&self, name: FieldName) -> Option<&FieldSpec> {
        self.fields.get(&name)
    }

    pub fn contains(&self, name: FieldName) -> bool {
        self.fields.contains_key(&name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &FieldSpec)> {
        self.fields.iter().map(|(name, spec)| (*name, spec))
    }
}

/// An ordered, validated operator list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Recipe {
    steps: Vec<Step>,
}

impl Recipe {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// The recipe for `config.kind`, honouring the configured advection,
    /// pressure scheme and force ordering.
    pub fn for_config(config: &SimConfig) -> Self {
        let mut b = Builder { config, steps: Vec::new() };
        match config.kind {
            SimulationKind::Fluid => {
                b.sources(FieldName::Velocity);
                b.sources(FieldName::Density);
                b.advect(FieldName::Velocity);
                b.pressure();
                b.advect(FieldName::Density);
            }
            SimulationKind::Smoke => {
                b.sources(FieldName::Density);
                b.sources(FieldName::Temperature);
                b.sources(FieldName::Velocity);
                match config.force_order() {
                    ForceOrder::BeforeAdvection => {
                        b.vorticity();
                        b.buoyancy();
                        b.advect(FieldName::Velocity);
                        b.pressure();
                        b.advect(FieldName::Density);
                        b.advect(FieldName::Temperature);
                    }
                    ForceOrder::AfterAdvection => {
                        b.advect(FieldName::Velocity);
                        b.advect(FieldName::Density);
                        b.advect(FieldName::Temperature);
                        b.vorticity();
                        b.buoyancy();
                        b.pressure();
                    }
                }
            }
            SimulationKind::Clouds => {
                b.sources(FieldName::Density);
                b.sources(FieldName::Temperature);
                b.sources(FieldName::Velocity);
                match config.force_order() {
                    ForceOrder::BeforeAdvection => {
                        b.vorticity();
                        b.buoyancy();
                        b.thermodynamics();
                        b.advect(FieldName::Velocity);
                        b.advect(FieldName::Density);
                        b.advect(FieldName::Temperature);
                        b.pressure();
                    }
                    ForceOrder::AfterAdvection => {
                        b.advect(FieldName::Velocity);
                        b.advect(FieldName::Density);
                        b.advect(FieldName::Temperature);
                        b.buoyancy();
                        b.vorticity();
                        b.thermodynamics();
                        b.pressure();
                    }
                }
            }
        }
        Self { steps: b.steps }
    }

    /// Walks the steps symbolically against `layout`.
    ///
    /// Rejects unknown fields, out-of-range slots, wrong arity, a step that
    /// reads its own output, reads of scratch slots nothing has written since
    /// the last commit, commits of unwritten slots, and writes still pending
    /// when the recipe ends.
    pub fn validate(&self, layout: &FieldLayout) -> Result<()> {
        let mut pending: BTreeMap<FieldName, BTreeSet<usize>> = BTreeMap::new();

        for (i, step) in self.steps.iter().enumerate() {
            let fail = |message: String| SimError::Recipe {
                step: i,
                op: step.op.to_string(),
                message,
            };
            let kernel = step.op.kernel();
            if step.reads.len() != kernel.inputs() {
                return Err(fail(format!(
                    "{kernel} takes {} inputs, step binds {}",
                    kernel.inputs(),
                    step.reads.len()
                )));
            }

            for r in step.reads.iter().chain([&step.write]).chain(&step.commit) {
                let spec = layout
                    .get(r.field)
                    .ok_or_else(|| fail(format!("field {} is not allocated", r.field)))?;
                if r.slot >= spec.buffers {
                    return Err(fail(format!(
                        "{r} is out of range for {} buffer(s)",
                        spec.buffers
                    )));
                }
            }

            for r in &step.reads {
                if *r == step.write {
                    return Err(fail(format!("{r} is both read and written")));
                }
                if r.slot != 0 && !pending.get(&r.field).is_some_and(|s| s.contains(&r.slot)) {
                    return Err(fail(format!("{r} is read before anything wrote it")));
                }
            }

            let buffered = layout.get(step.write.field).is_some_and(|s| s.buffers > 1);
            if buffered {
                if step.write.slot == 0 {
                    return Err(fail(format!(
                        "{} writes the current buffer of a buffered field",
                        step.write
                    )));
                }
                pending.entry(step.write.field).or_default().insert(step.write.slot);
            }

            for c in &step.commit {
                let written = pending.get_mut(&c.field);
                match written {
                    Some(slots) if slots.contains(&c.slot) => slots.clear(),
                    _ => return Err(fail(format!("commits {c} which holds no new write"))),
                }
            }
        }

        for (field, slots) in &pending {
            if let Some(slot) = slots.iter().next() {
                return Err(SimError::Recipe {
                    step: self.steps.len(),
                    op: "end".into(),
                    message: format!("write to {field}[{slot}] is never committed"),
                });
            }
        }
        Ok(())
    }
}

struct Builder<'a> {
    config: &'a SimConfig,
    steps: Vec<Step>,
}

impl Builder<'_> {
    fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    fn sources(&mut self, field: FieldName) {
        self.push(
            Step::new(Operator::Sources, vec![BufRef::current(field)], BufRef::next(field)).committed(),
        );
    }

    fn advect(&mut self, field: FieldName) {
        let vel = BufRef::current(FieldName::Velocity);
        let src = BufRef::current(field);
        match self.config.advection.scheme {
            AdvectionScheme::SemiLagrangian => {
                self.push(Step::new(Operator::Advect, vec![vel, src], BufRef::next(field)).committed());
            }
            AdvectionScheme::MacCormack => {
                let fwd = BufRef::slot(field, 1);
                let bwd = BufRef::slot(field, 2);
                let out = BufRef::slot(field, 3);
                self.push(Step::new(Operator::AdvectForward, vec![vel, src], fwd));
                self.push(Step::new(Operator::AdvectBackward, vec![vel, fwd], bwd));
                self.push(Step::new(Operator::MacCormack, vec![vel, src, fwd, bwd], out).committed());
            }
        }
    }

    fn div_curl(&mut self) {
        self.push(Step::new(
            Operator::DivergenceCurl,
            vec![BufRef::current(FieldName::Velocity)],
            BufRef::current(FieldName::DivCurl),
        ));
    }

    fn vorticity(&mut self) {
        if self.config.vorticity <= 0.0 {
            return;
        }
        self.div_curl();
        self.push(
            Step::new(
                Operator::Vorticity,
                vec![BufRef::current(FieldName::Velocity), BufRef::current(FieldName::DivCurl)],
                BufRef::next(FieldName::Velocity),
            )
            .committed(),
        );
    }

    fn buoyancy(&mut self) {
        self.push(
            Step::new(
                Operator::Buoyancy,
                vec![
                    BufRef::current(FieldName::Velocity),
                    BufRef::current(FieldName::Temperature),
                    BufRef::current(FieldName::Density),
                ],
                BufRef::next(FieldName::Velocity),
            )
            .committed(),
        );
    }

    /// Condensation and latent heating both read the pre-condensation state;
    /// the pair commits together.
    fn thermodynamics(&mut self) {
        let density = BufRef::current(FieldName::Density);
        let temperature = BufRef::current(FieldName::Temperature);
        self.push(Step::new(
            Operator::Condense,
            vec![density, temperature],
            BufRef::next(FieldName::Density),
        ));
        self.push(
            Step::new(
                Operator::LatentHeat,
                vec![temperature, density],
                BufRef::next(FieldName::Temperature),
            )
            .committing([BufRef::next(FieldName::Temperature), BufRef::next(FieldName::Density)]),
        );
    }

    /// Divergence, relaxation from a zero guess, and projection.
    fn pressure(&mut self) {
        let iterations = self.config.pressure_iterations;
        let vel = BufRef::current(FieldName::Velocity);
        match self.config.pressure_scheme {
            PressureScheme::Jacobi => {
                let p = FieldName::Pressure;
                self.div_curl();
                self.push(Step::new(Operator::ClearPressure, vec![], BufRef::next(p)).committed());
                for _ in 0..iterations {
                    self.push(
                        Step::new(
                            Operator::Jacobi,
                            vec![BufRef::current(p), BufRef::current(FieldName::DivCurl)],
                            BufRef::next(p),
                        )
                        .committed(),
                    );
                }
                self.push(
                    Step::new(Operator::Project, vec![vel, BufRef::current(p)], BufRef::next(FieldName::Velocity))
                        .committed(),
                );
            }
            PressureScheme::RedBlack => {
                for parity in [Parity::Black, Parity::Red] {
                    self.push(Step::new(
                        Operator::DivergenceHalf(parity),
                        vec![vel],
                        BufRef::current(parity.divergence()),
                    ));
                }
                for parity in [Parity::Black, Parity::Red] {
                    self.push(
                        Step::new(Operator::ClearPressure, vec![], BufRef::next(parity.pressure())).committed(),
                    );
                }
                for _ in 0..iterations {
                    for parity in [Parity::Black, Parity::Red] {
                        let own = parity.pressure();
                        self.push(
                            Step::new(
                                Operator::RelaxRedBlack(parity),
                                vec![
                                    BufRef::current(own),
                                    BufRef::current(parity.other().pressure()),
                                    BufRef::current(parity.divergence()),
                                ],
                                BufRef::next(own),
                            )
                            .committed(),
                        );
                    }
                }
                self.push(
                    Step::new(
                        Operator::ProjectRedBlack,
                        vec![
                            vel,
                            BufRef::current(FieldName::PressureBlack),
                            BufRef::current(FieldName::PressureRed),
                        ],
                        BufRef::next(FieldName::Velocity),
                    )
                    .committed(),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: SimulationKind) -> SimConfig {
        SimConfig::new(kind, 32, 32)
    }

    fn ops(recipe: &Recipe) -> Vec<Operator> {
        recipe.steps().iter().map(|s| s.op).collect()
    }

    #[test]
    fn built_in_recipes_validate() {
        for kind in [SimulationKind::Fluid, SimulationKind::Smoke, SimulationKind::Clouds] {
            for scheme in [AdvectionScheme::SemiLagrangian, AdvectionScheme::MacCormack] {
                for pressure in [PressureScheme::Jacobi, PressureScheme::RedBlack] {
                    for order in [ForceOrder::BeforeAdvection, ForceOrder::AfterAdvection] {
                        let mut cfg = config(kind);
                        cfg.advection.scheme = scheme;
                        cfg.pressure_scheme = pressure;
                        cfg.force_order = Some(order);
                        let recipe = Recipe::for_config(&cfg);
                        recipe
                            .validate(&FieldLayout::for_config(&cfg))
                            .unwrap_or_else(|e| panic!("{kind:?}/{scheme:?}/{pressure:?}/{order:?}: {e}"));
                    }
                }
            }
        }
    }

    #[test]
    fn jacobi_iterations_expand_in_place() {
        let mut cfg = config(SimulationKind::Fluid);
        cfg.pressure_iterations = 7;
        let recipe = Recipe::for_config(&cfg);
        let jacobi = ops(&recipe).iter().filter(|op| **op == Operator::Jacobi).count();
        assert_eq!(jacobi, 7);

        cfg.pressure_scheme = PressureScheme::RedBlack;
        let recipe = Recipe::for_config(&cfg);
        let relax = ops(&recipe)
            .iter()
            .filter(|op| matches!(op, Operator::RelaxRedBlack(_)))
            .count();
        assert_eq!(relax, 14);
    }

    #[test]
    fn smoke_projects_freshly_computed_divergence() {
        let mut cfg = config(SimulationKind::Smoke);
        cfg.advection.scheme = AdvectionScheme::SemiLagrangian;
        let ops = ops(&Recipe::for_config(&cfg));
        let advect = ops.iter().position(|op| *op == Operator::Advect).unwrap();
        let clear = ops.iter().position(|op| *op == Operator::ClearPressure).unwrap();
        assert_eq!(ops[advect + 1], Operator::DivergenceCurl);
        assert!(advect < clear);
    }

    #[test]
    fn fluid_skips_forces() {
        let ops = ops(&Recipe::for_config(&config(SimulationKind::Fluid)));
        assert!(!ops.contains(&Operator::Buoyancy));
        assert!(!ops.contains(&Operator::Vorticity));
    }

    #[test]
    fn reading_the_written_buffer_is_rejected() {
        let cfg = config(SimulationKind::Fluid);
        let layout = FieldLayout::for_config(&cfg);
        let d = FieldName::Density;
        let recipe = Recipe::new(vec![
            Step::new(Operator::Sources, vec![BufRef::next(d)], BufRef::next(d)).committed(),
        ]);
        let err = recipe.validate(&layout).unwrap_err();
        assert!(matches!(err, SimError::Recipe { step: 0, .. }), "{err}");
    }

    #[test]
    fn stale_scratch_reads_are_rejected() {
        let cfg = config(SimulationKind::Fluid);
        let layout = FieldLayout::for_config(&cfg);
        let v = BufRef::current(FieldName::Velocity);
        let d = FieldName::Density;
        let recipe = Recipe::new(vec![
            Step::new(Operator::AdvectBackward, vec![v, BufRef::slot(d, 1)], BufRef::slot(d, 2)),
        ]);
        let err = recipe.validate(&layout).unwrap_err();
        assert!(err.to_string().contains("before anything wrote it"), "{err}");
    }

    #[test]
    fn uncommitted_writes_are_rejected() {
        let cfg = config(SimulationKind::Fluid);
        let layout = FieldLayout::for_config(&cfg);
        let v = BufRef::current(FieldName::Velocity);
        let d = FieldName::Density;
        let recipe = Recipe::new(vec![Step::new(
            Operator::Advect,
            vec![v, BufRef::current(d)],
            BufRef::next(d),
        )]);
        let err = recipe.validate(&layout).unwrap_err();
        assert!(err.to_string().contains("never committed"), "{err}");
    }

    #[test]
    fn missing_fields_and_bad_arity_are_rejected() {
        let cfg = config(SimulationKind::Fluid);
        let layout = FieldLayout::for_config(&cfg);
        let t = FieldName::Temperature;
        let recipe = Recipe::new(vec![
            Step::new(Operator::Sources, vec![BufRef::current(t)], BufRef::next(t)).committed(),
        ]);
        assert!(recipe.validate(&layout).unwrap_err().to_string().contains("not allocated"));

        let d = FieldName::Density;
        let recipe = Recipe::new(vec![
            Step::new(Operator::Advect, vec![BufRef::current(d)], BufRef::next(d)).committed(),
        ]);
        assert!(recipe.validate(&layout).unwrap_err().to_string().contains("inputs"));
    }

    #[test]
    fn layout_quad_buffers_only_for_maccormack() {
        let mut cfg = config(SimulationKind::Smoke);
        let layout = FieldLayout::for_config(&cfg);
        assert_eq!(layout.get(FieldName::Temperature).map(|s| s.buffers), Some(4));
        cfg.advection.scheme = AdvectionScheme::SemiLagrangian;
        cfg.pressure_scheme = PressureScheme::RedBlack;
        let layout = FieldLayout::for_config(&cfg);
        assert_eq!(layout.get(FieldName::Velocity).map(|s| s.buffers), Some(2));
        assert_eq!(layout.get(FieldName::PressureRed).map(|s| s.desc.width), Some(16));
        assert!(!layout.contains(FieldName::Pressure));
    }
}
