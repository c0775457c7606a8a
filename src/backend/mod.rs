//! Execution backends: three ways to run the same physics step.
//!
//! Every backend computes integrate -> resolve collisions -> sample
//! energy over a private copy of the bodies and hands the outcome back
//! to the coordinator, which owns the canonical store.

use thiserror::Error;

use crate::body::Body;
use crate::collisions;
use crate::constants::RESTITUTION;
use crate::energy;
use crate::integrator::{self, Integrator};

pub mod gpu;
pub mod inline;
pub mod offload;

/// Everything a backend needs to run one step. `dt` is signed and
/// already carries the speed multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepConfig {
    pub dt: f64,
    pub g: f64,
    pub softening: f64,
    pub integrator: Integrator,
    pub collisions_enabled: bool,
    /// Body under external manual control; integration and collisions
    /// leave it alone.
    pub excluded: Option<usize>,
    /// Simulated time before this step.
    pub time: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepStats {
    pub time: f64,
    pub ke: f64,
    pub pe: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Post-step bodies, merged bodies already dropped.
    pub bodies: Vec<Body>,
    /// Indices removed by merges, descending.
    pub removed: Vec<usize>,
    pub stats: StepStats,
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unsupported: {0}")]
    Unsupported(&'static str),
    #[error("a step is already in flight")]
    Busy,
    #[error("body count {count} exceeds grid capacity {capacity}")]
    Capacity { count: usize, capacity: usize },
    #[error("worker thread is gone")]
    WorkerGone,
    #[error("gpu error: {0}")]
    Gpu(String),
}

/// The shared pipeline all backends agree on. The inline and offloaded
/// backends run it wholesale; the GPU backend replaces the integration
/// with its kernel and reuses the collision and energy stages.
pub fn run_step(mut bodies: Vec<Body>, config: &StepConfig) -> StepOutcome {
    integrator::advance(
        &mut bodies,
        config.integrator,
        config.dt,
        config.g,
        config.softening,
        config.excluded,
    );
    finish_step(bodies, config)
}

/// Collision and energy stages over already-integrated bodies.
pub(crate) fn finish_step(mut bodies: Vec<Body>, config: &StepConfig) -> StepOutcome {
    let removed = if config.collisions_enabled {
        collisions::resolve(&mut bodies, config.excluded, RESTITUTION)
    } else {
        Vec::new()
    };

    let ke = energy::kinetic(&bodies);
    let pe = energy::potential(&bodies, config.g);
    let stats = StepStats {
        time: config.time + config.dt,
        ke,
        pe,
        total: ke + pe,
    };

    StepOutcome {
        bodies,
        removed,
        stats,
    }
}

/// One physics step as a submit/poll pair. Synchronous backends finish
/// inside `begin_step` and report the outcome on the next `poll`; the
/// offloaded backend genuinely overlaps with the caller.
pub trait StepBackend {
    fn name(&self) -> &'static str;

    /// Whether the backend can currently accept work.
    fn ready(&mut self) -> bool;

    /// Dispatch one step. At most one may be outstanding.
    fn begin_step(&mut self, bodies: Vec<Body>, config: StepConfig) -> Result<(), BackendError>;

    /// Collect the outcome, if one is available.
    fn poll(&mut self) -> Result<Option<StepOutcome>, BackendError>;
}
