use log::{debug, warn};

use crate::backend::gpu::GpuBackend;
use crate::backend::inline::InlineBackend;
use crate::backend::offload::OffloadBackend;
use crate::backend::{BackendError, StepBackend, StepConfig, StepStats};
use crate::body::{Body, BodyId, BodyStore};
use crate::constants::{DEFAULT_DT, DEFAULT_G, DEFAULT_SOFTENING, SAMPLE_INTERVAL};
use crate::energy::{EnergyAnalyzer, EnergySample};
use crate::integrator::Integrator;

/// Which backend a tick was dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Inline,
    Offloaded,
    GpuParallel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    StepInFlight(BackendKind),
}

/// Owns the body store, picks a backend per tick, and commits results.
/// A tick that arrives while a step is in flight is dropped, not
/// queued; the next scheduled tick supersedes it.
pub struct Coordinator {
    store: BodyStore,
    inline: InlineBackend,
    offload: Option<OffloadBackend>,
    gpu: Option<GpuBackend>,
    phase: Phase,

    pub integrator: Integrator,
    pub collisions_enabled: bool,
    pub g: f64,
    pub softening: f64,
    /// Unsigned step size; direction is a separate toggle.
    pub base_dt: f64,
    pub speed: f64,
    reversed: bool,
    step_mode: bool,
    step_requested: bool,

    /// Body under external drag, excluded from integration.
    drag: Option<BodyId>,
    /// External UI selection, remapped across removals via its id.
    selection: Option<BodyId>,

    time: f64,
    analyzer: EnergyAnalyzer,
    last_sample: Option<EnergySample>,
    last_sample_time: f64,
    last_stats: Option<StepStats>,
    render_dirty: bool,
}

impl Coordinator {
    pub fn new(store: BodyStore) -> Self {
        Self {
            store,
            inline: InlineBackend::new(),
            offload: None,
            gpu: None,
            phase: Phase::Idle,
            integrator: Integrator::Euler,
            collisions_enabled: true,
            g: DEFAULT_G,
            softening: DEFAULT_SOFTENING,
            base_dt: DEFAULT_DT,
            speed: 1.0,
            reversed: false,
            step_mode: false,
            step_requested: false,
            drag: None,
            selection: None,
            time: 0.0,
            analyzer: EnergyAnalyzer::new(),
            last_sample: None,
            last_sample_time: 0.0,
            last_stats: None,
            render_dirty: true,
        }
    }

    /// Spawn the worker thread and prefer it over inline once ready.
    pub fn enable_offload(&mut self) {
        if self.offload.is_none() {
            match OffloadBackend::new() {
                Ok(backend) => self.offload = Some(backend),
                Err(e) => warn!("offloaded backend unavailable: {e}"),
            }
        }
    }

    /// Probe the GPU and prefer it when its constraints are met.
    pub fn enable_gpu(&mut self) {
        if self.gpu.is_none() {
            match GpuBackend::new() {
                Ok(backend) => self.gpu = Some(backend),
                Err(e) => warn!("gpu backend unavailable: {e}"),
            }
        }
    }

    /// Install an already-constructed GPU backend, e.g. one with a
    /// non-default grid size.
    pub fn install_gpu_backend(&mut self, backend: GpuBackend) {
        self.gpu = Some(backend);
    }

    pub fn store(&self) -> &BodyStore {
        &self.store
    }

    /// Direct store access for external editing. Only valid between
    /// steps; the coordinator never hands the store to a backend.
    pub fn store_mut(&mut self) -> &mut BodyStore {
        &mut self.store
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn step_in_flight(&self) -> bool {
        matches!(self.phase, Phase::StepInFlight(_))
    }

    pub fn set_reversed(&mut self, reversed: bool) {
        self.reversed = reversed;
    }

    pub fn reversed(&self) -> bool {
        self.reversed
    }

    pub fn set_step_mode(&mut self, on: bool) {
        self.step_mode = on;
        self.step_requested = false;
    }

    /// Queue exactly one manual step while in step mode.
    pub fn request_single_step(&mut self) {
        self.step_requested = true;
    }

    pub fn begin_drag(&mut self, id: BodyId) {
        self.drag = Some(id);
    }

    pub fn end_drag(&mut self) {
        self.drag = None;
    }

    pub fn select(&mut self, id: Option<BodyId>) {
        self.selection = id;
    }

    pub fn selection(&self) -> Option<BodyId> {
        self.selection
    }

    pub fn last_stats(&self) -> Option<&StepStats> {
        self.last_stats.as_ref()
    }

    pub fn last_sample(&self) -> Option<&EnergySample> {
        self.last_sample.as_ref()
    }

    /// True once since the last commit; the external renderer calls
    /// this to learn that fresh state is available.
    pub fn take_render_dirty(&mut self) -> bool {
        std::mem::take(&mut self.render_dirty)
    }

    /// Replace the bodies and restart the clock and energy baseline.
    pub fn reset(&mut self, store: BodyStore) {
        self.store = store;
        self.time = 0.0;
        self.last_sample_time = 0.0;
        self.last_sample = None;
        self.last_stats = None;
        self.analyzer.reset();
        self.selection = None;
        self.drag = None;
        self.render_dirty = true;
    }

    fn signed_dt(&self) -> f64 {
        let dt = self.base_dt * self.speed;
        if self.reversed { -dt } else { dt }
    }

    fn step_config(&self) -> StepConfig {
        StepConfig {
            dt: self.signed_dt(),
            g: self.g,
            softening: self.softening,
            integrator: self.integrator,
            collisions_enabled: self.collisions_enabled,
            excluded: self.drag.and_then(|id| self.store.index_of(id)),
            time: self.time,
        }
    }

    /// Backend priority: GPU when present, under capacity and running
    /// Euler; otherwise the worker when it has signalled ready;
    /// otherwise inline.
    fn select_backend(&mut self) -> BackendKind {
        if self.integrator == Integrator::Euler
            && let Some(gpu) = self.gpu.as_mut()
            && self.store.len() <= gpu.capacity()
            && gpu.ready()
        {
            return BackendKind::GpuParallel;
        }
        if let Some(offload) = self.offload.as_mut()
            && offload.ready()
        {
            return BackendKind::Offloaded;
        }
        BackendKind::Inline
    }

    /// Hand a step to the named backend. Fails when that backend is no
    /// longer installed or refuses the work.
    fn begin_on(
        &mut self,
        kind: BackendKind,
        bodies: Vec<Body>,
        config: StepConfig,
    ) -> Result<(), BackendError> {
        match kind {
            BackendKind::Inline => self.inline.begin_step(bodies, config),
            BackendKind::Offloaded => self
                .offload
                .as_mut()
                .ok_or(BackendError::WorkerGone)?
                .begin_step(bodies, config),
            BackendKind::GpuParallel => self
                .gpu
                .as_mut()
                .ok_or(BackendError::Unsupported("gpu backend not installed"))?
                .begin_step(bodies, config),
        }
    }

    /// Drive one tick. Returns the backend the step was dispatched to,
    /// or `None` when the tick was dropped (step mode without a
    /// request, a step already in flight, or an empty store).
    pub fn tick(&mut self) -> Option<BackendKind> {
        if self.step_mode && !self.step_requested {
            return None;
        }
        if self.step_in_flight() {
            debug!("tick dropped, step in flight");
            return None;
        }
        if self.store.is_empty() {
            return None;
        }
        self.step_requested = false;

        let config = self.step_config();
        let bodies = self.store.bodies().to_vec();

        let mut kind = self.select_backend();
        if kind != BackendKind::Inline
            && let Err(e) = self.begin_on(kind, bodies.clone(), config)
        {
            warn!("{kind:?} step failed ({e}), falling back to inline");
            match kind {
                BackendKind::Offloaded => self.offload = None,
                BackendKind::GpuParallel => self.gpu = None,
                BackendKind::Inline => {}
            }
            kind = BackendKind::Inline;
        }
        if kind == BackendKind::Inline
            && let Err(e) = self.begin_on(kind, bodies, config)
        {
            // The phase machine keeps inline free between ticks; if it
            // still refuses, drop the tick like a skipped frame.
            warn!("inline step rejected ({e}); dropping tick");
            return None;
        }

        self.phase = Phase::StepInFlight(kind);
        Some(kind)
    }

    /// Collect a finished step, commit it to the store and refresh
    /// diagnostics. Call once per external frame after `tick`.
    pub fn poll_completion(&mut self) -> bool {
        let Phase::StepInFlight(kind) = self.phase else {
            return false;
        };

        let polled = match kind {
            BackendKind::Inline => self.inline.poll(),
            BackendKind::Offloaded => match self.offload.as_mut() {
                Some(backend) => backend.poll(),
                None => Ok(None),
            },
            BackendKind::GpuParallel => match self.gpu.as_mut() {
                Some(backend) => backend.poll(),
                None => Ok(None),
            },
        };

        let outcome = match polled {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return false,
            Err(e) => {
                // The step is lost; drop it like a skipped tick and
                // stop using the failed backend.
                warn!("{kind:?} step failed ({e}); dropping it");
                if kind == BackendKind::Offloaded {
                    self.offload = None;
                }
                if kind == BackendKind::GpuParallel {
                    self.gpu = None;
                }
                self.phase = Phase::Idle;
                return false;
            }
        };

        // A drag target may have been repositioned externally while the
        // step was in flight; the backend's copy of it is stale. Carry
        // the live state across the commit.
        let dragged = self
            .drag
            .and_then(|id| self.store.get(id).map(|body| (id, *body)));

        self.store.commit(outcome.bodies, &outcome.removed);
        if let Some((id, live)) = dragged
            && let Some(body) = self.store.get_mut(id)
        {
            body.pos = live.pos;
            body.vel = live.vel;
        }
        self.time = outcome.stats.time;
        self.last_stats = Some(outcome.stats);

        // Ids that resolved to a removed body are gone for good.
        if let Some(id) = self.selection
            && self.store.index_of(id).is_none()
        {
            self.selection = None;
        }
        if let Some(id) = self.drag
            && self.store.index_of(id).is_none()
        {
            self.drag = None;
        }

        // Diagnostics sampling follows simulated time, not frames, so
        // speed multipliers do not starve or flood it.
        if (self.time - self.last_sample_time).abs() >= SAMPLE_INTERVAL {
            self.sample_now();
        }

        self.phase = Phase::Idle;
        self.render_dirty = true;
        true
    }

    /// Explicit "sample now" operation; also used by the timed path.
    pub fn sample_now(&mut self) -> EnergySample {
        let sample = self.analyzer.sample(self.store.bodies(), self.g, self.time);
        self.last_sample = Some(sample);
        self.last_sample_time = self.time;
        sample
    }

    /// Tick and wait for the result in one call. Convenience for
    /// headless callers that do not interleave rendering. Returns the
    /// backend that ran the step, or `None` when it was dropped.
    pub fn step_blocking(&mut self) -> Option<BackendKind> {
        let kind = self.tick()?;
        loop {
            if self.poll_completion() {
                return Some(kind);
            }
            if !self.step_in_flight() {
                // The step failed and was dropped.
                return None;
            }
            std::thread::yield_now();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::DEFAULT_COLOR;
    use crate::body::Body;
    use cgmath::{Point3, Vector3, Zero};

    fn two_body_store() -> BodyStore {
        BodyStore::from_bodies([
            Body::new(Point3::new(-1.0, 0.0, 0.0), Vector3::new(0.0, 0.3, 0.0), 1.0),
            Body::new(Point3::new(1.0, 0.0, 0.0), Vector3::new(0.0, -0.3, 0.0), 1.0),
        ])
    }

    #[test]
    fn inline_tick_advances_time() {
        let mut coordinator = Coordinator::new(two_body_store());
        assert_eq!(coordinator.tick(), Some(BackendKind::Inline));
        assert!(coordinator.poll_completion());
        assert!((coordinator.time() - DEFAULT_DT).abs() < 1e-12);
        assert!(coordinator.take_render_dirty());
        assert!(!coordinator.take_render_dirty());
    }

    #[test]
    fn in_flight_tick_is_dropped() {
        let mut coordinator = Coordinator::new(two_body_store());
        coordinator.enable_offload();
        if coordinator.offload.is_none() {
            return;
        }
        // Wait for the worker to come up so the offloaded path is taken.
        while !coordinator.offload.as_mut().unwrap().ready() {
            std::thread::yield_now();
        }
        assert_eq!(coordinator.tick(), Some(BackendKind::Offloaded));
        // No poll_completion in between: the step is still in flight.
        assert_eq!(coordinator.tick(), None);
        while !coordinator.poll_completion() {
            std::thread::yield_now();
        }
        assert_eq!(coordinator.tick(), Some(BackendKind::Offloaded));
    }

    #[test]
    fn step_mode_requires_a_request() {
        let mut coordinator = Coordinator::new(two_body_store());
        coordinator.set_step_mode(true);
        assert_eq!(coordinator.tick(), None);

        coordinator.request_single_step();
        assert_eq!(coordinator.tick(), Some(BackendKind::Inline));
        assert!(coordinator.poll_completion());
        // The request is consumed.
        assert_eq!(coordinator.tick(), None);
    }

    #[test]
    fn reversed_time_runs_backwards() {
        let mut coordinator = Coordinator::new(two_body_store());
        coordinator.set_reversed(true);
        assert!(coordinator.step_blocking().is_some());
        assert!(coordinator.time() < 0.0);
    }

    #[test]
    fn merge_commit_remaps_selection() {
        // Two bodies dead ahead of each other merge on the first step;
        // a selection on the absorbed body is cleared, one on the
        // survivor sticks.
        let mut store = BodyStore::new();
        let a = store.push(
            Body::new(Point3::new(0.0, 0.0, 0.0), Vector3::zero(), 1.0),
            DEFAULT_COLOR,
        );
        let b = store.push(
            Body::new(Point3::new(0.05, 0.0, 0.0), Vector3::zero(), 1.0),
            DEFAULT_COLOR,
        );
        let c = store.push(
            Body::new(Point3::new(100.0, 0.0, 0.0), Vector3::zero(), 1.0),
            DEFAULT_COLOR,
        );

        let mut coordinator = Coordinator::new(store);
        coordinator.select(Some(b));
        assert!(coordinator.step_blocking().is_some());

        assert_eq!(coordinator.store().len(), 2);
        assert_eq!(coordinator.selection(), None);
        assert_eq!(coordinator.store().index_of(a), Some(0));
        assert_eq!(coordinator.store().index_of(c), Some(1));
    }

    #[test]
    fn dragged_body_stays_put() {
        let mut coordinator = Coordinator::new(two_body_store());
        let id = coordinator.store().id_at(0).unwrap();
        let before = *coordinator.store().get(id).unwrap();
        coordinator.begin_drag(id);
        assert!(coordinator.step_blocking().is_some());
        let after = *coordinator.store().get(id).unwrap();
        assert_eq!(before.pos, after.pos);
        assert_eq!(before.vel, after.vel);
    }

    #[test]
    fn mid_flight_drag_reposition_survives_commit() {
        let mut coordinator = Coordinator::new(two_body_store());
        let id = coordinator.store().id_at(0).unwrap();
        coordinator.begin_drag(id);
        assert!(coordinator.tick().is_some());

        // External reposition lands while the step is in flight; the
        // commit must not revert it to the pre-step state.
        let held = Point3::new(42.0, 0.0, 0.0);
        coordinator.store_mut().get_mut(id).unwrap().pos = held;
        while !coordinator.poll_completion() {
            std::thread::yield_now();
        }

        let body = coordinator.store().get(id).unwrap();
        assert_eq!(body.pos, held);
        assert_eq!(body.vel, Vector3::new(0.0, 0.3, 0.0));
    }

    #[test]
    fn sampling_tracks_simulated_time() {
        let mut coordinator = Coordinator::new(two_body_store());
        coordinator.collisions_enabled = false;

        // 45 steps at the default dt is under half a time unit: the
        // cadence has not fired yet.
        for _ in 0..45 {
            assert!(coordinator.step_blocking().is_some());
        }
        assert!(coordinator.last_sample().is_none());

        // Ten more cross SAMPLE_INTERVAL of elapsed simulated time.
        for _ in 0..10 {
            assert!(coordinator.step_blocking().is_some());
        }
        let forward = *coordinator.last_sample().unwrap();
        assert!(forward.time > 0.0);

        // Reversed time accumulates elapsed magnitude just the same;
        // samples keep refreshing as the clock runs down past zero.
        coordinator.set_reversed(true);
        for _ in 0..120 {
            assert!(coordinator.step_blocking().is_some());
        }
        let backward = *coordinator.last_sample().unwrap();
        assert!(backward.time < 0.0);
    }

    #[test]
    fn empty_store_never_ticks() {
        let mut coordinator = Coordinator::new(BodyStore::new());
        assert_eq!(coordinator.tick(), None);
    }
}
