//! Cross-backend contracts: determinism between the inline and
//! offloaded pipelines, and the GPU capacity boundary.

use cgmath::{Point3, Vector3};
use gravsim::{
    BackendError, BackendKind, Body, BodyStore, Coordinator, GpuBackend, Integrator, StepBackend,
    StepConfig, presets, run_step,
};

fn euler_config(time: f64) -> StepConfig {
    StepConfig {
        dt: 0.01,
        g: 1.0,
        softening: 0.1,
        integrator: Integrator::Euler,
        collisions_enabled: true,
        excluded: None,
        time,
    }
}

fn grid_bodies(n: usize) -> Vec<Body> {
    (0..n)
        .map(|i| {
            Body::new(
                Point3::new(i as f64 * 5.0, (i % 3) as f64, 0.0),
                Vector3::new(0.0, 0.1 * i as f64, 0.0),
                1.0 + i as f64,
            )
        })
        .collect()
}

#[test]
fn inline_and_offloaded_agree_bit_for_bit() {
    let mut offload = gravsim::OffloadBackend::new().expect("worker spawns");
    let mut bodies = presets::figure_eight();
    let mut time = 0.0;

    for _ in 0..50 {
        let config = euler_config(time);
        offload.begin_step(bodies.clone(), config).unwrap();
        let offloaded = loop {
            if let Some(outcome) = offload.poll().unwrap() {
                break outcome;
            }
            std::thread::yield_now();
        };
        let inline = run_step(bodies, &config);
        assert_eq!(inline, offloaded);

        bodies = inline.bodies;
        time = inline.stats.time;
    }
}

#[test]
fn gpu_capacity_boundary() {
    // 2x2 grid: capacity of exactly four bodies.
    let mut gpu = match GpuBackend::with_grid_side(2) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("no gpu available, skipping: {e}");
            return;
        }
    };
    assert_eq!(gpu.capacity(), 4);

    // At capacity: the step runs and returns every body.
    gpu.begin_step(grid_bodies(4), euler_config(0.0)).unwrap();
    let outcome = gpu.poll().unwrap().expect("synchronous backend");
    assert_eq!(outcome.bodies.len(), 4);

    // One above: refused outright, nothing truncated.
    let result = gpu.begin_step(grid_bodies(5), euler_config(0.0));
    assert!(matches!(
        result,
        Err(BackendError::Capacity {
            count: 5,
            capacity: 4
        })
    ));
}

#[test]
fn gpu_rejects_rk4() {
    let mut gpu = match GpuBackend::with_grid_side(4) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("no gpu available, skipping: {e}");
            return;
        }
    };
    let config = StepConfig {
        integrator: Integrator::Rk4,
        ..euler_config(0.0)
    };
    assert!(matches!(
        gpu.begin_step(grid_bodies(2), config),
        Err(BackendError::Unsupported(_))
    ));
}

#[test]
fn gpu_matches_inline_within_f32_tolerance() {
    let mut gpu = match GpuBackend::with_grid_side(4) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("no gpu available, skipping: {e}");
            return;
        }
    };
    let bodies = grid_bodies(6);
    let config = euler_config(0.0);

    gpu.begin_step(bodies.clone(), config).unwrap();
    let gpu_outcome = gpu.poll().unwrap().unwrap();
    let inline_outcome = run_step(bodies, &config);

    assert_eq!(gpu_outcome.bodies.len(), inline_outcome.bodies.len());
    for (a, b) in gpu_outcome.bodies.iter().zip(&inline_outcome.bodies) {
        assert!((a.pos.x - b.pos.x).abs() < 1e-4);
        assert!((a.pos.y - b.pos.y).abs() < 1e-4);
        assert!((a.pos.z - b.pos.z).abs() < 1e-4);
        assert!((a.vel.x - b.vel.x).abs() < 1e-4);
        assert_eq!(a.mass, b.mass);
    }
}

#[test]
fn coordinator_falls_back_when_over_gpu_capacity() {
    let gpu = match GpuBackend::with_grid_side(2) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("no gpu available, skipping: {e}");
            return;
        }
    };

    let mut coordinator = Coordinator::new(BodyStore::from_bodies(grid_bodies(5)));
    coordinator.install_gpu_backend(gpu);
    // Five bodies in a four-texel grid: the selector must not pick
    // the GPU.
    assert_eq!(coordinator.step_blocking(), Some(BackendKind::Inline));
}

#[test]
fn coordinator_skips_gpu_for_rk4() {
    let gpu = match GpuBackend::with_grid_side(4) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("no gpu available, skipping: {e}");
            return;
        }
    };

    let mut coordinator = Coordinator::new(BodyStore::from_bodies(grid_bodies(3)));
    coordinator.install_gpu_backend(gpu);
    coordinator.integrator = Integrator::Rk4;
    assert_eq!(coordinator.step_blocking(), Some(BackendKind::Inline));

    coordinator.integrator = Integrator::Euler;
    assert_eq!(coordinator.step_blocking(), Some(BackendKind::GpuParallel));
}
