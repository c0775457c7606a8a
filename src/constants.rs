// PHYSICAL
/// Default gravitational constant. Scenario units, not SI.
pub const DEFAULT_G: f64 = 1.0;
/// Softening term added to squared distance so coincident bodies
/// produce a finite acceleration.
pub const DEFAULT_SOFTENING: f64 = 0.1;
/// Default simulated seconds per step, before the speed multiplier.
pub const DEFAULT_DT: f64 = 0.01;

// COLLISIONS
/// Fraction of the combined radius below which two bodies merge
/// instead of bouncing.
pub const MERGE_THRESHOLD: f64 = 0.3;
/// Fraction of closing velocity reflected by an elastic bounce.
pub const RESTITUTION: f64 = 0.95;
/// Radius proxy scale applied to cbrt(mass).
pub const RADIUS_SCALE: f64 = 0.5;

// DIAGNOSTICS
/// Pairs closer than this contribute nothing to potential energy.
/// Independent of the force softening above.
pub const PE_DISTANCE_FLOOR: f64 = 0.1;
/// Simulated seconds between automatic energy samples.
pub const SAMPLE_INTERVAL: f64 = 0.5;

// EDITING
/// Below this speed a velocity rescale assigns a fresh axis-aligned
/// velocity instead of scaling, to avoid dividing by ~0.
pub const MIN_RESCALE_SPEED: f64 = 1e-6;

// GPU
/// Side of the square body grid on the GPU backend.
pub const GRID_SIDE: usize = 32;
/// Hard body-count ceiling of the GPU backend.
pub const GPU_CAPACITY: usize = GRID_SIDE * GRID_SIDE;
