pub mod backend;
pub mod body;
pub mod collisions;
pub mod constants;
pub mod coordinator;
pub mod energy;
pub mod forces;
pub mod integrator;
pub mod presets;
pub mod snapshot;

pub use backend::gpu::GpuBackend;
pub use backend::inline::InlineBackend;
pub use backend::offload::OffloadBackend;
pub use backend::{BackendError, StepBackend, StepConfig, StepOutcome, StepStats, run_step};
pub use body::{Body, BodyId, BodyStore, Color, DEFAULT_COLOR};
pub use coordinator::{BackendKind, Coordinator};
pub use energy::{EnergyAnalyzer, EnergySample};
pub use integrator::Integrator;
pub use snapshot::{Snapshot, SnapshotError};
