use crate::backend::{BackendError, StepBackend, StepConfig, StepOutcome, run_step};
use crate::body::Body;

/// Runs the whole pipeline synchronously on the calling thread.
/// Always supported; the coordinator's fallback of last resort.
#[derive(Debug, Default)]
pub struct InlineBackend {
    result: Option<StepOutcome>,
}

impl InlineBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StepBackend for InlineBackend {
    fn name(&self) -> &'static str {
        "inline"
    }

    fn ready(&mut self) -> bool {
        self.result.is_none()
    }

    fn begin_step(&mut self, bodies: Vec<Body>, config: StepConfig) -> Result<(), BackendError> {
        if self.result.is_some() {
            return Err(BackendError::Busy);
        }
        self.result = Some(run_step(bodies, &config));
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<StepOutcome>, BackendError> {
        Ok(self.result.take())
    }
}
