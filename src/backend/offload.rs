use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::JoinHandle;

use log::{debug, warn};

use crate::backend::{BackendError, StepBackend, StepConfig, StepOutcome, run_step};
use crate::body::Body;

/// Request half of the worker protocol. One `Update` gets exactly one
/// `Result` back; `Shutdown` ends the worker loop.
enum Request {
    Update {
        bodies: Vec<Body>,
        config: StepConfig,
    },
    Shutdown,
}

/// Response half. `Ready` is sent once, unsolicited, before any
/// update is accepted.
enum Response {
    Ready,
    Result(StepOutcome),
}

/// Runs the identical step pipeline on a persistent worker thread.
/// At most one request is in flight; a second `begin_step` while one
/// is pending is a caller bug and reports `Busy`. Any channel failure
/// flips the backend to unsupported for good, and the coordinator
/// falls back to the inline backend.
pub struct OffloadBackend {
    tx: Sender<Request>,
    rx: Receiver<Response>,
    worker: Option<JoinHandle<()>>,
    got_ready: bool,
    pending: bool,
    failed: bool,
}

impl OffloadBackend {
    pub fn new() -> Result<Self, BackendError> {
        let (tx, worker_rx) = channel::<Request>();
        let (worker_tx, rx) = channel::<Response>();

        let worker = std::thread::Builder::new()
            .name("gravsim-step-worker".into())
            .spawn(move || worker_loop(worker_rx, worker_tx))
            .map_err(|_| BackendError::WorkerGone)?;

        Ok(Self {
            tx,
            rx,
            worker: Some(worker),
            got_ready: false,
            pending: false,
            failed: false,
        })
    }

    /// Drain responses, watching for the startup signal.
    fn pump(&mut self) -> Result<Option<StepOutcome>, BackendError> {
        loop {
            match self.rx.try_recv() {
                Ok(Response::Ready) => {
                    debug!("step worker ready");
                    self.got_ready = true;
                }
                Ok(Response::Result(outcome)) => {
                    self.pending = false;
                    return Ok(Some(outcome));
                }
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => {
                    self.failed = true;
                    self.pending = false;
                    return Err(BackendError::WorkerGone);
                }
            }
        }
    }
}

impl StepBackend for OffloadBackend {
    fn name(&self) -> &'static str {
        "offloaded"
    }

    fn ready(&mut self) -> bool {
        if self.failed || self.pending {
            return false;
        }
        if !self.got_ready {
            // The startup signal may still be sitting in the channel.
            let _ = self.pump();
        }
        self.got_ready && !self.failed && !self.pending
    }

    fn begin_step(&mut self, bodies: Vec<Body>, config: StepConfig) -> Result<(), BackendError> {
        if self.failed {
            return Err(BackendError::Unsupported("worker unavailable"));
        }
        if self.pending {
            return Err(BackendError::Busy);
        }
        if self.tx.send(Request::Update { bodies, config }).is_err() {
            warn!("step worker hung up; offloaded backend disabled");
            self.failed = true;
            return Err(BackendError::WorkerGone);
        }
        self.pending = true;
        Ok(())
    }

    fn poll(&mut self) -> Result<Option<StepOutcome>, BackendError> {
        if !self.pending {
            return Ok(None);
        }
        self.pump()
    }
}

impl Drop for OffloadBackend {
    fn drop(&mut self) {
        let _ = self.tx.send(Request::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn worker_loop(rx: Receiver<Request>, tx: Sender<Response>) {
    if tx.send(Response::Ready).is_err() {
        return;
    }
    while let Ok(request) = rx.recv() {
        match request {
            Request::Update { bodies, config } => {
                let outcome = run_step(bodies, &config);
                if tx.send(Response::Result(outcome)).is_err() {
                    break;
                }
            }
            Request::Shutdown => break,
        }
    }
    debug!("step worker terminated");
}
