//! Lifecycle of a run: launching workers and stopping all of them together.
//!
//! [`start`] validates everything that can fail up front, so a run either
//! starts all of its workers or none. Every worker observes the same
//! [`CancellationToken`]; [`RunHandle::stop`] flips it and only returns once
//! each worker task has been joined.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use log::{error, info};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::config::RunConfig;
use crate::error::ConfigError;
use crate::report::Reporter;
use crate::types::WorkerId;
use crate::worker::Worker;

/// A launched worker and the task it runs on
#[derive(Debug)]
pub struct WorkerHandle {
    id: WorkerId,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Identity of the worker
    #[must_use]
    pub const fn id(&self) -> WorkerId {
        self.id
    }

    /// Wait for the worker task to finish.
    ///
    /// Borrows the handle so that an abandoned join leaves it joinable.
    async fn join(&mut self) {
        if let Err(e) = (&mut self.handle).await {
            error!("Worker {} did not exit cleanly: {e}", self.id);
        }
    }
}

#[derive(Debug)]
struct Inner {
    cancel: CancellationToken,
    workers: Mutex<Vec<WorkerHandle>>,
    launched: usize,
    completed: AtomicUsize,
}

impl Drop for Inner {
    // Workers must not outlive the last handle to their run.
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Handle to a running set of workers.
///
/// Clones refer to the same run, so one clone can be moved into a signal
/// handler while another waits.
#[derive(Debug, Clone)]
pub struct RunHandle {
    inner: Arc<Inner>,
}

/// Launch `config.workers()` workers sharing one client and one
/// cancellation token.
///
/// Must be called from within a Tokio runtime.
///
/// # Errors
///
/// Fails before any worker is spawned if the HTTP client cannot be built
/// from `config`.
pub fn start(config: RunConfig, reporter: Arc<dyn Reporter>) -> Result<RunHandle, ConfigError> {
    let client = Client::new(&config)?;
    let config = Arc::new(config);
    let cancel = CancellationToken::new();

    info!(
        "Starting {} workers against {}",
        config.workers(),
        config.url()
    );

    let workers: Vec<_> = (1..=config.workers())
        .map(WorkerId)
        .map(|id| {
            let worker = Worker::new(
                id,
                client.clone(),
                config.clone(),
                reporter.clone(),
                cancel.clone(),
            );
            WorkerHandle {
                id,
                handle: tokio::spawn(worker.run()),
            }
        })
        .collect();

    Ok(RunHandle {
        inner: Arc::new(Inner {
            cancel,
            launched: workers.len(),
            workers: Mutex::new(workers),
            completed: AtomicUsize::new(0),
        }),
    })
}

impl RunHandle {
    /// Number of workers launched by [`start`]
    #[must_use]
    pub fn launched(&self) -> usize {
        self.inner.launched
    }

    /// The token all workers observe
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Whether stopping has been requested
    #[must_use]
    pub fn is_stopping(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }

    /// Signal every worker to stop and wait until all of them have exited.
    ///
    /// Idempotent, and safe to call concurrently from several tasks: every
    /// call returns only after all workers are gone. Returns the number of
    /// workers whose completion was observed.
    pub async fn stop(&self) -> usize {
        if !self.inner.cancel.is_cancelled() {
            info!("Stopping {} workers", self.inner.launched);
            self.inner.cancel.cancel();
        }
        self.wait().await
    }

    /// Wait until all workers have exited, without asking them to.
    ///
    /// Workers only exit on cancellation, so this returns once some other
    /// holder of the handle calls [`RunHandle::stop`].
    pub async fn wait(&self) -> usize {
        let mut workers = self.inner.workers.lock().await;
        // A handle leaves the list only after its task has been joined, so
        // dropping this future midway never loses track of a worker.
        while let Some(worker) = workers.last_mut() {
            worker.join().await;
            workers.pop();
            self.inner.completed.fetch_add(1, Ordering::SeqCst);
        }
        drop(workers);

        self.inner.completed.load(Ordering::SeqCst)
    }
}
