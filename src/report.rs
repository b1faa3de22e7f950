use http::StatusCode;
use log::{debug, info, warn};

use crate::config::RunConfig;
use crate::types::{RequestOutcome, WorkerId};

/// Receives what workers observe.
///
/// Called from worker tasks, so implementations must not block.
pub trait Reporter: Send + Sync {
    /// A worker is about to issue its first request
    fn worker_started(&self, _id: WorkerId, _config: &RunConfig) {}

    /// A worker has left its loop and will not issue further requests
    fn worker_stopped(&self, _id: WorkerId) {}

    /// One request attempt finished
    fn outcome(&self, id: WorkerId, outcome: &RequestOutcome);
}

/// Reports through the `log` facade.
///
/// Failures and any status other than `200 OK` are logged at `warn`,
/// everything else at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn worker_started(&self, id: WorkerId, config: &RunConfig) {
        let interval = if config.interval().is_zero() {
            "none".to_string()
        } else {
            humantime::format_duration(config.interval()).to_string()
        };
        info!(
            "Worker {id} started [interval: {interval}, rate limit: {}]",
            config.rate_limit()
        );
    }

    fn worker_stopped(&self, id: WorkerId) {
        info!("Worker {id} stopped");
    }

    fn outcome(&self, id: WorkerId, outcome: &RequestOutcome) {
        match outcome.status {
            Some(StatusCode::OK) if outcome.is_success() => {
                debug!("[Worker {id}] {outcome} bytes: {}", outcome.bytes);
            }
            _ => warn!("[Worker {id}] {outcome}"),
        }
    }
}
