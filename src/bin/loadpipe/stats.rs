use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use http::StatusCode;
use loadpipe::{LogReporter, Reporter, RequestOutcome, RunConfig, WorkerId};
use serde::Serialize;

/// Counts outcomes of all workers while passing them on to the log.
#[derive(Debug, Default)]
pub(crate) struct ResponseStats {
    log: LogReporter,
    total: AtomicU64,
    successful: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
    bytes: AtomicU64,
    latency_micros: AtomicU64,
    status_codes: Mutex<BTreeMap<u16, u64>>,
}

impl ResponseStats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Freeze the counters for display
    pub(crate) fn summary(&self, workers: usize, duration: Duration) -> Summary {
        let successful = self.successful.load(Ordering::Relaxed);
        let status_codes = self
            .status_codes
            .lock()
            .map(|codes| codes.clone())
            .unwrap_or_default();
        let non_ok = status_codes
            .iter()
            .filter(|(code, _)| **code != StatusCode::OK.as_u16())
            .map(|(_, count)| count)
            .sum();
        let bytes = self.bytes.load(Ordering::Relaxed);
        let secs = duration.as_secs_f64();

        Summary {
            workers,
            duration_secs: secs,
            total: self.total.load(Ordering::Relaxed),
            successful,
            non_ok,
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            bytes,
            bytes_per_second: if secs > 0.0 { bytes as f64 / secs } else { 0.0 },
            mean_latency_ms: if successful > 0 {
                self.latency_micros.load(Ordering::Relaxed) as f64 / successful as f64 / 1000.0
            } else {
                0.0
            },
            status_codes,
        }
    }
}

impl Reporter for ResponseStats {
    fn worker_started(&self, id: WorkerId, config: &RunConfig) {
        self.log.worker_started(id, config);
    }

    fn worker_stopped(&self, id: WorkerId) {
        self.log.worker_stopped(id);
    }

    fn outcome(&self, id: WorkerId, outcome: &RequestOutcome) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(outcome.bytes, Ordering::Relaxed);

        match &outcome.error {
            None => {
                self.successful.fetch_add(1, Ordering::Relaxed);
                let micros = u64::try_from(outcome.latency.as_micros()).unwrap_or(u64::MAX);
                self.latency_micros.fetch_add(micros, Ordering::Relaxed);
                if let (Some(status), Ok(mut codes)) = (outcome.status, self.status_codes.lock()) {
                    *codes.entry(status.as_u16()).or_default() += 1;
                }
            }
            Some(e) if e.is_timeout() => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Some(_) => {
                self.errors.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.log.outcome(id, outcome);
    }
}

/// Snapshot of a finished run
#[derive(Debug, Serialize)]
pub(crate) struct Summary {
    workers: usize,
    duration_secs: f64,
    total: u64,
    successful: u64,
    non_ok: u64,
    timeouts: u64,
    errors: u64,
    bytes: u64,
    bytes_per_second: f64,
    mean_latency_ms: f64,
    status_codes: BTreeMap<u16, u64>,
}

impl Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "📝 Summary")?;
        writeln!(f, "-------------------")?;
        writeln!(f, "👷 Workers: {}", self.workers)?;
        writeln!(f, "⏱️ Duration: {:.1}s", self.duration_secs)?;
        writeln!(f, "🔍 Total: {}", self.total)?;
        writeln!(f, "✅ Successful: {}", self.successful)?;
        for (code, count) in &self.status_codes {
            writeln!(f, "   [{code}] {count}")?;
        }
        writeln!(f, "🔀 Non-200: {}", self.non_ok)?;
        writeln!(f, "⏳ Timeouts: {}", self.timeouts)?;
        writeln!(f, "🚫 Errors: {}", self.errors)?;
        writeln!(f, "🐢 Mean latency: {:.1}ms", self.mean_latency_ms)?;
        write!(
            f,
            "📦 Received: {} bytes ({:.0} B/s)",
            self.bytes, self.bytes_per_second
        )
    }
}
