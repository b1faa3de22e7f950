use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::config::RunConfig;
use crate::report::Reporter;
use crate::types::WorkerId;

/// Issues requests one after another until cancelled.
pub(crate) struct Worker {
    id: WorkerId,
    client: Client,
    config: Arc<RunConfig>,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        id: WorkerId,
        client: Client,
        config: Arc<RunConfig>,
        reporter: Arc<dyn Reporter>,
        cancel: CancellationToken,
    ) -> Self {
        Worker {
            id,
            client,
            config,
            reporter,
            cancel,
        }
    }

    pub(crate) async fn run(self) {
        self.reporter.worker_started(self.id, &self.config);
        self.run_loop().await;
        self.reporter.worker_stopped(self.id);
    }

    async fn run_loop(&self) {
        let interval = self.config.interval();
        loop {
            if self.cancel.is_cancelled() {
                return;
            }

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                outcome = self.client.fetch(&self.cancel) => outcome,
            };
            match outcome {
                Some(outcome) => self.reporter.outcome(self.id, &outcome),
                // Cancelled while draining
                None => return,
            }

            if interval == Duration::ZERO {
                continue;
            }
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = sleep(interval) => {}
            }
        }
    }
}
