#![cfg(test)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use http::StatusCode;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::{Reporter, RequestOutcome, RunConfig, WorkerId};

pub(crate) async fn get_mock_server<S>(response_code: S) -> MockServer
where
    S: Into<StatusCode>,
{
    get_mock_server_with_content(response_code, None).await
}

pub(crate) async fn get_mock_server_with_body<S>(response_code: S, body: &str) -> MockServer
where
    S: Into<StatusCode>,
{
    get_mock_server_with_content(response_code, Some(body)).await
}

async fn get_mock_server_with_content<S>(response_code: S, content: Option<&str>) -> MockServer
where
    S: Into<StatusCode>,
{
    let mock_server = MockServer::start().await;
    let template = ResponseTemplate::new(response_code.into().as_u16());

    let template = if let Some(s) = content {
        template.set_body_string(s)
    } else {
        template
    };

    Mock::given(method("GET"))
        .respond_with(template)
        .mount(&mock_server)
        .await;

    mock_server
}

/// Reporter that remembers what it saw, for assertions
#[derive(Debug, Default)]
pub(crate) struct RecordingReporter {
    started: Mutex<BTreeSet<WorkerId>>,
    stopped: Mutex<BTreeSet<WorkerId>>,
    outcomes: AtomicUsize,
    failures: AtomicUsize,
    finished_at: Mutex<Vec<Instant>>,
}

impl RecordingReporter {
    pub(crate) fn started(&self) -> usize {
        self.started.lock().unwrap().len()
    }

    pub(crate) fn started_ids(&self) -> Vec<WorkerId> {
        self.started.lock().unwrap().iter().copied().collect()
    }

    pub(crate) fn stopped(&self) -> usize {
        self.stopped.lock().unwrap().len()
    }

    pub(crate) fn outcomes(&self) -> usize {
        self.outcomes.load(Ordering::SeqCst)
    }

    pub(crate) fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    pub(crate) fn finished_at(&self) -> Vec<Instant> {
        self.finished_at.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn worker_started(&self, id: WorkerId, _config: &RunConfig) {
        assert!(self.started.lock().unwrap().insert(id), "worker {id} started twice");
    }

    fn worker_stopped(&self, id: WorkerId) {
        assert!(self.stopped.lock().unwrap().insert(id), "worker {id} stopped twice");
    }

    fn outcome(&self, _id: WorkerId, outcome: &RequestOutcome) {
        self.outcomes.fetch_add(1, Ordering::SeqCst);
        if !outcome.is_success() {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
        self.finished_at.lock().unwrap().push(Instant::now());
    }
}
