use std::fmt::Display;
use std::time::Duration;

use http::StatusCode;

use crate::error::RequestError;

/// Identity of a worker, numbered from 1
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(pub usize);

impl Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of a single request attempt.
///
/// Transient: handed to the [`Reporter`](crate::Reporter) and dropped.
#[derive(Debug)]
pub struct RequestOutcome {
    /// Status code of the response, if one was received
    pub status: Option<StatusCode>,
    /// Time until the response head arrived (or the attempt failed)
    pub latency: Duration,
    /// Time including draining the body
    pub elapsed: Duration,
    /// Body bytes read
    pub bytes: u64,
    /// What went wrong, for failed attempts
    pub error: Option<RequestError>,
}

impl RequestOutcome {
    /// A response was received and its body drained.
    ///
    /// Any status code counts, including 4xx and 5xx.
    #[must_use]
    pub const fn success(status: StatusCode, latency: Duration, elapsed: Duration, bytes: u64) -> Self {
        Self {
            status: Some(status),
            latency,
            elapsed,
            bytes,
            error: None,
        }
    }

    /// The attempt failed before or while reading the response
    #[must_use]
    pub const fn failure(error: RequestError, status: Option<StatusCode>, elapsed: Duration, bytes: u64) -> Self {
        Self {
            status,
            latency: elapsed,
            elapsed,
            bytes,
            error: Some(error),
        }
    }

    /// Whether a complete response was received
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

impl Display for RequestOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.error, self.status) {
            (Some(e), _) => write!(f, "request failed: {e}"),
            (None, Some(status)) => write!(
                f,
                "status: {} latency: {}ms",
                status.as_u16(),
                self.latency.as_millis()
            ),
            (None, None) => write!(f, "no response"),
        }
    }
}
