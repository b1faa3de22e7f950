use std::io;
use std::time::Duration;

use futures::TryStreamExt;
use http::header::{self, HeaderMap, HeaderValue};
use tokio::time::{timeout_at, Instant};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::RunConfig;
use crate::egress::EgressPolicy;
use crate::error::{ConfigError, RequestError};
use crate::ratelimit::{DrainEnd, RateLimiter};
use crate::types::RequestOutcome;

/// Upper bound for a whole request, from sending it to the end of its body
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The HTTP client shared by all workers of a run.
///
/// Cloning is cheap; clones share one connection pool, which is safe
/// for concurrent use.
#[derive(Debug, Clone)]
pub struct Client {
    reqwest_client: reqwest::Client,
    url: Url,
    egress: EgressPolicy,
    limiter: RateLimiter,
    timeout: Duration,
}

impl Client {
    /// Build the client for a run
    pub fn new(config: &RunConfig) -> Result<Self, ConfigError> {
        Self::with_timeouts(config, REQUEST_TIMEOUT, REQUEST_TIMEOUT)
    }

    /// `timeout` bounds the whole request, `read_timeout` any single stalled
    /// read inside it.
    pub(crate) fn with_timeouts(
        config: &RunConfig,
        timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let egress = EgressPolicy::from_config(config)?;

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_str(config.user_agent())?);

        let builder = reqwest::ClientBuilder::new()
            .default_headers(headers)
            .read_timeout(read_timeout);
        let reqwest_client = egress
            .apply(builder)
            .build()
            .map_err(ConfigError::BuildClient)?;

        Ok(Client {
            reqwest_client,
            url: config.url().clone(),
            egress,
            limiter: RateLimiter::new(config.rate_limit()),
            timeout,
        })
    }

    /// The target of every request
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Issue one GET request and drain its body.
    ///
    /// The request timeout covers both the response head and the body; a
    /// body cut off by it is a timeout carrying the bytes read so far.
    /// Returns `None` if `cancel` fired while the body was being drained;
    /// the connection is dropped in that case.
    pub async fn fetch(&self, cancel: &CancellationToken) -> Option<RequestOutcome> {
        let start = Instant::now();
        let deadline = start + self.timeout;

        if let Err(e) = self.egress.admits(&self.url) {
            return Some(RequestOutcome::failure(e, None, start.elapsed(), 0));
        }

        let request = self.reqwest_client.get(self.url.clone()).send();
        let response = match timeout_at(deadline, request).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Some(RequestOutcome::failure(e.into(), None, start.elapsed(), 0)),
            Err(_) => {
                return Some(RequestOutcome::failure(
                    RequestError::Timeout(self.timeout),
                    None,
                    start.elapsed(),
                    0,
                ))
            }
        };
        let status = response.status();
        let latency = start.elapsed();

        let body = StreamReader::new(response.bytes_stream().map_err(body_error));
        tokio::pin!(body);
        let drained = self.limiter.drain(body, cancel, deadline).await;

        let error = match drained.end {
            DrainEnd::Complete => {
                return Some(RequestOutcome::success(
                    status,
                    latency,
                    start.elapsed(),
                    drained.bytes,
                ))
            }
            DrainEnd::Cancelled => return None,
            DrainEnd::DeadlineExceeded => RequestError::Timeout(self.timeout),
            DrainEnd::Failed(e) => RequestError::ReadBody(e),
        };
        Some(RequestOutcome {
            latency,
            ..RequestOutcome::failure(error, Some(status), start.elapsed(), drained.bytes)
        })
    }
}

/// Convert a body stream error, keeping timeouts recognizable as such.
fn body_error(e: reqwest::Error) -> io::Error {
    if e.is_timeout() {
        io::Error::new(io::ErrorKind::TimedOut, e)
    } else {
        io::Error::other(e)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_utils::{get_mock_server, get_mock_server_with_body};
    use http::StatusCode;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(url: &str) -> Client {
        let config = RunConfig::builder().url(url).workers(1_usize).build().unwrap();
        Client::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_ok() {
        let mock_server = get_mock_server_with_body(StatusCode::OK, "hello world").await;
        let outcome = client_for(&mock_server.uri())
            .fetch(&CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.status, Some(StatusCode::OK));
        assert_eq!(outcome.bytes, 11);
        assert!(outcome.elapsed >= outcome.latency);
    }

    #[tokio::test]
    async fn test_error_status_is_success() {
        let mock_server = get_mock_server(StatusCode::SERVICE_UNAVAILABLE).await;
        let outcome = client_for(&mock_server.uri())
            .fetch(&CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(outcome.status, Some(StatusCode::SERVICE_UNAVAILABLE));
    }

    #[tokio::test]
    async fn test_user_agent_header() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(header("user-agent", "custom-agent/2.0"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let config = RunConfig::builder()
            .url(mock_server.uri())
            .user_agent("custom-agent/2.0")
            .build()
            .unwrap();
        let outcome = Client::new(&config)
            .unwrap()
            .fetch(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.status, Some(StatusCode::NO_CONTENT));
    }

    #[tokio::test]
    async fn test_connection_refused_is_failure() {
        // Bind and drop a listener to get a port nobody listens on.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcome = client_for(&format!("http://{addr}/"))
            .fetch(&CancellationToken::new())
            .await
            .unwrap();
        assert!(!outcome.is_success());
        assert!(matches!(outcome.error, Some(RequestError::Connect(_))));
    }

    #[tokio::test]
    async fn test_timeout() {
        // Note: this checks response timeout, not connect timeout.
        let mock_delay = Duration::from_millis(200);
        let client_timeout = Duration::from_millis(50);
        assert!(mock_delay > client_timeout);

        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(mock_delay))
            .mount(&mock_server)
            .await;

        let config = RunConfig::builder()
            .url(mock_server.uri())
            .build()
            .unwrap();
        let client = Client::with_timeouts(&config, client_timeout, REQUEST_TIMEOUT).unwrap();
        let outcome = client.fetch(&CancellationToken::new()).await.unwrap();

        let error = outcome.error.expect("Expected a timeout");
        assert!(error.is_timeout());
        assert!(matches!(error, RequestError::Timeout(d) if d == client_timeout));
    }

    #[tokio::test]
    async fn test_wrong_family_literal_is_failure() {
        let config = RunConfig::builder()
            .url("http://127.0.0.1:9/")
            .ipv6_only(true)
            .build()
            .unwrap();
        let outcome = Client::new(&config)
            .unwrap()
            .fetch(&CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(
            outcome.error,
            Some(RequestError::AddressFamily { .. })
        ));
    }

    #[tokio::test]
    async fn test_bind_address_loopback() {
        let mock_server = get_mock_server(StatusCode::OK).await;
        let config = RunConfig::builder()
            .url(mock_server.uri())
            .bind_address("127.0.0.1")
            .ipv4_only(true)
            .build()
            .unwrap();
        let outcome = Client::new(&config)
            .unwrap()
            .fetch(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outcome.status, Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_timeout_covers_body() {
        let mock_server = get_mock_server_with_body(StatusCode::OK, &"x".repeat(64 * 1024)).await;
        let config = RunConfig::builder()
            .url(mock_server.uri())
            .rate_limit("1k".parse::<crate::ByteRate>().unwrap())
            .build()
            .unwrap();
        let client_timeout = Duration::from_millis(300);
        let client = Client::with_timeouts(&config, client_timeout, REQUEST_TIMEOUT).unwrap();

        let start = std::time::Instant::now();
        let outcome = client.fetch(&CancellationToken::new()).await.unwrap();
        assert!(start.elapsed() < Duration::from_secs(2));

        assert_eq!(outcome.status, Some(StatusCode::OK));
        assert!(outcome.bytes > 0 && outcome.bytes < 64 * 1024, "{}", outcome.bytes);
        let error = outcome.error.expect("Expected a timeout");
        assert!(matches!(error, RequestError::Timeout(d) if d == client_timeout));
        assert!(outcome.latency < outcome.elapsed);
    }

    #[tokio::test]
    async fn test_stalled_body_is_timeout() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        // Announces 100 bytes, sends 10, then goes quiet.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0_u8; 1024];
            let _ = socket.read(&mut request).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\n")
                .await
                .unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(50)).await;
            socket.write_all(&[b'x'; 10]).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let config = RunConfig::builder()
            .url(format!("http://{addr}/"))
            .build()
            .unwrap();
        let client =
            Client::with_timeouts(&config, Duration::from_secs(5), Duration::from_millis(200))
                .unwrap();
        let outcome = client.fetch(&CancellationToken::new()).await.unwrap();

        assert_eq!(outcome.status, Some(StatusCode::OK));
        assert_eq!(outcome.bytes, 10);
        let error = outcome.error.expect("Expected a read timeout");
        assert!(matches!(error, RequestError::ReadBody(_)), "{error:?}");
        assert!(error.is_timeout());
    }

    #[tokio::test]
    async fn test_cancelled_drain_yields_no_outcome() {
        let mock_server = get_mock_server_with_body(StatusCode::OK, &"x".repeat(64 * 1024)).await;
        let config = RunConfig::builder()
            .url(mock_server.uri())
            .rate_limit("1k".parse::<crate::ByteRate>().unwrap())
            .build()
            .unwrap();
        let client = Client::new(&config).unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let start = std::time::Instant::now();
        assert!(client.fetch(&cancel).await.is_none());
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
