use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use crate::config::AddressFamily;

/// Errors raised while resolving a [`RunConfig`](crate::RunConfig).
///
/// All of these are fatal and surface before any worker is started.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The worker count must be at least one
    #[error("Worker count must be greater than 0")]
    NoWorkers,

    /// The request interval was negative
    #[error("Request interval must not be negative, got `{0}`")]
    NegativeInterval(String),

    /// The request interval could not be parsed
    #[error("Cannot parse request interval `{input}`: {source}")]
    InvalidInterval {
        /// Raw user input
        input: String,
        /// Underlying parse error
        #[source]
        source: humantime::DurationError,
    },

    /// IPv4-only and IPv6-only were both requested
    #[error("Cannot force both IPv4 and IPv6; pick at most one of `-4` and `-6`")]
    ConflictingAddressFamily,

    /// The bind address is not an IP literal
    #[error("Invalid bind address `{input}`: {source}")]
    InvalidBindAddress {
        /// Raw user input
        input: String,
        /// Underlying parse error
        #[source]
        source: std::net::AddrParseError,
    },

    /// The bind address can never be used with the forced address family
    #[error("Bind address {address} cannot be used for {family} connections")]
    BindAddressFamily {
        /// The configured local address
        address: IpAddr,
        /// The forced address family
        family: AddressFamily,
    },

    /// The rate limit could not be parsed
    #[error("Invalid rate limit `{0}` (expected e.g. `512k`, `1.5m` or a plain number of bytes)")]
    InvalidRateLimit(String),

    /// The target URL could not be parsed
    #[error("Invalid target URL `{input}`: {source}")]
    InvalidUrl {
        /// Raw user input
        input: String,
        /// Underlying parse error
        #[source]
        source: url::ParseError,
    },

    /// The target URL does not use HTTP or HTTPS
    #[error("Unsupported URL scheme `{0}`; only http and https are supported")]
    UnsupportedScheme(String),

    /// The user agent cannot be sent as a header value
    #[error("Invalid user agent: {0}")]
    InvalidUserAgent(#[from] http::header::InvalidHeaderValue),

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    BuildClient(#[source] reqwest::Error),
}

/// Errors of a single request attempt.
///
/// These never stop a worker; they are reported as a failed
/// [`RequestOutcome`](crate::RequestOutcome) and the loop continues.
#[derive(Error, Debug)]
pub enum RequestError {
    /// No response head arrived within the request timeout
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// The connection could not be established (DNS, connect, TLS handshake)
    #[error("Connection failed: {0}")]
    Connect(#[source] reqwest::Error),

    /// Any other transport level failure
    #[error("Request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// Reading the response body failed
    #[error("Failed to read response body: {0}")]
    ReadBody(#[source] std::io::Error),

    /// The target is an IP literal of the wrong family
    #[error("Host {host} is not reachable over {family}")]
    AddressFamily {
        /// The literal host from the URL
        host: IpAddr,
        /// The forced address family
        family: AddressFamily,
    },
}

impl From<reqwest::Error> for RequestError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() {
            RequestError::Connect(e)
        } else {
            RequestError::Transport(e)
        }
    }
}

impl RequestError {
    /// Whether the attempt failed because it ran out of time
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self {
            RequestError::Timeout(_) => true,
            RequestError::Connect(e) | RequestError::Transport(e) => e.is_timeout(),
            RequestError::ReadBody(e) => e.kind() == std::io::ErrorKind::TimedOut,
            RequestError::AddressFamily { .. } => false,
        }
    }
}
