use std::fmt::{self, Display};
use std::net::IpAddr;
use std::time::Duration;

use derive_builder::Builder;
use http::HeaderValue;
use url::Url;

use crate::error::ConfigError;
use crate::ratelimit::ByteRate;

/// Default target, overridden by basically every real invocation.
pub const DEFAULT_URL: &str = "http://localhost:8080/";

/// Default number of concurrent workers
pub const DEFAULT_WORKERS: usize = 64;

/// Default user agent sent with every request
pub const DEFAULT_USER_AGENT: &str = concat!("loadpipe/", env!("CARGO_PKG_VERSION"));

/// Which IP family outbound connections are allowed to use
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// Whatever the resolver returns first
    #[default]
    Any,
    /// Only connect over IPv4
    Ipv4Only,
    /// Only connect over IPv6
    Ipv6Only,
}

impl AddressFamily {
    /// Combine the two mutually exclusive command line switches
    pub fn from_flags(ipv4_only: bool, ipv6_only: bool) -> Result<Self, ConfigError> {
        match (ipv4_only, ipv6_only) {
            (true, true) => Err(ConfigError::ConflictingAddressFamily),
            (true, false) => Ok(AddressFamily::Ipv4Only),
            (false, true) => Ok(AddressFamily::Ipv6Only),
            (false, false) => Ok(AddressFamily::Any),
        }
    }

    /// Whether `addr` may be used under this preference
    #[must_use]
    pub const fn admits(self, addr: &IpAddr) -> bool {
        match self {
            AddressFamily::Any => true,
            AddressFamily::Ipv4Only => addr.is_ipv4(),
            AddressFamily::Ipv6Only => addr.is_ipv6(),
        }
    }
}

impl Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let out = match self {
            AddressFamily::Any => "any",
            AddressFamily::Ipv4Only => "IPv4",
            AddressFamily::Ipv6Only => "IPv6",
        };
        write!(f, "{out}")
    }
}

/// Parse a request interval such as `500ms`, `2s` or `1m30s`.
///
/// A bare `0` (or an empty string) disables pacing.
pub fn parse_interval(input: &str) -> Result<Duration, ConfigError> {
    let trimmed = input.trim();
    if trimmed.starts_with('-') {
        return Err(ConfigError::NegativeInterval(input.to_string()));
    }
    if trimmed.is_empty() || trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(trimmed).map_err(|source| ConfigError::InvalidInterval {
        input: input.to_string(),
        source,
    })
}

/// Fully resolved, immutable configuration of a run.
///
/// Built once through [`RunConfigBuilder`] before any worker starts.
#[derive(Debug, Clone)]
pub struct RunConfig {
    url: Url,
    workers: usize,
    interval: Duration,
    user_agent: String,
    rate_limit: ByteRate,
    bind_address: Option<IpAddr>,
    family: AddressFamily,
}

impl RunConfig {
    /// Start building a configuration from defaults
    #[must_use]
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// The single target every worker requests
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Number of workers to launch
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Pause between two requests of the same worker; zero means back-to-back
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Value of the `User-Agent` header
    #[must_use]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Per-worker limit for draining response bodies
    #[must_use]
    pub const fn rate_limit(&self) -> ByteRate {
        self.rate_limit
    }

    /// Local address outbound connections are bound to
    #[must_use]
    pub const fn bind_address(&self) -> Option<IpAddr> {
        self.bind_address
    }

    /// Forced address family, if any
    #[must_use]
    pub const fn family(&self) -> AddressFamily {
        self.family
    }
}

/// Raw inputs of a run, as they come from flags or the environment.
#[derive(Builder, Debug)]
#[builder(build_fn(skip))]
#[builder(setter(into))]
#[builder(name = "RunConfigBuilder")]
pub struct RunConfigBuilderInternal {
    /// Target URL; must be http or https
    url: String,
    /// Number of workers, at least one
    workers: usize,
    /// Pause between requests of one worker; zero for back-to-back requests
    interval: Duration,
    /// `User-Agent` header value
    user_agent: String,
    /// Per-worker body drain rate
    rate_limit: ByteRate,
    /// Local IP literal to bind to; empty for none
    bind_address: String,
    /// Only connect over IPv4
    ipv4_only: bool,
    /// Only connect over IPv6
    ipv6_only: bool,
}

impl RunConfigBuilder {
    /// Validate the inputs and freeze them into a [`RunConfig`].
    ///
    /// Unset fields fall back to their defaults.
    pub fn build(&self) -> Result<RunConfig, ConfigError> {
        let workers = self.workers.unwrap_or(DEFAULT_WORKERS);
        if workers == 0 {
            return Err(ConfigError::NoWorkers);
        }

        let family = AddressFamily::from_flags(
            self.ipv4_only.unwrap_or(false),
            self.ipv6_only.unwrap_or(false),
        )?;

        let bind_address = match self.bind_address.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<IpAddr>().map_err(|source| {
                ConfigError::InvalidBindAddress {
                    input: raw.to_string(),
                    source,
                }
            })?),
        };
        if let Some(address) = bind_address {
            if !family.admits(&address) {
                return Err(ConfigError::BindAddressFamily { address, family });
            }
        }

        let raw_url = self.url.as_deref().unwrap_or(DEFAULT_URL);
        let url = Url::parse(raw_url).map_err(|source| ConfigError::InvalidUrl {
            input: raw_url.to_string(),
            source,
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::UnsupportedScheme(url.scheme().to_string()));
        }

        let user_agent = self
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        HeaderValue::from_str(&user_agent)?;

        Ok(RunConfig {
            url,
            workers,
            interval: self.interval.unwrap_or(Duration::ZERO),
            user_agent,
            rate_limit: self.rate_limit.unwrap_or_default(),
            bind_address,
            family,
        })
    }
}
