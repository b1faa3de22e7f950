//! Egress policy: which local address and IP family outbound connections use.

use std::error::Error as StdError;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use log::debug;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use url::{Host, Url};

use crate::config::{AddressFamily, RunConfig};
use crate::error::{ConfigError, RequestError};

/// Immutable dialing policy shared by every connection of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EgressPolicy {
    local_address: Option<IpAddr>,
    family: AddressFamily,
}

impl EgressPolicy {
    /// Create a policy, rejecting a local address that the forced family
    /// could never use.
    pub fn new(local_address: Option<IpAddr>, family: AddressFamily) -> Result<Self, ConfigError> {
        if let Some(address) = local_address {
            if !family.admits(&address) {
                return Err(ConfigError::BindAddressFamily { address, family });
            }
        }
        Ok(Self {
            local_address,
            family,
        })
    }

    /// The policy described by a run configuration
    pub fn from_config(config: &RunConfig) -> Result<Self, ConfigError> {
        Self::new(config.bind_address(), config.family())
    }

    /// Local address connections are bound to
    #[must_use]
    pub const fn local_address(&self) -> Option<IpAddr> {
        self.local_address
    }

    /// Forced address family
    #[must_use]
    pub const fn family(&self) -> AddressFamily {
        self.family
    }

    /// Install the policy on a client under construction
    pub fn apply(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let builder = builder.local_address(self.local_address);
        match self.family {
            AddressFamily::Any => builder,
            family => builder.dns_resolver(Arc::new(FamilyResolver { family })),
        }
    }

    /// Check a target URL against the policy before dialing.
    ///
    /// Hosts given as IP literals never go through the resolver, so their
    /// family is checked here.
    pub fn admits(&self, url: &Url) -> Result<(), RequestError> {
        let host = match url.host() {
            Some(Host::Ipv4(v4)) => IpAddr::V4(v4),
            Some(Host::Ipv6(v6)) => IpAddr::V6(v6),
            _ => return Ok(()),
        };
        if self.family.admits(&host) {
            Ok(())
        } else {
            Err(RequestError::AddressFamily {
                host,
                family: self.family,
            })
        }
    }
}

/// System resolver that only hands out addresses of one family.
#[derive(Debug)]
struct FamilyResolver {
    family: AddressFamily,
}

impl FamilyResolver {
    fn filter(
        &self,
        host: &str,
        addrs: impl Iterator<Item = SocketAddr>,
    ) -> Result<Vec<SocketAddr>, io::Error> {
        let addrs: Vec<_> = addrs.filter(|a| self.family.admits(&a.ip())).collect();
        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no {} address found for {host}", self.family),
            ));
        }
        Ok(addrs)
    }
}

impl Resolve for FamilyResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let family = self.family;
        Box::pin(async move {
            let host = name.as_str();
            // The port is replaced by the connector; any value works here.
            let resolved = tokio::net::lookup_host((host, 0)).await?;
            let addrs = FamilyResolver { family }.filter(host, resolved)?;
            debug!("Resolved {host} to {addrs:?} ({family})");
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<_, Box<dyn StdError + Send + Sync>>(addrs)
        })
    }
}
