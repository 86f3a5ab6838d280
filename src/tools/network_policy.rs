//! Outbound network policy for web-facing tools.
//!
//! Every hostname is resolved and every resolved address classified before a
//! request is allowed. Classifying only the first address would leave a DNS
//! rebinding hole where a hostname mixes public and private records.

use std::io;
use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use url::{Host, Url};

use crate::error::{Result, SkiffError};

/// Hostname-to-address resolution seam, swappable in tests.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// Resolver backed by the operating system.
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0u16)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

/// Policy deciding whether an outbound URL may be fetched.
#[derive(Clone)]
pub struct NetworkPolicy {
    allow_private_egress: bool,
    resolver: Arc<dyn Resolver>,
}

impl NetworkPolicy {
    pub fn new(allow_private_egress: bool) -> Self {
        Self {
            allow_private_egress,
            resolver: Arc::new(SystemResolver),
        }
    }

    /// Replace the resolver. Used by tests to avoid real DNS.
    pub fn with_resolver(allow_private_egress: bool, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            allow_private_egress,
            resolver,
        }
    }

    /// Validate `raw_url` against the policy.
    ///
    /// Rejects non-http(s) schemes, local hostnames, and any URL whose host
    /// resolves to a loopback, private, link-local, multicast, unspecified,
    /// or carrier-grade NAT address. The private-egress override disables
    /// every check; malformed URLs then fail later, at request time.
    pub async fn ensure_url_allowed(&self, raw_url: &str) -> Result<()> {
        if self.allow_private_egress {
            return Ok(());
        }

        let parsed = Url::parse(raw_url.trim())
            .map_err(|err| SkiffError::NetworkPolicy(format!("invalid url: {err}")))?;

        match parsed.scheme() {
            "http" | "https" => {}
            other => {
                return Err(SkiffError::NetworkPolicy(format!(
                    "scheme '{other}' is not allowed, use http or https"
                )));
            }
        }

        let host = parsed
            .host()
            .ok_or_else(|| SkiffError::NetworkPolicy("url has no host".into()))?;

        match host {
            Host::Ipv4(addr) => {
                if is_private_or_local_ip(IpAddr::V4(addr)) {
                    return Err(blocked_address_error(&addr.to_string()));
                }
            }
            Host::Ipv6(addr) => {
                if is_private_or_local_ip(IpAddr::V6(addr)) {
                    return Err(blocked_address_error(&addr.to_string()));
                }
            }
            Host::Domain(domain) => {
                if is_local_hostname(domain) {
                    return Err(SkiffError::NetworkPolicy(format!(
                        "host '{domain}' is not allowed"
                    )));
                }

                let addrs = self.resolver.lookup(domain).await.map_err(|err| {
                    SkiffError::NetworkPolicy(format!("failed to resolve host '{domain}': {err}"))
                })?;
                if addrs.is_empty() {
                    return Err(SkiffError::NetworkPolicy(format!(
                        "host '{domain}' resolved to no addresses"
                    )));
                }
                for addr in addrs {
                    if is_private_or_local_ip(addr) {
                        return Err(blocked_address_error(&addr.to_string()));
                    }
                }
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for NetworkPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkPolicy")
            .field("allow_private_egress", &self.allow_private_egress)
            .finish_non_exhaustive()
    }
}

fn blocked_address_error(addr: &str) -> SkiffError {
    SkiffError::NetworkPolicy(format!("address {addr} is private or local, refusing to connect"))
}

/// `localhost` and any name under `.localhost`.
fn is_local_hostname(host: &str) -> bool {
    let lowered = host.to_ascii_lowercase();
    lowered == "localhost" || lowered.ends_with(".localhost")
}

/// Address ranges treated as private or local, across both families.
fn is_private_or_local_ip(addr: IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_multicast()
                || v4.is_unspecified()
                || is_cgnat(v4)
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_private_or_local_ip(IpAddr::V4(mapped));
            }
            v6.is_loopback()
                || v6.is_multicast()
                || v6.is_unspecified()
                || is_unique_local(v6)
                || is_unicast_link_local(v6)
        }
    }
}

/// 100.64.0.0/10, carrier-grade NAT space.
fn is_cgnat(addr: std::net::Ipv4Addr) -> bool {
    let octets = addr.octets();
    octets[0] == 100 && (octets[1] & 0xc0) == 64
}

/// fc00::/7.
fn is_unique_local(addr: std::net::Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xfe00) == 0xfc00
}

/// fe80::/10.
fn is_unicast_link_local(addr: std::net::Ipv6Addr) -> bool {
    (addr.segments()[0] & 0xffc0) == 0xfe80
}
