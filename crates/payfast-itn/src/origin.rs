//! Origin authenticity: does the declared origin of an ITN resolve to one of
//! the gateway's current addresses?
//!
//! This is a DNS-based heuristic. The Referer header is client-controlled and
//! DNS can change between lookups, so deployments that need strong provenance
//! should also pin the transport peer (mTLS or a static allow-list).

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::net::IpAddr;

use url::Url;

use crate::error::ItnError;

/// Resolves a host name to its current addresses.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, host: &str) -> impl Future<Output = Result<Vec<IpAddr>, ItnError>> + Send;
}

/// Decides whether a declared origin is currently trusted.
pub trait OriginTrust: Send + Sync {
    /// `Ok(())` if trusted. `referer` is the raw header value, if any.
    fn verify_origin(&self, referer: Option<&str>) -> impl Future<Output = Result<(), ItnError>> + Send;
}

/// Live DNS lookups through the tokio resolver. Unbounded; wrap it in a
/// [`TimeoutResolver`].
#[cfg(feature = "full")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[cfg(feature = "full")]
impl HostResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ItnError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }

        // lookup_host wants a port; it plays no part in the answer.
        let addrs = tokio::net::lookup_host(format!("{host}:443"))
            .await
            .map_err(|e| ItnError::DnsResolution(format!("{host}: {e}")))?;

        Ok(addrs.map(|a| a.ip()).collect())
    }
}

/// Bounds every lookup of the inner resolver. A lookup that runs out of time
/// is an origin-stage timeout, which is retryable.
#[cfg(feature = "full")]
#[derive(Debug, Clone)]
pub struct TimeoutResolver<R> {
    inner: R,
    timeout: std::time::Duration,
}

#[cfg(feature = "full")]
impl<R: HostResolver> TimeoutResolver<R> {
    pub fn new(inner: R, timeout: std::time::Duration) -> Self {
        Self { inner, timeout }
    }
}

#[cfg(feature = "full")]
impl<R: HostResolver> HostResolver for TimeoutResolver<R> {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ItnError> {
        tokio::time::timeout(self.timeout, self.inner.resolve(host))
            .await
            .map_err(|_| {
                tracing::warn!(host = %host, timeout = ?self.timeout, "DNS lookup timed out");
                ItnError::Timeout(crate::pipeline::Stage::Origin)
            })?
    }
}

/// System DNS bounded by a timeout.
#[cfg(feature = "full")]
pub type DnsResolver = TimeoutResolver<SystemResolver>;

/// Fixed host → address table. IP literals resolve to themselves; unknown
/// names fail like an NXDOMAIN.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: HashMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, addrs: &[IpAddr]) -> Self {
        self.table
            .entry(host.to_ascii_lowercase())
            .or_default()
            .extend_from_slice(addrs);
        self
    }
}

impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, ItnError> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![ip]);
        }
        self.table
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| ItnError::DnsResolution(format!("{host}: no such host")))
    }
}

/// Trusts an origin when its host resolves to any address that one of the
/// trusted gateway hosts resolves to right now.
#[derive(Debug, Clone)]
pub struct ResolvingOriginTrust<R> {
    trusted_hosts: Vec<String>,
    resolver: R,
}

impl<R: HostResolver> ResolvingOriginTrust<R> {
    pub fn new(trusted_hosts: Vec<String>, resolver: R) -> Self {
        Self {
            trusted_hosts,
            resolver,
        }
    }

    pub fn trusted_hosts(&self) -> &[String] {
        &self.trusted_hosts
    }

    /// Union of the current addresses of every trusted host.
    ///
    /// Hosts that fail to resolve are skipped. If every one of them fails the
    /// first error is returned, so an outage reads as infrastructure trouble
    /// rather than as an untrusted origin.
    pub async fn trusted_addresses(&self) -> Result<BTreeSet<IpAddr>, ItnError> {
        let mut addrs = BTreeSet::new();
        let mut first_error = None;
        let mut resolved_any = false;

        for host in &self.trusted_hosts {
            match self.resolver.resolve(host).await {
                Ok(ips) => {
                    resolved_any = true;
                    addrs.extend(ips);
                }
                Err(e) => {
                    tracing::debug!(host = %host, error = %e, "trusted host did not resolve");
                    first_error.get_or_insert(e);
                }
            }
        }

        if !resolved_any {
            if let Some(e) = first_error {
                return Err(e);
            }
        }
        Ok(addrs)
    }
}

/// Host part of a Referer value, without IPv6 brackets.
fn referer_host(referer: &str) -> Result<String, ItnError> {
    let parsed = Url::parse(referer)
        .map_err(|_| ItnError::UntrustedOrigin(format!("unparsable referer: {referer}")))?;

    match parsed.host() {
        Some(url::Host::Domain(d)) => Ok(d.to_string()),
        Some(url::Host::Ipv4(ip)) => Ok(ip.to_string()),
        Some(url::Host::Ipv6(ip)) => Ok(ip.to_string()),
        None => Err(ItnError::UntrustedOrigin(format!("referer has no host: {referer}"))),
    }
}

impl<R: HostResolver> OriginTrust for ResolvingOriginTrust<R> {
    async fn verify_origin(&self, referer: Option<&str>) -> Result<(), ItnError> {
        let referer = referer
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(ItnError::MissingOrigin)?;

        let trusted = self.trusted_addresses().await?;
        if trusted.is_empty() {
            return Err(ItnError::NoTrustedAddresses);
        }

        let host = referer_host(referer)?;
        let origin_addrs = match self.resolver.resolve(&host).await {
            Ok(addrs) => addrs,
            Err(ItnError::DnsResolution(e)) => {
                return Err(ItnError::UntrustedOrigin(format!("origin does not resolve: {e}")))
            }
            Err(e) => return Err(e),
        };

        if origin_addrs.iter().any(|ip| trusted.contains(ip)) {
            Ok(())
        } else {
            Err(ItnError::UntrustedOrigin(host))
        }
    }
}
