//! DNS resolution at the edge of the engine.
//!
//! The dispatcher only ever asks one question: "which IPv4 addresses answer
//! for this host?". Everything else — caches, upstream transports, retry —
//! belongs to the [`Resolve`] implementation plugged into the client.

use std::{collections::HashMap, fmt, future::Future, io, net::Ipv4Addr, pin::Pin, rc::Rc};

use smallvec::SmallVec;

/// Resolved A-record set, at most a handful in the common case.
pub type AddrSet = SmallVec<[Ipv4Addr; 4]>;

/// Alias for the `Future` type returned by a DNS resolver.
pub type Resolving = Pin<Box<dyn Future<Output = io::Result<DnsResponse>>>>;

/// Trait for customizing DNS resolution.
///
/// It differs from a `tower_service::Service<Name>` in several ways:
///  * It is assumed that `resolve_a` will always be ready to poll.
///  * It does not need a mutable reference to `self`.
///  * Since trait objects cannot make use of associated types, it requires
///    wrapping the returned `Future` with `Box`.
///
/// An `Err` from the returned future means the lookup itself failed (socket
/// trouble, no upstream). A successful future carrying a non-`NoError`
/// [`DnsCode`] means the upstream answered negatively; the dispatcher maps
/// that onto [`Error::DnsQuery`](crate::Error::DnsQuery).
pub trait Resolve {
    /// Resolve the IPv4 A records for `host`.
    fn resolve_a(&self, host: &str) -> Resolving;
}

/// Response code of a completed lookup, mirroring RCODE values.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum DnsCode {
    NoError,
    FormErr,
    ServFail,
    NxDomain,
    NotImp,
    Refused,
    Other(u8),
}

impl fmt::Display for DnsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DnsCode::NoError => f.write_str("NOERROR"),
            DnsCode::FormErr => f.write_str("FORMERR"),
            DnsCode::ServFail => f.write_str("SERVFAIL"),
            DnsCode::NxDomain => f.write_str("NXDOMAIN"),
            DnsCode::NotImp => f.write_str("NOTIMP"),
            DnsCode::Refused => f.write_str("REFUSED"),
            DnsCode::Other(code) => write!(f, "RCODE({code})"),
        }
    }
}

/// Outcome of a completed A lookup.
#[derive(Clone, Debug)]
pub struct DnsResponse {
    code: DnsCode,
    ips: AddrSet,
}

impl DnsResponse {
    /// A positive answer carrying `ips`.
    pub fn ok(ips: AddrSet) -> Self {
        DnsResponse {
            code: DnsCode::NoError,
            ips,
        }
    }

    /// A negative answer with the given response code.
    pub fn err(code: DnsCode) -> Self {
        DnsResponse {
            code,
            ips: AddrSet::new(),
        }
    }

    /// Whether the lookup produced at least one usable address.
    pub fn successful(&self) -> bool {
        self.code == DnsCode::NoError && !self.ips.is_empty()
    }

    pub fn code(&self) -> DnsCode {
        // An empty NOERROR answer is as unusable as NXDOMAIN; report it as such.
        if self.code == DnsCode::NoError && self.ips.is_empty() {
            DnsCode::NxDomain
        } else {
            self.code
        }
    }

    pub fn ips(&self) -> &[Ipv4Addr] {
        &self.ips
    }

    pub(crate) fn into_ips(self) -> AddrSet {
        self.ips
    }
}

/// Default resolver backed by the blocking-in-the-runtime `getaddrinfo`
/// bridge exposed through `tokio::net::lookup_host`.
#[derive(Clone, Copy, Debug, Default)]
pub struct GaiResolver {
    _priv: (),
}

impl GaiResolver {
    pub fn new() -> Self {
        GaiResolver { _priv: () }
    }
}

impl Resolve for GaiResolver {
    fn resolve_a(&self, host: &str) -> Resolving {
        // Port 0 is a placeholder; callers pair the returned addresses with
        // the request URL port.
        let host = host.to_owned();
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host.as_str(), 0)).await?;
            let ips: AddrSet = addrs
                .filter_map(|addr| match addr.ip() {
                    std::net::IpAddr::V4(ip) => Some(ip),
                    std::net::IpAddr::V6(_) => None,
                })
                .collect();
            Ok(DnsResponse::ok(ips))
        })
    }
}

/// Fixed host table, answering NXDOMAIN for anything not listed.
///
/// Useful as the sole resolver in tests and closed deployments.
#[derive(Clone, Debug, Default)]
pub struct StaticResolver {
    entries: HashMap<String, AddrSet>,
}

impl StaticResolver {
    pub fn new() -> Self {
        StaticResolver::default()
    }

    pub fn insert<I>(&mut self, host: impl Into<String>, ips: I) -> &mut Self
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        self.entries.insert(host.into(), ips.into_iter().collect());
        self
    }
}

impl Resolve for StaticResolver {
    fn resolve_a(&self, host: &str) -> Resolving {
        let response = match self.entries.get(host) {
            Some(ips) => DnsResponse::ok(ips.clone()),
            None => DnsResponse::err(DnsCode::NxDomain),
        };
        Box::pin(std::future::ready(Ok(response)))
    }
}

/// Decorator consulting a fixed override table before the inner resolver.
pub(crate) struct ResolverWithOverrides {
    resolver: Rc<dyn Resolve>,
    overrides: HashMap<String, AddrSet>,
}

impl ResolverWithOverrides {
    pub(crate) fn new(resolver: Rc<dyn Resolve>, overrides: HashMap<String, AddrSet>) -> Self {
        ResolverWithOverrides {
            resolver,
            overrides,
        }
    }
}

impl Resolve for ResolverWithOverrides {
    fn resolve_a(&self, host: &str) -> Resolving {
        match self.overrides.get(host) {
            Some(ips) => {
                let response = DnsResponse::ok(ips.clone());
                Box::pin(std::future::ready(Ok(response)))
            }
            None => self.resolver.resolve_a(host),
        }
    }
}
