//! # efflux
//!
//! An asynchronous HTTP/1.1 client engine optimized for high-throughput
//! outbound traffic to many distinct origins.
//!
//! The interesting part is the connection lifecycle: a per-origin
//! keep-alive cache, an expiry sweeper that enforces idle and active
//! deadlines over thousands of sockets with a single amortized timer, and
//! a dispatch path that resolves DNS, leases or dials a connection,
//! performs the exchange, and decides whether the socket returns to the
//! pool or is retired.
//!
//! The engine is single-reactor by design: the [`HttpClient`] handle is
//! `!Send`, every internal task is `spawn_local`-ed, and no state is
//! behind a lock. Run one client per reactor thread.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! # async fn run() -> efflux::Result<()> {
//! let client = efflux::HttpClient::builder()
//!     .keep_alive_timeout(Duration::from_secs(30))
//!     .connect_timeout(Duration::from_secs(5))
//!     .build();
//!
//! let local = tokio::task::LocalSet::new();
//! local
//!     .run_until(async {
//!         let resp = client.get("http://example.com/").send().await?;
//!         println!("{} {}", resp.status(), resp.text());
//!         client.stop().await;
//!         Ok(())
//!     })
//!     .await
//! # }
//! ```
//!
//! Out of scope by design: HTTP/2 and HTTP/3, pipelining, redirects,
//! cookies, caching, proxies, and retries.

mod client;
mod conn;
pub mod dns;
mod error;
pub mod inspect;
mod net;
mod pool;
mod proto;
mod request;
mod response;
mod rt;

pub use http::{header, HeaderMap, Method, StatusCode, Version};
pub use url::Url;

pub use self::{
    client::{ClientBuilder, HttpClient, ResponseFuture, ShutdownFuture},
    dns::{AddrSet, DnsCode, DnsResponse, GaiResolver, Resolve, Resolving, StaticResolver},
    error::{Error, ProtocolError, Result},
    inspect::{find_inspector, ForwardingInspector, Inspect, NoopInspector},
    net::{Dial, Dialing, TcpDialer, TcpSettings, TlsContext},
    pool::PoolStats,
    request::{IntoUrl, Request, RequestBuilder},
    response::Response,
};
