//! Lifecycle observation.
//!
//! An [`Inspect`] implementation receives a synchronous callback at each
//! connection-lifecycle transition. Hooks are side-effect-only: they cannot
//! veto or reroute anything, and they run inline on the reactor thread, so
//! they should return quickly.
//!
//! Inspectors compose by forwarding: wrap the previous inspector in your
//! own and override only the hooks you care about. [`find_inspector`] walks
//! such a chain to recover a concrete inspector (say, to read its counters).

use std::{
    any::Any,
    net::{Ipv4Addr, SocketAddr},
    rc::Rc,
};

use crate::{error::Error, request::Request, response::Response};

/// Observer of connection lifecycle transitions.
///
/// Every hook has a no-op default; implement only what you need, plus
/// [`as_any`](Inspect::as_any) (`fn as_any(&self) -> &dyn Any { self }`)
/// so chain lookup works.
pub trait Inspect: 'static {
    /// A request entered the dispatcher.
    fn on_request(&self, _req: &Request) {}

    /// DNS resolution for `host` succeeded.
    fn on_resolve(&self, _host: &str, _ips: &[Ipv4Addr]) {}

    /// DNS resolution for `host` failed (I/O failure or negative answer).
    fn on_resolve_error(&self, _host: &str, _err: &Error) {}

    /// A new connection to `peer` was established (and TLS-wrapped, for
    /// `https`). Pool reuse does not re-emit this.
    fn on_connect(&self, _peer: SocketAddr) {}

    /// Dial or TLS handshake to `peer` failed.
    fn on_connect_error(&self, _peer: SocketAddr, _err: &Error) {}

    /// A response completed on the connection to `peer`.
    fn on_response(&self, _peer: SocketAddr, _resp: &Response) {}

    /// An error surfaced on the connection to `peer`.
    ///
    /// `was_idle` is `true` when no request was pending — the peer reset a
    /// pooled socket — in which case no request future fails and the event
    /// should not be counted as a response failure.
    fn on_error(&self, _peer: SocketAddr, _was_idle: bool, _err: &Error) {}

    /// The next inspector in a forwarding chain, if any.
    fn next(&self) -> Option<&dyn Inspect> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// The default inspector: observes nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopInspector;

impl Inspect for NoopInspector {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// An inspector that forwards every hook to the next one unchanged.
///
/// Embed one in a custom inspector (or use it as a chain terminator) to
/// build forwarding chains; overriding no hook makes it observationally
/// transparent.
pub struct ForwardingInspector {
    next: Rc<dyn Inspect>,
}

impl ForwardingInspector {
    pub fn new(next: Rc<dyn Inspect>) -> Self {
        ForwardingInspector { next }
    }
}

impl Inspect for ForwardingInspector {
    fn on_request(&self, req: &Request) {
        self.next.on_request(req);
    }

    fn on_resolve(&self, host: &str, ips: &[Ipv4Addr]) {
        self.next.on_resolve(host, ips);
    }

    fn on_resolve_error(&self, host: &str, err: &Error) {
        self.next.on_resolve_error(host, err);
    }

    fn on_connect(&self, peer: SocketAddr) {
        self.next.on_connect(peer);
    }

    fn on_connect_error(&self, peer: SocketAddr, err: &Error) {
        self.next.on_connect_error(peer, err);
    }

    fn on_response(&self, peer: SocketAddr, resp: &Response) {
        self.next.on_response(peer, resp);
    }

    fn on_error(&self, peer: SocketAddr, was_idle: bool, err: &Error) {
        self.next.on_error(peer, was_idle, err);
    }

    fn next(&self) -> Option<&dyn Inspect> {
        Some(&*self.next)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Walk a forwarding chain looking for an inspector of concrete type `T`.
pub fn find_inspector<T: Inspect>(start: &dyn Inspect) -> Option<&T> {
    let mut cursor = start;
    loop {
        if let Some(found) = cursor.as_any().downcast_ref::<T>() {
            return Some(found);
        }
        cursor = cursor.next()?;
    }
}
