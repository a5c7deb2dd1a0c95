//! The client: builder, dispatcher, expiry sweeper and lifecycle.
//!
//! An [`HttpClient`] owns a connection registry and runs everything on one
//! reactor thread. The handle is `Rc`-based and deliberately `!Send`; run
//! one client per reactor (a tokio `LocalSet` or current-thread runtime)
//! and forward cross-thread work through your own channel if you need to.

use std::{
    cell::RefCell,
    collections::HashMap,
    future::Future,
    net::SocketAddr,
    pin::Pin,
    rc::{Rc, Weak},
    task::{ready, Context, Poll},
    thread::{self, ThreadId},
    time::Duration,
};

use bytes::Bytes;
use futures_channel::oneshot;
use http::Method;
use pin_project_lite::pin_project;
use tracing::{debug, trace};
use url::Url;

use crate::{
    conn::{self, CloseReason, Connection, IoPhase},
    dns::{AddrSet, GaiResolver, Resolve, ResolverWithOverrides},
    error::{Error, Result},
    inspect::{Inspect, NoopInspector},
    net::{Dial, TcpDialer, TcpSettings, TlsContext, Transport},
    pool::{ConnId, Pool, PoolStats, SWEEP_INTERVAL},
    proto,
    request::{IntoUrl, Request, RequestBuilder},
    response::Response,
    rt::{ms, Clock},
};

/// An asynchronous HTTP/1.1 client with a per-origin keep-alive pool.
///
/// The client holds its connection pool internally, so create one and
/// **reuse** it. Cloning is cheap (`Rc` clone) and shares the pool.
///
/// All I/O runs as `spawn_local` tasks: the client must live on a tokio
/// [`LocalSet`](tokio::task::LocalSet) (or inside `run_until`).
#[derive(Clone)]
pub struct HttpClient {
    shared: Rc<ClientShared>,
}

/// A `ClientBuilder` can be used to create an `HttpClient` with custom
/// configuration.
#[must_use]
pub struct ClientBuilder {
    connect_timeout: Option<Duration>,
    read_write_timeout: Option<Duration>,
    shutdown_rw_timeout: Duration,
    keep_alive_timeout: Option<Duration>,
    max_keep_alive_requests: u32,
    max_body_size: usize,
    tcp_settings: TcpSettings,
    tls: Option<TlsContext>,
    resolver: Option<Rc<dyn Resolve>>,
    dialer: Option<Rc<dyn Dial>>,
    inspector: Option<Rc<dyn Inspect>>,
    dns_overrides: HashMap<String, AddrSet>,
}

struct Config {
    connect_timeout: Option<Duration>,
    read_write_timeout: Option<Duration>,
    shutdown_rw_timeout: Duration,
    keep_alive_timeout: Option<Duration>,
    max_keep_alive_requests: u32,
    max_body_size: usize,
    tcp_settings: TcpSettings,
}

pub(crate) struct ClientShared {
    config: Config,
    resolver: Rc<dyn Resolve>,
    dialer: Rc<dyn Dial>,
    tls: Option<TlsContext>,
    inspector: Rc<dyn Inspect>,
    clock: Clock,
    reactor_thread: ThreadId,
    state: RefCell<Inner>,
}

struct Inner {
    pool: Pool,
    cursor: u32,
    shutting_down: bool,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientBuilder {
    /// Constructs a new `ClientBuilder` with the default configuration:
    /// no connect or read/write deadlines, keep-alive disabled, a 3 s
    /// shutdown drain deadline, and no TLS context.
    pub fn new() -> ClientBuilder {
        ClientBuilder {
            connect_timeout: None,
            read_write_timeout: None,
            shutdown_rw_timeout: Duration::from_secs(3),
            keep_alive_timeout: None,
            max_keep_alive_requests: 0,
            max_body_size: i32::MAX as usize,
            tcp_settings: TcpSettings::new(),
            tls: None,
            resolver: None,
            dialer: None,
            inspector: None,
            dns_overrides: HashMap::new(),
        }
    }

    /// Set a deadline for only the connect phase.
    ///
    /// Default is `None` (wait forever).
    pub fn connect_timeout<D>(mut self, timeout: D) -> ClientBuilder
    where
        D: Into<Option<Duration>>,
    {
        self.connect_timeout = timeout.into();
        self
    }

    /// Set the active deadline: how long a busy connection may go without
    /// I/O progress before the sweeper fails it with a timeout.
    ///
    /// Default is `None` (unbounded active requests).
    pub fn read_write_timeout<D>(mut self, timeout: D) -> ClientBuilder
    where
        D: Into<Option<Duration>>,
    {
        self.read_write_timeout = timeout.into();
        self
    }

    /// Set the shortened active deadline applied while draining in
    /// `stop()`, guaranteeing termination even if peers stop sending.
    ///
    /// Default is 3 seconds.
    pub fn shutdown_rw_timeout(mut self, timeout: Duration) -> ClientBuilder {
        self.shutdown_rw_timeout = timeout;
        self
    }

    /// Enable keep-alive: idle connections are pooled for reuse until they
    /// sit unused this long.
    ///
    /// Default is `None`, which disables keep-alive entirely — every
    /// connection closes after one response.
    pub fn keep_alive_timeout<D>(mut self, timeout: D) -> ClientBuilder
    where
        D: Into<Option<Duration>>,
    {
        self.keep_alive_timeout = timeout.into();
        self
    }

    /// Cap the number of times one connection is recycled; `0` means
    /// unlimited.
    pub fn max_keep_alive_requests(mut self, max: u32) -> ClientBuilder {
        self.max_keep_alive_requests = max;
        self
    }

    /// Cap buffered response bodies. Default is `i32::MAX`; passing `0`
    /// restores the default.
    pub fn max_body_size(mut self, max: usize) -> ClientBuilder {
        self.max_body_size = if max == 0 { i32::MAX as usize } else { max };
        self
    }

    /// TCP options applied to every dialed socket.
    pub fn tcp_settings(mut self, settings: TcpSettings) -> ClientBuilder {
        self.tcp_settings = settings;
        self
    }

    /// Set the TLS context used to wrap sockets for `https` requests.
    ///
    /// Without one, `https` requests fail with
    /// [`Error::MissingTlsContext`] before any network I/O.
    pub fn tls_context(mut self, tls: TlsContext) -> ClientBuilder {
        self.tls = Some(tls);
        self
    }

    /// Override the DNS resolver implementation.
    ///
    /// Overrides for specific names passed to `resolve_to_addrs` are still
    /// applied on top of this resolver.
    pub fn resolver<R: Resolve + 'static>(mut self, resolver: R) -> ClientBuilder {
        self.resolver = Some(Rc::new(resolver));
        self
    }

    /// Override DNS resolution for a specific host.
    pub fn resolve_to_addrs<I>(mut self, host: impl Into<String>, ips: I) -> ClientBuilder
    where
        I: IntoIterator<Item = std::net::Ipv4Addr>,
    {
        self.dns_overrides
            .insert(host.into(), ips.into_iter().collect());
        self
    }

    /// Override the socket dialer.
    pub fn dialer<D: Dial + 'static>(mut self, dialer: D) -> ClientBuilder {
        self.dialer = Some(Rc::new(dialer));
        self
    }

    /// Install a lifecycle inspector (or a forwarding chain of them).
    pub fn inspector<I: Inspect>(mut self, inspector: I) -> ClientBuilder {
        self.inspector = Some(Rc::new(inspector));
        self
    }

    /// Returns an `HttpClient` bound to the calling thread.
    pub fn build(self) -> HttpClient {
        let mut resolver = self
            .resolver
            .unwrap_or_else(|| Rc::new(GaiResolver::new()));
        if !self.dns_overrides.is_empty() {
            resolver = Rc::new(ResolverWithOverrides::new(resolver, self.dns_overrides));
        }

        HttpClient {
            shared: Rc::new(ClientShared {
                config: Config {
                    connect_timeout: self.connect_timeout,
                    read_write_timeout: self.read_write_timeout,
                    shutdown_rw_timeout: self.shutdown_rw_timeout,
                    keep_alive_timeout: self.keep_alive_timeout,
                    max_keep_alive_requests: self.max_keep_alive_requests,
                    max_body_size: self.max_body_size,
                    tcp_settings: self.tcp_settings,
                },
                resolver,
                dialer: self.dialer.unwrap_or_else(|| Rc::new(TcpDialer::new())),
                tls: self.tls,
                inspector: self
                    .inspector
                    .unwrap_or_else(|| Rc::new(NoopInspector)),
                clock: Clock::new(),
                reactor_thread: thread::current().id(),
                state: RefCell::new(Inner {
                    pool: Pool::new(),
                    cursor: 0,
                    shutting_down: false,
                    shutdown_waiters: Vec::new(),
                }),
            }),
        }
    }
}

impl HttpClient {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Convenience method to make a `GET` request to a URL.
    pub fn get<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Convenience method to make a `POST` request to a URL.
    pub fn post<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Convenience method to make a `PUT` request to a URL.
    pub fn put<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Convenience method to make a `DELETE` request to a URL.
    pub fn delete<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Convenience method to make a `HEAD` request to a URL.
    pub fn head<U: IntoUrl>(&self, url: U) -> RequestBuilder {
        self.request(Method::HEAD, url)
    }

    /// Start building a `Request` with the `Method` and `Url`.
    pub fn request<U: IntoUrl>(&self, method: Method, url: U) -> RequestBuilder {
        let request = url.into_url().map(|url| Request::new(method, url));
        RequestBuilder::new(self.clone(), request)
    }

    /// Executes a `Request`.
    ///
    /// The returned future is detached from the exchange itself: dropping
    /// it does not abort the in-flight connection, which completes in the
    /// background and is recycled when keep-alive eligible.
    pub fn execute(&self, request: Request) -> ResponseFuture {
        let (tx, rx) = oneshot::channel();
        match self.shared.precheck(&request) {
            Ok(()) => {
                let shared = Rc::clone(&self.shared);
                tokio::task::spawn_local(dispatch(shared, request, tx));
            }
            Err(err) => {
                let _ = tx.send(Err(err));
            }
        }
        ResponseFuture { rx }
    }

    /// Validates the calling thread and returns; the client has no I/O
    /// prelude.
    pub fn start(&self) -> Result<()> {
        self.shared.check_thread()
    }

    /// Begin shutdown: close every idle connection now, reject new
    /// requests, and resolve the returned future once the last in-flight
    /// exchange finishes (bounded by the shutdown drain deadline).
    ///
    /// With no traffic outstanding the future is already resolved.
    pub fn stop(&self) -> ShutdownFuture {
        debug_assert!(self.shared.check_thread().is_ok());
        let shared = &self.shared;

        let already_stopping = {
            let mut inner = shared.state.borrow_mut();
            let was = inner.shutting_down;
            inner.shutting_down = true;
            was
        };
        if !already_stopping {
            debug!("client stopping; draining idle connections");
            let idle = shared.state.borrow().pool.idle_ids();
            for id in idle {
                shared.close_conn(id, CloseReason::ShutdownDrain);
            }
        }

        let mut inner = shared.state.borrow_mut();
        if inner.pool.total() == 0 {
            ShutdownFuture { rx: None }
        } else {
            let (tx, rx) = oneshot::channel();
            inner.shutdown_waiters.push(tx);
            ShutdownFuture { rx: Some(rx) }
        }
    }

    /// Current pool occupancy and expiry counters.
    pub fn pool_stats(&self) -> PoolStats {
        self.shared.state.borrow().pool.stats()
    }

    /// The installed inspector (chain head).
    pub fn inspector(&self) -> &dyn Inspect {
        &*self.shared.inspector
    }

    #[cfg(test)]
    pub(crate) fn set_round_robin_cursor(&self, cursor: u32) {
        self.shared.state.borrow_mut().cursor = cursor;
    }

    #[cfg(test)]
    pub(crate) fn round_robin_indexes(&self, n: usize, take: usize) -> Vec<usize> {
        (0..take).map(|_| self.shared.next_round_robin(n)).collect()
    }
}

impl ClientShared {
    pub(crate) fn inspector(&self) -> &dyn Inspect {
        &*self.inspector
    }

    pub(crate) fn max_body_size(&self) -> usize {
        self.config.max_body_size
    }

    fn check_thread(&self) -> Result<()> {
        // The `!Send` handle already confines the client statically; this
        // backs the same guarantee against `unsafe impl Send` wrappers.
        if thread::current().id() == self.reactor_thread {
            Ok(())
        } else {
            Err(Error::InvalidThread)
        }
    }

    fn precheck(&self, request: &Request) -> Result<()> {
        self.check_thread()?;
        if self.state.borrow().shutting_down {
            return Err(Error::ShuttingDown);
        }
        match request.url().scheme() {
            "http" => Ok(()),
            "https" => Ok(()),
            _ => Err(Error::InvalidUrl),
        }
    }

    /// `idx = (cursor++ & INT32_MAX) % n`; masking keeps the index
    /// non-negative across wrap-around at 2^31 − 1.
    fn next_round_robin(&self, n: usize) -> usize {
        let mut inner = self.state.borrow_mut();
        let cursor = inner.cursor;
        inner.cursor = cursor.wrapping_add(1);
        ((cursor & i32::MAX as u32) as usize) % n
    }

    /// Lease the hottest idle connection to `peer`, checking out its
    /// transport and arming the doom channel.
    fn try_take_idle(
        &self,
        peer: SocketAddr,
    ) -> Option<(ConnId, Transport, oneshot::Receiver<Error>)> {
        let mut inner = self.state.borrow_mut();
        let now = self.clock.now_ms();
        let id = inner.pool.take_idle(peer, now)?;
        let conn = inner.pool.get_mut(id).expect("leased connection is live");
        let transport = conn
            .transport
            .take()
            .expect("idle connection owns its transport");
        conn.watch.take();
        conn.phase = IoPhase::Writing;
        let (doom_tx, doom_rx) = oneshot::channel();
        conn.doom = Some(doom_tx);
        trace!("reusing idle connection for {peer}");
        Some((id, transport, doom_rx))
    }

    fn register_new_busy(
        self: &Rc<Self>,
        peer: SocketAddr,
    ) -> (ConnId, oneshot::Receiver<Error>) {
        let (id, doom_rx) = {
            let mut inner = self.state.borrow_mut();
            let now = self.clock.now_ms();
            let mut conn = Connection::new(peer, now);
            let (doom_tx, doom_rx) = oneshot::channel();
            conn.doom = Some(doom_tx);
            (inner.pool.insert_busy(conn), doom_rx)
        };
        self.ensure_sweeper();
        (id, doom_rx)
    }

    pub(crate) fn touch(&self, id: ConnId, phase: IoPhase) {
        let now = self.clock.now_ms();
        self.state.borrow_mut().pool.touch(id, now, phase);
    }

    /// Retire a connection: detach it from the registry, release its
    /// resources, and notify the lifecycle controller. Idempotent — stale
    /// ids are a no-op. Returns whether the entry was still live.
    pub(crate) fn close_conn(&self, id: ConnId, reason: CloseReason) -> bool {
        let conn = {
            let mut inner = self.state.borrow_mut();
            let Some(conn) = inner.pool.remove(id) else {
                return false;
            };
            match reason {
                CloseReason::IdleExpired => inner.pool.idle_expired_total += 1,
                CloseReason::ActiveTimeout => inner.pool.busy_expired_total += 1,
                _ => {}
            }
            conn
        };

        let Connection {
            peer,
            transport,
            doom,
            watch,
            phase,
            ..
        } = conn;
        // Dropping the watch sender retires the idle watcher.
        drop(watch);
        if let Some(doom_tx) = doom {
            if reason == CloseReason::ActiveTimeout {
                let err = match phase {
                    IoPhase::Writing => Error::WriteTimeout { peer },
                    IoPhase::Reading => Error::ReadTimeout { peer },
                };
                let _ = doom_tx.send(err);
            }
        }
        // Release the socket before the closed state is observable anywhere.
        drop(transport);
        debug!("closed connection to {peer}: {reason:?}");
        self.on_connection_closed();
        true
    }

    /// Lifecycle notification from every closing connection.
    fn on_connection_closed(&self) {
        let waiters = {
            let mut inner = self.state.borrow_mut();
            if inner.shutting_down && inner.pool.total() == 0 {
                std::mem::take(&mut inner.shutdown_waiters)
            } else {
                return;
            }
        };
        debug!("connection pool drained; shutdown complete");
        for waiter in waiters {
            let _ = waiter.send(());
        }
    }

    /// A response completed: recycle the connection or retire it.
    pub(crate) fn finish_exchange(self: &Rc<Self>, id: ConnId, transport: Transport, reusable: bool) {
        let eligible = {
            let inner = self.state.borrow();
            match inner.pool.get(id) {
                // Doomed while the response raced the sweeper; entry gone.
                None => None,
                Some(conn) => {
                    let cap = self.config.max_keep_alive_requests;
                    Some(
                        reusable
                            && !inner.shutting_down
                            && self.config.keep_alive_timeout.is_some()
                            && (cap == 0 || conn.keep_alive_count + 1 <= cap),
                    )
                }
            }
        };

        match eligible {
            None => drop(transport),
            Some(false) => {
                drop(transport);
                self.close_conn(id, CloseReason::Finished);
            }
            Some(true) => {
                let (peer, watch_rx) = {
                    let mut inner = self.state.borrow_mut();
                    let now = self.clock.now_ms();
                    let conn = inner.pool.get_mut(id).expect("recycled connection is live");
                    conn.keep_alive_count += 1;
                    conn.transport = Some(transport);
                    conn.doom = None;
                    let (watch_tx, watch_rx) = oneshot::channel();
                    conn.watch = Some(watch_tx);
                    let peer = conn.peer;
                    inner.pool.park_idle(id, now);
                    trace!("pooling idle connection for {peer}");
                    (peer, watch_rx)
                };
                self.ensure_sweeper();
                conn::spawn_idle_watch(Rc::clone(self), id, peer, watch_rx);
            }
        }
    }

    /// Readiness probe used by the idle watcher. Resolves `true` when the
    /// entry is gone or leased (nothing to watch), `false` on a read event.
    pub(crate) fn poll_idle_event(&self, id: ConnId, cx: &mut Context<'_>) -> Poll<bool> {
        let inner = self.state.borrow();
        let Some(conn) = inner.pool.get(id) else {
            return Poll::Ready(true);
        };
        let Some(transport) = conn.transport.as_ref() else {
            return Poll::Ready(true);
        };
        match transport.tcp().poll_read_ready(cx) {
            Poll::Ready(_) => Poll::Ready(false),
            Poll::Pending => Poll::Pending,
        }
    }

    /// Arm the expiry sweeper if it is not already ticking.
    ///
    /// The task holds only a weak reference: dropping the last client
    /// handle stops the ticking without ceremony.
    fn ensure_sweeper(self: &Rc<Self>) {
        {
            let mut inner = self.state.borrow_mut();
            if inner.pool.sweeper_armed || inner.pool.total() == 0 {
                return;
            }
            inner.pool.sweeper_armed = true;
        }
        trace!("arming expiry sweeper");
        let weak = Rc::downgrade(self);
        tokio::task::spawn_local(sweeper(weak));
    }

    /// One sweep: expired idle entries first, then stalled busy entries.
    /// Returns whether the sweeper should stay armed.
    fn sweep_tick(&self) -> bool {
        let now = self.clock.now_ms();

        // Idle walk. The list is insertion-ordered, so the scan stops at
        // the first entry that has not yet expired.
        if let Some(idle_deadline) = self.config.keep_alive_timeout.map(ms) {
            loop {
                let expired = {
                    let inner = self.state.borrow();
                    match inner.pool.idle_head() {
                        Some((id, last)) if now.saturating_sub(last) >= idle_deadline => Some(id),
                        _ => None,
                    }
                };
                match expired {
                    Some(id) => {
                        self.close_conn(id, CloseReason::IdleExpired);
                    }
                    None => break,
                }
            }
        }

        // Busy walk, only when an active deadline applies. `touch` keeps
        // the list ordered by last activity, allowing the same early exit.
        let shutting_down = self.state.borrow().shutting_down;
        let active_deadline = if shutting_down {
            Some(self.config.shutdown_rw_timeout)
        } else {
            self.config.read_write_timeout
        };
        if let Some(active_deadline) = active_deadline.map(ms) {
            loop {
                let expired = {
                    let inner = self.state.borrow();
                    match inner.pool.busy_head() {
                        Some((id, last)) if now.saturating_sub(last) >= active_deadline => Some(id),
                        _ => None,
                    }
                };
                match expired {
                    Some(id) => {
                        self.close_conn(id, CloseReason::ActiveTimeout);
                    }
                    None => break,
                }
            }
        }

        let mut inner = self.state.borrow_mut();
        if inner.pool.total() == 0 {
            inner.pool.sweeper_armed = false;
            trace!("no live connections; sweeper parked");
            false
        } else {
            true
        }
    }
}

/// The self-rescheduling sweep loop. At most one instance runs per client;
/// it parks itself once no live connection remains, and the next
/// registration arms a fresh one.
async fn sweeper(shared: Weak<ClientShared>) {
    loop {
        tokio::time::sleep(SWEEP_INTERVAL).await;
        let Some(shared) = shared.upgrade() else {
            return;
        };
        if !shared.sweep_tick() {
            return;
        }
    }
}

/// The dispatch path: resolve, round-robin, lease or dial, exchange.
async fn dispatch(
    shared: Rc<ClientShared>,
    request: Request,
    tx: oneshot::Sender<Result<Response>>,
) {
    shared.inspector.on_request(&request);

    let url = request.url();
    let https = url.scheme() == "https";
    let host = match url.host_str() {
        Some(host) => host.to_owned(),
        // Absolute http(s) URLs always carry a host; guard anyway.
        None => {
            let _ = tx.send(Err(Error::InvalidUrl));
            return;
        }
    };

    if https && shared.tls.is_none() {
        let _ = tx.send(Err(Error::MissingTlsContext));
        return;
    }

    // DNS, IPv4 A records only.
    let ips = match shared.resolver.resolve_a(&host).await {
        Err(source) => {
            let err = Error::Resolve {
                host: host.clone(),
                source,
            };
            shared.inspector.on_resolve_error(&host, &err);
            let _ = tx.send(Err(err));
            return;
        }
        Ok(response) if !response.successful() => {
            let err = Error::DnsQuery {
                host: host.clone(),
                code: response.code(),
            };
            shared.inspector.on_resolve_error(&host, &err);
            let _ = tx.send(Err(err));
            return;
        }
        Ok(response) => response.into_ips(),
    };
    shared.inspector.on_resolve(&host, &ips);

    let port = url.port_or_known_default().unwrap_or(80);
    let ip = ips[shared.next_round_robin(ips.len())];
    let peer = SocketAddr::from((ip, port));

    let (id, transport, doom_rx) = match shared.try_take_idle(peer) {
        Some(lease) => lease,
        None => {
            let dialed = shared
                .dialer
                .dial(peer, shared.config.connect_timeout, &shared.config.tcp_settings)
                .await;
            let stream = match dialed {
                Ok(stream) => stream,
                Err(source) => {
                    let err = Error::Connect { addr: peer, source };
                    shared.inspector.on_connect_error(peer, &err);
                    let _ = tx.send(Err(err));
                    return;
                }
            };

            let transport = if https {
                let tls = shared.tls.as_ref().expect("checked before resolving");
                match tls.wrap(stream, &host).await {
                    Ok(stream) => Transport::Tls(Box::new(stream)),
                    Err(source) => {
                        let err = Error::Tls {
                            host: host.clone(),
                            source,
                        };
                        shared.inspector.on_connect_error(peer, &err);
                        let _ = tx.send(Err(err));
                        return;
                    }
                }
            } else {
                Transport::Plain(stream)
            };

            let (id, doom_rx) = shared.register_new_busy(peer);
            shared.inspector.on_connect(peer);
            debug!("new connection to {peer} for {host}");
            (id, transport, doom_rx)
        }
    };

    let request_was_head = *request.method() == Method::HEAD;
    let request_allows_reuse = request
        .headers()
        .get(http::header::CONNECTION)
        .map_or(true, |value| !crate::proto::headers::connection_close(value));
    let wire: Bytes = proto::encode_request(&request).freeze();

    conn::drive(
        shared,
        id,
        peer,
        transport,
        wire,
        request_was_head,
        request_allows_reuse,
        doom_rx,
        tx,
    )
    .await;
}

pin_project! {
    /// Future of a dispatched request.
    ///
    /// Dropping it abandons the *result*, not the exchange: the connection
    /// finishes in the background and may return to the pool.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct ResponseFuture {
        #[pin]
        rx: oneshot::Receiver<Result<Response>>,
    }
}

impl ResponseFuture {
    /// A future that is already failed; used for errors caught before
    /// anything was dispatched.
    pub(crate) fn failed(err: Error) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(err));
        ResponseFuture { rx }
    }
}

impl Future for ResponseFuture {
    type Output = Result<Response>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        match ready!(this.rx.poll(cx)) {
            Ok(result) => Poll::Ready(result),
            // The drive task can only vanish mid-flight if its reactor was
            // torn down.
            Err(_canceled) => Poll::Ready(Err(Error::ShuttingDown)),
        }
    }
}

pin_project! {
    /// Future of `stop()`: resolves when the pool is fully drained.
    #[must_use = "futures do nothing unless you `.await` or poll them"]
    pub struct ShutdownFuture {
        #[pin]
        rx: Option<oneshot::Receiver<()>>,
    }
}

impl Future for ShutdownFuture {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.project().rx.as_pin_mut() {
            None => Poll::Ready(()),
            Some(rx) => {
                let _ = ready!(rx.poll(cx));
                Poll::Ready(())
            }
        }
    }
}
