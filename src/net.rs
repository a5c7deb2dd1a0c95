//! Transport plumbing: TCP dialing, socket options, and TLS wrapping.
//!
//! The engine treats both as external collaborators behind narrow seams: a
//! [`Dial`] implementation produces connected `TcpStream`s, and a
//! [`TlsContext`] upgrades them for `https` requests.

use std::{future::Future, io, net::SocketAddr, pin::Pin, sync::Arc, time::Duration};

use bytes::BytesMut;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_rustls::{client::TlsStream, rustls, TlsConnector};

/// Opaque TCP parameters applied to every dialed socket.
#[derive(Clone, Debug, Default)]
pub struct TcpSettings {
    pub(crate) nodelay: bool,
    pub(crate) keepalive: Option<Duration>,
    pub(crate) send_buffer_size: Option<usize>,
    pub(crate) recv_buffer_size: Option<usize>,
}

impl TcpSettings {
    pub fn new() -> Self {
        TcpSettings {
            nodelay: true,
            ..TcpSettings::default()
        }
    }

    /// Set whether sockets have `TCP_NODELAY` enabled.
    ///
    /// Default is `true`.
    pub fn nodelay(mut self, enabled: bool) -> Self {
        self.nodelay = enabled;
        self
    }

    /// Set that all sockets have `SO_KEEPALIVE` set with the supplied duration.
    ///
    /// If `None`, the option will not be set.
    pub fn keepalive<D>(mut self, dur: D) -> Self
    where
        D: Into<Option<Duration>>,
    {
        self.keepalive = dur.into();
        self
    }

    /// Set the socket send buffer size.
    pub fn send_buffer_size<S>(mut self, size: S) -> Self
    where
        S: Into<Option<usize>>,
    {
        self.send_buffer_size = size.into();
        self
    }

    /// Set the socket receive buffer size.
    pub fn recv_buffer_size<S>(mut self, size: S) -> Self
    where
        S: Into<Option<usize>>,
    {
        self.recv_buffer_size = size.into();
        self
    }

    fn apply(&self, stream: &TcpStream) -> io::Result<()> {
        let sock = socket2::SockRef::from(stream);
        sock.set_nodelay(self.nodelay)?;
        if let Some(dur) = self.keepalive {
            sock.set_tcp_keepalive(&socket2::TcpKeepalive::new().with_time(dur))?;
        }
        if let Some(size) = self.send_buffer_size {
            sock.set_send_buffer_size(size)?;
        }
        if let Some(size) = self.recv_buffer_size {
            sock.set_recv_buffer_size(size)?;
        }
        Ok(())
    }
}

/// Alias for the `Future` type returned by a dialer.
pub type Dialing = Pin<Box<dyn Future<Output = io::Result<TcpStream>>>>;

/// Connect to a destination, returning a TCP transport.
///
/// The default implementation is [`TcpDialer`]; tests and exotic setups
/// (unix sockets behind a shim, user-space stacks) plug in their own.
pub trait Dial {
    fn dial(&self, addr: SocketAddr, timeout: Option<Duration>, settings: &TcpSettings) -> Dialing;
}

/// Default dialer: `TcpStream::connect` with the configured deadline and
/// socket options.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpDialer {
    _priv: (),
}

impl TcpDialer {
    pub fn new() -> Self {
        TcpDialer { _priv: () }
    }
}

impl Dial for TcpDialer {
    fn dial(&self, addr: SocketAddr, timeout: Option<Duration>, settings: &TcpSettings) -> Dialing {
        let settings = settings.clone();
        Box::pin(async move {
            let connect = TcpStream::connect(addr);
            let stream = match timeout {
                Some(dur) => tokio::time::timeout(dur, connect).await.map_err(|_| {
                    io::Error::new(io::ErrorKind::TimedOut, "connect timed out")
                })??,
                None => connect.await?,
            };
            settings.apply(&stream)?;
            Ok(stream)
        })
    }
}

/// TLS configuration used to wrap sockets for `https` requests.
///
/// Built on rustls; the default context trusts the webpki root set. SNI is
/// always the request host.
#[derive(Clone)]
pub struct TlsContext {
    connector: TlsConnector,
}

impl std::fmt::Debug for TlsContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsContext").finish()
    }
}

impl TlsContext {
    /// A context trusting the bundled webpki roots.
    pub fn new() -> Self {
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        let config = rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        Self::from_config(Arc::new(config))
    }

    /// A context from a caller-assembled rustls config (custom roots,
    /// client certificates, pinning).
    pub fn from_config(config: Arc<rustls::ClientConfig>) -> Self {
        TlsContext {
            connector: TlsConnector::from(config),
        }
    }

    pub(crate) async fn wrap(
        &self,
        stream: TcpStream,
        host: &str,
    ) -> io::Result<TlsStream<TcpStream>> {
        let name = rustls::pki_types::ServerName::try_from(host.to_owned())
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        self.connector.connect(name, stream).await
    }
}

impl Default for TlsContext {
    fn default() -> Self {
        TlsContext::new()
    }
}

/// One transport socket, plain or TLS-wrapped.
#[derive(Debug)]
pub(crate) enum Transport {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Transport {
    /// The underlying TCP socket, for readiness probing on idle connections.
    pub(crate) fn tcp(&self) -> &TcpStream {
        match self {
            Transport::Plain(stream) => stream,
            Transport::Tls(stream) => stream.get_ref().0,
        }
    }

    pub(crate) async fn read_buf(&mut self, buf: &mut BytesMut) -> io::Result<usize> {
        match self {
            Transport::Plain(stream) => stream.read_buf(buf).await,
            Transport::Tls(stream) => stream.read_buf(buf).await,
        }
    }

    pub(crate) async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        match self {
            Transport::Plain(stream) => stream.write_all(data).await,
            Transport::Tls(stream) => stream.write_all(data).await,
        }
    }
}
