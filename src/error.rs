use std::{io, net::SocketAddr};

use thiserror::Error;

use crate::dns::DnsCode;

/// A `Result` alias where the `Err` case is `efflux::Error`.
pub type Result<T> = std::result::Result<T, Error>;

/// The errors that may occur when dispatching a request.
///
/// Every failure closes the offending connection (if one was involved) and
/// completes the single awaiting response future; nothing is retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// DNS lookup I/O failure for the request host.
    #[error("failed to resolve host {host}: {source}")]
    Resolve {
        host: String,
        #[source]
        source: io::Error,
    },

    /// The resolver answered, but with a non-success response code
    /// (NXDOMAIN, SERVFAIL, ...) or an empty A-record set.
    #[error("dns query for {host} failed with {code}")]
    DnsQuery { host: String, code: DnsCode },

    /// Transport-level dial failure, including connect timeouts.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// TLS handshake failure. Routed like a connect error, but kept as its
    /// own variant so inspectors can track handshakes separately.
    #[error("tls handshake with {host} failed: {source}")]
    Tls {
        host: String,
        #[source]
        source: io::Error,
    },

    /// An `https` request was dispatched on a client built without a TLS
    /// context. Raised before any network I/O.
    #[error("https request attempted without a tls context")]
    MissingTlsContext,

    /// The active read deadline expired while awaiting the response.
    #[error("read from {peer} timed out")]
    ReadTimeout { peer: SocketAddr },

    /// The active write deadline expired while sending the request.
    #[error("write to {peer} timed out")]
    WriteTimeout { peer: SocketAddr },

    /// Socket I/O failed on an established connection.
    #[error("connection to {peer} failed: {source}")]
    Io {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// The peer sent something that is not valid HTTP/1.1, or the response
    /// exceeded a configured size cap.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The request arrived after `stop()` began.
    #[error("client is shutting down")]
    ShuttingDown,

    /// A public entry point was invoked from a thread other than the
    /// client's reactor thread.
    #[error("client used outside its reactor thread")]
    InvalidThread,

    /// The request URL is not an absolute `http`/`https` URL with a host.
    #[error("request url is not a dispatchable http(s) url")]
    InvalidUrl,

    /// A header name or value passed to the request builder was malformed.
    #[error("invalid request header")]
    InvalidHeader,
}

/// Malformed or over-limit HTTP/1.1 response data.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("malformed response head: {0}")]
    InvalidHead(#[from] httparse::Error),

    #[error("response head exceeds {max} bytes")]
    HeadTooLarge { max: usize },

    #[error("conflicting or malformed content-length")]
    InvalidContentLength,

    #[error("malformed chunked encoding")]
    InvalidChunk,

    #[error("response body exceeds {max} bytes")]
    BodyTooLarge { max: usize },

    #[error("connection closed before the response completed")]
    IncompleteResponse,
}

impl Error {
    /// Whether this error was synthesized by the expiry sweeper.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ReadTimeout { .. } | Error::WriteTimeout { .. })
    }

    /// Whether this error occurred before any socket was dialed.
    pub fn is_pre_network(&self) -> bool {
        matches!(
            self,
            Error::MissingTlsContext
                | Error::ShuttingDown
                | Error::InvalidThread
                | Error::InvalidUrl
                | Error::Resolve { .. }
                | Error::DnsQuery { .. }
        )
    }
}
