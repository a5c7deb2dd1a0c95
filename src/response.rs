//! The response surface handed back to request futures.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, Version};

use crate::proto::ResponseHead;

/// A fully drained HTTP response.
///
/// The engine only recycles a connection after the body is completely
/// read, so the body arrives buffered (bounded by the configured
/// `max_body_size`).
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    version: Version,
    headers: HeaderMap,
    body: Bytes,
    peer: SocketAddr,
}

impl Response {
    pub(crate) fn new(head: ResponseHead, body: Bytes, peer: SocketAddr) -> Self {
        Response {
            status: head.status,
            version: head.version,
            headers: head.headers,
            body,
            peer,
        }
    }

    /// Get the `StatusCode` of this `Response`.
    #[inline(always)]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Get the HTTP `Version` of this `Response`.
    #[inline(always)]
    pub fn version(&self) -> Version {
        self.version
    }

    /// Get the `Headers` of this `Response`.
    #[inline(always)]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The resolved `(ip, port)` endpoint that served this response.
    #[inline(always)]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Get the response body bytes.
    #[inline(always)]
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Consume the response into its body.
    #[inline]
    pub fn into_body(self) -> Bytes {
        self.body
    }

    /// Get the response text, replacing invalid UTF-8 sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
