//! Request construction.

use bytes::Bytes;
use http::{
    header::{HeaderMap, HeaderName, HeaderValue},
    Method,
};
use url::Url;

use crate::{
    client::{HttpClient, ResponseFuture},
    error::{Error, Result},
};

/// A request which can be executed with `HttpClient::execute()`.
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Bytes,
}

/// A builder to construct the properties of a `Request`.
///
/// To construct a `RequestBuilder`, refer to the `HttpClient` documentation.
#[must_use = "RequestBuilder does nothing until you 'send' it"]
pub struct RequestBuilder {
    client: HttpClient,
    request: Result<Request>,
}

impl Request {
    /// Constructs a new request.
    #[inline]
    pub fn new(method: Method, url: Url) -> Self {
        Request {
            method,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Get the method.
    #[inline(always)]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Get a mutable reference to the method.
    #[inline(always)]
    pub fn method_mut(&mut self) -> &mut Method {
        &mut self.method
    }

    /// Get the url.
    #[inline(always)]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get a mutable reference to the url.
    #[inline(always)]
    pub fn url_mut(&mut self) -> &mut Url {
        &mut self.url
    }

    /// Get the headers.
    #[inline(always)]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Get a mutable reference to the headers.
    #[inline(always)]
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Get the body.
    #[inline(always)]
    pub fn body_bytes(&self) -> &Bytes {
        &self.body
    }

    /// Get a mutable reference to the body.
    #[inline(always)]
    pub fn body_mut(&mut self) -> &mut Bytes {
        &mut self.body
    }
}

impl RequestBuilder {
    pub(crate) fn new(client: HttpClient, request: Result<Request>) -> Self {
        RequestBuilder { client, request }
    }

    /// Add a header to this request.
    pub fn header<K, V>(mut self, key: K, value: V) -> RequestBuilder
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if let Ok(ref mut request) = self.request {
            match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
                (Ok(key), Ok(value)) => {
                    request.headers.append(key, value);
                }
                _ => self.request = Err(Error::InvalidHeader),
            }
        }
        self
    }

    /// Add a set of headers to the existing ones on this request.
    pub fn headers(mut self, headers: HeaderMap) -> RequestBuilder {
        if let Ok(ref mut request) = self.request {
            for (key, value) in headers {
                if let Some(key) = key {
                    request.headers.append(key, value);
                }
            }
        }
        self
    }

    /// Set the request body.
    pub fn body<B: Into<Bytes>>(mut self, body: B) -> RequestBuilder {
        if let Ok(ref mut request) = self.request {
            request.body = body.into();
        }
        self
    }

    /// Build a `Request`, which can be inspected, modified and executed
    /// with `HttpClient::execute()`.
    pub fn build(self) -> Result<Request> {
        self.request
    }

    /// Constructs the `Request` and dispatches it to the target URL.
    pub fn send(self) -> ResponseFuture {
        match self.request {
            Ok(request) => self.client.execute(request),
            Err(err) => ResponseFuture::failed(err),
        }
    }
}

/// A trait to try to convert some type into a `Url`.
///
/// This trait is "sealed" in spirit: it is implemented for `Url`, `&str`
/// and `String`, which covers every caller in practice.
pub trait IntoUrl {
    fn into_url(self) -> Result<Url>;
}

impl IntoUrl for Url {
    fn into_url(self) -> Result<Url> {
        Ok(self)
    }
}

impl IntoUrl for &str {
    fn into_url(self) -> Result<Url> {
        Url::parse(self).map_err(|_| Error::InvalidUrl)
    }
}

impl IntoUrl for &String {
    fn into_url(self) -> Result<Url> {
        self.as_str().into_url()
    }
}

impl IntoUrl for String {
    fn into_url(self) -> Result<Url> {
        self.as_str().into_url()
    }
}
