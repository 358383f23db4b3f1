//! Incoming HTTP request type.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use http::header::CONTENT_LENGTH;
use http::{HeaderMap, Method, Uri, Version};
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use tracing::debug;

use crate::error::Error;

/// An incoming HTTP request.
///
/// Handlers receive `&mut Request`. Middleware may rewrite the path,
/// headers, remote IP and body limit; the method and the raw request URI
/// stay as received.
///
/// The body is read lazily by [`body`](Request::body), so a body limit set
/// before the first read bounds how much is ever taken off the connection.
#[derive(Debug)]
pub struct Request {
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    path: String,
    body: Body,
    body_limit: Option<u64>,
    peer_addr: Option<SocketAddr>,
    remote_ip: Option<IpAddr>,
}

#[derive(Debug)]
enum Body {
    Buffered(Bytes),
    Unread(Incoming),
    /// Reading failed; holds the limit if that was the cause.
    Failed(Option<u64>),
}

impl Request {
    /// A request with no headers and an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        let path = uri.path().to_owned();
        Self {
            method,
            uri,
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            path,
            body: Body::Buffered(Bytes::new()),
            body_limit: None,
            peer_addr: None,
            remote_ip: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Body::Buffered(body.into());
        self
    }

    pub(crate) fn from_incoming(req: http::Request<Incoming>) -> Self {
        let (parts, body) = req.into_parts();
        let mut out = Self::new(parts.method, parts.uri);
        out.version = parts.version;
        out.headers = parts.headers;
        out.body = Body::Unread(body);
        out
    }

    /// Sets the TCP peer address; the remote IP starts out as its IP.
    pub fn with_peer_addr(mut self, addr: SocketAddr) -> Self {
        self.peer_addr = Some(addr);
        self.remote_ip = Some(addr.ip());
        self
    }

    pub fn method(&self) -> &Method { &self.method }
    /// The request URI exactly as received, before any path rewriting.
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn version(&self) -> Version { self.version }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    /// Header value as a string. Returns `None` when absent or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The current request path. Starts as the URI path; middleware such as
    /// [`StripPrefix`](crate::middleware::StripPrefix) may rewrite it.
    pub fn path(&self) -> &str { &self.path }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    pub fn query(&self) -> Option<&str> { self.uri.query() }

    /// The `Host` header, falling back to the URI authority.
    pub fn host(&self) -> Option<&str> {
        self.header("host").or_else(|| self.uri.host())
    }

    /// Reads the whole request body, on first call, and returns it.
    ///
    /// With a body limit in place, reading stops as soon as the limit is
    /// passed (or before reading at all if `Content-Length` is already over
    /// it) and this fails with [`Error::BodyTooLarge`]. Later calls return
    /// the same outcome.
    pub async fn body(&mut self) -> Result<&Bytes, Error> {
        if let Body::Unread(_) = self.body {
            self.read_body().await;
        }
        match &self.body {
            Body::Buffered(bytes) => match self.body_limit {
                Some(limit) if bytes.len() as u64 > limit => Err(Error::BodyTooLarge { limit }),
                _ => Ok(bytes),
            },
            Body::Failed(Some(limit)) => Err(Error::BodyTooLarge { limit: *limit }),
            Body::Failed(None) | Body::Unread(_) => {
                Err(Error::Body("request body is unavailable".into()))
            }
        }
    }

    async fn read_body(&mut self) {
        let Body::Unread(incoming) = std::mem::replace(&mut self.body, Body::Failed(None)) else {
            return;
        };
        self.body = match self.body_limit {
            Some(limit) if self.declared_length().is_some_and(|n| n > limit) => {
                Body::Failed(Some(limit))
            }
            Some(limit) => {
                let max = usize::try_from(limit).unwrap_or(usize::MAX);
                match Limited::new(incoming, max).collect().await {
                    Ok(collected) => Body::Buffered(collected.to_bytes()),
                    Err(e) if e.is::<LengthLimitError>() => Body::Failed(Some(limit)),
                    Err(e) => {
                        debug!("failed to read request body: {e}");
                        Body::Failed(None)
                    }
                }
            }
            None => match incoming.collect().await {
                Ok(collected) => Body::Buffered(collected.to_bytes()),
                Err(e) => {
                    debug!("failed to read request body: {e}");
                    Body::Failed(None)
                }
            },
        };
    }

    fn declared_length(&self) -> Option<u64> {
        self.headers.get(CONTENT_LENGTH)?.to_str().ok()?.parse().ok()
    }

    /// Size of the body: its length once buffered, otherwise the declared
    /// `Content-Length`, if any.
    pub fn content_length(&self) -> Option<u64> {
        match &self.body {
            Body::Buffered(bytes) => Some(bytes.len() as u64),
            _ => self.declared_length(),
        }
    }

    /// Caps the body at `limit` bytes. A tighter existing limit is kept.
    pub fn limit_body(&mut self, limit: u64) {
        self.body_limit = Some(self.body_limit.map_or(limit, |l| l.min(limit)));
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> { self.peer_addr }

    /// The client IP: the peer address unless overridden, e.g. by
    /// [`RemoteIp`](crate::middleware::RemoteIp).
    pub fn remote_ip(&self) -> Option<IpAddr> { self.remote_ip }

    pub fn set_remote_ip(&mut self, ip: IpAddr) {
        self.remote_ip = Some(ip);
    }
}

impl From<http::Request<Bytes>> for Request {
    fn from(req: http::Request<Bytes>) -> Self {
        let (parts, body) = req.into_parts();
        let mut out = Self::new(parts.method, parts.uri).with_body(body);
        out.version = parts.version;
        out.headers = parts.headers;
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_starts_as_uri_path_and_can_be_rewritten() {
        let mut req = Request::new(Method::GET, Uri::from_static("/api/users?page=2"));
        assert_eq!(req.path(), "/api/users");
        assert_eq!(req.query(), Some("page=2"));

        req.set_path("/users");
        assert_eq!(req.path(), "/users");
        assert_eq!(req.uri().path(), "/api/users");
    }

    #[tokio::test]
    async fn body_limit_applies_on_read() {
        let mut req = Request::new(Method::POST, Uri::from_static("/")).with_body("hello");
        assert_eq!(req.body().await.unwrap().as_ref(), b"hello");

        req.limit_body(5);
        assert!(req.body().await.is_ok());

        req.limit_body(4);
        assert!(matches!(req.body().await, Err(Error::BodyTooLarge { limit: 4 })));

        // A looser limit does not lift a tighter one.
        req.limit_body(100);
        assert!(matches!(req.body().await, Err(Error::BodyTooLarge { limit: 4 })));
        assert_eq!(req.content_length(), Some(5));
    }

    #[tokio::test]
    async fn converts_from_http_request() {
        let req = http::Request::builder()
            .method(Method::PUT)
            .uri("http://example.com/items/1")
            .header("x-custom", "yes")
            .body(Bytes::from_static(b"{}"))
            .unwrap();
        let mut req = Request::from(req);

        assert_eq!(req.method(), &Method::PUT);
        assert_eq!(req.path(), "/items/1");
        assert_eq!(req.header("x-custom"), Some("yes"));
        assert_eq!(req.host(), Some("example.com"));
        assert_eq!(req.body().await.unwrap().as_ref(), b"{}");
    }

    #[test]
    fn peer_addr_seeds_remote_ip() {
        let addr: SocketAddr = "10.0.0.7:5000".parse().unwrap();
        let mut req = Request::new(Method::GET, Uri::from_static("/")).with_peer_addr(addr);
        assert_eq!(req.remote_ip(), Some(addr.ip()));

        req.set_remote_ip("203.0.113.9".parse().unwrap());
        assert_eq!(req.remote_ip(), Some("203.0.113.9".parse().unwrap()));
        assert_eq!(req.peer_addr(), Some(addr));
    }
}
