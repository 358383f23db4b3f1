//! Client IP from proxy headers.

use std::net::IpAddr;
use std::sync::Arc;

use http::header::HeaderName;
use http::HeaderMap;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Headers consulted by [`RemoteIp`] when none are configured, in order.
pub fn default_headers() -> Vec<HeaderName> {
    vec![
        HeaderName::from_static("cf-connecting-ip"),
        HeaderName::from_static("x-forwarded-for"),
        HeaderName::from_static("x-real-ip"),
    ]
}

/// Sets [`Request::remote_ip`] from headers added by a reverse proxy.
///
/// The headers are tried in order; the first one whose first entry parses
/// as an IP address wins. If none does, the remote IP stays the TCP peer's.
/// Only use this behind a proxy that overwrites these headers: clients can
/// send them too.
#[derive(Clone, Debug)]
pub struct RemoteIp {
    pub headers: Vec<HeaderName>,
}

impl Default for RemoteIp {
    fn default() -> Self {
        Self { headers: default_headers() }
    }
}

impl Middleware for RemoteIp {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let headers = if self.headers.is_empty() {
            default_headers()
        } else {
            self.headers.clone()
        };
        Arc::new(ResolveIp { headers, next })
    }
}

struct ResolveIp {
    headers: Vec<HeaderName>,
    next: BoxedHandler,
}

impl Handler for ResolveIp {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            if let Some(ip) = client_ip(req.headers(), &self.headers) {
                req.set_remote_ip(ip);
            }
            self.next.serve(w, req).await;
        })
    }
}

fn client_ip(headers: &HeaderMap, names: &[HeaderName]) -> Option<IpAddr> {
    names.iter().find_map(|name| {
        let value = headers.get(name)?.to_str().ok()?;
        let first = value.split([',', ' ', '\t']).find(|s| !s.is_empty())?;
        first.parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::Mutex;

    use http::{HeaderValue, Method, StatusCode, Uri};

    use super::*;
    use crate::chain::wrap;
    use crate::handler::handler_fn;
    use crate::recorder::Recorder;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        pairs
            .iter()
            .map(|&(k, v)| (HeaderName::from_static(k), HeaderValue::from_static(v)))
            .collect()
    }

    #[test]
    fn extracts_first_valid_ip() {
        let names = default_headers();
        let cases: [(&[(&str, &str)], Option<&str>); 7] = [
            (&[], None),
            (&[("x-real-ip", "10.0.0.1")], Some("10.0.0.1")),
            (&[("x-forwarded-for", " 1.2.3.4, 5.6.7.8")], Some("1.2.3.4")),
            (&[("x-forwarded-for", "2001:db8::1 10.0.0.1")], Some("2001:db8::1")),
            (&[("x-forwarded-for", "junk"), ("x-real-ip", "10.0.0.2")], Some("10.0.0.2")),
            (&[("cf-connecting-ip", "9.9.9.9"), ("x-real-ip", "10.0.0.2")], Some("9.9.9.9")),
            (&[("x-other", "10.0.0.3")], None),
        ];
        for (i, (pairs, want)) in cases.into_iter().enumerate() {
            let want: Option<IpAddr> = want.map(|s| s.parse().unwrap());
            assert_eq!(client_ip(&headers(pairs), &names), want, "case {i}");
        }
    }

    #[tokio::test]
    async fn overrides_peer_ip() {
        let seen = Arc::new(Mutex::new(None));
        let inner = {
            let seen = Arc::clone(&seen);
            handler_fn(move |w, req| {
                *seen.lock().unwrap() = req.remote_ip();
                w.set_status(StatusCode::OK);
                Box::pin(async {})
            })
        };
        let h = wrap(inner, &[&RemoteIp::default()]);
        let peer: SocketAddr = "127.0.0.1:9000".parse().unwrap();

        let mut req = Request::new(Method::GET, Uri::from_static("/")).with_peer_addr(peer);
        req.headers_mut().insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        h.serve(&mut Recorder::new(), &mut req).await;
        assert_eq!(*seen.lock().unwrap(), Some("198.51.100.4".parse().unwrap()));

        let mut req = Request::new(Method::GET, Uri::from_static("/")).with_peer_addr(peer);
        h.serve(&mut Recorder::new(), &mut req).await;
        assert_eq!(*seen.lock().unwrap(), Some(peer.ip()));
    }
}
