//! Request ID tagging.

use std::sync::Arc;

use http::header::{HeaderName, HeaderValue};
use rand::RngCore;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::ResponseWriter;

/// The header [`RequestId`] uses unless told otherwise.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Tags each request with a random hex ID.
///
/// The ID is set on both the request and the response. A request that
/// already carries the header keeps its ID unless `force_set` is true.
#[derive(Clone, Debug)]
pub struct RequestId {
    /// Replace an incoming ID instead of keeping it.
    pub force_set: bool,
    /// Length of the hex-encoded ID. Zero means the default, 8.
    pub len: usize,
    pub header: HeaderName,
}

impl Default for RequestId {
    fn default() -> Self {
        Self { force_set: false, len: 8, header: X_REQUEST_ID }
    }
}

impl Middleware for RequestId {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let len = if self.len == 0 { 8 } else { self.len };
        Arc::new(TagRequest {
            force_set: self.force_set,
            len,
            header: self.header.clone(),
            next,
        })
    }
}

struct TagRequest {
    force_set: bool,
    len: usize,
    header: HeaderName,
    next: BoxedHandler,
}

impl Handler for TagRequest {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            let missing = req.headers().get(&self.header).is_none_or(|v| v.is_empty());
            if missing || self.force_set {
                let id = generate(self.len);
                req.headers_mut().insert(self.header.clone(), id.clone());
                w.headers_mut().insert(self.header.clone(), id);
            }
            self.next.serve(w, req).await;
        })
    }
}

/// `len / 2` random bytes, hex encoded.
fn generate(len: usize) -> HeaderValue {
    let mut bytes = vec![0u8; len / 2];
    rand::thread_rng().fill_bytes(&mut bytes);
    HeaderValue::try_from(hex::encode(bytes)).expect("hex is a valid header value")
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use http::{Method, StatusCode, Uri};

    use super::*;
    use crate::chain::wrap;
    use crate::handler::handler_fn;
    use crate::recorder::Recorder;

    /// Runs `rid` over a request with `incoming` as its ID header and returns
    /// (ID seen by the handler, ID on the response).
    async fn run(rid: RequestId, incoming: Option<&'static str>) -> (Option<String>, Option<String>) {
        let header = rid.header.clone();
        let seen = Arc::new(Mutex::new(None));
        let inner = {
            let seen = Arc::clone(&seen);
            let header = header.clone();
            handler_fn(move |w, req| {
                *seen.lock().unwrap() = req.header(header.as_str()).map(str::to_owned);
                w.set_status(StatusCode::OK);
                Box::pin(async {})
            })
        };
        let h = wrap(inner, &[&rid]);

        let mut req = Request::new(Method::GET, Uri::from_static("/"));
        if let Some(id) = incoming {
            req.headers_mut().insert(header.clone(), HeaderValue::from_static(id));
        }
        let mut rec = Recorder::new();
        h.serve(&mut rec, &mut req).await;

        let sent = rec.headers().get(&header).map(|v| v.to_str().unwrap().to_owned());
        let seen = seen.lock().unwrap().clone();
        (seen, sent)
    }

    fn is_hex(s: &str) -> bool {
        s.bytes().all(|b| b.is_ascii_hexdigit())
    }

    #[tokio::test]
    async fn generates_missing_id() {
        let (seen, sent) = run(RequestId::default(), None).await;
        let id = seen.expect("request tagged");

        assert_eq!(id.len(), 8);
        assert!(is_hex(&id), "{id}");
        assert_eq!(sent.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn keeps_incoming_id() {
        let (seen, sent) = run(RequestId::default(), Some("abc")).await;
        assert_eq!(seen.as_deref(), Some("abc"));
        assert_eq!(sent, None);
    }

    #[tokio::test]
    async fn force_set_replaces_incoming_id() {
        let rid = RequestId { force_set: true, ..Default::default() };
        let (seen, sent) = run(rid, Some("abc")).await;

        let id = seen.unwrap();
        assert_ne!(id, "abc");
        assert_eq!(sent.as_deref(), Some(id.as_str()));
    }

    #[tokio::test]
    async fn custom_header_and_length() {
        let rid = RequestId {
            len: 12,
            header: HeaderName::from_static("x-trace"),
            ..Default::default()
        };
        let (seen, _) = run(rid, None).await;
        assert_eq!(seen.unwrap().len(), 12);
    }

    #[test]
    fn odd_length_rounds_down() {
        assert_eq!(generate(5).len(), 4);
        assert_eq!(generate(0).len(), 0);
    }

    #[test]
    fn ids_differ() {
        assert_ne!(generate(32), generate(32));
    }
}
