//! Static response headers.

use std::sync::Arc;

use http::header::{HeaderMap, HeaderName, HeaderValue};

use crate::chain::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Adds a fixed set of headers to every response before calling the next
/// handler.
///
/// Values are appended, so a header configured twice is sent twice. The
/// next handler can still overwrite or remove them.
///
/// ```rust
/// use turtles::middleware::Headers;
/// use http::header::{HeaderValue, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS};
///
/// let mut headers = Headers::new();
/// headers.set(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
/// headers.set(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static("max-age=31536000"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Headers(HeaderMap);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, keeping any existing values for `name`.
    pub fn add(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.append(name, value);
    }

    /// Sets the only value for `name`.
    pub fn set(&mut self, name: HeaderName, value: HeaderValue) {
        self.0.insert(name, value);
    }

    pub fn get(&self, name: &HeaderName) -> Option<&HeaderValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &HeaderName) {
        self.0.remove(name);
    }
}

impl From<HeaderMap> for Headers {
    fn from(map: HeaderMap) -> Self {
        Self(map)
    }
}

impl Middleware for Headers {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(AddHeaders { headers: self.0.clone(), next })
    }
}

struct AddHeaders {
    headers: HeaderMap,
    next: BoxedHandler,
}

impl Handler for AddHeaders {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            let out = w.headers_mut();
            for (name, value) in &self.headers {
                out.append(name, value.clone());
            }
            self.next.serve(w, req).await
        })
    }
}
