//! Response instrumentation.
//!
//! [`ObserveResponses`] puts an [`ObservedWriter`] in front of the writer it
//! receives, so that the final status and the number of body bytes become
//! readable through [`ResponseWriter::observer`] once the inner handler
//! returns. Put it first in the chain; a request logger further in can then
//! report what was sent:
//!
//! ```rust
//! use turtles::{wrap, ObserveResponses, StatusHandler};
//! use turtles::middleware::LogRequest;
//! use http::StatusCode;
//!
//! let app = wrap(
//!     StatusHandler(StatusCode::NO_CONTENT),
//!     &[&ObserveResponses, &LogRequest::default()],
//! );
//! ```
//!
//! The writer is only wrapped if it is not observable already, so applying
//! the middleware twice in one chain does not count bytes twice.

use std::io;
use std::sync::Arc;

use http::{HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;

use crate::chain::Middleware;
use crate::error::Error;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::{CloseNotifier, Flusher, Hijacker, ResponseObserver, ResponseWriter};

/// Middleware that makes the response observable. See the
/// [module docs](self).
#[derive(Clone, Copy, Debug, Default)]
pub struct ObserveResponses;

impl Middleware for ObserveResponses {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        observe_responses(next)
    }
}

/// Function form of [`ObserveResponses`], for use with
/// [`MiddlewareFn`](crate::MiddlewareFn).
pub fn observe_responses(next: BoxedHandler) -> BoxedHandler {
    Arc::new(Observed { next })
}

struct Observed {
    next: BoxedHandler,
}

impl Handler for Observed {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            if w.observer().is_some() {
                self.next.serve(w, req).await;
            } else {
                let mut w = ObservedWriter::new(w);
                self.next.serve(&mut w, req).await;
            }
        })
    }
}

/// A [`ResponseWriter`] that records the status and body size of the
/// response written through it.
///
/// Always probeable as [`Flusher`] (a no-op if the inner writer cannot
/// flush) and as [`Hijacker`] (failing with [`Error::HijackUnsupported`] if
/// the inner writer cannot hijack). [`CloseNotifier`] is probeable exactly
/// when the inner writer supports it.
pub struct ObservedWriter<'w> {
    inner: &'w mut dyn ResponseWriter,
    size: u64,
    status: Option<StatusCode>,
}

impl<'w> ObservedWriter<'w> {
    pub fn new(inner: &'w mut dyn ResponseWriter) -> Self {
        Self { inner, size: 0, status: None }
    }
}

impl ResponseObserver for ObservedWriter<'_> {
    fn status(&self) -> Option<StatusCode> { self.status }
    fn size(&self) -> u64 { self.size }
}

impl ResponseWriter for ObservedWriter<'_> {
    fn headers(&self) -> &HeaderMap { self.inner.headers() }
    fn headers_mut(&mut self) -> &mut HeaderMap { self.inner.headers_mut() }

    fn set_status(&mut self, status: StatusCode) {
        self.status.get_or_insert(status);
        self.inner.set_status(status);
    }

    fn write_body(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.status.get_or_insert(StatusCode::OK);
        let n = self.inner.write_body(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        Some(self)
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        self.inner.close_notifier()
    }

    fn observer(&self) -> Option<&dyn ResponseObserver> {
        Some(self)
    }
}

impl Flusher for ObservedWriter<'_> {
    fn flush(&mut self) {
        if let Some(f) = self.inner.flusher() {
            f.flush();
        }
    }
}

impl Hijacker for ObservedWriter<'_> {
    fn hijack(&mut self) -> Result<OnUpgrade, Error> {
        match self.inner.hijacker() {
            Some(h) => h.hijack(),
            None => Err(Error::HijackUnsupported),
        }
    }
}
