//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! A middleware chain nests handlers of *different* concrete types: the
//! terminal handler, then one wrapper per middleware. Each wrapper only
//! knows its inner handler as a trait object (`Arc<dyn Handler>`), so any
//! handler can sit anywhere in the chain.
//!
//! ```text
//! handler_fn(|w, req| Box::pin(async move { … }))  ← user writes this
//!        ↓
//! HandlerFn(closure)                               ← implements Handler
//!        ↓ wrap(handler, &[&m0, &m1])
//! Arc<dyn Handler>                                 ← BoxedHandler
//!        ↓
//! handler.serve(&mut w, &mut req)  at request time ← one vtable dispatch
//!        ↓                                            per chain link
//! Pin<Box<dyn Future + Send + 'a>>                 ← BoxFuture
//! ```
//!
//! The future borrows the writer and the request for `'a`, so a handler can
//! write through `w` across `.await` points without taking ownership.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use http::StatusCode;

use crate::request::Request;
use crate::response::ResponseWriter;

/// A heap-allocated, type-erased future borrowing the writer and request.
///
/// `Send` lets the server run it on any tokio worker thread.
pub type BoxFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// A heap-allocated, type-erased handler shared across concurrent requests.
///
/// `Arc` gives cheap, thread-safe shared ownership: the server clones it
/// once per request, and function-style middleware clone their `next` into
/// each request's future.
pub type BoxedHandler = Arc<dyn Handler>;

/// The unit of request processing.
///
/// Implement it on a struct, or adapt a closure with [`handler_fn`].
pub trait Handler: Send + Sync + 'static {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a>;
}

impl Handler for BoxedHandler {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        (**self).serve(w, req)
    }
}

impl Handler for Box<dyn Handler> {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        (**self).serve(w, req)
    }
}

// ── Function adapter ──────────────────────────────────────────────────────────

/// Newtype that lets a closure act as a [`Handler`]. Build it with
/// [`handler_fn`].
pub struct HandlerFn<F>(F);

/// Adapts a closure into a [`Handler`].
///
/// The closure returns a boxed future borrowing its arguments:
///
/// ```rust
/// use turtles::{handler_fn, ResponseWriter};
///
/// let hello = handler_fn(|w, _req| {
///     Box::pin(async move {
///         let _ = w.write_body(b"hello");
///     })
/// });
/// ```
///
/// The bound on `F` is what lets the compiler infer the higher-ranked
/// closure signature, so always pass the closure to this function directly.
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, &'a mut Request) -> BoxFuture<'a>
        + Send
        + Sync
        + 'static,
{
    HandlerFn(f)
}

impl<F> Handler for HandlerFn<F>
where
    F: for<'a> Fn(&'a mut dyn ResponseWriter, &'a mut Request) -> BoxFuture<'a>
        + Send
        + Sync
        + 'static,
{
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        (self.0)(w, req)
    }
}

// ── StatusHandler ─────────────────────────────────────────────────────────────

/// A terminal handler that responds with a fixed status and no body.
///
/// It never reads the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatusHandler(pub StatusCode);

impl Handler for StatusHandler {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, _req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move { w.set_status(self.0) })
    }
}
