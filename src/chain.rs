//! Middleware composition.
//!
//! A middleware takes the next handler in the chain and returns a new
//! handler that decides whether, and how, to call it. [`wrap`] nests a list
//! of middleware around a terminal handler:
//!
//! ```text
//! wrap(h, &[&m0, &m1, &m2])  ==  m0.wrap(m1.wrap(m2.wrap(h)))
//!
//! request → m0 → m1 → m2 → h
//! ```

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};

/// A composable request-handling decorator.
///
/// Implement it on a configuration struct, or adapt a plain function with
/// [`MiddlewareFn`]. Both compose identically through [`wrap`].
pub trait Middleware {
    /// Returns a handler that runs this middleware around `next`.
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler;
}

/// Adapts a function `Fn(BoxedHandler) -> BoxedHandler` into a
/// [`Middleware`].
///
/// ```rust
/// use turtles::{observe_responses, wrap, MiddlewareFn, StatusHandler};
/// use http::StatusCode;
///
/// let app = wrap(StatusHandler(StatusCode::OK), &[&MiddlewareFn(observe_responses)]);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct MiddlewareFn<F>(pub F);

impl<F> Middleware for MiddlewareFn<F>
where
    F: Fn(BoxedHandler) -> BoxedHandler,
{
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        (self.0)(next)
    }
}

/// Wraps `handler` with `middleware`.
///
/// The returned handler calls `middleware[0] -> middleware[1] -> ... ->
/// handler`. Any middleware may stop the chain by not calling its next
/// handler. Composition itself never fails and has no side effects.
pub fn wrap(handler: impl Handler, middleware: &[&dyn Middleware]) -> BoxedHandler {
    let handler: BoxedHandler = Arc::new(handler);
    middleware.iter().rev().fold(handler, |next, m| m.wrap(next))
}
