//! # turtles
//!
//! Composable HTTP middleware chains, and a response writer that remembers
//! what was sent.
//!
//! ## The contract
//!
//! A [`Handler`] answers a request by writing into a [`ResponseWriter`].
//! A [`Middleware`] takes a handler and returns a new one that runs some
//! logic around it. [`wrap`] folds a list of middleware over a handler so
//! that the first one listed is the outermost layer and sees the request
//! first. It is middleware all the way down.
//!
//! Writers may offer optional capabilities: [`Flusher`], [`Hijacker`],
//! [`CloseNotifier`] and [`ResponseObserver`]. Code probes for them at
//! runtime through the `ResponseWriter` accessor methods.
//! [`ObserveResponses`] makes every downstream writer a
//! `ResponseObserver`, so logging and metrics code can read the final status
//! and the number of body bytes written.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use turtles::middleware::{LogRequest, Recover, RequestId};
//! use turtles::{handler_fn, wrap, ObserveResponses, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), turtles::Error> {
//!     let hello = handler_fn(|w, req| {
//!         let body = format!("hello from {}\n", req.path());
//!         Box::pin(async move {
//!             w.set_status(StatusCode::OK);
//!             let _ = w.write_body(body.as_bytes());
//!         })
//!     });
//!
//!     let app = wrap(
//!         hello,
//!         &[&ObserveResponses, &RequestId::default(), &LogRequest::default(), &Recover],
//!     );
//!
//!     Server::bind("0.0.0.0:3000")?.serve(app).await
//! }
//! ```

mod chain;
mod error;
mod handler;
mod observe;
mod recorder;
mod request;
mod response;
mod server;

pub mod middleware;

pub use chain::{wrap, Middleware, MiddlewareFn};
pub use error::Error;
pub use handler::{handler_fn, BoxFuture, BoxedHandler, Handler, HandlerFn, StatusHandler};
pub use observe::{observe_responses, ObserveResponses, ObservedWriter};
pub use recorder::Recorder;
pub use request::Request;
pub use response::{
    write_error, CloseNotifier, CloseNotify, Flusher, Hijacker, ResponseObserver, ResponseWriter,
};
pub use server::Server;
