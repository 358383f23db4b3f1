//! Panic recovery.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use http::StatusCode;
use tracing::error;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::{write_error, ResponseWriter};

/// Turns a panic in the next handler into a `500 Internal Server Error`.
///
/// The panic message is logged at `error` level together with the request
/// method and path. If the handler had already started the response, the
/// status cannot change any more and only the error text is appended.
#[derive(Clone, Copy, Debug, Default)]
pub struct Recover;

impl Middleware for Recover {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(CatchPanic { next })
    }
}

struct CatchPanic {
    next: BoxedHandler,
}

impl Handler for CatchPanic {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            let method = req.method().clone();
            let result = AssertUnwindSafe(self.next.serve(&mut *w, &mut *req))
                .catch_unwind()
                .await;
            if let Err(payload) = result {
                error!(
                    method = %method,
                    path = req.path(),
                    panic = panic_message(payload.as_ref()),
                    "handler panicked"
                );
                write_error(w, StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error");
            }
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
