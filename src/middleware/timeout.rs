//! Request deadline.

use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use tracing::warn;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::recorder::Recorder;
use crate::request::Request;
use crate::response::ResponseWriter;

const DEFAULT_MESSAGE: &str =
    "<html><head><title>Timeout</title></head><body><h1>Timeout</h1></body></html>";

/// Gives the next handler `duration` to produce its response.
///
/// The next handler writes into an in-memory buffer. If it finishes in
/// time, the buffered status, headers and body are copied to the real
/// writer. Otherwise its future is dropped and the client gets
/// `503 Service Unavailable` with `message` as the body (a small HTML page
/// if `message` is empty).
///
/// Because output is buffered, the next handler sees no hijack or close
/// notification capability, and flushing has no effect on the client.
#[derive(Clone, Debug)]
pub struct Timeout {
    pub duration: Duration,
    pub message: String,
}

impl Timeout {
    pub fn new(duration: Duration) -> Self {
        Self { duration, message: String::new() }
    }
}

impl Middleware for Timeout {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        let message = if self.message.is_empty() {
            DEFAULT_MESSAGE.to_owned()
        } else {
            self.message.clone()
        };
        Arc::new(Deadline { duration: self.duration, message, next })
    }
}

struct Deadline {
    duration: Duration,
    message: String,
    next: BoxedHandler,
}

impl Handler for Deadline {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            let mut buf = Recorder::new();
            let finished = tokio::time::timeout(self.duration, self.next.serve(&mut buf, req))
                .await
                .is_ok();

            if !finished {
                warn!(path = req.path(), timeout = ?self.duration, "handler timed out");
                w.set_status(StatusCode::SERVICE_UNAVAILABLE);
                let _ = w.write_body(self.message.as_bytes());
                return;
            }

            let (parts, body) = buf.into_response().into_parts();
            let headers = w.headers_mut();
            for (name, value) in &parts.headers {
                headers.append(name, value.clone());
            }
            w.set_status(parts.status);
            if !body.is_empty() {
                let _ = w.write_body(&body);
            }
        })
    }
}
