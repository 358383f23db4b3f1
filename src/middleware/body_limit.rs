//! Request body size limit.

use std::sync::Arc;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::ResponseWriter;

/// Caps how much of the request body handlers may read.
///
/// Once limited, [`Request::body`] stops reading from the connection after
/// `limit` bytes and returns
/// [`Error::BodyTooLarge`](crate::Error::BodyTooLarge); a body declared
/// larger by `Content-Length` is refused without being read. It is up to
/// the handler to answer, typically with `413 Content Too Large`. A `limit`
/// of zero disables the cap.
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyLimit {
    pub limit: u64,
}

impl BodyLimit {
    pub fn new(limit: u64) -> Self {
        Self { limit }
    }
}

impl Middleware for BodyLimit {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        if self.limit == 0 {
            return next;
        }
        Arc::new(LimitBody { limit: self.limit, next })
    }
}

struct LimitBody {
    limit: u64,
    next: BoxedHandler,
}

impl Handler for LimitBody {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            req.limit_body(self.limit);
            self.next.serve(w, req).await;
        })
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode, Uri};

    use super::*;
    use crate::chain::wrap;
    use crate::error::Error;
    use crate::handler::handler_fn;
    use crate::recorder::Recorder;
    use crate::response::write_error;

    /// Echoes the body, or answers 413 when it is over the limit.
    async fn run(limit: u64, body: &'static str) -> Recorder {
        let echo = handler_fn(|w, req| {
            Box::pin(async move {
                match req.body().await {
                    Ok(body) => {
                        let _ = w.write_body(body);
                    }
                    Err(Error::BodyTooLarge { .. }) => {
                        write_error(w, StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            })
        });
        let h = wrap(echo, &[&BodyLimit::new(limit)]);

        let mut rec = Recorder::new();
        let mut req = Request::new(Method::POST, Uri::from_static("/")).with_body(body);
        h.serve(&mut rec, &mut req).await;
        rec
    }

    #[tokio::test]
    async fn body_within_limit_is_readable() {
        let rec = run(5, "hello").await;
        assert_eq!(rec.status(), StatusCode::OK);
        assert_eq!(rec.body(), b"hello");
    }

    #[tokio::test]
    async fn body_over_limit_is_refused() {
        let rec = run(4, "hello").await;
        assert_eq!(rec.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn zero_disables_the_limit() {
        let rec = run(0, "hello").await;
        assert_eq!(rec.body(), b"hello");
    }
}
