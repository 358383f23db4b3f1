//! Per-request access log.

use std::sync::Arc;
use std::time::Instant;

use http::header::{HeaderName, ORIGIN, USER_AGENT};
use tracing::info;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::middleware::request_id::X_REQUEST_ID;
use crate::request::Request;
use crate::response::ResponseWriter;

/// Emits one `info` event per request once the next handler returns.
///
/// Status and bytes sent are only known if the writer is observable, so
/// place [`ObserveResponses`](crate::ObserveResponses) before this in the
/// chain. Without it those two fields are left out of the event.
#[derive(Clone, Debug)]
pub struct LogRequest {
    /// Header holding the request ID, as set by
    /// [`RequestId`](crate::middleware::RequestId).
    pub request_id_header: HeaderName,
}

impl Default for LogRequest {
    fn default() -> Self {
        Self { request_id_header: X_REQUEST_ID }
    }
}

impl Middleware for LogRequest {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(AccessLog { id_header: self.request_id_header.clone(), next })
    }
}

struct AccessLog {
    id_header: HeaderName,
    next: BoxedHandler,
}

impl Handler for AccessLog {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            let start = Instant::now();
            self.next.serve(&mut *w, &mut *req).await;
            let elapsed = start.elapsed();

            let (status, bytes_sent) = match w.observer() {
                Some(o) => (o.status().map(|s| s.as_u16()), Some(o.size())),
                None => (None, None),
            };
            let remote_ip = req.remote_ip().map(|ip| ip.to_string());
            let header = |name: &HeaderName| req.headers().get(name).and_then(|v| v.to_str().ok());

            info!(
                method = %req.method(),
                uri = %req.uri(),
                path = req.path(),
                version = ?req.version(),
                host = req.host(),
                remote_ip = remote_ip.as_deref(),
                id = header(&self.id_header),
                user_agent = header(&USER_AGENT),
                origin = header(&ORIGIN),
                bytes_received = req.content_length(),
                duration_ms = elapsed.as_secs_f64() * 1000.0,
                status,
                bytes_sent,
                "request"
            );
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Mutex;

    use http::{HeaderValue, Method, StatusCode, Uri};

    use super::*;
    use crate::chain::wrap;
    use crate::handler::handler_fn;
    use crate::observe::ObserveResponses;
    use crate::recorder::Recorder;

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    async fn logged(middleware: &[&dyn Middleware]) -> String {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_writer({
                let capture = capture.clone();
                move || capture.clone()
            })
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let teapot = handler_fn(|w, _req| {
            Box::pin(async move {
                w.set_status(StatusCode::IM_A_TEAPOT);
                let _ = w.write_body(b"short and stout");
            })
        });
        let h = wrap(teapot, middleware);

        let mut req = Request::new(Method::POST, Uri::from_static("/brew?kind=earl-grey"))
            .with_body("milk");
        req.headers_mut().insert(X_REQUEST_ID, HeaderValue::from_static("req-42"));
        req.headers_mut().insert(USER_AGENT, HeaderValue::from_static("kettle/1.0"));
        h.serve(&mut Recorder::new(), &mut req).await;

        capture.text()
    }

    #[tokio::test]
    async fn logs_observed_response() {
        let line = logged(&[&ObserveResponses, &LogRequest::default()]).await;

        assert!(line.contains("request"), "{line}");
        assert!(line.contains("method=POST"), "{line}");
        assert!(line.contains("path=\"/brew\""), "{line}");
        assert!(line.contains("version=HTTP/1.1"), "{line}");
        assert!(line.contains("id=\"req-42\""), "{line}");
        assert!(line.contains("user_agent=\"kettle/1.0\""), "{line}");
        assert!(line.contains("bytes_received=4"), "{line}");
        assert!(line.contains("status=418"), "{line}");
        assert!(line.contains("bytes_sent=15"), "{line}");
    }

    #[tokio::test]
    async fn omits_status_without_observer() {
        let line = logged(&[&LogRequest::default()]).await;

        assert!(line.contains("method=POST"), "{line}");
        assert!(!line.contains("status="), "{line}");
        assert!(!line.contains("bytes_sent="), "{line}");
    }
}
