//! Minimal turtles example: a middleware stack around a tiny app.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:3000/api/hello
//!   curl -N http://localhost:3000/api/countdown
//!   curl -i http://localhost:3000/api//hello/../hello/
//!   curl -i http://localhost:3000/api/panic
//!   curl -i http://localhost:3000/elsewhere

use std::sync::Arc;
use std::time::Duration;

use http::header::{HeaderValue, SERVER};
use http::StatusCode;
use tracing::info;
use turtles::middleware::{
    CleanPath, Headers, LogRequest, Recover, RemoteIp, RequestId, StripPrefix,
};
use turtles::{
    handler_fn, wrap, write_error, BoxedHandler, Handler, MiddlewareFn, ObserveResponses,
    ResponseWriter,
};

#[tokio::main]
async fn main() -> Result<(), turtles::Error> {
    tracing_subscriber::fmt::init();

    let app = handler_fn(|w, req| {
        let path = req.path().to_owned();
        Box::pin(async move {
            match path.as_str() {
                "/hello" => {
                    let _ = w.write_body(b"hello, world\n");
                }
                "/countdown" => countdown(w).await,
                "/panic" => panic!("oh no"),
                _ => write_error(w, StatusCode::NOT_FOUND, "404 page not found"),
            }
        })
    });

    let mut headers = Headers::new();
    headers.set(SERVER, HeaderValue::from_static("turtles"));

    let app = wrap(
        app,
        &[
            &ObserveResponses,
            &RemoteIp::default(),
            &RequestId::default(),
            &LogRequest::default(),
            &MiddlewareFn(slow_requests),
            &Recover,
            &headers,
            &CleanPath::default(),
            &StripPrefix::new("/api"),
        ],
    );

    turtles::Server::bind("0.0.0.0:3000")?.serve(app).await
}

// GET /api/countdown streams one line per tick; each flush reaches the client.
async fn countdown(w: &mut dyn ResponseWriter) {
    for n in (1..=3).rev() {
        let _ = w.write_body(format!("{n}...\n").as_bytes());
        if let Some(f) = w.flusher() {
            f.flush();
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    let _ = w.write_body(b"liftoff\n");
}

// Reads the observed status after the rest of the chain has run.
// Placed after ObserveResponses, so the writer is always observable here.
fn slow_requests(next: BoxedHandler) -> BoxedHandler {
    Arc::new(handler_fn(move |w, req| {
        let next = Arc::clone(&next);
        Box::pin(async move {
            let start = std::time::Instant::now();
            next.serve(&mut *w, &mut *req).await;
            if start.elapsed() > Duration::from_secs(1) {
                let status = w.observer().and_then(|o| o.status());
                info!(path = req.path(), ?status, "slow request");
            }
        })
    }))
}
