//! Path prefix stripping.

use std::sync::Arc;

use http::StatusCode;

use crate::chain::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::{write_error, ResponseWriter};

/// Removes `prefix` from the request path before calling the next handler.
///
/// Requests whose path does not start with the prefix get `404 Not Found`.
/// So does every request when the prefix is empty, since nothing would be
/// stripped.
#[derive(Clone, Debug, Default)]
pub struct StripPrefix {
    pub prefix: String,
}

impl StripPrefix {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }
}

impl Middleware for StripPrefix {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Strip { prefix: self.prefix.clone(), next })
    }
}

struct Strip {
    prefix: String,
    next: BoxedHandler,
}

impl Handler for Strip {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            let stripped = match req.path().strip_prefix(self.prefix.as_str()) {
                Some(rest) if !self.prefix.is_empty() => Some(rest.to_owned()),
                _ => None,
            };
            match stripped {
                Some(path) => {
                    req.set_path(path);
                    self.next.serve(w, req).await;
                }
                None => write_error(w, StatusCode::NOT_FOUND, "404 page not found"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use http::{Method, Uri};

    use super::*;
    use crate::chain::wrap;
    use crate::handler::handler_fn;
    use crate::recorder::Recorder;

    async fn run(prefix: &str, uri: &'static str) -> (Recorder, Option<String>) {
        let seen = Arc::new(Mutex::new(None));
        let inner = {
            let seen = Arc::clone(&seen);
            handler_fn(move |_w, req| {
                *seen.lock().unwrap() = Some(req.path().to_owned());
                Box::pin(async {})
            })
        };
        let h = wrap(inner, &[&StripPrefix::new(prefix)]);

        let mut rec = Recorder::new();
        let mut req = Request::new(Method::GET, Uri::from_static(uri));
        h.serve(&mut rec, &mut req).await;
        let seen = seen.lock().unwrap().clone();
        (rec, seen)
    }

    #[tokio::test]
    async fn strips_matching_prefix() {
        let (rec, seen) = run("/api", "/api/users?x=1").await;
        assert_eq!(seen.as_deref(), Some("/users"));
        assert_eq!(rec.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn whole_path_may_be_stripped() {
        let (_, seen) = run("/api", "/api").await;
        assert_eq!(seen.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn rejects_other_paths() {
        let (rec, seen) = run("/api", "/web/index.html").await;
        assert!(seen.is_none());
        assert_eq!(rec.status(), StatusCode::NOT_FOUND);
        assert_eq!(rec.body(), b"404 page not found\n");
    }

    #[tokio::test]
    async fn empty_prefix_rejects_everything() {
        let (rec, seen) = run("", "/anything").await;
        assert!(seen.is_none());
        assert_eq!(rec.status(), StatusCode::NOT_FOUND);
    }
}
