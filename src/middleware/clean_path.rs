//! Canonical request paths.

use std::sync::Arc;

use http::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use http::{Method, StatusCode};

use crate::chain::Middleware;
use crate::handler::{BoxFuture, BoxedHandler, Handler};
use crate::request::Request;
use crate::response::ResponseWriter;

/// What [`CleanPath`] does with a trailing slash.
///
/// The root path `/` is never affected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TrailingSlash {
    /// Keep the trailing slash as received.
    #[default]
    Leave,
    /// Require a trailing slash.
    Add,
    /// Strip any trailing slash.
    Remove,
}

/// Redirects requests for non-canonical paths to their canonical form.
///
/// Duplicate slashes, `.` and `..` segments are resolved and a leading
/// slash is enforced; then [`TrailingSlash`] is applied. If the result
/// differs from the request path, the response is a
/// `301 Moved Permanently` to the clean path, with the query string kept.
/// `CONNECT` requests pass through untouched.
#[derive(Clone, Copy, Debug, Default)]
pub struct CleanPath {
    pub trailing_slash: TrailingSlash,
}

impl Middleware for CleanPath {
    fn wrap(&self, next: BoxedHandler) -> BoxedHandler {
        Arc::new(Clean { mode: self.trailing_slash, next })
    }
}

struct Clean {
    mode: TrailingSlash,
    next: BoxedHandler,
}

impl Handler for Clean {
    fn serve<'a>(&'a self, w: &'a mut dyn ResponseWriter, req: &'a mut Request) -> BoxFuture<'a> {
        Box::pin(async move {
            if req.method() != Method::CONNECT {
                let clean = clean_path(req.path(), self.mode);
                if clean != req.path() {
                    let location = match req.query() {
                        Some(q) => format!("{clean}?{q}"),
                        None => clean,
                    };
                    if let Ok(value) = HeaderValue::try_from(location.as_str()) {
                        redirect(w, req.method(), value, &location);
                        return;
                    }
                }
            }
            self.next.serve(w, req).await;
        })
    }
}

fn redirect(w: &mut dyn ResponseWriter, method: &Method, location: HeaderValue, raw: &str) {
    w.headers_mut().insert(LOCATION, location);
    let body = (method == Method::GET || method == Method::HEAD).then(|| {
        format!("<a href=\"{}\">Moved Permanently</a>.\n\n", html_escape(raw))
    });
    if body.is_some() {
        w.headers_mut().insert(CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    }
    w.set_status(StatusCode::MOVED_PERMANENTLY);
    if let Some(body) = body {
        let _ = w.write_body(body.as_bytes());
    }
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Returns the canonical form of `path` under `mode`.
pub fn clean_path(path: &str, mode: TrailingSlash) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }

    let mut clean = String::with_capacity(path.len() + 1);
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s => segments.push(s),
        }
    }
    for segment in &segments {
        clean.push('/');
        clean.push_str(segment);
    }
    if clean.is_empty() {
        clean.push('/');
    }

    // Resolving segments drops the trailing slash; restore it.
    if path.ends_with('/') && clean != "/" {
        clean.push('/');
    }

    match mode {
        TrailingSlash::Leave => {}
        TrailingSlash::Add => {
            if !clean.ends_with('/') {
                clean.push('/');
            }
        }
        TrailingSlash::Remove => {
            if clean.len() > 1 && clean.ends_with('/') {
                clean.pop();
            }
        }
    }
    clean
}

#[cfg(test)]
mod tests {
    use http::Uri;

    use super::*;
    use crate::chain::wrap;
    use crate::handler::StatusHandler;
    use crate::recorder::Recorder;

    #[test]
    fn cleans_paths() {
        use TrailingSlash::*;

        let cases = [
            ("", Leave, "/"),
            ("", Remove, "/"),
            ("/", Leave, "/"),
            ("/", Remove, "/"),
            ("/", Add, "/"),
            ("a/b", Leave, "/a/b"),
            ("/a//b/./c/../d", Leave, "/a/b/d"),
            ("/a//b/./c/../d/", Leave, "/a/b/d/"),
            ("/a//b/./c/../d/", Remove, "/a/b/d"),
            ("/a", Add, "/a/"),
            ("/a/", Add, "/a/"),
            ("/../../x", Leave, "/x"),
            ("/x/..", Leave, "/"),
            ("/x/../", Leave, "/"),
            ("//", Remove, "/"),
        ];
        for (i, (input, mode, want)) in cases.into_iter().enumerate() {
            assert_eq!(clean_path(input, mode), want, "{i}: clean_path({input:?}, {mode:?})");
        }
    }

    async fn run(clean: CleanPath, method: Method, uri: &'static str) -> Recorder {
        let h = wrap(StatusHandler(StatusCode::NO_CONTENT), &[&clean]);
        let mut rec = Recorder::new();
        h.serve(&mut rec, &mut Request::new(method, Uri::from_static(uri))).await;
        rec
    }

    #[tokio::test]
    async fn canonical_paths_pass_through() {
        let rec = run(CleanPath::default(), Method::GET, "/a/b/").await;
        assert_eq!(rec.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn redirects_with_query_kept() {
        let rec = run(CleanPath::default(), Method::GET, "/a//b/../c?q=1").await;

        assert_eq!(rec.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(rec.headers()[LOCATION], "/a/c?q=1");
        assert_eq!(rec.body(), b"<a href=\"/a/c?q=1\">Moved Permanently</a>.\n\n");
    }

    #[tokio::test]
    async fn applies_trailing_slash_mode() {
        let clean = CleanPath { trailing_slash: TrailingSlash::Remove };
        let rec = run(clean, Method::POST, "/items/").await;

        assert_eq!(rec.status(), StatusCode::MOVED_PERMANENTLY);
        assert_eq!(rec.headers()[LOCATION], "/items");
        assert!(rec.body().is_empty());
    }

    #[tokio::test]
    async fn connect_is_left_alone() {
        let rec = run(CleanPath::default(), Method::CONNECT, "/a//b").await;
        assert_eq!(rec.status(), StatusCode::NO_CONTENT);
    }
}
