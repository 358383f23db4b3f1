//! The outbound response contract and its optional capabilities.
//!
//! Every handler writes its response through a [`ResponseWriter`]. The base
//! contract is small: headers, a status line, body bytes. Anything beyond
//! that is an optional *capability* a concrete writer may or may not have:
//!
//! | Probe | Capability | Typical provider |
//! |---|---|---|
//! | [`flusher`](ResponseWriter::flusher) | push buffered output now | the server transport, [`Recorder`](crate::Recorder) |
//! | [`hijacker`](ResponseWriter::hijacker) | take over the connection (protocol upgrade) | the server transport |
//! | [`close_notifier`](ResponseWriter::close_notifier) | learn that the client went away | the server transport |
//! | [`observer`](ResponseWriter::observer) | read back status and bytes written | [`ObservedWriter`](crate::ObservedWriter) |
//!
//! A probe returns `Some` when the capability is present and `None` when it
//! is not. There is no half-supported state: a writer that returns `Some`
//! must honour the capability's contract.
//!
//! ```rust
//! use turtles::ResponseWriter;
//!
//! fn flush_if_possible(w: &mut dyn ResponseWriter) {
//!     if let Some(f) = w.flusher() {
//!         f.flush();
//!     }
//! }
//! ```

use std::io;

use http::header::{HeaderValue, CONTENT_TYPE, X_CONTENT_TYPE_OPTIONS};
use http::{HeaderMap, StatusCode};
use hyper::upgrade::OnUpgrade;
use tokio::sync::watch;

use crate::error::Error;

/// The mutable destination of an HTTP response.
///
/// Implementors must be `Send`: handlers run as tokio tasks and hold the
/// writer across `.await` points.
pub trait ResponseWriter: Send {
    /// Response headers. Changes made after the status line has gone out are
    /// ignored by the transport.
    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Sets the response status. The first call decides what the transport
    /// sends; later calls are passed along and may be logged as superfluous.
    fn set_status(&mut self, status: StatusCode);

    /// Writes body bytes, implicitly setting `200 OK` if no status was set.
    ///
    /// Follows the [`std::io::Write::write`] contract: `Ok(n)` means `n`
    /// bytes were accepted (possibly fewer than `buf.len()`), `Err` means
    /// none were.
    fn write_body(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        None
    }

    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> {
        None
    }

    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> {
        None
    }

    fn observer(&self) -> Option<&dyn ResponseObserver> {
        None
    }
}

/// Sends any buffered output to the client immediately.
pub trait Flusher {
    fn flush(&mut self);
}

/// Hands the underlying connection over to the caller.
///
/// The returned [`OnUpgrade`] resolves once the response head (normally
/// `101 Switching Protocols`) has been sent; the caller then owns the raw
/// stream. Wrap it in `hyper_util::rt::TokioIo` for tokio I/O.
pub trait Hijacker {
    fn hijack(&mut self) -> Result<OnUpgrade, Error>;
}

/// Subscribes to client disconnect.
pub trait CloseNotifier {
    fn close_notify(&mut self) -> CloseNotify;
}

/// Read access to what has been written so far.
pub trait ResponseObserver {
    /// The status recorded for this response, or `None` if neither a status
    /// nor any body byte has been written yet.
    fn status(&self) -> Option<StatusCode>;

    /// Total body bytes accepted by the underlying writer.
    fn size(&self) -> u64;
}

/// A handle that resolves when the client connection goes away.
///
/// Obtained from [`CloseNotifier::close_notify`]. Any number of handles may
/// exist for one request; all of them fire together.
#[derive(Clone, Debug)]
pub struct CloseNotify(watch::Receiver<()>);

impl CloseNotify {
    /// Creates a handle that fires once the sender behind `guard` is
    /// dropped.
    pub fn new(guard: watch::Receiver<()>) -> Self {
        Self(guard)
    }

    /// Waits until the connection is closed.
    pub async fn closed(&mut self) {
        // The sender never publishes a value; `changed` only errors once it
        // is dropped.
        while self.0.changed().await.is_ok() {}
    }

    /// Returns `true` if the connection is already gone.
    pub fn is_closed(&self) -> bool {
        self.0.has_changed().is_err()
    }
}

/// Replies with `status` and a plain-text `message` line.
///
/// The body is `message` followed by a newline. Write errors are ignored:
/// the client is most likely gone.
pub fn write_error(w: &mut dyn ResponseWriter, status: StatusCode, message: &str) {
    let headers = w.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    w.set_status(status);
    let _ = w.write_body(format!("{message}\n").as_bytes());
}
