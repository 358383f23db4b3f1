//! In-memory response writer.

use std::io;

use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::response::{Flusher, ResponseWriter};

/// A [`ResponseWriter`] that keeps the whole response in memory.
///
/// Useful in tests, and as the buffer behind
/// [`Timeout`](crate::middleware::Timeout). The first status set wins, as
/// with a real transport; every call is still counted so tests can check
/// what reached the writer.
///
/// The only optional capability a recorder has is [`Flusher`], which just
/// marks it as flushed.
#[derive(Debug, Default)]
pub struct Recorder {
    status: Option<StatusCode>,
    status_calls: usize,
    write_calls: usize,
    headers: HeaderMap,
    body: Vec<u8>,
    flushed: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The response status: the first one set, or `200 OK` if none was.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    /// Number of `set_status` calls received, including implicit ones from
    /// body writes.
    pub fn status_calls(&self) -> usize { self.status_calls }
    pub fn write_calls(&self) -> usize { self.write_calls }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn flushed(&self) -> bool { self.flushed }

    pub fn into_response(self) -> http::Response<Bytes> {
        let mut res = http::Response::new(Bytes::from(self.body));
        *res.status_mut() = self.status.unwrap_or(StatusCode::OK);
        *res.headers_mut() = self.headers;
        res
    }
}

impl ResponseWriter for Recorder {
    fn headers(&self) -> &HeaderMap { &self.headers }
    fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    fn set_status(&mut self, status: StatusCode) {
        self.status_calls += 1;
        self.status.get_or_insert(status);
    }

    fn write_body(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_calls += 1;
        if self.status.is_none() {
            self.set_status(StatusCode::OK);
        }
        self.body.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> {
        Some(self)
    }
}

impl Flusher for Recorder {
    fn flush(&mut self) {
        if self.status.is_none() {
            self.set_status(StatusCode::OK);
        }
        self.flushed = true;
    }
}
