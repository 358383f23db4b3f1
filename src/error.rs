//! Unified error type.

use thiserror::Error;

/// The error type returned by turtles' fallible operations.
///
/// Application-level failures (404, 500, etc.) are written to the
/// [`ResponseWriter`](crate::ResponseWriter) as responses, not returned as
/// `Error`s. This type surfaces infrastructure failures and refused
/// capability requests.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{addr}`: {source}")]
    InvalidAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },

    /// The writer in use cannot hand over its connection.
    #[error("hijack is not supported")]
    HijackUnsupported,

    #[error("connection has already been hijacked")]
    AlreadyHijacked,

    /// Returned by [`Request::body`](crate::Request::body) once a
    /// [`BodyLimit`](crate::middleware::BodyLimit) has been exceeded.
    #[error("request body too large: limit is {limit} bytes")]
    BodyTooLarge { limit: u64 },

    /// The request body could not be read, e.g. the client went away.
    #[error("failed to read request body: {0}")]
    Body(#[source] Box<dyn std::error::Error + Send + Sync>),
}
