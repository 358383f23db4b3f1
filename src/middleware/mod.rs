//! Built-in middleware.
//!
//! Each type here is a small configuration struct implementing
//! [`Middleware`](crate::Middleware). Compose them with [`wrap`](crate::wrap);
//! the first one listed sees the request first:
//!
//! ```rust
//! use std::time::Duration;
//!
//! use http::StatusCode;
//! use turtles::middleware::{LogRequest, Recover, RequestId, Timeout};
//! use turtles::{wrap, ObserveResponses, StatusHandler};
//!
//! let app = wrap(
//!     StatusHandler(StatusCode::OK),
//!     &[
//!         &ObserveResponses,
//!         &RequestId::default(),
//!         &LogRequest::default(),
//!         &Recover,
//!         &Timeout::new(Duration::from_secs(30)),
//!     ],
//! );
//! ```
//!
//! | Middleware | Does |
//! |---|---|
//! | [`BodyLimit`] | caps the readable request body |
//! | [`CleanPath`] | redirects to the canonical path |
//! | [`Headers`] | adds fixed response headers |
//! | [`LogRequest`] | logs one event per request |
//! | [`Recover`] | turns handler panics into 500s |
//! | [`RemoteIp`] | takes the client IP from proxy headers |
//! | [`RequestId`] | tags requests with a random ID |
//! | [`StripPrefix`] | removes a path prefix |
//! | [`Timeout`] | bounds handler run time |

mod body_limit;
mod clean_path;
mod headers;
mod log_request;
mod recover;
mod remote_ip;
mod request_id;
mod strip_prefix;
mod timeout;

pub use body_limit::BodyLimit;
pub use clean_path::{clean_path, CleanPath, TrailingSlash};
pub use headers::Headers;
pub use log_request::LogRequest;
pub use recover::Recover;
pub use remote_ip::{default_headers as default_remote_ip_headers, RemoteIp};
pub use request_id::{RequestId, X_REQUEST_ID};
pub use strip_prefix::StripPrefix;
pub use timeout::Timeout;
