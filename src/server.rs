//! HTTP server and graceful shutdown.
//!
//! # Graceful shutdown and Kubernetes
//!
//! When Kubernetes terminates a pod it sends **SIGTERM** and waits
//! `terminationGracePeriodSeconds` (default 30 s) before sending SIGKILL.
//!
//! The server reacts by:
//! 1. Stopping `listener.accept()` at once, so no new connections are made.
//! 2. Letting every in-flight connection task run to completion.
//! 3. Returning from [`Server::serve`], which lets `main` exit cleanly.
//!
//! # How a response reaches the client
//!
//! Each request runs its handler chain on its own tokio task, writing into
//! a transport writer. Nothing is sent until the handler flushes, writes
//! more than a few KiB, or returns; at that point the status line and
//! headers go out and body bytes are streamed as they are flushed.
//!
//! A client that stops reading does not make the server buffer the whole
//! response: once a bounded amount is queued, `write_body` returns
//! [`io::ErrorKind::WouldBlock`] and accepts nothing more until the client
//! catches up.
//!
//! The request body is not read up front. [`Request::body`] reads it on
//! first use, stopping at the limit set by
//! [`BodyLimit`](crate::middleware::BodyLimit).
//!
//! The transport writer supports every optional capability:
//! [`Flusher`], [`Hijacker`] (via hyper's upgrade mechanism) and
//! [`CloseNotifier`] (fires when hyper drops the response, i.e. when the
//! client goes away or the exchange is over).

use std::convert::Infallible;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body::Frame;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::response::{CloseNotifier, CloseNotify, Flusher, Hijacker, ResponseWriter};

/// Buffered body bytes are sent once they reach this size.
const FLUSH_THRESHOLD: usize = 4096;

/// Chunks queued for hyper per response before writes start to buffer.
const CHUNK_QUEUE: usize = 16;

/// Most body bytes a response buffers while hyper's queue is full.
const HIGH_WATER: usize = 64 * 1024;

enum Bind {
    Addr(SocketAddr),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called.
    ///
    /// ```rust
    /// use turtles::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr = addr
            .parse()
            .map_err(|source| Error::InvalidAddr { addr: addr.to_owned(), source })?;
        Ok(Self { bind: Bind::Addr(addr) })
    }

    /// Serves on an already bound listener.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener) }
    }

    /// Starts accepting connections and running `handler` for each request.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight connections completing).
    pub async fn serve(self, handler: impl Handler) -> Result<(), Error> {
        self.serve_with_shutdown(handler, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), but stops accepting when `signal`
    /// resolves instead of on SIGTERM / Ctrl-C.
    pub async fn serve_with_shutdown(
        self,
        handler: impl Handler,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr).await?,
            Bind::Listener(listener) => listener,
        };

        // One Arc shared by every connection task; each request clones it.
        let handler: BoxedHandler = std::sync::Arc::new(handler);

        info!(addr = %listener.local_addr()?, "turtles listening");

        // JoinSet tracks every spawned connection task so we can wait for
        // them all to finish during graceful shutdown.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal immediately stops
                // accepting new connections, even if more are queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let handler = BoxedHandler::clone(&handler);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            dispatch(BoxedHandler::clone(&handler), req, remote_addr)
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection_with_upgrades(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet does not grow
                // without bound on long-running servers.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("turtles stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Runs `handler` for one request and returns as soon as the response head
/// is known; the body keeps streaming from the handler task.
///
/// The request body is left unread: handlers pull it through
/// [`Request::body`], which honours any body limit while reading.
///
/// The error type is [`Infallible`]: failures become 500 responses.
async fn dispatch(
    handler: BoxedHandler,
    mut req: hyper::Request<Incoming>,
    peer: SocketAddr,
) -> Result<hyper::Response<ResponseBody>, Infallible> {
    let upgrade = hyper::upgrade::on(&mut req);
    let mut request = Request::from_incoming(req).with_peer_addr(peer);

    let (head_tx, head_rx) = oneshot::channel();
    let (chunk_tx, chunk_rx) = mpsc::channel(CHUNK_QUEUE);
    // Dropped together with the response body (or with this future, if the
    // client leaves before the head is ready); that is the close signal.
    let (closed_tx, closed_rx) = watch::channel(());

    let mut transport = Transport {
        headers: HeaderMap::new(),
        status: None,
        head: Some(head_tx),
        chunks: chunk_tx,
        buf: BytesMut::new(),
        closed: closed_rx,
        upgrade: Some(upgrade),
    };

    tokio::spawn(async move {
        handler.serve(&mut transport, &mut request).await;
        transport.finish().await;
    });

    match head_rx.await {
        Ok(head) => Ok(hyper::Response::from_parts(
            head,
            ResponseBody { chunks: Some(chunk_rx), _closed: Some(closed_tx) },
        )),
        Err(_) => {
            error!(peer = %peer, "handler exited without a response");
            Ok(bare(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

fn bare(status: StatusCode) -> hyper::Response<ResponseBody> {
    let mut res = hyper::Response::new(ResponseBody { chunks: None, _closed: None });
    *res.status_mut() = status;
    res
}

// ── Transport writer ──────────────────────────────────────────────────────────

/// The [`ResponseWriter`] handed to the outermost handler for each request.
///
/// Memory per response is bounded: at most [`CHUNK_QUEUE`] chunks wait for
/// hyper, and at most [`HIGH_WATER`] bytes wait in `buf` behind them. Once
/// both are full, `write_body` fails with [`io::ErrorKind::WouldBlock`]
/// until the client reads more; the handler may retry after awaiting.
struct Transport {
    headers: HeaderMap,
    status: Option<StatusCode>,
    head: Option<oneshot::Sender<http::response::Parts>>,
    chunks: mpsc::Sender<Bytes>,
    buf: BytesMut,
    closed: watch::Receiver<()>,
    upgrade: Option<OnUpgrade>,
}

impl Transport {
    fn send_head(&mut self) {
        let Some(tx) = self.head.take() else { return };
        let (mut parts, ()) = http::Response::new(()).into_parts();
        parts.status = *self.status.get_or_insert(StatusCode::OK);
        parts.headers = self.headers.clone();
        // A dropped receiver means the client is gone; writes will notice.
        let _ = tx.send(parts);
    }

    /// Hands `buf` to hyper if the queue has room. A full queue is not an
    /// error: the bytes stay buffered.
    fn send_buffered(&mut self) -> io::Result<()> {
        self.send_head();
        if self.buf.is_empty() {
            return Ok(());
        }
        match self.chunks.try_reserve() {
            Ok(permit) => {
                permit.send(self.buf.split().freeze());
                Ok(())
            }
            Err(TrySendError::Full(())) => Ok(()),
            Err(TrySendError::Closed(())) => Err(disconnected()),
        }
    }

    /// Sends whatever is still buffered, waiting for queue space.
    async fn finish(mut self) {
        self.send_head();
        if self.buf.is_empty() {
            return;
        }
        let chunk = self.buf.split().freeze();
        if self.chunks.send(chunk).await.is_err() {
            debug!("response not delivered: {}", disconnected());
        }
    }
}

fn disconnected() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "client disconnected")
}

fn body_allowed(status: StatusCode) -> bool {
    !(status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED)
}

impl ResponseWriter for Transport {
    fn headers(&self) -> &HeaderMap { &self.headers }
    fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    fn set_status(&mut self, status: StatusCode) {
        if let Some(sent) = self.status {
            warn!(%status, %sent, "superfluous set_status call");
            return;
        }
        self.status = Some(status);
    }

    fn write_body(&mut self, buf: &[u8]) -> io::Result<usize> {
        let status = *self.status.get_or_insert(StatusCode::OK);
        if buf.is_empty() {
            return Ok(0);
        }
        if !body_allowed(status) {
            return Err(io::Error::other(format!("status {status} does not allow a body")));
        }
        if self.chunks.is_closed() {
            return Err(disconnected());
        }
        if self.buf.len() >= HIGH_WATER {
            self.send_buffered()?;
        }
        let room = HIGH_WATER.saturating_sub(self.buf.len());
        if room == 0 {
            return Err(io::Error::new(io::ErrorKind::WouldBlock, "client is not reading"));
        }
        let n = buf.len().min(room);
        self.buf.extend_from_slice(&buf[..n]);
        if self.buf.len() >= FLUSH_THRESHOLD {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flusher(&mut self) -> Option<&mut dyn Flusher> { Some(self) }
    fn hijacker(&mut self) -> Option<&mut dyn Hijacker> { Some(self) }
    fn close_notifier(&mut self) -> Option<&mut dyn CloseNotifier> { Some(self) }
}

impl Flusher for Transport {
    /// Best effort: if hyper's queue is full the bytes stay buffered and go
    /// out with a later write, flush or the end of the handler.
    fn flush(&mut self) {
        if let Err(e) = self.send_buffered() {
            debug!("flush failed: {e}");
        }
    }
}

impl Hijacker for Transport {
    fn hijack(&mut self) -> Result<OnUpgrade, Error> {
        self.upgrade.take().ok_or(Error::AlreadyHijacked)
    }
}

impl CloseNotifier for Transport {
    fn close_notify(&mut self) -> CloseNotify {
        CloseNotify::new(self.closed.clone())
    }
}

// ── Response body ─────────────────────────────────────────────────────────────

/// Streams the chunks a [`Transport`] sends, ending when it is dropped.
struct ResponseBody {
    chunks: Option<mpsc::Receiver<Bytes>>,
    _closed: Option<watch::Sender<()>>,
}

impl http_body::Body for ResponseBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        match self.chunks.as_mut() {
            Some(rx) => rx.poll_recv(cx).map(|chunk| chunk.map(|b| Ok(Frame::data(b)))),
            None => Poll::Ready(None),
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first shutdown signal the process receives.
///
/// On Unix this listens for both **SIGTERM** and **SIGINT** (Ctrl-C).
/// On Windows only Ctrl-C is available. If a handler cannot be installed,
/// that signal is logged and ignored.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    // `pending()` never resolves, so on non-Unix platforms the SIGTERM arm is
    // effectively disabled.
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
