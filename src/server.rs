//! HTTP server and graceful shutdown.
//!
//! # Request lifecycle
//!
//! ```text
//! accept ─▶ hyper (HTTP/1.1 or HTTP/2) ─▶ dispatch
//!   dispatch: route lookup ─▶ capture body (read deadline)
//!             ─▶ handler / chain (write deadline) ─▶ gzip negotiation ─▶ hyper
//! ```
//!
//! Failures the server detects itself (no route, unreadable body, missed
//! deadline) are answered the same way a chain answers: an
//! [`Accumulator`] with one error string and a matching status.
//!
//! # Graceful shutdown
//!
//! On SIGTERM or Ctrl-C the server stops accepting, lets every in-flight
//! connection run to completion, then returns from [`Server::serve`].

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::StatusCode;
use http::header::ACCEPT_ENCODING;
use http_body_util::Full;
use hyper::body::{Body, Incoming};
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::accumulator::Accumulator;
use crate::body::RawBody;
use crate::compression::{self, Encoding};
use crate::config::Config;
use crate::error::Error;
use crate::handler::BoxedHandler;
use crate::request::{Request, host_of};
use crate::response::{IntoResponse, Response};
use crate::router::Router;

/// The HTTP server.
pub struct Server {
    config: Config,
}

/// Everything a connection task needs, shared read-only across all of them.
struct Shared {
    router: Router,
    config: Config,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// A server with default settings listening on `addr`.
    ///
    /// ```rust
    /// use baton::Server;
    /// let server = Server::bind("0.0.0.0:3000").unwrap();
    /// assert!(Server::bind("not an address").is_err());
    /// ```
    pub fn bind(addr: &str) -> Result<Self, Error> {
        let addr: SocketAddr = addr.parse()?;
        Ok(Self::new(Config { addr, ..Config::default() }))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serves `router` until SIGTERM or Ctrl-C, then drains in-flight
    /// connections.
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Self::serve), but stops when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let listener = TcpListener::bind(self.config.addr).await?;
        self.serve_listener(listener, router, signal).await
    }

    /// Serves on an already-bound listener. The configured `addr` is ignored.
    pub async fn serve_listener(
        self,
        listener: TcpListener,
        router: Router,
        signal: impl Future<Output = ()>,
    ) -> Result<(), Error> {
        let shared = Arc::new(Shared { router, config: self.config });

        info!(addr = %listener.local_addr()?, "baton listening");

        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting immediately,
                // even if more connections are queued.
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

                    let shared = Arc::clone(&shared);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let shared = Arc::clone(&shared);
                            async move { dispatch(shared, req, remote_addr).await }
                        });

                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            debug!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks so the JoinSet stays small.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("baton stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response. Never fails: every problem
/// becomes a response.
async fn dispatch(
    shared: Arc<Shared>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
) -> Result<http::Response<Full<Bytes>>, Infallible> {
    let started = Instant::now();
    let (parts, body) = req.into_parts();

    let method = parts.method.clone();
    let path = parts.uri.path().to_owned();
    let encoding = Encoding::negotiate(
        parts.headers.get(ACCEPT_ENCODING).and_then(|v| v.to_str().ok()),
    );
    let route = shared
        .router
        .lookup(&parts.method, host_of(&parts.uri, &parts.headers), &path);

    let response = match route {
        None => failure(StatusCode::NOT_FOUND, "404 page not found"),
        Some((handler, params)) => {
            match capture(body, shared.config.read_timeout(), remote_addr).await {
                Ok(raw) => {
                    let request = Request::new(parts, raw, params);
                    run_handler(handler, request, shared.config.write_timeout()).await
                }
                Err(response) => response,
            }
        }
    };

    let response = compression::encode(response, encoding, &shared.config.compression);

    info!(
        %method,
        %path,
        status = response.status_code().as_u16(),
        elapsed_us = started.elapsed().as_micros() as u64,
        "request",
    );

    Ok(response.into_inner())
}

async fn capture<B>(
    body: B,
    deadline: Option<Duration>,
    remote_addr: SocketAddr,
) -> Result<RawBody, Response>
where
    B: Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let read = RawBody::capture(body);
    let result = match deadline {
        Some(limit) => match tokio::time::timeout(limit, read).await {
            Ok(result) => result,
            Err(_) => {
                warn!(peer = %remote_addr, "request body not received within {limit:?}");
                return Err(failure(StatusCode::REQUEST_TIMEOUT, "request body timed out"));
            }
        },
        None => read.await,
    };

    result.map_err(|e| {
        warn!(peer = %remote_addr, "request body read failed: {e}");
        failure(StatusCode::BAD_REQUEST, e.to_string())
    })
}

async fn run_handler(handler: BoxedHandler, request: Request, deadline: Option<Duration>) -> Response {
    let fut = handler.call(request);
    match deadline {
        Some(limit) => tokio::time::timeout(limit, fut).await.unwrap_or_else(|_| {
            warn!("handler did not finish within {limit:?}");
            failure(StatusCode::SERVICE_UNAVAILABLE, "handler timed out")
        }),
        None => fut.await,
    }
}

fn failure(status: StatusCode, msg: impl Into<String>) -> Response {
    let mut acc = Accumulator::new();
    acc.add_error(msg);
    acc.set_status(status);
    acc.into_response()
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM (Unix) or Ctrl-C the process receives.
///
/// If a handler cannot be installed the corresponding arm never resolves;
/// the other one still works.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c   => {}
        () = sigterm  => {}
    }
}
