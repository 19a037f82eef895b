//! Read-only HTTP query surface.
//!
//! Routes:
//!
//! | Path                     | Body                                   |
//! |--------------------------|----------------------------------------|
//! | `/api/data`              | gateway, nodes and mesh stats          |
//! | `/api/nodes`             | node records keyed by id               |
//! | `/api/topology`          | node list, parent edges, history count |
//! | `/api/topology/history`  | snapshots and recent packet events     |
//! | `/health`                | liveness probe                         |
//!
//! ## Example
//!
//! ```rust,no_run
//! use meshwatch_core::Aggregator;
//! use meshwatch_core::http::QueryServer;
//!
//! #[tokio::main]
//! async fn main() -> std::io::Result<()> {
//!     let aggregator = Aggregator::builder().build().unwrap();
//!     let server = QueryServer::bind("0.0.0.0:3000", aggregator).await?;
//!     server.serve().await
//! }
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, ALLOW, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::{TcpListener, ToSocketAddrs};

use crate::Aggregator;

/// Pause after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// HTTP server answering state queries from an [`Aggregator`].
///
/// Binding and serving are separate steps so a bad listen address fails
/// before anything else starts.
#[derive(Debug)]
pub struct QueryServer {
    listener: TcpListener,
    aggregator: Aggregator,
}

impl QueryServer {
    pub async fn bind(addr: impl ToSocketAddrs, aggregator: Aggregator) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            aggregator,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections indefinitely. Accept errors are logged and retried.
    pub async fn serve(self) -> std::io::Result<()> {
        let addr = self.listener.local_addr()?;
        tracing::info!(%addr, "query server listening");

        loop {
            let (stream, peer) = accept_with_backoff(|| self.listener.accept()).await;
            let io = TokioIo::new(stream);
            let aggregator = self.aggregator.clone();

            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let aggregator = aggregator.clone();
                    async move { Ok::<_, Infallible>(route(&aggregator, req.method(), req.uri().path())) }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    tracing::debug!(%peer, error = %e, "query connection error");
                }
            });
        }
    }

    /// Serve on a background task.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.serve().await {
                tracing::error!(error = %e, "query server stopped");
            }
        })
    }
}

/// Retry `accept` until it yields a connection.
async fn accept_with_backoff<F, Fut, T>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(conn) => return conn,
            Err(e) => {
                tracing::warn!(error = %e, "query accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Answer one request.
pub fn route(aggregator: &Aggregator, method: &Method, path: &str) -> Response<Full<Bytes>> {
    if method != Method::GET {
        let mut response = text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
        response
            .headers_mut()
            .insert(ALLOW, HeaderValue::from_static("GET"));
        return response;
    }

    match path.trim_end_matches('/') {
        "/api/data" => json(&aggregator.state()),
        "/api/nodes" => json(&aggregator.nodes()),
        "/api/topology" => json(&aggregator.topology()),
        "/api/topology/history" => json(&aggregator.history()),
        "/health" | "/healthz" => json(&Health {
            status: "ok",
            nodes: aggregator.nodes().nodes.len(),
            subscribers: aggregator.subscriber_count(),
            revision: aggregator.revision(),
        }),
        _ => text(StatusCode::NOT_FOUND, "Not Found"),
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    nodes: usize,
    subscribers: usize,
    revision: u64,
}

fn json<T: Serialize>(body: &T) -> Response<Full<Bytes>> {
    match serde_json::to_vec(body) {
        Ok(bytes) => respond(StatusCode::OK, "application/json", Bytes::from(bytes)),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode response");
            text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
        }
    }
}

fn text(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    respond(status, "text/plain", Bytes::from_static(body.as_bytes()))
}

fn respond(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}
