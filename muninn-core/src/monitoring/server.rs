//! Health / readiness / metrics HTTP server.
//!
//! - `GET /health`: always 200 `{"status":"ok"}` (liveness)
//! - `GET /ready`: 200/503 from three probes: state, risk not frozen,
//!   exchange reachable
//! - `GET /metrics`: Prometheus exposition when a registry is attached,
//!   501 otherwise

use super::MetricsRegistry;
use anyhow::{Context, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};

type Probe = Arc<dyn Fn() -> bool + Send + Sync>;

/// The three readiness probes the `/ready` endpoint evaluates.
#[derive(Clone)]
pub struct ReadinessProbes {
    state: Probe,
    risk: Probe,
    exchange: Probe,
}

impl ReadinessProbes {
    pub fn new(state: Probe, risk: Probe, exchange: Probe) -> Self {
        Self {
            state,
            risk,
            exchange,
        }
    }

    /// Probes that always pass (for tests and minimal deployments).
    pub fn always_ready() -> Self {
        Self {
            state: Arc::new(|| true),
            risk: Arc::new(|| true),
            exchange: Arc::new(|| true),
        }
    }

    fn evaluate(&self) -> (bool, bool, bool) {
        ((self.state)(), (self.risk)(), (self.exchange)())
    }
}

/// Configuration for the observability server.
#[derive(Debug, Clone)]
pub struct ObsServerConfig {
    pub listen_addr: SocketAddr,
}

impl Default for ObsServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:18993".parse().expect("static addr"),
        }
    }
}

/// Observability HTTP server.
pub struct ObsServer {
    config: ObsServerConfig,
    probes: ReadinessProbes,
    metrics: Option<MetricsRegistry>,
}

impl ObsServer {
    pub fn new(
        config: ObsServerConfig,
        probes: ReadinessProbes,
        metrics: Option<MetricsRegistry>,
    ) -> Self {
        Self {
            config,
            probes,
            metrics,
        }
    }

    /// Serve forever; spawn this on the runtime.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .context("bind observability server")?;
        info!("observability server listening on http://{}", self.config.listen_addr);

        let probes = self.probes.clone();
        let metrics = self.metrics.clone();

        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("accept failed: {e}");
                    continue;
                }
            };

            let probes = probes.clone();
            let metrics = metrics.clone();

            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let probes = probes.clone();
                    let metrics = metrics.clone();
                    async move { handle_request(req, probes, metrics) }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("connection error from {remote_addr}: {err}");
                }
            });
        }
    }
}

fn handle_request(
    req: Request<hyper::body::Incoming>,
    probes: ReadinessProbes,
    metrics: Option<MetricsRegistry>,
) -> std::result::Result<Response<Full<Bytes>>, hyper::Error> {
    let path = req.uri().path();
    let response = match path {
        "/health" => respond(StatusCode::OK, "{\"status\":\"ok\"}"),
        "/ready" => {
            let (state, risk, exchange) = probes.evaluate();
            let ready = state && risk && exchange;
            let body = format!(
                "{{\"exchange\":{exchange},\"ready\":{ready},\"risk\":{risk},\"state\":{state}}}"
            );
            let code = if ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            respond(code, &body)
        }
        "/metrics" => match &metrics {
            Some(registry) => Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(registry.render())))
                .expect("static response"),
            None => respond(StatusCode::NOT_IMPLEMENTED, "metrics not configured"),
        },
        _ => respond(StatusCode::NOT_FOUND, "Not Found"),
    };
    Ok(response)
}

fn respond(code: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(code)
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response")
}
