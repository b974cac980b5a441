//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed node metrics, and an async HTTP
//! exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    Method, Request, Response, StatusCode, body::Incoming, header, server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Gossip- and chain-related Prometheus metrics.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Frames decoded off peer connections.
    pub frames_received: IntCounter,
    /// Transactions admitted into the mempool (local or gossiped).
    pub transactions_accepted: IntCounter,
    /// Transactions dropped by validation.
    pub transactions_rejected: IntCounter,
    /// Blocks appended to the local chain.
    pub blocks_appended: IntCounter,
    /// Blocks dropped by validation.
    pub blocks_rejected: IntCounter,
    /// Peers currently known through discovery.
    pub peers_known: IntGauge,
    /// Time spent mining a block, in seconds.
    pub mine_seconds: Histogram,
}

impl NodeMetrics {
    /// Registers node metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let frames_received = IntCounter::with_opts(Opts::new(
            "node_frames_received",
            "Total frames decoded off peer connections",
        ))?;
        registry.register(Box::new(frames_received.clone()))?;

        let transactions_accepted = IntCounter::with_opts(Opts::new(
            "node_transactions_accepted",
            "Total transactions admitted into the mempool",
        ))?;
        registry.register(Box::new(transactions_accepted.clone()))?;

        let transactions_rejected = IntCounter::with_opts(Opts::new(
            "node_transactions_rejected",
            "Total transactions dropped by validation",
        ))?;
        registry.register(Box::new(transactions_rejected.clone()))?;

        let blocks_appended = IntCounter::with_opts(Opts::new(
            "node_blocks_appended",
            "Total blocks appended to the local chain",
        ))?;
        registry.register(Box::new(blocks_appended.clone()))?;

        let blocks_rejected = IntCounter::with_opts(Opts::new(
            "node_blocks_rejected",
            "Total blocks dropped by validation",
        ))?;
        registry.register(Box::new(blocks_rejected.clone()))?;

        let peers_known = IntGauge::with_opts(Opts::new(
            "node_peers_known",
            "Peers currently known through discovery",
        ))?;
        registry.register(Box::new(peers_known.clone()))?;

        let mine_seconds = Histogram::with_opts(
            HistogramOpts::new("node_mine_seconds", "Time spent mining one block in seconds")
                .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        )?;
        registry.register(Box::new(mine_seconds.clone()))?;

        Ok(Self {
            frames_received,
            transactions_accepted,
            transactions_rejected,
            blocks_appended,
            blocks_rejected,
            peers_known,
            mine_seconds,
        })
    }
}

/// Wrapper around a Prometheus registry and the node metrics.
///
/// This is the main handle you pass around in the node. It can be
/// wrapped in an [`Arc`] and shared across tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub node: NodeMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying `Registry`
    /// and registers the node metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("messenger".to_string()), None)?;
        let node = NodeMetrics::register(&registry)?;
        Ok(Self { registry, node })
    }

    /// Encodes all metrics in this registry into the Prometheus text
    /// format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::error!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404. This
/// function is intended to be spawned onto the runtime.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                tracing::error!("metrics HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let response = if req.method() == Method::GET && req.uri().path() == "/metrics" {
        text_response(StatusCode::OK, metrics.gather_text())
    } else {
        text_response(StatusCode::NOT_FOUND, "not found".to_string())
    };
    Ok(response)
}

fn text_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
        .body(Full::new(Bytes::from(body)))
        .expect("static response headers are valid")
}
