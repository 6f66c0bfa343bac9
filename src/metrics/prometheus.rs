//! Prometheus metrics definitions and HTTP server

use std::net::SocketAddr;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::header::HeaderValue;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use prometheus::{
    register_counter, register_counter_vec, register_gauge, register_histogram, Counter,
    CounterVec, Encoder, Gauge, Histogram, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info};

lazy_static::lazy_static! {
    /// Total number of queue items handled by workers
    pub static ref QUEUE_ITEMS_PROCESSED: Counter = register_counter!(
        "ark_backup_deletion_queue_items_processed_total",
        "Total number of queue items handled by workers"
    ).unwrap();

    /// Total number of queue items that failed and were requeued
    pub static ref QUEUE_ITEMS_REQUEUED: Counter = register_counter!(
        "ark_backup_deletion_queue_items_requeued_total",
        "Total number of queue items requeued with backoff"
    ).unwrap();

    /// Keys waiting in the work queue
    pub static ref QUEUE_DEPTH: Gauge = register_gauge!(
        "ark_backup_deletion_queue_depth",
        "Number of keys waiting in the work queue"
    ).unwrap();

    /// Request processing duration histogram
    pub static ref PROCESS_DURATION: Histogram = register_histogram!(
        "ark_backup_deletion_process_duration_seconds",
        "Duration of DeleteBackupRequest processing in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]
    ).unwrap();

    /// Requests driven to Processed, by outcome
    pub static ref REQUESTS_PROCESSED: CounterVec = register_counter_vec!(
        "ark_backup_deletion_requests_processed_total",
        "Total number of DeleteBackupRequests processed by outcome",
        &["outcome"]
    ).unwrap();

    /// Best-effort cleanup failures, by step
    pub static ref CLEANUP_FAILURES: CounterVec = register_counter_vec!(
        "ark_backup_deletion_cleanup_failures_total",
        "Total number of failed cleanup steps",
        &["step"]
    ).unwrap();

    /// Volume snapshots deleted
    pub static ref SNAPSHOTS_DELETED: Counter = register_counter!(
        "ark_backup_deletion_snapshots_deleted_total",
        "Total number of volume snapshots deleted"
    ).unwrap();

    /// Processed requests removed by the expiry sweeper
    pub static ref EXPIRED_REQUESTS_DELETED: CounterVec = register_counter_vec!(
        "ark_backup_deletion_expired_requests_deleted_total",
        "Total number of expired DeleteBackupRequests deleted by outcome",
        &["outcome"]
    ).unwrap();

    /// Controller health (1 = healthy, 0 = unhealthy)
    pub static ref CONTROLLER_HEALTH: Gauge = register_gauge!(
        "ark_backup_deletion_controller_health",
        "Controller health status (1 = healthy, 0 = unhealthy)"
    ).unwrap();
}

/// Start the metrics HTTP server
pub async fn serve(port: u16) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    CONTROLLER_HEALTH.set(1.0);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_request))
                .await
            {
                error!("Error serving connection: {}", e);
            }
        });
    }
}

/// Handle HTTP requests
async fn handle_request(
    req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let response = match req.uri().path() {
        "/metrics" => metrics_response(),
        "/healthz" | "/health" => health_response(),
        "/readyz" | "/ready" => text_response(StatusCode::OK, "ok"),
        _ => text_response(StatusCode::NOT_FOUND, "Not Found"),
    };

    Ok(response)
}

/// Generate metrics response
fn metrics_response() -> Response<Full<Bytes>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return text_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics");
    }

    let mut response = Response::new(Full::new(Bytes::from(buffer)));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        HeaderValue::from_static(prometheus::TEXT_FORMAT),
    );
    response
}

/// Health check response, reflecting [`CONTROLLER_HEALTH`]
fn health_response() -> Response<Full<Bytes>> {
    if CONTROLLER_HEALTH.get() >= 1.0 {
        text_response(StatusCode::OK, "ok")
    } else {
        text_response(StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

fn text_response(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
}
