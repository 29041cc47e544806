//! Prometheus metrics for the sender.
//!
//! Exposes:
//! - `telegram_sender_messages_total` (counter with status)
//! - `telegram_sender_send_attempts_total` (counter)
//! - `telegram_sender_rate_limit_wait_seconds` (histogram)
//! - `telegram_sender_run_duration_seconds` (histogram)
//! - process metrics via `process` collector

use std::convert::Infallible;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use once_cell::sync::Lazy;
use prometheus::process_collector::ProcessCollector;
use prometheus::{
    default_registry, register_histogram, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, IntCounter, IntCounterVec, TextEncoder,
};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::dispatch::SendOutcome;

static PROCESS_COLLECTOR: Lazy<()> = Lazy::new(|| {
    if let Err(err) = default_registry().register(Box::new(ProcessCollector::for_self())) {
        warn!("Failed to register process collector: {}", err);
    }
});

static MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "telegram_sender_messages_total",
        "Messages processed by terminal status",
        &["status"]
    )
    .expect("failed to register messages counter")
});

static SEND_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "telegram_sender_send_attempts_total",
        "Send attempts, rate-limited ones included"
    )
    .expect("failed to register attempts counter")
});

static RATE_LIMIT_WAIT: Lazy<Histogram> = Lazy::new(|| {
    // Flood waits range from a second to several hours.
    let buckets =
        prometheus::exponential_buckets(1.0, 4.0, 9).expect("failed to create histogram buckets");
    register_histogram!(
        "telegram_sender_rate_limit_wait_seconds",
        "Provider-mandated waits honoured by the dispatch loop",
        buckets
    )
    .expect("failed to register rate limit histogram")
});

static RUN_DURATION: Lazy<Histogram> = Lazy::new(|| {
    let buckets =
        prometheus::exponential_buckets(0.5, 2.0, 14).expect("failed to create histogram buckets");
    register_histogram!(
        "telegram_sender_run_duration_seconds",
        "Duration of a whole interactive run",
        buckets
    )
    .expect("failed to register run duration histogram")
});

/// Ensure collectors are registered.
fn init_collectors() {
    Lazy::force(&PROCESS_COLLECTOR);
    Lazy::force(&MESSAGES_TOTAL);
    Lazy::force(&SEND_ATTEMPTS);
    Lazy::force(&RATE_LIMIT_WAIT);
    Lazy::force(&RUN_DURATION);
}

fn status_label(outcome: SendOutcome) -> &'static str {
    match outcome {
        SendOutcome::Sent => "sent",
        SendOutcome::Failed => "failed",
        SendOutcome::Skipped => "skipped",
    }
}

/// Count a message that reached a terminal outcome.
pub fn record_message(outcome: SendOutcome) {
    MESSAGES_TOTAL
        .with_label_values(&[status_label(outcome)])
        .inc();
}

pub fn record_attempt() {
    SEND_ATTEMPTS.inc();
}

pub fn record_rate_limit_wait(wait: Duration) {
    RATE_LIMIT_WAIT.observe(wait.as_secs_f64());
}

pub fn record_run(duration: Duration) {
    RUN_DURATION.observe(duration.as_secs_f64());
}

async fn metrics_response() -> Result<Response<Full<Bytes>>, Infallible> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", err);
        return Ok(Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Full::from("encode error"))
            .unwrap());
    }

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(hyper::header::CONTENT_TYPE, encoder.format_type())
        .body(Full::from(buffer))
        .unwrap())
}

async fn handle_request(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    match req.uri().path() {
        "/metrics" => metrics_response().await,
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::new()))
            .unwrap()),
    }
}

async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Prometheus metrics endpoint started");

    loop {
        let (stream, peer) = listener.accept().await?;
        let service = service_fn(handle_request);
        let io = TokioIo::new(stream);

        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(?peer, "Metrics connection error: {}", err);
            }
        });
    }
}

/// Spawn the metrics HTTP endpoint on the given address.
pub fn spawn_metrics_server(addr: SocketAddr) {
    init_collectors();
    tokio::spawn(async move {
        if let Err(err) = serve(addr).await {
            error!(%addr, "Metrics server failed: {}", err);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    // Counters are process-global and shared with the dispatch tests, so
    // assertions compare deltas.

    #[test]
    fn records_message_outcomes_by_status() {
        let before = MESSAGES_TOTAL.with_label_values(&["failed"]).get();
        record_message(SendOutcome::Failed);
        assert!(MESSAGES_TOTAL.with_label_values(&["failed"]).get() >= before + 1);
    }

    #[test]
    fn records_attempts() {
        let before = SEND_ATTEMPTS.get();
        record_attempt();
        record_attempt();
        assert!(SEND_ATTEMPTS.get() >= before + 2);
    }

    #[test]
    fn rate_limit_wait_is_observed_in_seconds() {
        let before = RATE_LIMIT_WAIT.get_sample_sum();
        record_rate_limit_wait(Duration::from_secs(31));
        assert!(RATE_LIMIT_WAIT.get_sample_sum() - before >= 31.0);
    }

    #[test]
    fn status_labels_are_stable() {
        assert_eq!(status_label(SendOutcome::Sent), "sent");
        assert_eq!(status_label(SendOutcome::Failed), "failed");
        assert_eq!(status_label(SendOutcome::Skipped), "skipped");
    }

    #[tokio::test]
    async fn metrics_response_contains_registered_metrics() {
        init_collectors();
        record_message(SendOutcome::Sent);
        record_run(Duration::from_secs(3));

        let response = metrics_response().await.expect("metrics response");
        assert_eq!(response.status(), StatusCode::OK);

        let body_bytes = response
            .into_body()
            .collect()
            .await
            .expect("collect metrics body")
            .to_bytes();
        let text = String::from_utf8(body_bytes.to_vec()).expect("utf-8 metrics body");
        assert!(text.contains("telegram_sender_messages_total"));
        assert!(text.contains("telegram_sender_run_duration_seconds"));
    }
}
