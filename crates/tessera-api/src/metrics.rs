//! Prometheus metrics
//!
//! Process-wide collectors registered in a dedicated registry and rendered
//! in the text exposition format by the `/metrics` endpoint.
//!
//! Author: hephaex@gmail.com

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::time::Instant;

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    static ref START_TIME: Instant = Instant::now();

    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tessera_http_requests_total", "HTTP requests by endpoint, method and status"),
        &["endpoint", "method", "status"],
    )
    .expect("valid metric definition");

    pub static ref HTTP_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "tessera_http_request_duration_seconds",
            "HTTP request latency by endpoint and method",
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["endpoint", "method"],
    )
    .expect("valid metric definition");

    pub static ref SESSION_OPERATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("tessera_session_operations_total", "Session operations by outcome"),
        &["operation", "outcome"],
    )
    .expect("valid metric definition");

    pub static ref UPTIME_SECONDS: IntGauge =
        IntGauge::new("tessera_uptime_seconds", "Time since server start")
            .expect("valid metric definition");
}

/// Register every collector with [`REGISTRY`]
///
/// Safe to call more than once; repeated registrations are ignored.
pub fn init() {
    lazy_static::initialize(&START_TIME);

    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(SESSION_OPERATIONS_TOTAL.clone()),
        Box::new(UPTIME_SECONDS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = REGISTRY.register(collector) {
            if !matches!(e, prometheus::Error::AlreadyReg) {
                tracing::warn!("Failed to register metric: {e}");
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let process = prometheus::process_collector::ProcessCollector::for_self();
        if let Err(e) = REGISTRY.register(Box::new(process)) {
            if !matches!(e, prometheus::Error::AlreadyReg) {
                tracing::warn!("Failed to register process metrics: {e}");
            }
        }
    }
}

/// Record one HTTP request
pub fn record_request(endpoint: &str, method: &str, status: u16, elapsed_secs: f64) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[endpoint, method, status.as_str()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[endpoint, method])
        .observe(elapsed_secs);
}

/// Record the outcome of a session operation
pub fn record_session_operation(operation: &str, outcome: &str) {
    SESSION_OPERATIONS_TOTAL
        .with_label_values(&[operation, outcome])
        .inc();
}

/// Render all registered metrics in the Prometheus text format
pub fn render() -> Result<String, prometheus::Error> {
    UPTIME_SECONDS.set(START_TIME.elapsed().as_secs() as i64);

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&REGISTRY.gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
