use axum::{routing::get, Router};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::attributes::ProviderId;

#[derive(Clone)]
pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder once per process. Later calls return the
    /// same handle, so tests can build several routers.
    pub fn init() -> anyhow::Result<Self> {
        static HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();
        let handle = HANDLE
            .get_or_try_init(|| PrometheusBuilder::new().install_recorder())?
            .clone();
        ensure_metrics_described();
        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// One-time metrics registration (so series show up on /metrics).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "analyze_requests_total",
            "Analyze requests by response status."
        );
        describe_counter!(
            "provider_calls_total",
            "Provider invocations by provider and outcome."
        );
        describe_histogram!(
            "provider_latency_ms",
            "Provider call latency in milliseconds."
        );
        describe_counter!(
            "images_rejected_total",
            "URL sets rejected by the size/reachability check."
        );
        describe_counter!(
            "images_acquired_total",
            "Images downloaded and re-encoded successfully."
        );
        describe_counter!(
            "persistence_errors_total",
            "Analysis results that failed to store."
        );
    });
}

pub(crate) fn record_request(status: u16) {
    counter!("analyze_requests_total", "status" => status.to_string()).increment(1);
}

pub(crate) fn record_provider_success(provider: ProviderId, elapsed_ms: f64) {
    counter!("provider_calls_total", "provider" => provider.as_str(), "outcome" => "ok")
        .increment(1);
    histogram!("provider_latency_ms", "provider" => provider.as_str()).record(elapsed_ms);
}

pub(crate) fn record_provider_failure(provider: ProviderId) {
    counter!("provider_calls_total", "provider" => provider.as_str(), "outcome" => "error")
        .increment(1);
}
