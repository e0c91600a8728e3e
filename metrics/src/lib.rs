//! Prometheus-style metrics surface, built on the `metrics` +
//! `metrics-exporter-prometheus` crate pair.

pub mod route;

pub use route::normalize_route;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

/// The process can only ever install one global recorder; every
/// `FaceMetrics::install()` call (including the several independent test
/// binaries in this workspace that each construct their own coordinator/
/// batch engine) shares the same handle rather than racing to re-install it.
static RECORDER: OnceLock<PrometheusHandle> = OnceLock::new();

/// Thin wrapper around a `PrometheusHandle`, constructed once at startup
/// and passed by reference to every component that emits
/// metrics, rather than recorded through an ambient global.
#[derive(Clone)]
pub struct FaceMetrics {
    handle: PrometheusHandle,
}

impl FaceMetrics {
    pub fn install() -> Self {
        let handle = RECORDER
            .get_or_init(|| {
                PrometheusBuilder::new()
                    .install_recorder()
                    .expect("failed to install prometheus recorder")
            })
            .clone();
        Self { handle }
    }

    /// `GET /metrics` exposition.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    #[tracing::instrument(skip(self))]
    pub fn record_recognition(&self, status: &str, mode: &str, duration: Duration) {
        metrics::counter!("recognition_total", "status" => status.to_string(), "mode" => mode.to_string())
            .increment(1);
        metrics::histogram!("recognition_duration_seconds", "status" => status.to_string(), "mode" => mode.to_string())
            .record(duration.as_secs_f64());
    }

    #[tracing::instrument(skip(self))]
    pub fn record_registration(&self, status: &str, duration: Duration) {
        metrics::counter!("registration_total", "status" => status.to_string()).increment(1);
        metrics::histogram!("registration_duration_seconds", "status" => status.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn inc_cache_hit(&self) {
        metrics::counter!("cache_hits_total").increment(1);
    }

    pub fn inc_cache_miss(&self) {
        metrics::counter!("cache_misses_total").increment(1);
    }

    pub fn record_batch_job(&self, status: &str) {
        metrics::counter!("batch_jobs_total", "status" => status.to_string()).increment(1);
    }

    pub fn record_batch_images(&self, status: &str, count: u64) {
        metrics::counter!("batch_images_total", "status" => status.to_string()).increment(count);
    }

    pub fn record_hnsw_search(&self, duration: Duration) {
        metrics::histogram!("hnsw_search_duration_seconds").record(duration.as_secs_f64());
    }

    pub fn record_db_query(&self, operation: &str, duration: Duration) {
        metrics::histogram!("db_query_duration_seconds", "operation" => operation.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_http_request(&self, method: &str, route: &str, status_code: u16, duration: Duration) {
        let route = normalize_route(route);
        metrics::counter!(
            "http_requests_total",
            "method" => method.to_string(),
            "route" => route.clone(),
            "status_code" => status_code.to_string(),
        )
        .increment(1);
        metrics::histogram!(
            "http_request_duration_seconds",
            "method" => method.to_string(),
            "route" => route,
            "status_code" => status_code.to_string(),
        )
        .record(duration.as_secs_f64());
    }

    pub fn set_hnsw_index_size(&self, size: u64) {
        metrics::gauge!("hnsw_index_size").set(size as f64);
    }

    pub fn set_active_users(&self, count: u64) {
        metrics::gauge!("active_users").set(count as f64);
    }

    pub fn set_gpu_memory(&self, used_bytes: u64, total_bytes: u64) {
        metrics::gauge!("gpu_memory_used_bytes").set(used_bytes as f64);
        metrics::gauge!("gpu_memory_total_bytes").set(total_bytes as f64);
    }

    pub fn set_tensorflow_gpu_active(&self, active: bool) {
        metrics::gauge!("tensorflow_gpu_active").set(if active { 1.0 } else { 0.0 });
    }
}
