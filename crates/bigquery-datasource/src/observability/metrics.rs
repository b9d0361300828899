//! Prometheus metrics for the session caches

use std::sync::OnceLock;

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::Result;
use crate::error::Error;

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

const METRIC_INFO: &str = "bigquery_datasource_info";
const METRIC_CACHE_HITS: &str = "bigquery_datasource_cache_hits_total";
const METRIC_CACHE_MISSES: &str = "bigquery_datasource_cache_misses_total";
const METRIC_CACHE_SIZE: &str = "bigquery_datasource_cache_entries";
const METRIC_CLIENTS_CREATED: &str = "bigquery_datasource_clients_created_total";
const METRIC_RESOURCE_MANAGERS_CREATED: &str =
    "bigquery_datasource_resource_managers_created_total";

/// Initialize Prometheus metrics recorder.
pub fn init_metrics() -> Result<()> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| Error::Config(format!("Failed to install metrics recorder: {e}")))?;

    PROMETHEUS_HANDLE.set(handle).ok();

    register_metrics();
    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

fn register_metrics() {
    describe_gauge!(METRIC_INFO, "Build information (always 1)");
    describe_counter!(METRIC_CACHE_HITS, "Session cache hits by cache");
    describe_counter!(METRIC_CACHE_MISSES, "Session cache misses by cache");
    describe_gauge!(METRIC_CACHE_SIZE, "Entries held by each session cache");
    describe_counter!(
        METRIC_CLIENTS_CREATED,
        "Remote BigQuery clients constructed (full handshakes)"
    );
    describe_counter!(
        METRIC_RESOURCE_MANAGERS_CREATED,
        "Resource manager services constructed"
    );

    gauge!(METRIC_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Render metrics in Prometheus text format.
#[must_use]
pub fn render_metrics() -> String {
    PROMETHEUS_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .unwrap_or_default()
}

pub fn record_cache_hit(cache: &'static str) {
    counter!(METRIC_CACHE_HITS, "cache" => cache).increment(1);
}

pub fn record_cache_miss(cache: &'static str) {
    counter!(METRIC_CACHE_MISSES, "cache" => cache).increment(1);
}

#[allow(clippy::cast_precision_loss)]
pub fn set_cache_size(cache: &'static str, entries: usize) {
    gauge!(METRIC_CACHE_SIZE, "cache" => cache).set(entries as f64);
}

pub fn record_client_created() {
    counter!(METRIC_CLIENTS_CREATED).increment(1);
}

pub fn record_resource_manager_created() {
    counter!(METRIC_RESOURCE_MANAGERS_CREATED).increment(1);
}
