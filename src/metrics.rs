//! Per-stage pipeline metrics.
//!
//! Counters and histograms go through the `metrics` facade. A Prometheus
//! exporter is installed only when `MKE_METRICS_ADDR` is set; otherwise the
//! calls are no-ops.

use std::net::SocketAddr;
use std::sync::Once;
use tracing::{info, warn};

static INIT: Once = Once::new();

pub const METRICS_ADDR_ENV: &str = "MKE_METRICS_ADDR";

/// Install the Prometheus exporter if `MKE_METRICS_ADDR` is configured. Idempotent.
pub fn init_metrics() {
    INIT.call_once(|| {
        let addr_str = match std::env::var(METRICS_ADDR_ENV) {
            Ok(v) if !v.trim().is_empty() => v,
            _ => return,
        };
        let addr: SocketAddr = match addr_str.trim().parse() {
            Ok(addr) => addr,
            Err(e) => {
                warn!("Invalid {} '{}': {}", METRICS_ADDR_ENV, addr_str, e);
                return;
            }
        };
        let builder =
            metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
        match builder.install() {
            Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
            Err(e) => warn!("Prometheus exporter install failed: {}", e),
        }
    });
}

pub struct FetchMetrics;

impl FetchMetrics {
    pub fn page_fetched(records: usize, duration_secs: f64) {
        ::metrics::counter!("mke_fetch_pages_total").increment(1);
        ::metrics::counter!("mke_fetch_records_total").increment(records as u64);
        ::metrics::histogram!("mke_fetch_page_duration_seconds").record(duration_secs);
    }

    pub fn page_failed() {
        ::metrics::counter!("mke_fetch_page_failures_total").increment(1);
    }
}

pub struct MergeMetrics;

impl MergeMetrics {
    pub fn merged(input_records: usize, unique_cases: usize) {
        ::metrics::counter!("mke_merge_input_records_total").increment(input_records as u64);
        ::metrics::gauge!("mke_merge_unique_cases").set(unique_cases as f64);
    }
}

pub struct GeocodeMetrics;

impl GeocodeMetrics {
    pub fn matched(score: f64) {
        ::metrics::counter!("mke_geocode_matches_total").increment(1);
        ::metrics::histogram!("mke_geocode_score").record(score);
    }

    pub fn no_match() {
        ::metrics::counter!("mke_geocode_no_match_total").increment(1);
    }

    pub fn skipped_blank() {
        ::metrics::counter!("mke_geocode_blank_address_total").increment(1);
    }

    pub fn failed() {
        ::metrics::counter!("mke_geocode_errors_total").increment(1);
    }

    pub fn lookup_duration(duration_secs: f64) {
        ::metrics::histogram!("mke_geocode_lookup_duration_seconds").record(duration_secs);
    }
}

pub struct ExportMetrics;

impl ExportMetrics {
    pub fn exported(rows: usize, duplicates: usize, unparsed_dates: usize) {
        ::metrics::counter!("mke_export_rows_total").increment(rows as u64);
        ::metrics::counter!("mke_export_duplicate_rows_total").increment(duplicates as u64);
        ::metrics::counter!("mke_export_unparsed_dates_total").increment(unparsed_dates as u64);
    }
}

/// Record how long a stage took end to end.
pub fn stage_duration(stage: &'static str, duration_secs: f64) {
    ::metrics::histogram!("mke_stage_duration_seconds", "stage" => stage).record(duration_secs);
}
