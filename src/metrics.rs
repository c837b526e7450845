//! Scrape metrics.
//!
//! Counters are recorded through the `metrics` facade; they are no-ops until
//! `init_metrics` installs the Prometheus recorder.

use crate::types::SchoolOutcome;
use std::net::SocketAddr;
use tracing::{info, warn};

pub const SCHOOLS_TOTAL: &str = "vocational_schools_total";
pub const ROWS_ACCEPTED_TOTAL: &str = "vocational_rows_accepted_total";
pub const ROWS_SKIPPED_TOTAL: &str = "vocational_rows_skipped_total";
pub const ROW_INSERT_ERRORS_TOTAL: &str = "vocational_row_insert_errors_total";
pub const DETAIL_FETCH_SECONDS: &str = "vocational_detail_fetch_duration_seconds";
pub const DETAIL_PAYLOAD_BYTES: &str = "vocational_detail_payload_bytes";

pub struct ScrapeMetrics;

impl ScrapeMetrics {
    pub fn record_school(outcome: &SchoolOutcome) {
        ::metrics::counter!(SCHOOLS_TOTAL, "outcome" => outcome.label()).increment(1);
    }

    pub fn record_rows_accepted(count: usize) {
        ::metrics::counter!(ROWS_ACCEPTED_TOTAL).increment(count as u64);
    }

    /// One dropped row; `reason` is a fixed label such as `shape_mismatch`.
    pub fn record_row_skipped(reason: &'static str) {
        ::metrics::counter!(ROWS_SKIPPED_TOTAL, "reason" => reason).increment(1);
    }

    pub fn record_row_insert_error() {
        ::metrics::counter!(ROW_INSERT_ERRORS_TOTAL).increment(1);
    }

    pub fn record_detail_fetch(duration_secs: f64, payload_bytes: usize) {
        ::metrics::histogram!(DETAIL_FETCH_SECONDS).record(duration_secs);
        ::metrics::histogram!(DETAIL_PAYLOAD_BYTES).record(payload_bytes as f64);
    }
}

/// Installs a Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: &str) {
    let addr: SocketAddr = match addr.parse() {
        Ok(a) => a,
        Err(e) => {
            warn!("Invalid metrics address '{}': {}; metrics disabled", addr, e);
            return;
        }
    };
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => info!("Prometheus exporter listening on http://{}/metrics", addr),
        Err(e) => warn!("Prometheus exporter install failed: {}", e),
    }
}
