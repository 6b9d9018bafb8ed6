//! Prometheus metrics for application observability.
//!
//! Metrics are exposed via a dedicated HTTP listener when `METRICS_PORT` is set.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `walk_archive_gate_rejections_total` - Requests stopped by the prevalidation gate (label: reason)
//! - `walk_archive_auth_outcomes_total` - Token verification outcomes (label: outcome)
//! - `walk_archive_addresses_banned_total` - Addresses added to the ban list
//! - `walk_archive_points_redacted_total` - Coordinates withheld by privacy zones
//! - `walk_archive_upstream_requests_total` - Outbound calls (labels: service, status)
//! - `walk_archive_throttled_requests_total` - API requests answered with 429
//!
//! ## Histograms
//! - `walk_archive_request_duration_seconds` - Request duration (labels: route, method, status)
//!
//! ## Gauges
//! - `walk_archive_banned_addresses` - Size of the in-memory ban list
//!
//! # Usage
//!
//! ```rust,ignore
//! use walk_archive::metrics::{init_metrics, record_request_duration};
//!
//! init_metrics(addr)?;
//! record_request_duration("/api/routes", "GET", "200", 0.012);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const GATE_REJECTIONS_TOTAL: &str = "walk_archive_gate_rejections_total";
    pub const AUTH_OUTCOMES_TOTAL: &str = "walk_archive_auth_outcomes_total";
    pub const ADDRESSES_BANNED_TOTAL: &str = "walk_archive_addresses_banned_total";
    pub const POINTS_REDACTED_TOTAL: &str = "walk_archive_points_redacted_total";
    pub const UPSTREAM_REQUESTS_TOTAL: &str = "walk_archive_upstream_requests_total";
    pub const THROTTLED_REQUESTS_TOTAL: &str = "walk_archive_throttled_requests_total";
    pub const REQUEST_DURATION_SECONDS: &str = "walk_archive_request_duration_seconds";
    pub const BANNED_ADDRESSES: &str = "walk_archive_banned_addresses";
}

/// Initialize the Prometheus metrics exporter.
///
/// # Errors
///
/// Returns a message if the exporter cannot be installed (e.g. port in use).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(
        names::GATE_REJECTIONS_TOTAL,
        "Requests rejected by the prevalidation gate"
    );
    describe_counter!(
        names::AUTH_OUTCOMES_TOTAL,
        "Bearer token verification outcomes"
    );
    describe_counter!(
        names::ADDRESSES_BANNED_TOTAL,
        "Client addresses added to the ban list"
    );
    describe_counter!(
        names::POINTS_REDACTED_TOTAL,
        "Coordinates withheld from unauthenticated callers"
    );
    describe_counter!(
        names::UPSTREAM_REQUESTS_TOTAL,
        "Outbound requests to upstream services"
    );
    describe_counter!(
        names::THROTTLED_REQUESTS_TOTAL,
        "API requests refused for exceeding the per-address budget"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        names::BANNED_ADDRESSES,
        "Addresses currently held in the in-memory ban list"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

pub fn record_gate_rejection(reason: &'static str) {
    counter!(names::GATE_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

pub fn record_auth_outcome(outcome: &'static str) {
    counter!(names::AUTH_OUTCOMES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_address_banned(total_banned: usize) {
    counter!(names::ADDRESSES_BANNED_TOTAL).increment(1);
    gauge!(names::BANNED_ADDRESSES).set(total_banned as f64);
}

pub fn record_throttled() {
    counter!(names::THROTTLED_REQUESTS_TOTAL).increment(1);
}

pub fn set_banned_addresses(total_banned: usize) {
    gauge!(names::BANNED_ADDRESSES).set(total_banned as f64);
}

pub fn record_points_redacted(count: usize) {
    if count > 0 {
        counter!(names::POINTS_REDACTED_TOTAL).increment(count as u64);
    }
}

pub fn record_upstream_request(service: &'static str, status: &str) {
    counter!(names::UPSTREAM_REQUESTS_TOTAL, "service" => service, "status" => status.to_string())
        .increment(1);
}

/// Record HTTP request duration.
pub fn record_request_duration(route: &str, method: &str, status: &str, duration_secs: f64) {
    histogram!(names::REQUEST_DURATION_SECONDS, "route" => route.to_string(), "method" => method.to_string(), "status" => status.to_string())
        .record(duration_secs);
}
