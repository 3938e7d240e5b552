//! Prometheus metrics for the gateway.
//!
//! - Hub registry metrics (active, registered, removed)
//! - Authentication rejections
//! - Hub error funnel by kind
//! - Downstream publish throughput and failures

mod helpers;

pub use helpers::{encode_metrics, HubMetrics, PublishMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "gateway";

lazy_static! {
    // ============================================================================
    // Hub Metrics
    // ============================================================================

    /// Connections currently in the hub registry. Written only by the hub loop.
    pub static ref CONNECTIONS_ACTIVE: IntGauge = register_int_gauge!(
        format!("{}_connections_active", METRIC_PREFIX),
        "Number of connections in the hub registry"
    ).unwrap();

    /// Add events applied by the hub
    pub static ref CONNECTIONS_REGISTERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_registered_total", METRIC_PREFIX),
        "Total Add events applied to the registry"
    ).unwrap();

    /// Remove events that deleted an entry
    pub static ref CONNECTIONS_REMOVED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_connections_removed_total", METRIC_PREFIX),
        "Total Remove events that deleted a registry entry"
    ).unwrap();

    /// Errors received on the hub error channel
    pub static ref HUB_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_hub_errors_total", METRIC_PREFIX),
        "Total errors funneled to the hub",
        &["kind"]
    ).unwrap();

    /// Lifetime of registered connections
    pub static ref CONNECTION_DURATION: Histogram = register_histogram!(
        format!("{}_connection_duration_seconds", METRIC_PREFIX),
        "Duration of registered connections in seconds",
        vec![1.0, 10.0, 60.0, 300.0, 900.0, 3600.0, 14400.0, 86400.0]
    ).unwrap();

    // ============================================================================
    // Authentication Metrics
    // ============================================================================

    /// Connections rejected by the authenticator
    pub static ref AUTH_REJECTIONS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_auth_rejections_total", METRIC_PREFIX),
        "Total connections rejected before registration"
    ).unwrap();

    // ============================================================================
    // Publisher Metrics
    // ============================================================================

    /// Payloads accepted by the downstream publisher
    pub static ref MESSAGES_PUBLISHED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_messages_published_total", METRIC_PREFIX),
        "Total payloads handed to the downstream publisher"
    ).unwrap();

    /// Payloads the downstream publisher failed to accept
    pub static ref PUBLISH_FAILURES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_publish_failures_total", METRIC_PREFIX),
        "Total payloads the downstream publisher rejected"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        // lazy_static requires first access
        CONNECTIONS_REGISTERED_TOTAL.inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("gateway_connections_registered_total"));
    }

    #[test]
    fn test_hub_error_labels() {
        HUB_ERRORS_TOTAL.with_label_values(&["authentication"]).inc();
        HUB_ERRORS_TOTAL.with_label_values(&["upstream"]).inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("kind=\"authentication\""));
    }
}
