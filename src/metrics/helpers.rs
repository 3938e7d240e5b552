//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    AUTH_REJECTIONS_TOTAL, CONNECTIONS_ACTIVE, CONNECTIONS_REGISTERED_TOTAL,
    CONNECTIONS_REMOVED_TOTAL, CONNECTION_DURATION, HUB_ERRORS_TOTAL, MESSAGES_PUBLISHED_TOTAL,
    PUBLISH_FAILURES_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording hub metrics
pub struct HubMetrics;

impl HubMetrics {
    pub fn record_registered(registry_size: usize) {
        CONNECTIONS_REGISTERED_TOTAL.inc();
        CONNECTIONS_ACTIVE.set(registry_size as i64);
    }

    pub fn record_removed(registry_size: usize) {
        CONNECTIONS_REMOVED_TOTAL.inc();
        CONNECTIONS_ACTIVE.set(registry_size as i64);
    }

    pub fn record_error(kind: &str) {
        HUB_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }

    pub fn record_auth_rejection() {
        AUTH_REJECTIONS_TOTAL.inc();
    }

    pub fn record_connection_duration(seconds: f64) {
        CONNECTION_DURATION.observe(seconds);
    }
}

/// Helper struct for recording publisher metrics
pub struct PublishMetrics;

impl PublishMetrics {
    pub fn record_published() {
        MESSAGES_PUBLISHED_TOTAL.inc();
    }

    pub fn record_failed() {
        PUBLISH_FAILURES_TOTAL.inc();
    }

    pub fn record_published_batch(count: usize) {
        MESSAGES_PUBLISHED_TOTAL.inc_by(count as u64);
    }

    pub fn record_failed_batch(count: usize) {
        PUBLISH_FAILURES_TOTAL.inc_by(count as u64);
    }
}
