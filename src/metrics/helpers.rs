//! Metrics helper structs for convenient metric recording

use prometheus::{Encoder, TextEncoder};

use super::{
    ACCESSOR_FAILURES_TOTAL, CACHE_LOOKUPS_TOTAL, PUBLISH_ATTEMPTS_TOTAL, RENDERS_TOTAL,
    RENDER_LATENCY, RESOLUTIONS_TOTAL, SECTIONS_SKIPPED_TOTAL, VALIDATIONS_TOTAL,
    VERSIONS_FORKED_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording render metrics
pub struct RenderMetrics;

impl RenderMetrics {
    /// Record a finished render and its latency
    pub fn record_render(mode: &str, seconds: f64) {
        RENDERS_TOTAL.with_label_values(&[mode]).inc();
        RENDER_LATENCY.with_label_values(&[mode]).observe(seconds);
    }

    pub fn record_section_skipped() {
        SECTIONS_SKIPPED_TOTAL.inc();
    }
}

/// Helper struct for recording variable resolution metrics
pub struct ResolverMetrics;

impl ResolverMetrics {
    pub fn record_cache_hit() {
        CACHE_LOOKUPS_TOTAL.with_label_values(&["hit"]).inc();
    }

    pub fn record_cache_miss() {
        CACHE_LOOKUPS_TOTAL.with_label_values(&["miss"]).inc();
    }

    /// Record where a resolved value came from
    pub fn record_resolution(outcome: &str) {
        RESOLUTIONS_TOTAL.with_label_values(&[outcome]).inc();
    }

    /// Record a failed or timed out external lookup
    pub fn record_accessor_failure(source: &str) {
        ACCESSOR_FAILURES_TOTAL.with_label_values(&[source]).inc();
    }
}

/// Helper struct for recording validation and publish metrics
pub struct LifecycleMetrics;

impl LifecycleMetrics {
    pub fn record_validation(valid: bool) {
        let result = if valid { "valid" } else { "invalid" };
        VALIDATIONS_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn record_publish(published: bool) {
        let result = if published { "published" } else { "rejected" };
        PUBLISH_ATTEMPTS_TOTAL.with_label_values(&[result]).inc();
    }

    pub fn record_fork() {
        VERSIONS_FORKED_TOTAL.inc();
    }
}
