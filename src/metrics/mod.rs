//! Prometheus metrics for the clinical template service.
//!
//! - Render metrics (renders by mode, latency, sections skipped)
//! - Variable resolution metrics (outcome by source, cache hits/misses)
//! - External accessor failures by source
//! - Validation and publish outcomes

mod helpers;

pub use helpers::{encode_metrics, LifecycleMetrics, RenderMetrics, ResolverMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, HistogramVec,
    IntCounter, IntCounterVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "ctpl";

lazy_static! {
    // ============================================================================
    // Render Metrics
    // ============================================================================

    /// Total renders by mode (published / preview)
    pub static ref RENDERS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_renders_total", METRIC_PREFIX),
        "Total template renders",
        &["mode"]
    ).unwrap();

    /// Render latency by mode
    pub static ref RENDER_LATENCY: HistogramVec = register_histogram_vec!(
        format!("{}_render_latency_seconds", METRIC_PREFIX),
        "Template render latency in seconds",
        &["mode"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    /// Sections omitted because their display condition was not met
    pub static ref SECTIONS_SKIPPED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_sections_skipped_total", METRIC_PREFIX),
        "Total sections omitted by display conditions"
    ).unwrap();

    // ============================================================================
    // Variable Resolution Metrics
    // ============================================================================

    /// Variable resolutions by where the value came from
    pub static ref RESOLUTIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_variable_resolutions_total", METRIC_PREFIX),
        "Total variable resolutions by outcome",
        &["outcome"]
    ).unwrap();

    /// Variable cache lookups (hit / miss)
    pub static ref CACHE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_variable_cache_lookups_total", METRIC_PREFIX),
        "Total variable cache lookups",
        &["result"]
    ).unwrap();

    /// External accessor failures (timeouts included) by source
    pub static ref ACCESSOR_FAILURES_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_accessor_failures_total", METRIC_PREFIX),
        "Total external source failures",
        &["source"]
    ).unwrap();

    // ============================================================================
    // Lifecycle Metrics
    // ============================================================================

    /// Validation runs by result (valid / invalid)
    pub static ref VALIDATIONS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_validations_total", METRIC_PREFIX),
        "Total template validations",
        &["result"]
    ).unwrap();

    /// Publish attempts by result (published / rejected)
    pub static ref PUBLISH_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_publish_attempts_total", METRIC_PREFIX),
        "Total publish attempts",
        &["result"]
    ).unwrap();

    /// Draft versions forked from published templates
    pub static ref VERSIONS_FORKED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_versions_forked_total", METRIC_PREFIX),
        "Total draft versions forked from published templates"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_metrics() {
        // lazy_static requires first access
        RENDERS_TOTAL.with_label_values(&["preview"]).inc();

        let output = encode_metrics().unwrap();
        assert!(output.contains("ctpl_renders_total"));
    }

    #[test]
    fn test_helpers() {
        RenderMetrics::record_render("published", 0.01);
        RenderMetrics::record_section_skipped();
        ResolverMetrics::record_cache_hit();
        ResolverMetrics::record_cache_miss();
        ResolverMetrics::record_resolution("context");
        ResolverMetrics::record_accessor_failure("api");
        LifecycleMetrics::record_validation(true);
        LifecycleMetrics::record_publish(false);
        LifecycleMetrics::record_fork();

        assert!(CACHE_LOOKUPS_TOTAL.with_label_values(&["hit"]).get() >= 1);
        assert!(VERSIONS_FORKED_TOTAL.get() >= 1);
    }
}
