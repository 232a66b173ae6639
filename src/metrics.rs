/// Metrics and telemetry
///
/// Prometheus-compatible metrics for monitoring:
/// - Lookups by type and outcome
/// - Provider calls, statuses and latencies
/// - Cache hit/miss rates
/// - Rate limit refusals
/// - Background job execution
use lazy_static::lazy_static;
use prometheus::{
    register_gauge, register_histogram_vec, register_int_counter_vec, register_int_gauge, Encoder,
    Gauge, HistogramVec, IntCounterVec, IntGauge, TextEncoder,
};
use tracing::error;

lazy_static! {
    // ========== Lookup Metrics ==========

    /// Lookups by type and outcome (complete, partial, empty, cached, denied)
    pub static ref LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "lookups_total",
        "Total number of lookups",
        &["lookup_type", "outcome"]
    )
    .unwrap();

    /// End-to-end lookup duration in seconds
    pub static ref LOOKUP_DURATION_SECONDS: HistogramVec = register_histogram_vec!(
        "lookup_duration_seconds",
        "Lookup latencies in seconds",
        &["lookup_type"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    // ========== Provider Metrics ==========

    /// Provider calls by provider and final status
    pub static ref PROVIDER_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "provider_calls_total",
        "Total number of provider results",
        &["provider", "status"]
    )
    .unwrap();

    /// Provider call duration in seconds
    pub static ref PROVIDER_LATENCY_SECONDS: HistogramVec = register_histogram_vec!(
        "provider_latency_seconds",
        "Provider call latencies in seconds",
        &["provider"],
        vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    )
    .unwrap();

    /// Provider calls currently in flight
    pub static ref PROVIDER_CALLS_IN_FLIGHT: IntGauge = register_int_gauge!(
        "provider_calls_in_flight",
        "Number of provider calls currently running"
    )
    .unwrap();

    /// Tokens refused by the per-provider limiter
    pub static ref RATE_LIMITED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rate_limited_total",
        "Total number of provider calls skipped by rate limiting",
        &["provider"]
    )
    .unwrap();

    // ========== Cache Metrics ==========

    /// Cache hits by backend
    pub static ref CACHE_HITS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_hits_total",
        "Total number of cache hits",
        &["cache_type"]
    )
    .unwrap();

    /// Cache misses by backend
    pub static ref CACHE_MISSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        "cache_misses_total",
        "Total number of cache misses",
        &["cache_type"]
    )
    .unwrap();

    /// Cache size (number of entries)
    pub static ref CACHE_SIZE: IntGauge = register_int_gauge!(
        "cache_size",
        "Number of entries in cache"
    )
    .unwrap();

    // ========== Background Job Metrics ==========

    /// Background job executions by job type and status
    pub static ref BACKGROUND_JOBS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "background_jobs_total",
        "Total number of background job executions",
        &["job_type", "status"]
    )
    .unwrap();

    // ========== System Metrics ==========

    /// Application uptime in seconds
    pub static ref UPTIME_SECONDS: Gauge = register_gauge!(
        "uptime_seconds",
        "Application uptime in seconds"
    )
    .unwrap();
}

/// Render metrics in Prometheus text format
pub fn render_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Record a finished lookup
pub fn record_lookup(lookup_type: &str, outcome: &str, duration: f64) {
    LOOKUPS_TOTAL
        .with_label_values(&[lookup_type, outcome])
        .inc();
    LOOKUP_DURATION_SECONDS
        .with_label_values(&[lookup_type])
        .observe(duration);
}

/// Record one provider result
pub fn record_provider_result(provider: &str, status: &str, latency: f64) {
    PROVIDER_CALLS_TOTAL
        .with_label_values(&[provider, status])
        .inc();
    if status != "rate_limited" && status != "not_supported" {
        PROVIDER_LATENCY_SECONDS
            .with_label_values(&[provider])
            .observe(latency);
    }
}

/// Record a refused rate limit token
pub fn record_rate_limited(provider: &str) {
    RATE_LIMITED_TOTAL.with_label_values(&[provider]).inc();
}

/// Record a cache access
pub fn record_cache_access(cache_type: &str, hit: bool) {
    if hit {
        CACHE_HITS_TOTAL.with_label_values(&[cache_type]).inc();
    } else {
        CACHE_MISSES_TOTAL.with_label_values(&[cache_type]).inc();
    }
}

/// Record a background job execution
pub fn record_background_job(job_type: &str, status: &str) {
    BACKGROUND_JOBS_TOTAL
        .with_label_values(&[job_type, status])
        .inc();
}
