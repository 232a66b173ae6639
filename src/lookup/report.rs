/// Provider results and aggregated reports
use super::CacheKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

/// Outcome of one provider invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderStatus {
    Ok,
    Timeout,
    RateLimited,
    Error,
    NotSupported,
}

impl ProviderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderStatus::Ok => "ok",
            ProviderStatus::Timeout => "timeout",
            ProviderStatus::RateLimited => "rate_limited",
            ProviderStatus::Error => "error",
            ProviderStatus::NotSupported => "not_supported",
        }
    }
}

impl fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of querying one provider
///
/// Confidence is clamped to `[0, 1]` on construction and only `Ok`
/// results carry fields.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderResult {
    provider_id: String,
    status: ProviderStatus,
    fields: BTreeMap<String, String>,
    confidence: f64,
    latency: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ProviderResult {
    /// Successful response
    pub fn ok(
        provider_id: impl Into<String>,
        fields: BTreeMap<String, String>,
        confidence: f64,
        latency: Duration,
    ) -> Self {
        Self {
            provider_id: provider_id.into(),
            status: ProviderStatus::Ok,
            fields,
            confidence: clamp_confidence(confidence),
            latency,
            error: None,
        }
    }

    /// Any non-ok outcome; never carries fields
    pub fn failed(
        provider_id: impl Into<String>,
        status: ProviderStatus,
        latency: Duration,
        error: Option<String>,
    ) -> Self {
        debug_assert!(status != ProviderStatus::Ok);
        Self {
            provider_id: provider_id.into(),
            status,
            fields: BTreeMap::new(),
            confidence: 0.0,
            latency,
            error,
        }
    }

    pub fn error(provider_id: impl Into<String>, latency: Duration, message: impl Into<String>) -> Self {
        Self::failed(provider_id, ProviderStatus::Error, latency, Some(message.into()))
    }

    pub fn timeout(provider_id: impl Into<String>, latency: Duration) -> Self {
        Self::failed(provider_id, ProviderStatus::Timeout, latency, None)
    }

    pub fn rate_limited(provider_id: impl Into<String>) -> Self {
        Self::failed(provider_id, ProviderStatus::RateLimited, Duration::ZERO, None)
    }

    pub fn not_supported(provider_id: impl Into<String>) -> Self {
        Self::failed(provider_id, ProviderStatus::NotSupported, Duration::ZERO, None)
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub fn status(&self) -> ProviderStatus {
        self.status
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_ok(&self) -> bool {
        self.status == ProviderStatus::Ok
    }
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 1.0)
    }
}

/// One distinct value reported for a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub value: String,
    pub sources: BTreeSet<String>,
    pub confidence: f64,
}

/// Merged field: canonical value plus lower-ranked alternatives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub value: String,
    pub sources: BTreeSet<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<Candidate>,
}

/// Merged report returned to callers and stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub request_key: CacheKey,
    pub fields: BTreeMap<String, FieldValue>,
    /// Final status of every provider that took part
    pub providers: BTreeMap<String, ProviderStatus>,
    pub partial: bool,
    pub generated_at: DateTime<Utc>,
}

impl AggregatedReport {
    /// True when no provider contributed any field
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }
}
