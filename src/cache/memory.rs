/// In-process report cache
use super::ReportCache;
use crate::{
    error::LookupResult,
    lookup::{AggregatedReport, CacheKey},
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone)]
struct CacheEntry {
    report: AggregatedReport,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Roughly thirty years; stands in for "never" when a TTL overflows the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

fn expiry_after(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// `DashMap`-backed cache; each key's slot is updated atomically
#[derive(Debug, Default)]
pub struct MemoryReportCache {
    entries: DashMap<CacheKey, CacheEntry>,
}

impl MemoryReportCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReportCache for MemoryReportCache {
    async fn get(&self, key: &CacheKey) -> LookupResult<Option<AggregatedReport>> {
        let now = Instant::now();

        if let Some(entry) = self.entries.get(key) {
            if !entry.is_expired(now) {
                debug!("Cache HIT: {}", key);
                return Ok(Some(entry.report.clone()));
            }
        } else {
            debug!("Cache MISS: {}", key);
            return Ok(None);
        }

        // Only drop the entry if it is still the expired one
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        debug!("Cache EXPIRED: {}", key);
        Ok(None)
    }

    async fn put(
        &self,
        key: CacheKey,
        report: AggregatedReport,
        ttl: Duration,
    ) -> LookupResult<()> {
        debug!("Cache SET: {} (TTL: {}s)", key, ttl.as_secs());
        self.entries.insert(
            key,
            CacheEntry {
                report,
                expires_at: expiry_after(Instant::now(), ttl),
            },
        );
        Ok(())
    }

    async fn sweep_expired(&self) -> LookupResult<u64> {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    async fn len(&self) -> LookupResult<u64> {
        Ok(self.entries.len() as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
