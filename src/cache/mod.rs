/// Report cache
///
/// Maps a normalized `(lookup type, value)` key to the last aggregated
/// report for it. Expiry is checked on read; expired entries behave as
/// absent and are removed opportunistically or by the background sweep.
/// Writes are last-write-wins.
pub mod memory;
pub mod sqlite;

pub use memory::MemoryReportCache;
pub use sqlite::SqliteReportCache;

use crate::{
    error::LookupResult,
    lookup::{AggregatedReport, CacheKey},
};
use async_trait::async_trait;
use std::time::Duration;

/// Storage backend for aggregated reports
#[async_trait]
pub trait ReportCache: Send + Sync {
    /// Live report for `key`, if any
    async fn get(&self, key: &CacheKey) -> LookupResult<Option<AggregatedReport>>;

    /// Store `report` under `key` for `ttl`, replacing any existing entry
    async fn put(&self, key: CacheKey, report: AggregatedReport, ttl: Duration)
        -> LookupResult<()>;

    /// Drop every expired entry, returning how many were removed
    async fn sweep_expired(&self) -> LookupResult<u64>;

    /// Number of stored entries, expired ones included until swept
    async fn len(&self) -> LookupResult<u64>;

    fn backend_name(&self) -> &'static str;
}
