/// SQLite-backed report cache
///
/// Survives restarts. Reports are stored as JSON with an absolute expiry
/// in unix milliseconds.
use super::ReportCache;
use crate::{
    error::{LookupError, LookupResult},
    lookup::{AggregatedReport, CacheKey},
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct SqliteReportCache {
    db: SqlitePool,
}

impl SqliteReportCache {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    async fn delete_if_expired(&self, key: &str, now_ms: i64) -> LookupResult<()> {
        sqlx::query("DELETE FROM report_cache WHERE cache_key = ?1 AND expires_at <= ?2")
            .bind(key)
            .bind(now_ms)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ReportCache for SqliteReportCache {
    async fn get(&self, key: &CacheKey) -> LookupResult<Option<AggregatedReport>> {
        let cache_key = key.to_string();
        let now_ms = Utc::now().timestamp_millis();

        let row = sqlx::query(
            r#"
            SELECT report, expires_at
            FROM report_cache
            WHERE cache_key = ?1
            "#,
        )
        .bind(&cache_key)
        .fetch_optional(&self.db)
        .await?;

        let Some(row) = row else {
            debug!("Cache MISS: {}", cache_key);
            return Ok(None);
        };

        let expires_at: i64 = row.try_get("expires_at")?;
        if expires_at <= now_ms {
            debug!("Cache EXPIRED: {}", cache_key);
            self.delete_if_expired(&cache_key, now_ms).await?;
            return Ok(None);
        }

        let json: String = row.try_get("report")?;
        match serde_json::from_str(&json) {
            Ok(report) => {
                debug!("Cache HIT: {}", cache_key);
                Ok(Some(report))
            }
            Err(e) => {
                warn!("Failed to deserialize cached report {}: {}", cache_key, e);
                // Delete corrupted cache entry
                sqlx::query("DELETE FROM report_cache WHERE cache_key = ?1")
                    .bind(&cache_key)
                    .execute(&self.db)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn put(
        &self,
        key: CacheKey,
        report: AggregatedReport,
        ttl: Duration,
    ) -> LookupResult<()> {
        let cache_key = key.to_string();
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        let expires_at = Utc::now().timestamp_millis().saturating_add(ttl_ms);

        let json = serde_json::to_string(&report)
            .map_err(|e| LookupError::Internal(format!("Cache serialization failed: {}", e)))?;

        debug!("Cache SET: {} (TTL: {}s)", cache_key, ttl.as_secs());

        sqlx::query(
            r#"
            INSERT INTO report_cache (cache_key, lookup_type, report, expires_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(cache_key) DO UPDATE SET
                report = excluded.report,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(&cache_key)
        .bind(key.lookup_type.as_str())
        .bind(&json)
        .bind(expires_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn sweep_expired(&self) -> LookupResult<u64> {
        let result = sqlx::query("DELETE FROM report_cache WHERE expires_at <= ?1")
            .bind(Utc::now().timestamp_millis())
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }

    async fn len(&self) -> LookupResult<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM report_cache")
            .fetch_one(&self.db)
            .await?;
        Ok(count as u64)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
