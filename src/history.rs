/// Lookup history
///
/// Audit log of completed lookups, used for usage statistics and for
/// showing a requester their recent lookups.
use crate::{
    error::LookupResult,
    lookup::{AggregatedReport, LookupRequest},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

/// Longest summary kept per row
const MAX_SUMMARY_CHARS: usize = 200;

/// Upper bound for `recent_for`
pub const MAX_RECENT: i64 = 100;

/// One stored lookup
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LookupRecord {
    pub id: i64,
    pub requester_id: String,
    pub lookup_type: String,
    pub input_value: String,
    pub field_count: i64,
    pub partial: bool,
    pub cached: bool,
    pub summary: String,
    pub looked_up_at: DateTime<Utc>,
}

/// Number of lookups of one type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct TypeCount {
    pub lookup_type: String,
    pub count: i64,
}

#[derive(Clone)]
pub struct LookupHistory {
    db: SqlitePool,
}

impl LookupHistory {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Append a finished lookup
    pub async fn record(
        &self,
        request: &LookupRequest,
        report: &AggregatedReport,
        cached: bool,
    ) -> LookupResult<i64> {
        self.insert(request, report, cached, Utc::now()).await
    }

    async fn insert(
        &self,
        request: &LookupRequest,
        report: &AggregatedReport,
        cached: bool,
        looked_up_at: DateTime<Utc>,
    ) -> LookupResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO lookup_history
                (requester_id, lookup_type, input_value, field_count, partial, cached, summary, looked_up_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(request.requester_id())
        .bind(request.lookup_type().as_str())
        .bind(request.value())
        .bind(report.fields.len() as i64)
        .bind(report.partial)
        .bind(cached)
        .bind(summarize(report))
        .bind(looked_up_at)
        .execute(&self.db)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Lookup counts per type, most used first
    pub async fn stats_by_type(&self) -> LookupResult<Vec<TypeCount>> {
        let rows = sqlx::query_as::<_, TypeCount>(
            r#"
            SELECT lookup_type, COUNT(*) AS count
            FROM lookup_history
            GROUP BY lookup_type
            ORDER BY count DESC, lookup_type ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    pub async fn total(&self) -> LookupResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lookup_history")
            .fetch_one(&self.db)
            .await?;
        Ok(count)
    }

    /// Most recent lookups of one requester, newest first
    pub async fn recent_for(&self, requester_id: &str, limit: i64) -> LookupResult<Vec<LookupRecord>> {
        let limit = limit.clamp(1, MAX_RECENT);

        let rows = sqlx::query_as::<_, LookupRecord>(
            r#"
            SELECT id, requester_id, lookup_type, input_value, field_count,
                   partial, cached, summary, looked_up_at
            FROM lookup_history
            WHERE requester_id = ?1
            ORDER BY id DESC
            LIMIT ?2
            "#,
        )
        .bind(requester_id)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows)
    }

    /// Delete rows older than `days`; returns the number removed
    pub async fn prune_older_than(&self, days: i64) -> LookupResult<u64> {
        // A window reaching past the calendar's start leaves nothing to prune
        let Some(cutoff) = Duration::try_days(days.max(0))
            .and_then(|window| Utc::now().checked_sub_signed(window))
        else {
            return Ok(0);
        };

        let result = sqlx::query("DELETE FROM lookup_history WHERE looked_up_at < ?1")
            .bind(cutoff)
            .execute(&self.db)
            .await?;

        Ok(result.rows_affected())
    }
}

/// Short `field=value` digest of the canonical values
fn summarize(report: &AggregatedReport) -> String {
    let joined = report
        .fields
        .iter()
        .map(|(name, field)| format!("{}={}", name, field.value))
        .collect::<Vec<_>>()
        .join("; ");

    if joined.chars().count() <= MAX_SUMMARY_CHARS {
        joined
    } else {
        let mut truncated: String = joined.chars().take(MAX_SUMMARY_CHARS).collect();
        truncated.push_str("...");
        truncated
    }
}
