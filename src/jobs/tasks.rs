/// Background task implementations
use crate::{context::AppContext, db, error::LookupResult, metrics};

/// Drop expired report cache entries
pub async fn sweep_report_cache(ctx: &AppContext) -> LookupResult<u64> {
    let removed = ctx.cache.sweep_expired().await?;

    // Keep the size gauge in step with the sweep
    let remaining = ctx.cache.len().await?;
    metrics::CACHE_SIZE.set(remaining as i64);

    Ok(removed)
}

/// Delete lookup history older than the retention window
pub async fn prune_lookup_history(ctx: &AppContext) -> LookupResult<u64> {
    ctx.history
        .prune_older_than(ctx.config.history.retention_days)
        .await
}

/// Health check - verify the database is reachable
pub async fn health_check(ctx: &AppContext) -> LookupResult<()> {
    db::test_connection(&ctx.db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        access::AccessGuard,
        cache::{MemoryReportCache, ReportCache},
        config::ServerConfig,
        dispatcher::{DispatchSettings, Dispatcher},
        lookup::{AggregatedReport, CacheKey, LookupType},
        providers::ProviderRegistry,
        rate_limit::RateLimiter,
    };
    use chrono::Utc;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Arc;
    use std::time::Duration;

    async fn create_test_context() -> AppContext {
        let vars: HashMap<String, String> = [("BOT_TOKEN", "123:abc"), ("OWNER_ID", "42")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = ServerConfig::from_map(&vars).unwrap();
        let cache: Arc<dyn ReportCache> = Arc::new(MemoryReportCache::new());
        let dispatcher = Dispatcher::new(
            AccessGuard::new("42", Vec::<LookupType>::new()),
            ProviderRegistry::default(),
            RateLimiter::default(),
            Arc::clone(&cache),
            DispatchSettings::default(),
        );

        AppContext::from_parts(config, db::memory_pool().await.unwrap(), cache, dispatcher)
    }

    fn empty_report(key: &CacheKey) -> AggregatedReport {
        AggregatedReport {
            request_key: key.clone(),
            fields: BTreeMap::new(),
            providers: BTreeMap::new(),
            partial: true,
            generated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_sweep_report_cache() {
        let ctx = create_test_context().await;
        let stale = CacheKey::new(LookupType::Ip, "1.1.1.1");
        let fresh = CacheKey::new(LookupType::Ip, "8.8.8.8");

        ctx.cache
            .put(stale.clone(), empty_report(&stale), Duration::ZERO)
            .await
            .unwrap();
        ctx.cache
            .put(fresh.clone(), empty_report(&fresh), Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(sweep_report_cache(&ctx).await.unwrap(), 1);
        assert_eq!(ctx.cache.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prune_and_health_check() {
        let ctx = create_test_context().await;
        assert_eq!(prune_lookup_history(&ctx).await.unwrap(), 0);
        health_check(&ctx).await.unwrap();
    }
}
