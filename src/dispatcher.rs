/// Lookup dispatcher
///
/// Runs one lookup end to end: authorize, consult the cache, take rate
/// limit tokens, fan out to every applicable provider under a shared
/// deadline, merge, store.
///
/// Provider calls run as separate tasks. A global semaphore bounds how many
/// are in flight across all lookups; excess calls queue for a permit and
/// the queueing time counts against the lookup's deadline.
use crate::{
    access::{AccessDecision, AccessGuard},
    aggregator,
    cache::ReportCache,
    config::ServerConfig,
    error::{LookupError, LookupResult},
    history::LookupHistory,
    lookup::{AggregatedReport, CacheKey, LookupRequest, ProviderResult},
    metrics,
    providers::{build_registry, ProviderAdapter, ProviderQuery, ProviderRegistry},
    rate_limit::RateLimiter,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

/// Tunables for the fan-out
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Overall bound for one lookup's provider phase
    pub deadline: Duration,
    /// Lifetime of stored reports
    pub cache_ttl: Duration,
    /// Provider calls in flight across all lookups
    pub max_concurrency: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            deadline: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(600),
            max_concurrency: 16,
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            deadline: config.dispatch.request_deadline,
            cache_ttl: config.cache.ttl,
            max_concurrency: config.dispatch.max_concurrency,
        }
    }
}

pub struct Dispatcher {
    guard: AccessGuard,
    registry: ProviderRegistry,
    limiter: RateLimiter,
    cache: Arc<dyn ReportCache>,
    history: Option<LookupHistory>,
    permits: Arc<Semaphore>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        guard: AccessGuard,
        registry: ProviderRegistry,
        limiter: RateLimiter,
        cache: Arc<dyn ReportCache>,
        settings: DispatchSettings,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(settings.max_concurrency.max(1)));

        Self {
            guard,
            registry,
            limiter,
            cache,
            history: None,
            permits,
            settings,
        }
    }

    /// Append every completed lookup to `history`
    pub fn with_history(mut self, history: LookupHistory) -> Self {
        self.history = Some(history);
        self
    }

    /// Build the HTTP providers and their limiter from configuration
    pub fn from_config(config: &ServerConfig, cache: Arc<dyn ReportCache>) -> LookupResult<Self> {
        let (registry, limiter) = build_registry(&config.providers)?;

        Ok(Self::new(
            AccessGuard::from_config(&config.access),
            registry,
            limiter,
            cache,
            DispatchSettings::from_config(config),
        ))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Resolve one lookup into an aggregated report
    ///
    /// Only denial (and nothing a provider does) produces an error.
    pub async fn resolve(&self, request: LookupRequest) -> LookupResult<AggregatedReport> {
        let span = tracing::info_span!(
            "lookup",
            request_id = %Uuid::new_v4(),
            lookup_type = %request.lookup_type(),
            requester = %request.requester_id(),
        );

        self.resolve_inner(request).instrument(span).await
    }

    async fn resolve_inner(&self, request: LookupRequest) -> LookupResult<AggregatedReport> {
        let started = Instant::now();
        let lookup_type = request.lookup_type();

        let owner = match self.guard.authorize(request.requester_id(), &request) {
            AccessDecision::Allow { owner } => owner,
            AccessDecision::Deny { reason } => {
                info!(reason = %reason, "Lookup denied");
                metrics::record_lookup(lookup_type.as_str(), "denied", elapsed_secs(started));
                return Err(LookupError::denied(reason));
            }
        };

        let key = request.cache_key();
        if let Some(report) = self.cached(&key).await {
            debug!("Serving {} from cache", key);
            self.remember(&request, &report, true).await;
            metrics::record_lookup(lookup_type.as_str(), "cached", elapsed_secs(started));
            return Ok(report);
        }

        let deadline = started
            .checked_add(self.settings.deadline)
            .unwrap_or_else(|| started + DispatchSettings::default().deadline);
        let mut results = Vec::new();
        let mut granted = Vec::new();

        for adapter in self.registry.applicable(lookup_type, owner) {
            let query = ProviderQuery::for_request(adapter.id(), &request);

            if !adapter.accepts(&query) {
                debug!(provider = adapter.id(), "Provider does not accept value");
                results.push(ProviderResult::not_supported(adapter.id()));
                continue;
            }

            if !owner && !self.limiter.try_acquire(adapter.id()) {
                metrics::record_rate_limited(adapter.id());
                results.push(ProviderResult::rate_limited(adapter.id()));
                continue;
            }

            granted.push((adapter, query));
        }

        info!(
            providers = granted.len(),
            skipped = results.len(),
            "Dispatching lookup"
        );

        results.extend(self.fan_out(granted, deadline).await);

        for result in &results {
            metrics::record_provider_result(
                result.provider_id(),
                result.status().as_str(),
                result.latency().as_secs_f64(),
            );
        }

        let report = aggregator::merge(&request, results);

        if let Err(e) = self
            .cache
            .put(key, report.clone(), self.settings.cache_ttl)
            .await
        {
            warn!("Failed to store report in {} cache: {}", self.cache.backend_name(), e);
        }

        self.remember(&request, &report, false).await;

        let outcome = if report.is_empty() {
            "empty"
        } else if report.partial {
            "partial"
        } else {
            "complete"
        };
        info!(
            outcome,
            fields = report.fields.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Lookup finished"
        );
        metrics::record_lookup(lookup_type.as_str(), outcome, elapsed_secs(started));

        Ok(report)
    }

    /// Run the granted calls concurrently and collect them as they finish
    async fn fan_out(
        &self,
        granted: Vec<(Arc<dyn ProviderAdapter>, ProviderQuery)>,
        deadline: Instant,
    ) -> Vec<ProviderResult> {
        let mut pending = FuturesUnordered::new();

        for (adapter, query) in granted {
            let provider_id = query.provider_id.clone();
            let permits = Arc::clone(&self.permits);

            let handle = tokio::spawn(
                async move {
                    let queued = Instant::now();
                    let _permit = match permits.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => {
                            return ProviderResult::error(
                                query.provider_id.clone(),
                                queued.elapsed(),
                                "dispatcher is shutting down",
                            )
                        }
                    };
                    let _in_flight = InFlight::enter();
                    adapter.query(&query, deadline).await
                }
                .in_current_span(),
            );

            pending.push(await_call(provider_id, handle, deadline));
        }

        let mut results = Vec::with_capacity(pending.len());
        while let Some(result) = pending.next().await {
            results.push(result);
        }
        results
    }

    /// Cache read; backend failures count as a miss
    async fn cached(&self, key: &CacheKey) -> Option<AggregatedReport> {
        match self.cache.get(key).await {
            Ok(hit) => {
                metrics::record_cache_access(self.cache.backend_name(), hit.is_some());
                hit
            }
            Err(e) => {
                warn!("Cache read failed for {}: {}", key, e);
                None
            }
        }
    }

    async fn remember(&self, request: &LookupRequest, report: &AggregatedReport, cached: bool) {
        if let Some(history) = &self.history {
            if let Err(e) = history.record(request, report, cached).await {
                warn!("Failed to record lookup history: {}", e);
            }
        }
    }
}

/// Wait for one provider task until the deadline; late calls are aborted
async fn await_call(
    provider_id: String,
    mut handle: JoinHandle<ProviderResult>,
    deadline: Instant,
) -> ProviderResult {
    let started = Instant::now();

    match timeout_at(deadline, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
            warn!(provider = %provider_id, "Provider task failed: {}", e);
            ProviderResult::error(provider_id, started.elapsed(), "provider task failed")
        }
        Err(_) => {
            handle.abort();
            debug!(provider = %provider_id, "Provider missed the deadline");
            ProviderResult::timeout(provider_id, started.elapsed())
        }
    }
}

fn elapsed_secs(started: Instant) -> f64 {
    started.elapsed().as_secs_f64()
}

/// Keeps the in-flight gauge accurate even when a call is aborted
struct InFlight;

impl InFlight {
    fn enter() -> Self {
        metrics::PROVIDER_CALLS_IN_FLIGHT.inc();
        InFlight
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        metrics::PROVIDER_CALLS_IN_FLIGHT.dec();
    }
}
