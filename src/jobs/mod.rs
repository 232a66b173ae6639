use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{error, info};

use crate::metrics;

pub mod tasks;

/// History pruning cadence
const HISTORY_PRUNE_INTERVAL: Duration = Duration::from_secs(6 * 3600);

/// Database health check cadence
const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(300);

/// Job scheduler for background tasks
pub struct JobScheduler {
    context: Arc<crate::context::AppContext>,
}

impl JobScheduler {
    pub fn new(context: Arc<crate::context::AppContext>) -> Self {
        Self { context }
    }

    /// Start all background jobs
    pub fn start(self: Arc<Self>) {
        info!("Starting background job scheduler");

        // Spawn cleanup tasks
        tokio::spawn(Self::cache_sweep_job(Arc::clone(&self)));
        if self.context.config.history.enabled {
            tokio::spawn(Self::history_prune_job(Arc::clone(&self)));
        }

        // Spawn monitoring tasks
        tokio::spawn(Self::health_check_job(Arc::clone(&self)));

        info!("Background jobs started");
    }

    /// Remove expired cache entries (runs every CACHE_SWEEP_INTERVAL_SECS)
    async fn cache_sweep_job(scheduler: Arc<Self>) {
        let period = scheduler.context.config.cache.sweep_interval.max(Duration::from_secs(1));
        let mut interval = interval(period);

        loop {
            interval.tick().await;

            match tasks::sweep_report_cache(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("cache_sweep", "success");
                    if count > 0 {
                        info!("Swept {} expired cache entries", count);
                    }
                }
                Err(e) => {
                    metrics::record_background_job("cache_sweep", "failure");
                    error!("Failed to sweep report cache: {}", e);
                }
            }
        }
    }

    /// Prune old lookup history (runs every 6 hours)
    async fn history_prune_job(scheduler: Arc<Self>) {
        let mut interval = interval(HISTORY_PRUNE_INTERVAL);

        loop {
            interval.tick().await;
            info!("Running lookup history pruning");

            match tasks::prune_lookup_history(&scheduler.context).await {
                Ok(count) => {
                    metrics::record_background_job("history_prune", "success");
                    if count > 0 {
                        info!("Pruned {} lookup history rows", count);
                    } else {
                        info!("History pruning: nothing older than retention");
                    }
                }
                Err(e) => {
                    metrics::record_background_job("history_prune", "failure");
                    error!("Failed to prune lookup history: {}", e);
                }
            }
        }
    }

    /// Health check job (runs every 5 minutes)
    async fn health_check_job(scheduler: Arc<Self>) {
        let mut interval = interval(HEALTH_CHECK_INTERVAL);

        loop {
            interval.tick().await;

            match tasks::health_check(&scheduler.context).await {
                Ok(_) => {
                    metrics::UPTIME_SECONDS
                        .set(scheduler.context.started_at.elapsed().as_secs_f64());
                }
                Err(e) => error!("Health check failed: {}", e),
            }
        }
    }
}
