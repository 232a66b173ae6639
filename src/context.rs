/// Application context and dependency injection
use crate::{
    cache::{MemoryReportCache, ReportCache, SqliteReportCache},
    config::{CacheBackend, ServerConfig},
    db,
    dispatcher::Dispatcher,
    error::LookupResult,
    history::LookupHistory,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Instant;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub cache: Arc<dyn ReportCache>,
    pub history: LookupHistory,
    pub dispatcher: Arc<Dispatcher>,
    pub started_at: Instant,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> LookupResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize database
        let db = db::create_pool(&config.storage.database_path, db::DatabaseOptions::default())
            .await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        Self::with_pool(config, db)
    }

    /// Wire services over an existing pool with the configured providers
    pub fn with_pool(config: ServerConfig, db: SqlitePool) -> LookupResult<Self> {
        let cache: Arc<dyn ReportCache> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryReportCache::new()),
            CacheBackend::Sqlite => Arc::new(SqliteReportCache::new(db.clone())),
        };
        tracing::info!("Report cache backend: {}", cache.backend_name());

        let dispatcher = Dispatcher::from_config(&config, Arc::clone(&cache))?;

        Ok(Self::from_parts(config, db, cache, dispatcher))
    }

    /// Assemble a context around an already built dispatcher
    pub fn from_parts(
        config: ServerConfig,
        db: SqlitePool,
        cache: Arc<dyn ReportCache>,
        dispatcher: Dispatcher,
    ) -> Self {
        let history = LookupHistory::new(db.clone());

        let dispatcher = if config.history.enabled {
            dispatcher.with_history(history.clone())
        } else {
            tracing::info!("Lookup history disabled");
            dispatcher
        };

        Self {
            config: Arc::new(config),
            db,
            cache,
            history,
            dispatcher: Arc::new(dispatcher),
            started_at: Instant::now(),
        }
    }
}
