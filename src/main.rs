/// OSINT Aggregator - lookup service for the chat bot front end
use osint_aggregator::{
    config::ServerConfig, context::AppContext, error::LookupResult, jobs, server,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> LookupResult<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "osint_aggregator=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    print_banner();

    // Load configuration
    let config = ServerConfig::from_env()?;
    tracing::info!(
        providers = config.providers.len(),
        deadline_ms = config.dispatch.request_deadline.as_millis() as u64,
        max_concurrency = config.dispatch.max_concurrency,
        "Configuration loaded"
    );

    // Create application context (validates configuration)
    let ctx = Arc::new(AppContext::new(config).await?);

    // Start background jobs
    let scheduler = Arc::new(jobs::JobScheduler::new(Arc::clone(&ctx)));
    scheduler.start();

    // Start server
    server::serve((*ctx).clone()).await?;

    Ok(())
}

fn print_banner() {
    println!(
        r#"
   ____       _       __
  / __ \_____(_)___  / /_
 / / / / ___/ / __ \/ __/
/ /_/ (__  ) / / / / /_
\____/____/_/_/ /_/\__/   aggregator v{}
        "#,
        env!("CARGO_PKG_VERSION")
    );
}
