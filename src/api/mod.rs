/// API routes and handlers
pub mod health;
pub mod lookup;
pub mod middleware;
pub mod stats;

use crate::context::AppContext;
use axum::{middleware::from_fn_with_state, Router};

/// Build API routes; everything under `/v1` requires the service token
pub fn routes(ctx: AppContext) -> Router<AppContext> {
    let protected = Router::new()
        .merge(lookup::routes())
        .merge(stats::routes())
        .route_layer(from_fn_with_state(ctx, middleware::require_service_token));

    Router::new().merge(health::routes()).merge(protected)
}
