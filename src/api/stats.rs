/// Usage statistics and per-requester history
use crate::{
    context::AppContext,
    error::LookupResult,
    history::{LookupRecord, TypeCount},
};
use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

const DEFAULT_HISTORY_LIMIT: i64 = 50;

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub total: i64,
    pub by_type: Vec<TypeCount>,
    pub providers: Vec<String>,
    pub cache_backend: String,
    pub cache_entries: u64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub requester_id: String,
    pub lookups: Vec<LookupRecord>,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/v1/stats", get(stats))
        .route("/v1/history/:requester_id", get(history))
}

async fn stats(State(ctx): State<AppContext>) -> LookupResult<Json<StatsResponse>> {
    let by_type = ctx.history.stats_by_type().await?;
    let total = ctx.history.total().await?;
    let cache_entries = ctx.cache.len().await?;

    Ok(Json(StatsResponse {
        total,
        by_type,
        providers: ctx.dispatcher.registry().ids().map(str::to_string).collect(),
        cache_backend: ctx.cache.backend_name().to_string(),
        cache_entries,
    }))
}

async fn history(
    State(ctx): State<AppContext>,
    Path(requester_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> LookupResult<Json<HistoryResponse>> {
    let limit = params.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    let lookups = ctx.history.recent_for(&requester_id, limit).await?;

    Ok(Json(HistoryResponse {
        requester_id,
        lookups,
    }))
}
