/// Lookup endpoint
use crate::{
    context::AppContext,
    error::LookupResult,
    lookup::{AggregatedReport, LookupRequest, LookupType},
};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

/// Body of `POST /v1/lookup`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LookupBody {
    #[serde(rename = "type")]
    pub lookup_type: String,
    pub value: String,
    pub requester_id: String,
    #[serde(default)]
    pub is_owner: bool,
}

pub fn routes() -> Router<AppContext> {
    Router::new().route("/v1/lookup", post(lookup))
}

async fn lookup(
    State(ctx): State<AppContext>,
    Json(body): Json<LookupBody>,
) -> LookupResult<Json<AggregatedReport>> {
    let lookup_type: LookupType = body.lookup_type.parse()?;
    let request = LookupRequest::new(lookup_type, &body.value, body.requester_id, body.is_owner)?;

    let report = ctx.dispatcher.resolve(request).await?;
    Ok(Json(report))
}
