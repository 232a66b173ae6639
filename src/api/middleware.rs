/// Service token authentication for the `/v1` routes
use crate::{context::AppContext, error::LookupError};
use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

/// Reject requests that do not carry the configured service token
pub async fn require_service_token(
    State(ctx): State<AppContext>,
    req: Request,
    next: Next,
) -> Result<Response, LookupError> {
    let token = extract_bearer_token(req.headers())
        .ok_or_else(|| LookupError::Authentication("Missing authorization header".to_string()))?;

    if !tokens_match(&token, &ctx.config.service.service_token) {
        tracing::warn!(path = %req.uri().path(), "Rejected request with invalid service token");
        return Err(LookupError::Authentication("Invalid service token".to_string()));
    }

    Ok(next.run(req).await)
}

/// Length-independent comparison over the full token
fn tokens_match(given: &str, expected: &str) -> bool {
    let given = given.as_bytes();
    let expected = expected.as_bytes();

    let mut diff = given.len() ^ expected.len();
    for (i, byte) in expected.iter().enumerate() {
        let other = given.get(i).copied().unwrap_or(0);
        diff |= usize::from(byte ^ other);
    }
    diff == 0
}
