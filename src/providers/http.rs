/// Generic HTTP/JSON provider
///
/// Queries `GET {base_url}{value}` and flattens the JSON body into
/// dot-path fields. Most sources behind the bot follow this shape; they
/// differ only in base URL, auth header, supported type and how much we
/// trust them.
use super::{ProviderAdapter, ProviderQuery};
use crate::lookup::{LookupType, ProviderResult};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

/// Upper bound on fields taken from one response
const MAX_FIELDS: usize = 256;

/// Reseller branding block; credit banners are caught by value in `is_advert`
const BRANDING_KEY: &str = "branding";

/// HTTP/JSON provider configuration
#[derive(Debug, Clone)]
pub struct HttpProviderSettings {
    pub id: String,
    pub base_url: String,
    pub lookup_types: Vec<LookupType>,
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub confidence: f64,
    pub privileged: bool,
    /// When non-empty, values must start with one of these prefixes
    pub accepted_prefixes: Vec<String>,
}

pub struct HttpJsonProvider {
    settings: HttpProviderSettings,
    client: Client,
}

impl HttpJsonProvider {
    pub fn new(settings: HttpProviderSettings, client: Client) -> Self {
        Self { settings, client }
    }

    pub fn settings(&self) -> &HttpProviderSettings {
        &self.settings
    }

    fn url_for(&self, value: &str) -> String {
        format!("{}{}", self.settings.base_url, urlencoding::encode(value))
    }

    async fn fetch(&self, url: &str) -> Result<BTreeMap<String, String>, String> {
        let mut request = self.client.get(url);
        if let Some(key) = &self.settings.api_key {
            request = request.header(self.settings.api_key_header.as_str(), key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| format!("failed to read body: {}", e))?;

        let payload: Value =
            serde_json::from_str(&body).map_err(|_| "invalid JSON response".to_string())?;

        if let Some(message) = remote_error(&payload) {
            return Err(message);
        }

        Ok(flatten_payload(&payload))
    }
}

#[async_trait]
impl ProviderAdapter for HttpJsonProvider {
    fn id(&self) -> &str {
        &self.settings.id
    }

    fn supports(&self, lookup_type: LookupType) -> bool {
        self.settings.lookup_types.contains(&lookup_type)
    }

    fn accepts(&self, query: &ProviderQuery) -> bool {
        self.supports(query.lookup_type)
            && (self.settings.accepted_prefixes.is_empty()
                || self
                    .settings
                    .accepted_prefixes
                    .iter()
                    .any(|p| query.value.starts_with(p.as_str())))
    }

    fn privileged(&self) -> bool {
        self.settings.privileged
    }

    async fn query(&self, query: &ProviderQuery, deadline: Instant) -> ProviderResult {
        let started = Instant::now();
        let url = self.url_for(&query.value);

        debug!(provider = %self.settings.id, key = %query.request_key, "querying provider");

        match timeout_at(deadline, self.fetch(&url)).await {
            Ok(Ok(fields)) => ProviderResult::ok(
                self.settings.id.clone(),
                fields,
                self.settings.confidence,
                started.elapsed(),
            ),
            Ok(Err(message)) => {
                warn!(provider = %self.settings.id, error = %message, "provider call failed");
                ProviderResult::error(self.settings.id.clone(), started.elapsed(), message)
            }
            Err(_) => ProviderResult::timeout(self.settings.id.clone(), started.elapsed()),
        }
    }
}

/// Error message carried by a well-formed error payload, if any
fn remote_error(payload: &Value) -> Option<String> {
    let object = payload.as_object()?;
    match object.get("error") {
        Some(Value::String(message)) => Some(message.clone()),
        Some(Value::Bool(true)) => Some(
            object
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("remote error")
                .to_string(),
        ),
        _ => None,
    }
}

/// Flatten a JSON payload into `dot.path -> text` fields
pub fn flatten_payload(payload: &Value) -> BTreeMap<String, String> {
    let mut fields = BTreeMap::new();
    match payload {
        Value::Object(_) | Value::Array(_) => flatten_into("", payload, &mut fields),
        other => flatten_into("data", other, &mut fields),
    }
    fields
}

fn flatten_into(prefix: &str, value: &Value, out: &mut BTreeMap<String, String>) {
    if out.len() >= MAX_FIELDS {
        return;
    }

    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        }
    };

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let key = key.to_lowercase();
                if key == BRANDING_KEY {
                    continue;
                }
                flatten_into(&join(&key), child, out);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(&join(&i.to_string()), child, out);
            }
        }
        Value::Null => {}
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() || is_advert(text) || prefix.is_empty() {
                return;
            }
            out.insert(prefix.to_string(), text.to_string());
        }
        Value::Bool(_) | Value::Number(_) => {
            if !prefix.is_empty() {
                out.insert(prefix.to_string(), value.to_string());
            }
        }
    }
}

/// Promotional strings resellers splice into payloads
fn is_advert(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("t.me/") || (lower.contains("credit") && lower.contains('@'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::{LookupRequest, ProviderStatus};
    use axum::{extract::Path, routing::get, Json, Router};
    use serde_json::json;
    use std::time::Duration;

    async fn spawn_upstream() -> String {
        let app = Router::new()
            .route(
                "/num/:value",
                get(|Path(value): Path<String>| async move {
                    Json(json!({
                        "number": value,
                        "name": "Asha Rao",
                        "address": { "city": "Pune", "pin": 411001 },
                        "branding": "@someone",
                    }))
                }),
            )
            .route("/broken/:value", get(|| async { "not json" }))
            .route(
                "/missing/:value",
                get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
            )
            .route(
                "/slow/:value",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({ "late": true }))
                }),
            )
            .route(
                "/remote-error/:value",
                get(|| async { Json(json!({ "error": "quota exhausted" })) }),
            );

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn provider(base_url: String) -> HttpJsonProvider {
        HttpJsonProvider::new(
            HttpProviderSettings {
                id: "num".to_string(),
                base_url,
                lookup_types: vec![LookupType::Phone],
                api_key: None,
                api_key_header: "X-Api-Key".to_string(),
                confidence: 0.7,
                privileged: false,
                accepted_prefixes: vec![],
            },
            Client::new(),
        )
    }

    fn phone_query(value: &str) -> ProviderQuery {
        let request = LookupRequest::new(LookupType::Phone, value, "tester", false).unwrap();
        ProviderQuery::for_request("num", &request)
    }

    #[test]
    fn test_flatten_payload() {
        let payload = json!({
            "Name": "Asha",
            "phones": ["111", "222"],
            "meta": { "active": true, "score": 3 },
            "credit": "credit: @reseller",
            "empty": "",
            "nothing": null,
        });
        let fields = flatten_payload(&payload);
        assert_eq!(fields.get("name").map(String::as_str), Some("Asha"));
        assert_eq!(fields.get("phones.1").map(String::as_str), Some("222"));
        assert_eq!(fields.get("meta.active").map(String::as_str), Some("true"));
        assert_eq!(fields.get("meta.score").map(String::as_str), Some("3"));
        assert!(!fields.contains_key("credit"));
        assert!(!fields.contains_key("empty"));
        assert!(!fields.contains_key("nothing"));
    }

    #[test]
    fn test_record_fields_named_like_branding_survive() {
        let payload = json!({
            "reg_no": "MH12AB1234",
            "owner": "Ravi Kumar",
            "dev": "Honda",
            "channel": "dealer",
            "details": { "owner": "Ravi Kumar", "branding": { "by": "@reseller" } },
            "Branding": "@someone",
        });
        let fields = flatten_payload(&payload);

        assert_eq!(fields.get("owner").map(String::as_str), Some("Ravi Kumar"));
        assert_eq!(fields.get("dev").map(String::as_str), Some("Honda"));
        assert_eq!(fields.get("channel").map(String::as_str), Some("dealer"));
        assert_eq!(fields.get("details.owner").map(String::as_str), Some("Ravi Kumar"));
        assert_eq!(fields.get("reg_no").map(String::as_str), Some("MH12AB1234"));
        assert!(fields.keys().all(|k| !k.contains("branding")));
        assert_eq!(fields.len(), 5);
    }

    #[test]
    fn test_flatten_scalar_payload() {
        let fields = flatten_payload(&json!("just text"));
        assert_eq!(fields.get("data").map(String::as_str), Some("just text"));
    }

    #[test]
    fn test_adverts_dropped() {
        let fields = flatten_payload(&json!({ "note": "join t.me/somechannel" }));
        assert!(fields.is_empty());
    }

    #[tokio::test]
    async fn test_successful_query() {
        let base = spawn_upstream().await;
        let provider = provider(format!("{}/num/", base));

        let deadline = Instant::now() + Duration::from_secs(5);
        let result = provider.query(&phone_query("9876543210"), deadline).await;

        assert_eq!(result.status(), ProviderStatus::Ok);
        assert_eq!(result.confidence(), 0.7);
        assert_eq!(
            result.fields().get("address.city").map(String::as_str),
            Some("Pune")
        );
        assert_eq!(
            result.fields().get("number").map(String::as_str),
            Some("9876543210")
        );
        assert!(!result.fields().contains_key("branding"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_error() {
        let base = spawn_upstream().await;
        let provider = provider(format!("{}/broken/", base));

        let deadline = Instant::now() + Duration::from_secs(5);
        let result = provider.query(&phone_query("1"), deadline).await;

        assert_eq!(result.status(), ProviderStatus::Error);
        assert!(result.fields().is_empty());
    }

    #[tokio::test]
    async fn test_http_status_is_error() {
        let base = spawn_upstream().await;
        let provider = provider(format!("{}/missing/", base));

        let deadline = Instant::now() + Duration::from_secs(5);
        let result = provider.query(&phone_query("1"), deadline).await;

        assert_eq!(result.status(), ProviderStatus::Error);
        assert_eq!(result.error_message(), Some("HTTP 404"));
    }

    #[tokio::test]
    async fn test_remote_error_payload() {
        let base = spawn_upstream().await;
        let provider = provider(format!("{}/remote-error/", base));

        let deadline = Instant::now() + Duration::from_secs(5);
        let result = provider.query(&phone_query("1"), deadline).await;

        assert_eq!(result.status(), ProviderStatus::Error);
        assert_eq!(result.error_message(), Some("quota exhausted"));
    }

    #[tokio::test]
    async fn test_deadline_produces_timeout() {
        let base = spawn_upstream().await;
        let provider = provider(format!("{}/slow/", base));

        let started = Instant::now();
        let deadline = started + Duration::from_millis(150);
        let result = provider.query(&phone_query("1"), deadline).await;

        assert_eq!(result.status(), ProviderStatus::Timeout);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        // Port 9 on localhost is almost never listening
        let provider = provider("http://127.0.0.1:9/".to_string());
        let deadline = Instant::now() + Duration::from_secs(5);
        let result = provider.query(&phone_query("1"), deadline).await;
        assert!(matches!(
            result.status(),
            ProviderStatus::Error | ProviderStatus::Timeout
        ));
    }

    #[test]
    fn test_prefix_acceptance() {
        let mut settings = provider("http://localhost/".to_string()).settings().clone();
        settings.accepted_prefixes = vec!["+92".to_string(), "92".to_string()];
        let pakistan = HttpJsonProvider::new(settings, Client::new());

        assert!(pakistan.accepts(&phone_query("+92 300 1234567")));
        assert!(!pakistan.accepts(&phone_query("+91 98765 43210")));
    }
}
