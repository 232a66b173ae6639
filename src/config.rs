/// Configuration management for the lookup service
use crate::{
    error::{LookupError, LookupResult},
    lookup::LookupType,
    providers::catalog::SOURCES,
    rate_limit::{RateBudget, MAX_REFILL_INTERVAL},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Longest cache TTL accepted from configuration
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Longest per-lookup deadline accepted from configuration
pub const MAX_REQUEST_DEADLINE: Duration = Duration::from_secs(10 * 60);

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub access: AccessConfig,
    pub dispatch: DispatchConfig,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitConfig,
    pub storage: StorageConfig,
    pub history: HistoryConfig,
    pub providers: Vec<ProviderConfig>,
}

/// HTTP boundary configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Bearer token the chat layer presents on every `/v1` call
    pub service_token: String,
}

/// Identity configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    pub bot_token: String,
    pub owner_id: String,
    /// Lookup types only the owner may run
    pub privileged_types: Vec<LookupType>,
}

/// Fan-out configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Overall deadline for one lookup's fan-out
    pub request_deadline: Duration,
    /// Provider calls in flight across all lookups
    pub max_concurrency: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            request_deadline: Duration::from_secs(30),
            max_concurrency: 16,
        }
    }
}

/// Report cache backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

impl FromStr for CacheBackend {
    type Err = LookupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "sqlite" => Ok(CacheBackend::Sqlite),
            other => Err(LookupError::Configuration(format!(
                "Unknown cache backend: {}",
                other
            ))),
        }
    }
}

/// Report cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub ttl: Duration,
    pub sweep_interval: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            ttl: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Default token bucket applied to providers without their own budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub default_budget: RateBudget,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

/// Lookup history configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryConfig {
    pub enabled: bool,
    pub retention_days: i64,
}

/// One configured external source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub base_url: String,
    pub lookup_types: Vec<LookupType>,
    pub api_key: Option<String>,
    pub api_key_header: String,
    pub confidence: f64,
    pub privileged: bool,
    pub budget: RateBudget,
    pub accepted_prefixes: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables (and `.env`)
    pub fn from_env() -> LookupResult<Self> {
        dotenv::dotenv().ok();
        Self::from_vars(|key| env::var(key).ok())
    }

    /// Load configuration from an explicit variable map
    pub fn from_map(vars: &HashMap<String, String>) -> LookupResult<Self> {
        Self::from_vars(|key| vars.get(key).cloned())
    }

    fn from_vars<F>(var: F) -> LookupResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let parsed =
            |key: &str, default: &str| non_empty(key).unwrap_or_else(|| default.to_string());
        let list = |key: &str| -> Vec<String> {
            non_empty(key)
                .unwrap_or_default()
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let bot_token = non_empty("BOT_TOKEN")
            .ok_or_else(|| LookupError::Configuration("BOT_TOKEN is required".to_string()))?;
        let owner_id = non_empty("OWNER_ID")
            .ok_or_else(|| LookupError::Configuration("OWNER_ID is required".to_string()))?;
        let service_token = non_empty("SERVICE_TOKEN").unwrap_or_else(|| bot_token.clone());

        let host = parsed("HOST", "0.0.0.0");
        let port = parsed("PORT", "8080")
            .parse()
            .map_err(|_| LookupError::Configuration("Invalid port number".to_string()))?;

        let privileged_types = list("PRIVILEGED_LOOKUP_TYPES")
            .iter()
            .map(|s| {
                s.parse::<LookupType>()
                    .map_err(|e| LookupError::Configuration(e.to_string()))
            })
            .collect::<LookupResult<Vec<_>>>()?;
        let privileged_providers = list("PRIVILEGED_PROVIDERS");

        let request_deadline = Duration::from_millis(parse_number(
            &parsed("REQUEST_DEADLINE_MS", "30000"),
            "REQUEST_DEADLINE_MS",
        )?);
        let max_concurrency = parse_int::<usize>(&parsed("MAX_CONCURRENCY", "16"), "MAX_CONCURRENCY")?;

        let backend = parsed("CACHE_BACKEND", "memory").parse()?;
        let ttl = Duration::from_secs(parse_number(
            &parsed("CACHE_TTL_SECS", "600"),
            "CACHE_TTL_SECS",
        )?);
        let sweep_interval = Duration::from_secs(parse_number(
            &parsed("CACHE_SWEEP_INTERVAL_SECS", "300"),
            "CACHE_SWEEP_INTERVAL_SECS",
        )?);

        let default_budget = RateBudget {
            capacity: parse_int(&parsed("RATE_LIMIT_CAPACITY", "10"), "RATE_LIMIT_CAPACITY")?,
            refill_per_second: parse_float(
                &parsed("RATE_LIMIT_REFILL_PER_SECOND", "1.0"),
                "RATE_LIMIT_REFILL_PER_SECOND",
            )?,
        };

        let database_path: PathBuf = parsed("DATABASE_PATH", "./data/lookups.sqlite").into();

        let history_enabled = parse_bool(&parsed("HISTORY_ENABLED", "true"), "HISTORY_ENABLED")?;
        let retention_days =
            parse_int::<i64>(&parsed("HISTORY_RETENTION_DAYS", "30"), "HISTORY_RETENTION_DAYS")?;

        let api_key_header = parsed("API_KEY_HEADER", "X-API-Key");

        let mut providers = Vec::new();
        for source in SOURCES {
            let prefix = format!("API_{}", source.name.to_uppercase());
            let Some(base_url) = non_empty(&prefix) else {
                continue;
            };

            let confidence = match non_empty(&format!("{}_CONFIDENCE", prefix)) {
                Some(raw) => parse_float(&raw, &format!("{}_CONFIDENCE", prefix))?,
                None => source.confidence,
            };
            let capacity = match non_empty(&format!("{}_RATE_CAPACITY", prefix)) {
                Some(raw) => parse_int(&raw, &format!("{}_RATE_CAPACITY", prefix))?,
                None => default_budget.capacity,
            };
            let refill_per_second = match non_empty(&format!("{}_RATE_PER_SECOND", prefix)) {
                Some(raw) => parse_float(&raw, &format!("{}_RATE_PER_SECOND", prefix))?,
                None => default_budget.refill_per_second,
            };

            providers.push(ProviderConfig {
                name: source.name.to_string(),
                base_url,
                lookup_types: source.lookup_types.to_vec(),
                api_key: non_empty(&format!("{}_KEY", prefix)),
                api_key_header: api_key_header.clone(),
                confidence,
                privileged: privileged_providers.iter().any(|p| p == source.name),
                budget: RateBudget {
                    capacity,
                    refill_per_second,
                },
                accepted_prefixes: source.accepted_prefixes.iter().map(|s| s.to_string()).collect(),
            });
        }

        Ok(ServerConfig {
            service: ServiceConfig {
                host,
                port,
                service_token,
            },
            access: AccessConfig {
                bot_token,
                owner_id,
                privileged_types,
            },
            dispatch: DispatchConfig {
                request_deadline,
                max_concurrency,
            },
            cache: CacheSettings {
                backend,
                ttl,
                sweep_interval,
            },
            rate_limit: RateLimitConfig { default_budget },
            storage: StorageConfig { database_path },
            history: HistoryConfig {
                enabled: history_enabled,
                retention_days,
            },
            providers,
        })
    }

    /// Validate configuration; any failure here must stop startup
    pub fn validate(&self) -> LookupResult<()> {
        if self.access.bot_token.is_empty() {
            return Err(LookupError::Configuration("Bot token cannot be empty".to_string()));
        }

        if self.access.owner_id.is_empty() {
            return Err(LookupError::Configuration("Owner id cannot be empty".to_string()));
        }

        if self.providers.is_empty() {
            return Err(LookupError::Configuration(
                "No providers configured (set at least one API_* variable)".to_string(),
            ));
        }

        if self.dispatch.max_concurrency == 0 {
            return Err(LookupError::Configuration(
                "MAX_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        if self.dispatch.request_deadline.is_zero() {
            return Err(LookupError::Configuration(
                "REQUEST_DEADLINE_MS must be positive".to_string(),
            ));
        }

        if self.dispatch.request_deadline > MAX_REQUEST_DEADLINE {
            return Err(LookupError::Configuration(format!(
                "REQUEST_DEADLINE_MS must be at most {}",
                MAX_REQUEST_DEADLINE.as_millis()
            )));
        }

        if self.cache.ttl.is_zero() {
            return Err(LookupError::Configuration(
                "CACHE_TTL_SECS must be positive".to_string(),
            ));
        }

        if self.cache.ttl > MAX_CACHE_TTL {
            return Err(LookupError::Configuration(format!(
                "CACHE_TTL_SECS must be at most {}",
                MAX_CACHE_TTL.as_secs()
            )));
        }

        for provider in &self.providers {
            if !(0.0..=1.0).contains(&provider.confidence) {
                return Err(LookupError::Configuration(format!(
                    "Confidence for {} must be within [0, 1]",
                    provider.name
                )));
            }
            if provider.budget.capacity == 0 {
                return Err(LookupError::Configuration(format!(
                    "Rate capacity for {} must be positive",
                    provider.name
                )));
            }
            if provider.budget.checked_refill_interval().is_none() {
                return Err(LookupError::Configuration(format!(
                    "Refill rate for {} must be positive and restore a token at least every {}s",
                    provider.name,
                    MAX_REFILL_INTERVAL.as_secs()
                )));
            }
        }

        Ok(())
    }
}

fn parse_number(raw: &str, key: &str) -> LookupResult<u64> {
    raw.parse()
        .map_err(|_| LookupError::Configuration(format!("{} must be a non-negative integer", key)))
}

/// Parse an integer that must fit the target type
fn parse_int<T: TryFrom<u64>>(raw: &str, key: &str) -> LookupResult<T> {
    T::try_from(parse_number(raw, key)?)
        .map_err(|_| LookupError::Configuration(format!("{} is out of range", key)))
}

fn parse_bool(raw: &str, key: &str) -> LookupResult<bool> {
    match raw.to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(LookupError::Configuration(format!(
            "{} must be true or false",
            key
        ))),
    }
}

fn parse_float(raw: &str, key: &str) -> LookupResult<f64> {
    raw.parse()
        .map_err(|_| LookupError::Configuration(format!("{} must be a number", key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_vars() -> HashMap<String, String> {
        [
            ("BOT_TOKEN", "123:abc"),
            ("OWNER_ID", "42"),
            ("API_NUM", "https://num.example/lookup?q="),
            ("API_EMAIL", "https://mail.example/"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_map(&base_vars()).unwrap();
        config.validate().unwrap();

        assert_eq!(config.service.port, 8080);
        assert_eq!(config.service.service_token, "123:abc");
        assert_eq!(config.dispatch.request_deadline, Duration::from_secs(30));
        assert_eq!(config.dispatch.max_concurrency, 16);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.ttl, Duration::from_secs(600));
        assert_eq!(config.providers.len(), 2);
        assert!(config.history.enabled);
    }

    #[test]
    fn test_missing_bot_token_is_fatal() {
        let mut vars = base_vars();
        vars.remove("BOT_TOKEN");
        let err = ServerConfig::from_map(&vars).unwrap_err();
        assert!(matches!(err, LookupError::Configuration(_)));
    }

    #[test]
    fn test_missing_owner_is_fatal() {
        let mut vars = base_vars();
        vars.insert("OWNER_ID".to_string(), "   ".to_string());
        assert!(ServerConfig::from_map(&vars).is_err());
    }

    #[test]
    fn test_no_providers_fails_validation() {
        let mut vars = base_vars();
        vars.remove("API_NUM");
        vars.remove("API_EMAIL");
        let config = ServerConfig::from_map(&vars).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_overrides() {
        let mut vars = base_vars();
        vars.insert("API_NUM_KEY".to_string(), "secret".to_string());
        vars.insert("API_NUM_CONFIDENCE".to_string(), "0.55".to_string());
        vars.insert("API_NUM_RATE_CAPACITY".to_string(), "3".to_string());
        vars.insert("PRIVILEGED_PROVIDERS".to_string(), "num".to_string());
        vars.insert("PRIVILEGED_LOOKUP_TYPES".to_string(), "vehicle, gst".to_string());

        let config = ServerConfig::from_map(&vars).unwrap();
        let num = config.providers.iter().find(|p| p.name == "num").unwrap();

        assert_eq!(num.api_key.as_deref(), Some("secret"));
        assert_eq!(num.confidence, 0.55);
        assert_eq!(num.budget.capacity, 3);
        assert!(num.privileged);
        assert_eq!(
            config.access.privileged_types,
            vec![LookupType::Vehicle, LookupType::Gst]
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut vars = base_vars();
        vars.insert("MAX_CONCURRENCY".to_string(), "many".to_string());
        assert!(ServerConfig::from_map(&vars).is_err());

        let mut vars = base_vars();
        vars.insert("CACHE_BACKEND".to_string(), "redis".to_string());
        assert!(ServerConfig::from_map(&vars).is_err());

        let mut vars = base_vars();
        vars.insert("PRIVILEGED_LOOKUP_TYPES".to_string(), "fax".to_string());
        assert!(ServerConfig::from_map(&vars).is_err());
    }

    #[test]
    fn test_out_of_range_confidence_fails_validation() {
        let mut vars = base_vars();
        vars.insert("API_EMAIL_CONFIDENCE".to_string(), "1.5".to_string());
        let config = ServerConfig::from_map(&vars).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_glacial_refill_rate_fails_validation() {
        let mut vars = base_vars();
        vars.insert("RATE_LIMIT_REFILL_PER_SECOND".to_string(), "1e-20".to_string());
        let config = ServerConfig::from_map(&vars).unwrap();
        assert!(matches!(
            config.validate(),
            Err(LookupError::Configuration(_))
        ));

        let mut vars = base_vars();
        vars.insert("API_NUM_RATE_PER_SECOND".to_string(), "0".to_string());
        let config = ServerConfig::from_map(&vars).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_ttl_and_deadline_fail_validation() {
        let mut vars = base_vars();
        vars.insert("CACHE_TTL_SECS".to_string(), u64::MAX.to_string());
        let config = ServerConfig::from_map(&vars).unwrap();
        assert!(matches!(
            config.validate(),
            Err(LookupError::Configuration(_))
        ));

        let mut vars = base_vars();
        vars.insert("REQUEST_DEADLINE_MS".to_string(), u64::MAX.to_string());
        let config = ServerConfig::from_map(&vars).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_out_of_range_integers_rejected() {
        let mut vars = base_vars();
        vars.insert("RATE_LIMIT_CAPACITY".to_string(), "4294967297".to_string());
        assert!(matches!(
            ServerConfig::from_map(&vars),
            Err(LookupError::Configuration(_))
        ));

        let mut vars = base_vars();
        vars.insert("API_NUM_RATE_CAPACITY".to_string(), "4294967297".to_string());
        assert!(ServerConfig::from_map(&vars).is_err());

        let mut vars = base_vars();
        vars.insert("HISTORY_RETENTION_DAYS".to_string(), u64::MAX.to_string());
        assert!(ServerConfig::from_map(&vars).is_err());
    }

    #[test]
    fn test_history_flag_parsing() {
        let mut vars = base_vars();
        vars.insert("HISTORY_ENABLED".to_string(), "yes".to_string());
        assert!(matches!(
            ServerConfig::from_map(&vars),
            Err(LookupError::Configuration(_))
        ));

        vars.insert("HISTORY_ENABLED".to_string(), "FALSE".to_string());
        assert!(!ServerConfig::from_map(&vars).unwrap().history.enabled);

        vars.insert("HISTORY_ENABLED".to_string(), "1".to_string());
        assert!(ServerConfig::from_map(&vars).unwrap().history.enabled);
    }

    #[test]
    fn test_zero_concurrency_fails_validation() {
        let mut vars = base_vars();
        vars.insert("MAX_CONCURRENCY".to_string(), "0".to_string());
        let config = ServerConfig::from_map(&vars).unwrap();
        assert!(config.validate().is_err());
    }
}
