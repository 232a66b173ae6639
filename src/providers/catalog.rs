/// Known external sources and registry construction
use super::{
    http::{HttpJsonProvider, HttpProviderSettings},
    ProviderAdapter, ProviderRegistry,
};
use crate::{
    config::ProviderConfig,
    error::{LookupError, LookupResult},
    lookup::LookupType,
    rate_limit::RateLimiter,
};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Static description of a source the service knows how to talk to
#[derive(Debug, Clone, Copy)]
pub struct SourceSpec {
    /// Name used in `API_<NAME>` variables and as provider id
    pub name: &'static str,
    pub lookup_types: &'static [LookupType],
    /// Confidence used when `API_<NAME>_CONFIDENCE` is unset
    pub confidence: f64,
    pub accepted_prefixes: &'static [&'static str],
}

pub const SOURCES: &[SourceSpec] = &[
    SourceSpec {
        name: "num",
        lookup_types: &[LookupType::Phone],
        confidence: 0.8,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "pakistan",
        lookup_types: &[LookupType::Phone],
        confidence: 0.7,
        accepted_prefixes: &["+92", "92"],
    },
    SourceSpec {
        name: "email",
        lookup_types: &[LookupType::Email],
        confidence: 0.8,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "instagram",
        lookup_types: &[LookupType::Username],
        confidence: 0.6,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "github",
        lookup_types: &[LookupType::Username],
        confidence: 0.7,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "ip",
        lookup_types: &[LookupType::Ip],
        confidence: 0.9,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "ifsc",
        lookup_types: &[LookupType::Ifsc],
        confidence: 0.95,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "gst",
        lookup_types: &[LookupType::Gst],
        confidence: 0.9,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "vehicle",
        lookup_types: &[LookupType::Vehicle],
        confidence: 0.85,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "pincode",
        lookup_types: &[LookupType::Pincode],
        confidence: 0.95,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "ff_info",
        lookup_types: &[LookupType::GameId],
        confidence: 0.7,
        accepted_prefixes: &[],
    },
    SourceSpec {
        name: "ff_ban",
        lookup_types: &[LookupType::GameId],
        confidence: 0.7,
        accepted_prefixes: &[],
    },
];

/// Build the provider registry and its rate limiter from configuration
pub fn build_registry(providers: &[ProviderConfig]) -> LookupResult<(ProviderRegistry, RateLimiter)> {
    let client = Client::builder()
        .user_agent(concat!("osint-aggregator/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| LookupError::Internal(format!("Failed to create HTTP client: {}", e)))?;

    let adapters: Vec<Arc<dyn ProviderAdapter>> = providers
        .iter()
        .map(|p| {
            Arc::new(HttpJsonProvider::new(
                HttpProviderSettings {
                    id: p.name.clone(),
                    base_url: p.base_url.clone(),
                    lookup_types: p.lookup_types.clone(),
                    api_key: p.api_key.clone(),
                    api_key_header: p.api_key_header.clone(),
                    confidence: p.confidence,
                    privileged: p.privileged,
                    accepted_prefixes: p.accepted_prefixes.clone(),
                },
                client.clone(),
            )) as Arc<dyn ProviderAdapter>
        })
        .collect();

    let registry = ProviderRegistry::new(adapters)?;
    let limiter = RateLimiter::new(providers.iter().map(|p| (p.name.clone(), p.budget)));

    info!(
        "Loaded {} provider(s): {}",
        registry.len(),
        registry.ids().collect::<Vec<_>>().join(", ")
    );

    Ok((registry, limiter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::RateBudget;
    use std::collections::HashSet;

    #[test]
    fn test_source_names_unique() {
        let names: HashSet<_> = SOURCES.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), SOURCES.len());
    }

    #[test]
    fn test_every_lookup_type_has_a_source() {
        for lookup_type in LookupType::ALL {
            assert!(
                SOURCES.iter().any(|s| s.lookup_types.contains(&lookup_type)),
                "no source for {}",
                lookup_type
            );
        }
    }

    #[test]
    fn test_build_registry() {
        let configs = vec![ProviderConfig {
            name: "github".to_string(),
            base_url: "https://gh.example/".to_string(),
            lookup_types: vec![LookupType::Username],
            api_key: None,
            api_key_header: "X-API-Key".to_string(),
            confidence: 0.7,
            privileged: false,
            budget: RateBudget {
                capacity: 2,
                refill_per_second: 1.0,
            },
            accepted_prefixes: vec![],
        }];

        let (registry, limiter) = build_registry(&configs).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.applicable(LookupType::Username, false).len(), 1);
        assert_eq!(limiter.capacity("github"), Some(2));
    }
}
