/// Provider adapters
///
/// Every external source implements [`ProviderAdapter`]. The set of
/// adapters is fixed at startup and held by a [`ProviderRegistry`].
pub mod catalog;
pub mod http;

pub use catalog::build_registry;
pub use http::HttpJsonProvider;

use crate::{
    error::{LookupError, LookupResult},
    lookup::{CacheKey, LookupRequest, LookupType, ProviderResult},
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;

/// Per-provider view of a lookup, owned by the dispatcher for one fan-out
#[derive(Debug, Clone)]
pub struct ProviderQuery {
    pub provider_id: String,
    pub lookup_type: LookupType,
    pub value: String,
    pub request_key: CacheKey,
}

impl ProviderQuery {
    pub fn for_request(provider_id: &str, request: &LookupRequest) -> Self {
        Self {
            provider_id: provider_id.to_string(),
            lookup_type: request.lookup_type(),
            value: request.value().to_string(),
            request_key: request.cache_key(),
        }
    }
}

/// One external data source
///
/// `query` must return by `deadline` and must not fail: transport,
/// status and payload problems are reported as `ProviderStatus::Error`.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable identifier, also the rate limit key
    fn id(&self) -> &str;

    /// Whether this source handles the lookup type at all
    fn supports(&self, lookup_type: LookupType) -> bool;

    /// Value-level check made before any token is taken
    fn accepts(&self, query: &ProviderQuery) -> bool {
        self.supports(query.lookup_type)
    }

    /// Owner-only source
    fn privileged(&self) -> bool {
        false
    }

    async fn query(&self, query: &ProviderQuery, deadline: Instant) -> ProviderResult;
}

/// Statically known set of adapters
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> LookupResult<Self> {
        let mut seen = HashSet::new();
        for adapter in &adapters {
            if !seen.insert(adapter.id().to_string()) {
                return Err(LookupError::Configuration(format!(
                    "Duplicate provider id: {}",
                    adapter.id()
                )));
            }
        }

        Ok(Self { adapters })
    }

    /// Adapters that handle `lookup_type`; privileged ones only when allowed
    pub fn applicable(
        &self,
        lookup_type: LookupType,
        include_privileged: bool,
    ) -> Vec<Arc<dyn ProviderAdapter>> {
        self.adapters
            .iter()
            .filter(|a| a.supports(lookup_type))
            .filter(|a| include_privileged || !a.privileged())
            .cloned()
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.adapters.iter().map(|a| a.id())
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}
