//! Scripted in-process providers shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use osint_aggregator::{
    access::AccessGuard,
    cache::{MemoryReportCache, ReportCache},
    lookup::{LookupType, ProviderResult},
    providers::{ProviderAdapter, ProviderQuery, ProviderRegistry},
    rate_limit::{RateBudget, RateLimiter},
    DispatchSettings, Dispatcher,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const OWNER_ID: &str = "1000";
pub const USER_ID: &str = "2000";

/// What a scripted provider does when queried
#[derive(Debug, Clone)]
pub enum Behavior {
    Respond {
        fields: Vec<(String, String)>,
        confidence: f64,
    },
    Fail(String),
    Hang,
}

/// Tracks calls and peak concurrency across providers
#[derive(Debug, Default)]
pub struct Probe {
    calls: AtomicUsize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Probe {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedProvider {
    id: String,
    types: Vec<LookupType>,
    behavior: Behavior,
    delay: Duration,
    required_prefix: Option<String>,
    privileged: bool,
    probe: Arc<Probe>,
}

impl ScriptedProvider {
    pub fn new(id: &str, behavior: Behavior) -> Self {
        Self {
            id: id.to_string(),
            types: LookupType::ALL.to_vec(),
            behavior,
            delay: Duration::ZERO,
            required_prefix: None,
            privileged: false,
            probe: Arc::new(Probe::default()),
        }
    }

    pub fn ok(id: &str, confidence: f64, fields: &[(&str, &str)]) -> Self {
        Self::new(
            id,
            Behavior::Respond {
                fields: fields
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                confidence,
            },
        )
    }

    pub fn failing(id: &str, message: &str) -> Self {
        Self::new(id, Behavior::Fail(message.to_string()))
    }

    pub fn hanging(id: &str) -> Self {
        Self::new(id, Behavior::Hang)
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_types(mut self, types: &[LookupType]) -> Self {
        self.types = types.to_vec();
        self
    }

    /// Only accept values starting with `prefix`
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.required_prefix = Some(prefix.to_string());
        self
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    pub fn with_probe(mut self, probe: Arc<Probe>) -> Self {
        self.probe = probe;
        self
    }

    pub fn probe(&self) -> Arc<Probe> {
        Arc::clone(&self.probe)
    }
}

struct ExitGuard<'a>(&'a Probe);

impl Drop for ExitGuard<'_> {
    fn drop(&mut self) {
        self.0.exit();
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn supports(&self, lookup_type: LookupType) -> bool {
        self.types.contains(&lookup_type)
    }

    fn accepts(&self, query: &ProviderQuery) -> bool {
        self.supports(query.lookup_type)
            && self
                .required_prefix
                .as_ref()
                .map_or(true, |prefix| query.value.starts_with(prefix.as_str()))
    }

    fn privileged(&self) -> bool {
        self.privileged
    }

    async fn query(&self, _query: &ProviderQuery, _deadline: Instant) -> ProviderResult {
        self.probe.enter();
        let _guard = ExitGuard(&self.probe);
        let started = Instant::now();

        tokio::time::sleep(self.delay).await;

        match &self.behavior {
            Behavior::Respond { fields, confidence } => {
                let fields: BTreeMap<String, String> = fields.iter().cloned().collect();
                ProviderResult::ok(self.id.clone(), fields, *confidence, started.elapsed())
            }
            Behavior::Fail(message) => {
                ProviderResult::error(self.id.clone(), started.elapsed(), message.clone())
            }
            Behavior::Hang => std::future::pending::<ProviderResult>().await,
        }
    }
}

/// Dispatcher over scripted providers, plus handles the tests inspect
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub limiter: RateLimiter,
    pub cache: Arc<MemoryReportCache>,
}

pub struct HarnessBuilder {
    providers: Vec<ScriptedProvider>,
    budget: RateBudget,
    settings: DispatchSettings,
    privileged_types: Vec<LookupType>,
}

impl HarnessBuilder {
    pub fn new(providers: Vec<ScriptedProvider>) -> Self {
        Self {
            providers,
            budget: RateBudget {
                capacity: 100,
                refill_per_second: 100.0,
            },
            settings: DispatchSettings {
                deadline: Duration::from_secs(5),
                ..DispatchSettings::default()
            },
            privileged_types: vec![LookupType::Vehicle],
        }
    }

    pub fn budget(mut self, budget: RateBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.settings.deadline = deadline;
        self
    }

    pub fn max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.settings.max_concurrency = max_concurrency;
        self
    }

    pub fn build(self) -> Harness {
        let limiter = RateLimiter::new(
            self.providers
                .iter()
                .map(|p| (p.id.clone(), self.budget))
                .collect::<Vec<_>>(),
        );
        let adapters = self
            .providers
            .into_iter()
            .map(|p| Arc::new(p) as Arc<dyn ProviderAdapter>)
            .collect();
        let registry = ProviderRegistry::new(adapters).expect("unique provider ids");
        let cache = Arc::new(MemoryReportCache::new());

        let dispatcher = Dispatcher::new(
            AccessGuard::new(OWNER_ID, self.privileged_types),
            registry,
            limiter.clone(),
            Arc::clone(&cache) as Arc<dyn ReportCache>,
            self.settings,
        );

        Harness {
            dispatcher,
            limiter,
            cache,
        }
    }
}
