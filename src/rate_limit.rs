/// Per-provider rate limiting
///
/// Each provider gets its own token bucket so one exhausted source never
/// throttles the others. Buckets are `governor` direct limiters: GCRA with
/// burst = capacity and one token replenished every `1 / refill_per_second`.
/// `check()` refills and consumes in a single compare-and-swap, so
/// concurrent fan-outs cannot double-spend a token.
use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter as GovernorLimiter,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, num::NonZeroU32, sync::Arc, time::Duration};
use tracing::debug;

type DirectLimiter = GovernorLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Token bucket parameters for one provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateBudget {
    /// Maximum tokens (burst size)
    pub capacity: u32,
    /// Tokens restored per second
    pub refill_per_second: f64,
}

impl Default for RateBudget {
    fn default() -> Self {
        Self {
            capacity: 10,
            refill_per_second: 1.0,
        }
    }
}

/// Slowest refill a bucket may be configured with
pub const MAX_REFILL_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

impl RateBudget {
    /// Time to regain one token, or `None` when the rate is unusable
    ///
    /// Rates must be finite and positive, and one token must come back
    /// within `MAX_REFILL_INTERVAL`.
    pub fn checked_refill_interval(&self) -> Option<Duration> {
        if !(self.refill_per_second.is_finite() && self.refill_per_second > 0.0) {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / self.refill_per_second)
            .ok()
            .filter(|interval| *interval <= MAX_REFILL_INTERVAL)
            .map(|interval| interval.max(Duration::from_nanos(1)))
    }

    /// Time to regain one token
    ///
    /// Unusable rates fall back to the default rate, or to
    /// `MAX_REFILL_INTERVAL` when the rate is merely too slow.
    pub fn refill_interval(&self) -> Duration {
        match self.checked_refill_interval() {
            Some(interval) => interval,
            None if self.refill_per_second.is_finite() && self.refill_per_second > 0.0 => {
                MAX_REFILL_INTERVAL
            }
            None => Duration::from_secs_f64(1.0 / RateBudget::default().refill_per_second),
        }
    }

    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.capacity).unwrap_or(NonZeroU32::MIN);
        // with_period only fails on a zero period, which refill_interval rules out
        Quota::with_period(self.refill_interval())
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst)
    }
}

/// Rate limiter manager keyed by provider id
///
/// The provider set is fixed at construction, so the map itself is never
/// mutated and needs no lock; only the bucket state is shared.
#[derive(Clone, Default)]
pub struct RateLimiter {
    buckets: Arc<HashMap<String, (RateBudget, DirectLimiter)>>,
}

impl RateLimiter {
    pub fn new<I, S>(budgets: I) -> Self
    where
        I: IntoIterator<Item = (S, RateBudget)>,
        S: Into<String>,
    {
        let buckets = budgets
            .into_iter()
            .map(|(id, budget)| {
                let limiter = GovernorLimiter::direct(budget.quota());
                (id.into(), (budget, limiter))
            })
            .collect();

        Self {
            buckets: Arc::new(buckets),
        }
    }

    /// Take one token for `provider_id` if available
    ///
    /// Never blocks. Unknown providers are refused.
    pub fn try_acquire(&self, provider_id: &str) -> bool {
        match self.buckets.get(provider_id) {
            Some((_, limiter)) => {
                let granted = limiter.check().is_ok();
                if !granted {
                    debug!(provider = provider_id, "rate limit token refused");
                }
                granted
            }
            None => false,
        }
    }

    /// Configured budget for a provider
    pub fn budget(&self, provider_id: &str) -> Option<RateBudget> {
        self.buckets.get(provider_id).map(|(budget, _)| *budget)
    }

    pub fn capacity(&self, provider_id: &str) -> Option<u32> {
        self.budget(provider_id).map(|b| b.capacity)
    }
}
