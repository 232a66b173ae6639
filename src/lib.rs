/// OSINT lookup aggregation service
///
/// Fans one lookup out to many external sources under per-provider rate
/// limits and a shared deadline, merges what comes back into one
/// confidence-ranked report and caches it.
pub mod access;
pub mod aggregator;
pub mod api;
pub mod cache;
pub mod config;
pub mod context;
pub mod db;
pub mod dispatcher;
pub mod error;
pub mod history;
pub mod jobs;
pub mod lookup;
pub mod metrics;
pub mod providers;
pub mod rate_limit;
pub mod server;

pub use dispatcher::{DispatchSettings, Dispatcher};
pub use error::{LookupError, LookupResult};
