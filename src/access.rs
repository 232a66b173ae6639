/// Owner/non-owner access guard
use crate::{config::AccessConfig, lookup::LookupRequest, lookup::LookupType};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Denial reason for privileged lookup types
pub const REASON_PRIVILEGED: &str = "privileged";

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "decision")]
pub enum AccessDecision {
    /// `owner` grants privileged sources and rate limit bypass
    Allow { owner: bool },
    Deny { reason: String },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allow { .. })
    }
}

/// Decides who may run what
#[derive(Debug, Clone)]
pub struct AccessGuard {
    owner_id: String,
    privileged_types: HashSet<LookupType>,
}

impl AccessGuard {
    pub fn new(owner_id: impl Into<String>, privileged_types: impl IntoIterator<Item = LookupType>) -> Self {
        Self {
            owner_id: owner_id.into(),
            privileged_types: privileged_types.into_iter().collect(),
        }
    }

    pub fn from_config(config: &AccessConfig) -> Self {
        Self::new(config.owner_id.clone(), config.privileged_types.iter().copied())
    }

    /// The configured owner identity is the only one treated as owner;
    /// a request's `is_owner` flag is honored only when it agrees.
    pub fn is_owner(&self, requester_id: &str) -> bool {
        !self.owner_id.is_empty() && requester_id == self.owner_id
    }

    pub fn authorize(&self, requester_id: &str, request: &LookupRequest) -> AccessDecision {
        let owner = self.is_owner(requester_id);

        if request.is_owner() && !owner {
            warn!(
                requester = requester_id,
                "request claims owner identity that does not match configuration"
            );
        }

        if !owner && self.privileged_types.contains(&request.lookup_type()) {
            return AccessDecision::Deny {
                reason: REASON_PRIVILEGED.to_string(),
            };
        }

        AccessDecision::Allow { owner }
    }
}
