/// Lookup requests, identifier normalization and cache keys
pub mod report;

pub use report::{AggregatedReport, Candidate, FieldValue, ProviderResult, ProviderStatus};

use crate::error::{LookupError, LookupResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum accepted identifier length after trimming
const MAX_VALUE_LEN: usize = 256;

/// Category of identifier being looked up
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LookupType {
    Phone,
    Email,
    Username,
    Ip,
    Ifsc,
    Gst,
    Vehicle,
    Pincode,
    GameId,
}

impl LookupType {
    pub const ALL: [LookupType; 9] = [
        LookupType::Phone,
        LookupType::Email,
        LookupType::Username,
        LookupType::Ip,
        LookupType::Ifsc,
        LookupType::Gst,
        LookupType::Vehicle,
        LookupType::Pincode,
        LookupType::GameId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LookupType::Phone => "phone",
            LookupType::Email => "email",
            LookupType::Username => "username",
            LookupType::Ip => "ip",
            LookupType::Ifsc => "ifsc",
            LookupType::Gst => "gst",
            LookupType::Vehicle => "vehicle",
            LookupType::Pincode => "pincode",
            LookupType::GameId => "game_id",
        }
    }

    /// Normalize a raw identifier for this lookup type
    ///
    /// The result is what providers receive and what the cache is keyed on.
    pub fn normalize(&self, raw: &str) -> LookupResult<String> {
        let trimmed = raw.trim();
        if trimmed.len() > MAX_VALUE_LEN {
            return Err(LookupError::Validation(format!(
                "{} value exceeds {} characters",
                self.as_str(),
                MAX_VALUE_LEN
            )));
        }

        let normalized = match self {
            LookupType::Phone | LookupType::Pincode | LookupType::GameId => {
                let mut out = String::with_capacity(trimmed.len());
                for (i, c) in trimmed.chars().enumerate() {
                    if c.is_ascii_digit() || (c == '+' && i == 0 && *self == LookupType::Phone) {
                        out.push(c);
                    }
                }
                out
            }
            LookupType::Username => trimmed.trim_start_matches('@').to_lowercase(),
            LookupType::Vehicle => trimmed
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect::<String>()
                .to_lowercase(),
            LookupType::Email | LookupType::Ip | LookupType::Ifsc | LookupType::Gst => {
                trimmed.to_lowercase()
            }
        };

        if normalized.is_empty() || normalized == "+" {
            return Err(LookupError::Validation(format!(
                "Empty {} value",
                self.as_str()
            )));
        }

        Ok(normalized)
    }
}

impl fmt::Display for LookupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LookupType {
    type Err = LookupError;

    /// Accepts canonical names plus the service names used by the bot menus
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "phone" | "num" | "pakistan" => Ok(LookupType::Phone),
            "email" => Ok(LookupType::Email),
            "username" | "instagram" | "github" => Ok(LookupType::Username),
            "ip" => Ok(LookupType::Ip),
            "ifsc" => Ok(LookupType::Ifsc),
            "gst" => Ok(LookupType::Gst),
            "vehicle" => Ok(LookupType::Vehicle),
            "pincode" => Ok(LookupType::Pincode),
            "game_id" | "ff_info" | "ff_ban" => Ok(LookupType::GameId),
            other => Err(LookupError::Validation(format!(
                "Unknown lookup type: {}",
                other
            ))),
        }
    }
}

/// Normalized `(lookup type, value)` pair identifying one report
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    pub lookup_type: LookupType,
    pub value: String,
}

impl CacheKey {
    pub fn new(lookup_type: LookupType, value: impl Into<String>) -> Self {
        Self {
            lookup_type,
            value: value.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lookup_type, self.value)
    }
}

/// A single lookup submitted by the chat layer
///
/// Immutable once built; the value is normalized on construction.
#[derive(Debug, Clone, Serialize)]
pub struct LookupRequest {
    lookup_type: LookupType,
    value: String,
    requester_id: String,
    is_owner: bool,
    timestamp: DateTime<Utc>,
}

impl LookupRequest {
    pub fn new(
        lookup_type: LookupType,
        raw_value: &str,
        requester_id: impl Into<String>,
        is_owner: bool,
    ) -> LookupResult<Self> {
        let requester_id = requester_id.into();
        if requester_id.trim().is_empty() {
            return Err(LookupError::Validation("Missing requester id".to_string()));
        }

        Ok(Self {
            lookup_type,
            value: lookup_type.normalize(raw_value)?,
            requester_id,
            is_owner,
            timestamp: Utc::now(),
        })
    }

    pub fn lookup_type(&self) -> LookupType {
        self.lookup_type
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn requester_id(&self) -> &str {
        &self.requester_id
    }

    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.lookup_type, self.value.clone())
    }
}
