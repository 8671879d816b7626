//! Expiration classification for secrets and certificates
//!
//! Maps an optional expiry timestamp to the alert bucket used both for
//! per-resource display and for the cache's expiring-resource queries.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Expiring within this many days is critical
pub const CRITICAL_DAYS: i64 = 30;

/// Expiring within this many days is a warning
pub const WARNING_DAYS: i64 = 60;

/// Alert bucket for a resource's expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirationStatus {
    Expired,
    Critical,
    Warning,
    Safe,
    NoExpiration,
}

impl ExpirationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Safe => "safe",
            Self::NoExpiration => "no_expiration",
        }
    }

    /// Human-readable label for table output
    pub fn label(&self) -> &'static str {
        match self {
            Self::Expired => "Expired",
            Self::Critical => "Expires within 30 days",
            Self::Warning => "Expires within 60 days",
            Self::Safe => "OK",
            Self::NoExpiration => "No expiry",
        }
    }

    /// Whether this bucket should raise an alert
    pub fn needs_attention(&self) -> bool {
        matches!(self, Self::Expired | Self::Critical | Self::Warning)
    }
}

impl fmt::Display for ExpirationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classify an expiry timestamp relative to `now`.
///
/// Boundaries are inclusive: exactly 30 days out is `Critical`, exactly 60 days
/// out is `Warning`, and an expiry equal to `now` is not yet `Expired`.
pub fn classify(expires_on: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ExpirationStatus {
    let Some(expires_on) = expires_on else {
        return ExpirationStatus::NoExpiration;
    };

    if expires_on < now {
        return ExpirationStatus::Expired;
    }

    let remaining = expires_on - now;
    if remaining <= Duration::days(CRITICAL_DAYS) {
        ExpirationStatus::Critical
    } else if remaining <= Duration::days(WARNING_DAYS) {
        ExpirationStatus::Warning
    } else {
        ExpirationStatus::Safe
    }
}

/// Whole days until expiry; negative once expired
pub fn days_until(expires_on: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<i64> {
    expires_on.map(|at| (at - now).num_days())
}

/// Whether `expires_on` falls within `days` of `now` (already expired included).
///
/// A window reaching past the representable date range has no upper bound.
pub fn expires_within(expires_on: Option<DateTime<Utc>>, now: DateTime<Utc>, days: i64) -> bool {
    let Some(at) = expires_on else {
        return false;
    };
    match Duration::try_days(days).and_then(|window| now.checked_add_signed(window)) {
        Some(limit) => at <= limit,
        None => days > 0,
    }
}
