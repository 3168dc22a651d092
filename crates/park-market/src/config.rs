//! Marketplace configuration.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Radius used when a query names none (meters).
pub const DEFAULT_RADIUS_M: f64 = 2_000.0;

/// Largest accepted search radius (meters).
pub const MAX_RADIUS_M: f64 = 50_000.0;

/// What to do with a reservation whose funds could not be locked.
///
/// Reservation and lock are two separate ledger calls with no transaction
/// around them. Neither option retries the lock: it moves funds and carries
/// no idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    /// Cancel the reservation once, best effort, so the slot is released.
    #[default]
    Cancel,
    /// Leave it for the driver or an operator to fund or cancel.
    Leave,
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancel => write!(f, "cancel"),
            Self::Leave => write!(f, "leave"),
        }
    }
}

impl FromStr for OrphanPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cancel" => Ok(Self::Cancel),
            "leave" => Ok(Self::Leave),
            other => Err(format!("unknown orphan policy: {other}")),
        }
    }
}

/// Marketplace settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Radius used when a query names none (meters).
    pub default_radius_m: f64,
    /// Largest accepted radius (meters).
    pub max_radius_m: f64,
    /// Duration quoted for listings when no interval is given.
    pub default_quote_hours: u64,
    /// Handling of reservations left without funds.
    pub orphan_policy: OrphanPolicy,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            default_radius_m: DEFAULT_RADIUS_M,
            max_radius_m: MAX_RADIUS_M,
            default_quote_hours: 1,
            orphan_policy: OrphanPolicy::default(),
        }
    }
}

impl MarketConfig {
    /// Sets the default radius.
    #[must_use]
    pub const fn with_default_radius(mut self, meters: f64) -> Self {
        self.default_radius_m = meters;
        self
    }

    /// Sets the maximum radius.
    #[must_use]
    pub const fn with_max_radius(mut self, meters: f64) -> Self {
        self.max_radius_m = meters;
        self
    }

    /// Sets the listing quote duration (at least one hour).
    #[must_use]
    pub const fn with_default_quote_hours(mut self, hours: u64) -> Self {
        self.default_quote_hours = if hours == 0 { 1 } else { hours };
        self
    }

    /// Sets the orphan policy.
    #[must_use]
    pub const fn with_orphan_policy(mut self, policy: OrphanPolicy) -> Self {
        self.orphan_policy = policy;
        self
    }
}
