//! Parking slots as projected from the ledger.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::geo::GeoPoint;
use crate::ids::{Address, ObjectId};

/// Neutral demand multiplier (1.0x) in basis points.
pub const NEUTRAL_COEFF_BPS: u64 = 10_000;

/// Coarse "right now" status maintained by the ledger program.
///
/// This only reflects the present moment. Interval availability is derived
/// separately from reservations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    /// No reservation holds the slot now.
    Free,
    /// Reserved but not checked in.
    Reserved,
    /// Driver has checked in.
    Occupied,
}

impl SlotStatus {
    /// Decode the on-ledger `u8` discriminant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for codes other than 0..=2.
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(Self::Free),
            1 => Ok(Self::Reserved),
            2 => Ok(Self::Occupied),
            other => Err(CoreError::unknown_variant("slot status", other.to_string())),
        }
    }

    /// Decode a variant name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for unrecognized names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "FREE" | "AVAILABLE" => Ok(Self::Free),
            "RESERVED" => Ok(Self::Reserved),
            "OCCUPIED" => Ok(Self::Occupied),
            _ => Err(CoreError::unknown_variant("slot status", name)),
        }
    }

    /// The on-ledger discriminant.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Free => 0,
            Self::Reserved => 1,
            Self::Occupied => 2,
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Free => write!(f, "FREE"),
            Self::Reserved => write!(f, "RESERVED"),
            Self::Occupied => write!(f, "OCCUPIED"),
        }
    }
}

/// A parking slot owned by a third party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Object identifier.
    pub id: ObjectId,
    /// Owning party.
    pub owner: Address,
    /// Position in micro-degrees.
    pub location: GeoPoint,
    /// Base hourly price in minor currency units.
    pub base_price_per_hour: u64,
    /// Zone demand multiplier in basis points (10000 = 1.0x).
    pub dynamic_coeff_bps: u64,
    /// Coarse ledger status.
    pub status: SlotStatus,
    /// Display name.
    pub name: Option<String>,
    /// Street address text.
    pub address: Option<String>,
    /// Pricing zone, when the slot belongs to one.
    pub zone_id: Option<ObjectId>,
    /// Reservations completed over the slot's lifetime.
    pub completed_reservations: u64,
    /// Revenue earned over the slot's lifetime (minor units).
    pub total_revenue: u64,
}

impl Slot {
    /// Display label: the name if present, otherwise the address, otherwise the id.
    #[must_use]
    pub fn label(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.address.clone())
            .unwrap_or_else(|| self.id.short())
    }
}
