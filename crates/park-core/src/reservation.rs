//! Reservations of a slot by a driver.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::{Address, ObjectId};
use crate::window::{MS_PER_HOUR, TimeWindow};

/// Reservation lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationState {
    /// Created; funds may or may not be locked yet.
    Requested,
    /// Driver checked in.
    Active,
    /// Finished and settled.
    Completed,
    /// Under dispute.
    Disputed,
    /// Cancelled before use.
    Cancelled,
}

impl ReservationState {
    /// Decode the on-ledger `u8` discriminant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for codes other than 0..=4.
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(Self::Requested),
            1 => Ok(Self::Active),
            2 => Ok(Self::Completed),
            3 => Ok(Self::Disputed),
            4 => Ok(Self::Cancelled),
            other => Err(CoreError::unknown_variant(
                "reservation state",
                other.to_string(),
            )),
        }
    }

    /// Decode a variant name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for unrecognized names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "REQUESTED" | "PENDING" => Ok(Self::Requested),
            "ACTIVE" => Ok(Self::Active),
            "COMPLETED" => Ok(Self::Completed),
            "DISPUTED" => Ok(Self::Disputed),
            "CANCELLED" | "CANCELED" => Ok(Self::Cancelled),
            _ => Err(CoreError::unknown_variant("reservation state", name)),
        }
    }

    /// The on-ledger discriminant.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Requested => 0,
            Self::Active => 1,
            Self::Completed => 2,
            Self::Disputed => 3,
            Self::Cancelled => 4,
        }
    }

    /// Whether a reservation in this state holds the slot.
    #[must_use]
    pub const fn blocks_slot(self) -> bool {
        matches!(self, Self::Requested | Self::Active)
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "REQUESTED"),
            Self::Active => write!(f, "ACTIVE"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Disputed => write!(f, "DISPUTED"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A reservation of one slot for a contiguous number of hours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Object identifier.
    pub id: ObjectId,
    /// Reserved slot.
    pub slot_id: ObjectId,
    /// Driver who reserved.
    pub driver: Address,
    /// Slot owner at reservation time.
    pub owner: Address,
    /// Start (ms since epoch).
    pub start_time_ms: u64,
    /// Duration in whole hours.
    pub duration_hours: u64,
    /// Price locked at reservation time (minor units).
    pub locked_price: u64,
    /// Lifecycle state.
    pub state: ReservationState,
    /// Escrow holding the funds; absent until funds are locked.
    pub escrow_id: Option<ObjectId>,
}

impl Reservation {
    /// Exclusive end (ms since epoch).
    #[must_use]
    pub const fn end_time_ms(&self) -> u64 {
        self.start_time_ms
            .saturating_add(self.duration_hours.saturating_mul(MS_PER_HOUR))
    }

    /// The occupied interval, or `None` for a zero-length reservation.
    #[must_use]
    pub fn window(&self) -> Option<TimeWindow> {
        TimeWindow::new(self.start_time_ms, self.end_time_ms()).ok()
    }

    /// Whether this reservation holds the slot.
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        self.state.blocks_slot()
    }

    /// Whether the reservation was created but its funds never locked.
    #[must_use]
    pub const fn awaiting_escrow(&self) -> bool {
        matches!(self.state, ReservationState::Requested) && self.escrow_id.is_none()
    }
}
