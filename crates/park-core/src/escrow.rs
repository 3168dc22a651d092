//! Escrows holding the three balances of a reservation.
//!
//! The escrow state machine only moves forward:
//!
//! ```text
//! Locked ──► Used ──► Settled
//!    │         │
//!    └────┬────┘
//!         ▼
//!      Dispute ──► Slashed
//!         │
//!         └──────► Settled
//! ```
//!
//! `Settled` and `Slashed` are terminal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::ids::{Address, ObjectId};

/// The state of an escrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowState {
    /// Funds deposited and locked.
    Locked,
    /// Driver used the slot; awaiting settlement.
    Used,
    /// Funds released according to the normal outcome.
    Settled,
    /// Under dispute, awaiting the arbiter.
    Dispute,
    /// Arbiter ruled against a party and its stake was slashed.
    Slashed,
}

impl EscrowState {
    /// Checks if a transition to the target state is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: &Self) -> bool {
        use EscrowState::{Dispute, Locked, Settled, Slashed, Used};

        matches!(
            (self, target),
            (Locked, Used) | (Used, Settled) | (Locked | Used, Dispute) | (Dispute, Slashed | Settled)
        )
    }

    /// Returns true if no further transitions are possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Settled | Self::Slashed)
    }

    /// Decode the on-ledger `u8` discriminant.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for codes other than 0..=4.
    pub fn from_code(code: u64) -> Result<Self> {
        match code {
            0 => Ok(Self::Locked),
            1 => Ok(Self::Used),
            2 => Ok(Self::Settled),
            3 => Ok(Self::Dispute),
            4 => Ok(Self::Slashed),
            other => Err(CoreError::unknown_variant("escrow state", other.to_string())),
        }
    }

    /// Decode a variant name (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownVariant`] for unrecognized names.
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_uppercase().as_str() {
            "LOCKED" => Ok(Self::Locked),
            "USED" => Ok(Self::Used),
            "SETTLED" => Ok(Self::Settled),
            "DISPUTE" | "DISPUTED" => Ok(Self::Dispute),
            "SLASHED" => Ok(Self::Slashed),
            _ => Err(CoreError::unknown_variant("escrow state", name)),
        }
    }

    /// The on-ledger discriminant.
    #[must_use]
    pub const fn code(self) -> u64 {
        match self {
            Self::Locked => 0,
            Self::Used => 1,
            Self::Settled => 2,
            Self::Dispute => 3,
            Self::Slashed => 4,
        }
    }
}

impl fmt::Display for EscrowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "LOCKED"),
            Self::Used => write!(f, "USED"),
            Self::Settled => write!(f, "SETTLED"),
            Self::Dispute => write!(f, "DISPUTE"),
            Self::Slashed => write!(f, "SLASHED"),
        }
    }
}

/// Dispute metadata recorded on the escrow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisputeInfo {
    /// Party that opened the dispute.
    pub initiator: Address,
    /// Free-text reason.
    pub reason: Option<String>,
}

/// An escrow account for one reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Escrow {
    /// Object identifier.
    pub id: ObjectId,
    /// Reservation the escrow backs.
    pub reservation_id: ObjectId,
    /// Driver (payer).
    pub driver: Address,
    /// Slot owner (payee).
    pub owner: Address,
    /// Driver's refundable deposit.
    pub driver_deposit: u64,
    /// Payment for the reservation.
    pub payment: u64,
    /// Owner's collateral against no-show or misuse.
    pub owner_collateral: u64,
    /// Current state.
    pub state: EscrowState,
    /// Set once a dispute has been opened.
    pub dispute: Option<DisputeInfo>,
    /// Address allowed to decide disputes.
    pub arbiter: Option<Address>,
    /// Driver reputation weight captured at lock time (basis points).
    pub driver_reputation_weight: u64,
    /// Owner reputation weight captured at lock time (basis points).
    pub owner_reputation_weight: u64,
}

impl Escrow {
    /// Sum of all balances held.
    #[must_use]
    pub const fn total_held(&self) -> u64 {
        self.driver_deposit
            .saturating_add(self.payment)
            .saturating_add(self.owner_collateral)
    }

    /// Whether a dispute was ever opened on this escrow.
    #[must_use]
    pub const fn is_disputed(&self) -> bool {
        self.dispute.is_some()
    }

    /// Returns true if the escrow is in a terminal state.
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        self.state.is_terminal()
    }

    /// Apply a transition, rejecting anything that would move backwards.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] naming the illegal transition.
    pub fn transition_to(&mut self, target: EscrowState) -> Result<()> {
        if self.state.can_transition_to(&target) {
            self.state = target;
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: self.state.to_string(),
                to: target.to_string(),
            })
        }
    }
}
