//! User profiles and their driver/owner views.
//!
//! One ledger object carries the counters for both roles a user can play.
//! The views below only select the counters relevant to a role; they do not
//! copy or recompute anything.

use serde::{Deserialize, Serialize};

use crate::ids::{Address, ObjectId};
use crate::reputation::Score;

/// A user's reputation profile as stored by the ledger program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Profile object identifier.
    pub id: ObjectId,
    /// Account the profile belongs to.
    pub address: Address,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Reputation score, clamped to [0, 10000].
    pub score: Score,
    /// Completed parkings as a driver.
    pub successful_parkings: u64,
    /// Completed rentals as an owner.
    pub successful_rentals: u64,
    /// Disputes this user opened.
    pub disputes_filed: u64,
    /// Disputes opened against this user.
    pub disputes_received: u64,
    /// Disputes decided in this user's favour.
    pub disputes_won: u64,
    /// Disputes decided against this user.
    pub disputes_lost: u64,
    /// Reservations never used by this driver.
    pub no_shows: u64,
    /// Late arrivals as a driver.
    pub late_arrivals: u64,
    /// Total spent as a driver (minor units).
    pub total_spent: u64,
    /// Total earned as an owner (minor units).
    pub total_earned: u64,
    /// Number of ratings received.
    pub rating_count: u64,
    /// Sum of ratings received, each in basis points.
    pub rating_sum: u64,
    /// Profile creation time (ms since epoch).
    pub created_at_ms: u64,
    /// Last update time (ms since epoch).
    pub updated_at_ms: u64,
}

impl UserProfile {
    /// A fresh profile at the neutral base score.
    #[must_use]
    pub fn new(id: ObjectId, address: Address, created_at_ms: u64) -> Self {
        Self {
            id,
            address,
            display_name: None,
            score: Score::BASE,
            successful_parkings: 0,
            successful_rentals: 0,
            disputes_filed: 0,
            disputes_received: 0,
            disputes_won: 0,
            disputes_lost: 0,
            no_shows: 0,
            late_arrivals: 0,
            total_spent: 0,
            total_earned: 0,
            rating_count: 0,
            rating_sum: 0,
            created_at_ms,
            updated_at_ms: created_at_ms,
        }
    }

    /// Every dispute the user took part in, on either side.
    #[must_use]
    pub const fn dispute_count(&self) -> u64 {
        self.disputes_filed.saturating_add(self.disputes_received)
    }

    /// Average rating in basis points, if any ratings exist.
    #[must_use]
    pub const fn average_rating_bps(&self) -> Option<u64> {
        if self.rating_count == 0 {
            None
        } else {
            Some(self.rating_sum / self.rating_count)
        }
    }

    /// Counters relevant to the driver role.
    #[must_use]
    pub const fn as_driver(&self) -> DriverView<'_> {
        DriverView { profile: self }
    }

    /// Counters relevant to the owner role.
    #[must_use]
    pub const fn as_owner(&self) -> OwnerView<'_> {
        OwnerView { profile: self }
    }
}

/// Driver-role view of a profile.
#[derive(Debug, Clone, Copy)]
pub struct DriverView<'a> {
    profile: &'a UserProfile,
}

impl DriverView<'_> {
    /// Completed parkings.
    #[must_use]
    pub const fn successful_parkings(&self) -> u64 {
        self.profile.successful_parkings
    }

    /// No-shows.
    #[must_use]
    pub const fn no_shows(&self) -> u64 {
        self.profile.no_shows
    }

    /// Late arrivals.
    #[must_use]
    pub const fn late_arrivals(&self) -> u64 {
        self.profile.late_arrivals
    }

    /// Total spent.
    #[must_use]
    pub const fn total_spent(&self) -> u64 {
        self.profile.total_spent
    }

    /// Disputes opened by the driver.
    #[must_use]
    pub const fn disputes_filed(&self) -> u64 {
        self.profile.disputes_filed
    }
}

/// Owner-role view of a profile.
#[derive(Debug, Clone, Copy)]
pub struct OwnerView<'a> {
    profile: &'a UserProfile,
}

impl OwnerView<'_> {
    /// Completed rentals.
    #[must_use]
    pub const fn successful_rentals(&self) -> u64 {
        self.profile.successful_rentals
    }

    /// Total earned.
    #[must_use]
    pub const fn total_earned(&self) -> u64 {
        self.profile.total_earned
    }

    /// Disputes opened against the owner.
    #[must_use]
    pub const fn disputes_received(&self) -> u64 {
        self.profile.disputes_received
    }
}
