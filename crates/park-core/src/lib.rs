//! # park-core
//!
//! Domain primitives for the parkmesh parking marketplace.
//!
//! This crate provides:
//!
//! - [`Slot`], [`Reservation`], [`Escrow`], [`UserProfile`]: read-side
//!   projections of the ledger program's objects
//! - [`geo`]: haversine distance over micro-degree positions
//! - [`availability`]: interval conflict detection and status derivation
//! - [`pricing`]: local price quotes
//! - [`reputation`]: score labels, trusted badge and star ratings
//! - [`ranking`]: deterministic slot recommendation
//!
//! Nothing here performs I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod availability;
pub mod error;
pub mod escrow;
pub mod geo;
pub mod ids;
pub mod pricing;
pub mod profile;
pub mod ranking;
pub mod reputation;
pub mod reservation;
pub mod slot;
pub mod window;

pub use availability::AvailabilityStatus;
pub use error::{CoreError, Result};
pub use escrow::{DisputeInfo, Escrow, EscrowState};
pub use geo::GeoPoint;
pub use ids::{Address, ObjectId};
pub use pricing::PriceQuote;
pub use profile::UserProfile;
pub use ranking::{Candidate, RankMode, RankedSlot, Ranking, RankingCriteria};
pub use reputation::{ReputationSummary, Score, StarRating, TrustLabel};
pub use reservation::{Reservation, ReservationState};
pub use slot::{Slot, SlotStatus};
pub use window::TimeWindow;
