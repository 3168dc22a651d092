//! # park-market
//!
//! The parkmesh marketplace: search, quotes, reputation annotation and the
//! reservation flow, all composed from ledger reads.
//!
//! [`Marketplace`] answers queries. [`ReservationFlow`] performs writes
//! through the ledger program. Both are built from an explicit
//! [`park_ledger::LedgerContext`].
//!
//! Reads fail open and writes fail closed. Listings never hide a slot
//! because a read failed; writes never pretend to have succeeded.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod availability;
pub mod config;
pub mod error;
pub mod facade;
pub mod flow;
pub mod pricing;
pub mod reputation;

#[cfg(test)]
mod testing;

pub use availability::{AvailabilityCheck, AvailabilityEngine, AvailabilityReport, AvailabilityTarget};
pub use config::{MarketConfig, OrphanPolicy};
pub use error::{MarketError, Result};
pub use facade::{Marketplace, Recommendation, ReservationList, SlotListing, SlotQuery, SlotSearch};
pub use flow::{Booking, Registration, ReservationFlow, ReservationRequest};
pub use pricing::PricingService;
pub use reputation::{ProfileDirectory, ReputationLookup};
