//! Interval conflict detection and "right now" status derivation.
//!
//! Only REQUESTED and ACTIVE reservations hold a slot. The ledger's coarse
//! slot status is never trusted for interval questions; everything here is
//! derived from the reservations themselves.

use serde::{Deserialize, Serialize};

use crate::reservation::Reservation;
use crate::window::TimeWindow;

/// Derived availability of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityStatus {
    /// Nothing holds the slot at the instant or interval in question.
    Free,
    /// A blocking reservation holds the slot. Checked-in and not-yet-arrived
    /// reservations are not distinguished here; inspect the reservation
    /// state for that.
    Reserved,
}

impl AvailabilityStatus {
    /// True for [`AvailabilityStatus::Free`].
    #[must_use]
    pub const fn is_free(self) -> bool {
        matches!(self, Self::Free)
    }
}

/// Reservations that hold the slot and overlap `window`.
pub fn conflicts<'a, I>(reservations: I, window: &TimeWindow) -> impl Iterator<Item = &'a Reservation>
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let window = *window;
    reservations.into_iter().filter(move |r| {
        r.is_blocking() && r.window().is_some_and(|w| w.overlaps(&window))
    })
}

/// True if any blocking reservation overlaps `window`.
pub fn has_conflict<'a, I>(reservations: I, window: &TimeWindow) -> bool
where
    I: IntoIterator<Item = &'a Reservation>,
{
    conflicts(reservations, window).next().is_some()
}

/// Status at `instant_ms`: reserved if a blocking reservation contains it.
pub fn status_at<'a, I>(reservations: I, instant_ms: u64) -> AvailabilityStatus
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let held = reservations
        .into_iter()
        .any(|r| r.is_blocking() && r.window().is_some_and(|w| w.contains(instant_ms)));
    if held {
        AvailabilityStatus::Reserved
    } else {
        AvailabilityStatus::Free
    }
}

/// Status over `window`: reserved if any blocking reservation overlaps it.
pub fn status_for<'a, I>(reservations: I, window: &TimeWindow) -> AvailabilityStatus
where
    I: IntoIterator<Item = &'a Reservation>,
{
    if has_conflict(reservations, window) {
        AvailabilityStatus::Reserved
    } else {
        AvailabilityStatus::Free
    }
}
