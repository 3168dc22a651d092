//! Availability answers backed by ledger reads.
//!
//! Reads here fail open. If the event scan or any reservation read fails,
//! a slot without a *known* conflict is reported free and the answer is
//! marked degraded. Hiding a valid slot costs a user a booking; showing a
//! taken one only costs a rejected reservation, and the ledger program
//! rejects conflicting reservations atomically anyway. Every fail-open
//! answer is logged and counted in the context's read statistics.

use std::collections::{HashMap, HashSet};

use park_core::availability::{status_at, status_for};
use park_core::{AvailabilityStatus, ObjectId, Reservation, TimeWindow};
use park_ledger::decode::value_as_id;
use park_ledger::{EventKind, LedgerContext, LedgerError, LedgerReader, RawEvent};
use serde::Serialize;
use tracing::warn;

/// What availability is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityTarget {
    /// The given instant (ms since epoch).
    Now(u64),
    /// A requested interval.
    Interval(TimeWindow),
}

impl AvailabilityTarget {
    fn status<'a, I>(self, reservations: I) -> AvailabilityStatus
    where
        I: IntoIterator<Item = &'a Reservation>,
    {
        match self {
            Self::Now(instant) => status_at(reservations, instant),
            Self::Interval(window) => status_for(reservations, &window),
        }
    }
}

/// Availability of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AvailabilityCheck {
    /// Derived status.
    pub status: AvailabilityStatus,
    /// True when the answer assumed "free" because reads failed.
    pub degraded: bool,
}

impl AvailabilityCheck {
    /// Whether the slot can be offered.
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.status.is_free()
    }
}

/// Reservations referencing a set of slots.
#[derive(Debug, Default)]
pub struct SlotReservations {
    /// Reservations grouped by slot.
    pub by_slot: HashMap<ObjectId, Vec<Reservation>>,
    /// Reservations that could not be read.
    pub read_failures: usize,
    /// The event scan stopped before the start of the log.
    pub possibly_incomplete: bool,
}

/// Availability for many slots at once.
#[derive(Debug, Default)]
pub struct AvailabilityReport {
    /// Per-slot answers.
    pub checks: HashMap<ObjectId, AvailabilityCheck>,
    /// The reservation scan was bounded and may have missed old entries.
    pub possibly_incomplete: bool,
}

impl AvailabilityReport {
    /// The answer for `slot_id`, failing open if it is missing.
    #[must_use]
    pub fn get(&self, slot_id: &ObjectId) -> AvailabilityCheck {
        self.checks.get(slot_id).copied().unwrap_or(AvailabilityCheck {
            status: AvailabilityStatus::Free,
            degraded: true,
        })
    }
}

fn mentions_slot(event: &RawEvent, slots: &HashSet<ObjectId>) -> bool {
    event
        .parsed
        .get("slot_id")
        .and_then(value_as_id)
        .is_some_and(|id| slots.contains(&id))
}

/// Derives slot availability from reservations on the ledger.
#[derive(Debug)]
pub struct AvailabilityEngine<L> {
    ctx: LedgerContext<L>,
}

impl<L: LedgerReader> AvailabilityEngine<L> {
    /// Creates an engine over a context.
    pub const fn new(ctx: LedgerContext<L>) -> Self {
        Self { ctx }
    }

    /// All reservations referencing the given slots.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the event scan fails. Individual read
    /// failures are counted in [`SlotReservations::read_failures`].
    pub async fn reservations_for(&self, slot_ids: &[ObjectId]) -> Result<SlotReservations, LedgerError> {
        let wanted: HashSet<ObjectId> = slot_ids.iter().cloned().collect();
        let scan = self
            .ctx
            .indexer()
            .find_identifiers(EventKind::ReservationCreated, |e| mentions_slot(e, &wanted))
            .await?;
        let batch = self.ctx.resolver().resolve_many::<Reservation>(&scan.ids).await;

        let mut found = SlotReservations {
            read_failures: batch.failed.len(),
            possibly_incomplete: scan.possibly_incomplete,
            ..SlotReservations::default()
        };
        for reservation in batch.resolved {
            if wanted.contains(&reservation.slot_id) {
                found
                    .by_slot
                    .entry(reservation.slot_id.clone())
                    .or_default()
                    .push(reservation);
            }
        }
        Ok(found)
    }

    /// Availability of many slots, failing open.
    pub async fn check_many(&self, slot_ids: &[ObjectId], target: AvailabilityTarget) -> AvailabilityReport {
        let stats = self.ctx.stats();
        match self.reservations_for(slot_ids).await {
            Err(e) => {
                warn!(slots = slot_ids.len(), error = %e, "reservation scan failed; assuming slots are free");
                let checks = slot_ids
                    .iter()
                    .map(|id| {
                        stats.record_fail_open();
                        let check = AvailabilityCheck {
                            status: AvailabilityStatus::Free,
                            degraded: true,
                        };
                        (id.clone(), check)
                    })
                    .collect();
                AvailabilityReport {
                    checks,
                    possibly_incomplete: true,
                }
            }
            Ok(found) => {
                if found.read_failures > 0 {
                    warn!(
                        failures = found.read_failures,
                        "some reservations could not be read; slots without a known conflict count as free"
                    );
                }
                let checks = slot_ids
                    .iter()
                    .map(|id| {
                        let reservations = found.by_slot.get(id).map_or(&[][..], Vec::as_slice);
                        let status = target.status(reservations);
                        let degraded = found.read_failures > 0 && status.is_free();
                        if degraded {
                            stats.record_fail_open();
                        }
                        (id.clone(), AvailabilityCheck { status, degraded })
                    })
                    .collect();
                AvailabilityReport {
                    checks,
                    possibly_incomplete: found.possibly_incomplete,
                }
            }
        }
    }

    /// Availability of one slot, failing open.
    pub async fn check(&self, slot_id: &ObjectId, target: AvailabilityTarget) -> AvailabilityCheck {
        self.check_many(std::slice::from_ref(slot_id), target)
            .await
            .get(slot_id)
    }

    /// Whether no live reservation overlaps `window`.
    ///
    /// Returns `true` when the answer cannot be determined.
    pub async fn is_available_for_interval(&self, slot_id: &ObjectId, window: &TimeWindow) -> bool {
        self.check(slot_id, AvailabilityTarget::Interval(*window))
            .await
            .is_free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, T0, hours};
    use park_ledger::Fault;

    #[tokio::test]
    async fn test_overlap_is_unavailable() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        h.reserve(&slot, T0 + hours(10), 2).await;
        let engine = AvailabilityEngine::new(h.ctx.clone());

        let overlapping = TimeWindow::from_hours(T0 + hours(11), 2).unwrap();
        assert!(!engine.is_available_for_interval(&slot, &overlapping).await);

        let touching = TimeWindow::from_hours(T0 + hours(12), 2).unwrap();
        assert!(engine.is_available_for_interval(&slot, &touching).await);
    }

    #[tokio::test]
    async fn test_scan_failure_fails_open_and_counts() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        h.reserve(&slot, T0 + hours(10), 2).await;
        h.ledger.set_fault(Fault::EventQueries, true);
        let engine = AvailabilityEngine::new(h.ctx.clone());

        let window = TimeWindow::from_hours(T0 + hours(11), 1).unwrap();
        assert!(engine.is_available_for_interval(&slot, &window).await);
        assert_eq!(h.ctx.stats().snapshot().fail_open_decisions, 1);
        assert_eq!(h.ctx.stats().snapshot().scan_failures, 1);
    }

    #[tokio::test]
    async fn test_read_failure_fails_open() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        h.reserve(&slot, T0 + hours(10), 2).await;
        h.ledger.set_fault(Fault::ObjectReads, true);
        let engine = AvailabilityEngine::new(h.ctx.clone());

        let check = engine
            .check(&slot, AvailabilityTarget::Interval(TimeWindow::from_hours(T0 + hours(10), 1).unwrap()))
            .await;
        assert!(check.is_free());
        assert!(check.degraded);
    }

    #[tokio::test]
    async fn test_now_status() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        let other = h.slot_at(0, 1, 100);
        h.reserve(&slot, T0, 1).await;
        let engine = AvailabilityEngine::new(h.ctx.clone());

        let report = engine
            .check_many(&[slot.clone(), other.clone()], AvailabilityTarget::Now(T0 + 1))
            .await;
        assert_eq!(report.get(&slot).status, AvailabilityStatus::Reserved);
        assert_eq!(report.get(&other).status, AvailabilityStatus::Free);
        assert!(!report.get(&other).degraded);
    }
}
