//! Write orchestration over the ledger program's entry points.
//!
//! Writes fail closed: every rejection is returned with the program's own
//! abort code. Nothing is retried. A reservation and its escrow are two
//! separate calls; what happens when only the first succeeds is governed
//! by [`OrphanPolicy`].

use park_core::reputation::Score;
use park_core::{Address, ObjectId, TimeWindow};
use park_ledger::{
    CallArg, EntityKind, EntryCall, EntryFunction, LedgerContext, LedgerError, LedgerReader,
    LedgerWriter, TxReceipt,
};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::availability::AvailabilityEngine;
use crate::config::{MarketConfig, OrphanPolicy};
use crate::error::{MarketError, Result};

/// A request to reserve a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    /// Slot to reserve.
    pub slot_id: ObjectId,
    /// Reserving driver.
    pub driver: Address,
    /// Start (ms since epoch).
    pub start_ms: u64,
    /// Duration in whole hours.
    pub duration_hours: u64,
}

/// A funded reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Booking {
    /// The reservation.
    pub reservation_id: ObjectId,
    /// The escrow holding its funds.
    pub escrow_id: ObjectId,
}

/// Outcome of a profile registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Registration {
    /// A new profile was created.
    Created {
        /// The profile.
        profile_id: ObjectId,
    },
    /// The user already had one.
    AlreadyRegistered,
}

fn created(receipt: &TxReceipt, kind: EntityKind) -> Result<ObjectId> {
    receipt.created_of(kind).cloned().ok_or_else(|| {
        MarketError::Ledger(LedgerError::Decode {
            kind: "transaction receipt",
            id: receipt.digest.clone(),
            message: format!("no {} created", kind.struct_name()),
        })
    })
}

fn text_arg(text: Option<&str>) -> CallArg {
    CallArg::Bytes(text.unwrap_or_default().as_bytes().to_vec())
}

/// Drives reservations, escrows and profiles through the ledger program.
#[derive(Debug)]
pub struct ReservationFlow<L> {
    ctx: LedgerContext<L>,
    availability: AvailabilityEngine<L>,
    orphan_policy: OrphanPolicy,
}

impl<L: LedgerReader + LedgerWriter> ReservationFlow<L> {
    /// Creates a flow.
    pub fn new(ctx: LedgerContext<L>, config: &MarketConfig) -> Self {
        Self {
            availability: AvailabilityEngine::new(ctx.clone()),
            ctx,
            orphan_policy: config.orphan_policy,
        }
    }

    async fn submit(&self, function: EntryFunction, sender: &Address, args: Vec<CallArg>) -> Result<TxReceipt> {
        let call = EntryCall::new(function, sender.clone(), args);
        let (_, name) = function.target();
        match self.ctx.ledger().submit(&call).await {
            Ok(receipt) => {
                info!(function = name, sender = %sender, digest = %receipt.digest, "transaction executed");
                Ok(receipt)
            }
            Err(e) => {
                warn!(function = name, sender = %sender, error = %e, "transaction failed");
                Err(e.into())
            }
        }
    }

    /// Reserves a slot, after checking for known conflicts.
    ///
    /// The check is the fail-open listing check; the program rejects any
    /// conflict it missed.
    ///
    /// # Errors
    ///
    /// [`MarketError::SlotUnavailable`] on a known conflict, otherwise the
    /// program's rejection.
    pub async fn create_reservation(&self, request: &ReservationRequest) -> Result<ObjectId> {
        let window = TimeWindow::from_hours(request.start_ms, request.duration_hours)?;
        if !self
            .availability
            .is_available_for_interval(&request.slot_id, &window)
            .await
        {
            info!(slot_id = %request.slot_id, start_ms = window.start_ms, end_ms = window.end_ms, "reservation refused before submission");
            return Err(MarketError::SlotUnavailable {
                slot_id: request.slot_id.to_string(),
            });
        }

        let receipt = self
            .submit(
                EntryFunction::CreateReservation,
                &request.driver,
                vec![
                    CallArg::Object(request.slot_id.clone()),
                    CallArg::U64(request.start_ms),
                    CallArg::U64(request.duration_hours),
                ],
            )
            .await?;
        created(&receipt, EntityKind::Reservation)
    }

    /// Funds a reservation.
    ///
    /// # Errors
    ///
    /// Returns the program's rejection.
    pub async fn lock_funds(
        &self,
        driver: &Address,
        reservation_id: &ObjectId,
        slot_id: &ObjectId,
        coins: Vec<ObjectId>,
    ) -> Result<ObjectId> {
        let receipt = self
            .submit(
                EntryFunction::LockFunds,
                driver,
                vec![
                    CallArg::Object(reservation_id.clone()),
                    CallArg::Object(slot_id.clone()),
                    CallArg::Objects(coins),
                ],
            )
            .await?;
        created(&receipt, EntityKind::Escrow)
    }

    /// Reserves and funds in two calls.
    ///
    /// # Errors
    ///
    /// Errors from the first call are returned as is. If the lock fails the
    /// orphan policy runs and [`MarketError::FundsNotLocked`] reports
    /// whether the reservation was cancelled.
    pub async fn reserve_and_lock(&self, request: &ReservationRequest, coins: Vec<ObjectId>) -> Result<Booking> {
        let reservation_id = self.create_reservation(request).await?;
        let lock = self
            .lock_funds(&request.driver, &reservation_id, &request.slot_id, coins)
            .await;
        let source = match lock {
            Ok(escrow_id) => {
                return Ok(Booking {
                    reservation_id,
                    escrow_id,
                });
            }
            Err(MarketError::Ledger(e)) => e,
            Err(other) => LedgerError::transient("lock_funds", other.to_string()),
        };

        let cancelled = match self.orphan_policy {
            OrphanPolicy::Cancel => match self.cancel_reservation(&request.driver, &reservation_id).await {
                Ok(_) => {
                    info!(reservation_id = %reservation_id, "unfunded reservation cancelled");
                    true
                }
                Err(e) => {
                    error!(reservation_id = %reservation_id, error = %e, "unfunded reservation could not be cancelled");
                    false
                }
            },
            OrphanPolicy::Leave => {
                warn!(reservation_id = %reservation_id, "reservation left without funds");
                false
            }
        };
        Err(MarketError::FundsNotLocked {
            reservation_id: reservation_id.to_string(),
            cancelled,
            source,
        })
    }

    /// Cancels an unfunded reservation.
    ///
    /// # Errors
    ///
    /// Returns the program's rejection.
    pub async fn cancel_reservation(&self, driver: &Address, reservation_id: &ObjectId) -> Result<TxReceipt> {
        self.submit(
            EntryFunction::CancelReservation,
            driver,
            vec![CallArg::Object(reservation_id.clone())],
        )
        .await
    }

    /// Driver check-in.
    ///
    /// # Errors
    ///
    /// Returns the program's rejection.
    pub async fn mark_used(&self, driver: &Address, escrow_id: &ObjectId) -> Result<TxReceipt> {
        self.submit(EntryFunction::MarkUsed, driver, vec![CallArg::Object(escrow_id.clone())])
            .await
    }

    /// Normal settlement.
    ///
    /// # Errors
    ///
    /// Returns the program's rejection.
    pub async fn settle(&self, sender: &Address, escrow_id: &ObjectId) -> Result<TxReceipt> {
        self.submit(EntryFunction::Settle, sender, vec![CallArg::Object(escrow_id.clone())])
            .await
    }

    /// Opens a dispute on an escrow.
    ///
    /// # Errors
    ///
    /// Returns the program's rejection.
    pub async fn open_dispute(&self, sender: &Address, escrow_id: &ObjectId, reason: Option<&str>) -> Result<TxReceipt> {
        self.submit(
            EntryFunction::OpenDispute,
            sender,
            vec![CallArg::Object(escrow_id.clone()), text_arg(reason)],
        )
        .await
    }

    /// Arbiter ruling.
    ///
    /// # Errors
    ///
    /// Returns the program's rejection.
    pub async fn decide_dispute(&self, arbiter: &Address, escrow_id: &ObjectId, favor_driver: bool) -> Result<TxReceipt> {
        self.submit(
            EntryFunction::DecideDispute,
            arbiter,
            vec![CallArg::Object(escrow_id.clone()), CallArg::Bool(favor_driver)],
        )
        .await
    }

    /// Creates the caller's profile. An existing profile is not an error.
    ///
    /// # Errors
    ///
    /// Returns any other rejection.
    pub async fn register_profile(&self, user: &Address, display_name: Option<&str>) -> Result<Registration> {
        match self
            .submit(EntryFunction::RegisterProfile, user, vec![text_arg(display_name)])
            .await
        {
            Ok(receipt) => Ok(Registration::Created {
                profile_id: created(&receipt, EntityKind::Profile)?,
            }),
            Err(MarketError::Ledger(e)) if e.is_already_registered() => {
                info!(user = %user, "profile already registered");
                Ok(Registration::AlreadyRegistered)
            }
            Err(e) => Err(e),
        }
    }

    /// Rates another user (basis points, 0 to 10000).
    ///
    /// # Errors
    ///
    /// [`MarketError::InvalidInput`] for an out-of-range rating, otherwise
    /// the program's rejection.
    pub async fn rate_user(&self, rater: &Address, target: &Address, rating_bps: u64) -> Result<TxReceipt> {
        if rating_bps > Score::MAX.bps() {
            return Err(MarketError::invalid(format!(
                "rating must be between 0 and {}",
                Score::MAX.bps()
            )));
        }
        self.submit(
            EntryFunction::RateUser,
            rater,
            vec![CallArg::Address(target.clone()), CallArg::U64(rating_bps)],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, T0, arbiter, driver, hours, owner};
    use park_core::{EscrowState, Reservation, ReservationState};
    use park_ledger::error::abort;
    use park_ledger::{Fault, SimulatedLedger};

    fn flow(h: &Harness, policy: OrphanPolicy) -> ReservationFlow<SimulatedLedger> {
        ReservationFlow::new(h.ctx.clone(), &MarketConfig::default().with_orphan_policy(policy))
    }

    fn request(slot_id: &ObjectId, start_ms: u64, duration_hours: u64) -> ReservationRequest {
        ReservationRequest {
            slot_id: slot_id.clone(),
            driver: driver(),
            start_ms,
            duration_hours,
        }
    }

    fn coins() -> Vec<ObjectId> {
        vec![ObjectId::parse("0xc0").unwrap()]
    }

    async fn state_of(h: &Harness, id: &ObjectId) -> ReservationState {
        h.ctx.resolver().resolve::<Reservation>(id).await.unwrap().unwrap().state
    }

    #[tokio::test]
    async fn test_preflight_refuses_known_conflict() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        h.reserve(&slot, T0 + hours(10), 2).await;
        let flow = flow(&h, OrphanPolicy::Cancel);

        let err = flow.create_reservation(&request(&slot, T0 + hours(11), 2)).await.unwrap_err();
        assert!(matches!(err, MarketError::SlotUnavailable { .. }));
        flow.create_reservation(&request(&slot, T0 + hours(12), 2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_program_rejects_conflict_the_preflight_missed() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        h.reserve(&slot, T0 + hours(10), 2).await;
        let flow = flow(&h, OrphanPolicy::Cancel);
        h.ledger.set_fault(Fault::EventQueries, true);

        let err = flow.create_reservation(&request(&slot, T0 + hours(11), 2)).await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::Ledger(LedgerError::Rejected { code: abort::SLOT_UNAVAILABLE, .. })
        ));
    }

    #[tokio::test]
    async fn test_reserve_and_lock() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        let booking = flow(&h, OrphanPolicy::Cancel)
            .reserve_and_lock(&request(&slot, T0 + hours(1), 1), coins())
            .await
            .unwrap();
        let escrow = h
            .ctx
            .resolver()
            .resolve::<park_core::Escrow>(&booking.escrow_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(escrow.reservation_id, booking.reservation_id);
        assert_eq!(escrow.state, EscrowState::Locked);
    }

    fn orphan(err: &MarketError) -> Option<(ObjectId, bool)> {
        match err {
            MarketError::FundsNotLocked {
                reservation_id,
                cancelled,
                ..
            } => Some((ObjectId::parse(reservation_id).ok()?, *cancelled)),
            _ => None,
        }
    }

    #[tokio::test]
    async fn test_failed_lock_cancels_under_cancel_policy() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        let err = flow(&h, OrphanPolicy::Cancel)
            .reserve_and_lock(&request(&slot, T0 + hours(1), 1), Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            &err,
            MarketError::FundsNotLocked {
                source: LedgerError::Rejected { code: abort::INSUFFICIENT_FUNDS, .. },
                ..
            }
        ));
        let (id, cancelled) = orphan(&err).unwrap();
        assert!(cancelled);
        assert_eq!(state_of(&h, &id).await, ReservationState::Cancelled);

        // The slot is free again.
        flow(&h, OrphanPolicy::Cancel)
            .create_reservation(&request(&slot, T0 + hours(1), 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_lock_leaves_reservation_under_leave_policy() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        let err = flow(&h, OrphanPolicy::Leave)
            .reserve_and_lock(&request(&slot, T0 + hours(1), 1), Vec::new())
            .await
            .unwrap_err();
        let (id, cancelled) = orphan(&err).unwrap();
        assert!(!cancelled);
        assert_eq!(state_of(&h, &id).await, ReservationState::Requested);
    }

    #[tokio::test]
    async fn test_register_twice_is_success_equivalent() {
        let h = Harness::new();
        let flow = flow(&h, OrphanPolicy::Cancel);
        let first = flow.register_profile(&owner(), Some("Ana")).await.unwrap();
        assert!(matches!(first, Registration::Created { .. }));
        let second = flow.register_profile(&owner(), Some("Ana")).await.unwrap();
        assert_eq!(second, Registration::AlreadyRegistered);
    }

    #[tokio::test]
    async fn test_out_of_range_rating_is_refused_locally() {
        let h = Harness::new();
        let flow = flow(&h, OrphanPolicy::Cancel);
        let err = flow.rate_user(&driver(), &owner(), 10_001).await.unwrap_err();
        assert!(matches!(err, MarketError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_dispute_ruled_for_driver() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        let flow = flow(&h, OrphanPolicy::Cancel);
        let booking = flow
            .reserve_and_lock(&request(&slot, T0 + hours(1), 1), coins())
            .await
            .unwrap();

        flow.open_dispute(&driver(), &booking.escrow_id, Some("gate locked")).await.unwrap();
        let not_arbiter = flow.decide_dispute(&owner(), &booking.escrow_id, false).await.unwrap_err();
        assert!(matches!(
            not_arbiter,
            MarketError::Ledger(LedgerError::Rejected { code: abort::NOT_AUTHORIZED, .. })
        ));
        flow.decide_dispute(&arbiter(), &booking.escrow_id, true).await.unwrap();
        assert_eq!(state_of(&h, &booking.reservation_id).await, ReservationState::Disputed);
    }

    #[tokio::test]
    async fn test_settlement_path() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        let flow = flow(&h, OrphanPolicy::Cancel);
        let booking = flow
            .reserve_and_lock(&request(&slot, T0 + hours(1), 1), coins())
            .await
            .unwrap();
        flow.mark_used(&driver(), &booking.escrow_id).await.unwrap();
        flow.settle(&owner(), &booking.escrow_id).await.unwrap();
        assert_eq!(state_of(&h, &booking.reservation_id).await, ReservationState::Completed);
        assert!(flow.settle(&owner(), &booking.escrow_id).await.is_err());
    }
}
