//! The marketplace query surface.
//!
//! Set-level questions ("free slots near here tomorrow morning") are
//! rebuilt from what the ledger offers: a creation-event scan for
//! candidate identifiers, one object read per candidate, then local
//! filtering by distance and interval. Listing reads fail open through
//! [`AvailabilityEngine`]; a failed candidate scan is an error, never an
//! empty result.

use std::collections::{BTreeMap, HashMap};

use futures::stream::{self, StreamExt};
use park_core::ranking::rank;
use park_core::window::now_ms;
use park_core::{
    Address, Candidate, Escrow, GeoPoint, ObjectId, PriceQuote, Ranking, RankingCriteria,
    Reservation, Score, Slot, TimeWindow, UserProfile,
};
use park_ledger::indexer::{any_event, field_is};
use park_ledger::{EventKind, LedgerContext, LedgerReader, OwnerCap, ReadStatsSnapshot};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::availability::{AvailabilityCheck, AvailabilityEngine, AvailabilityTarget};
use crate::config::MarketConfig;
use crate::error::{MarketError, Result};
use crate::pricing::PricingService;
use crate::reputation::{ProfileDirectory, ReputationLookup};

/// Source of "now" in ledger milliseconds.
pub type Clock = fn() -> u64;

/// A location-bounded slot query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlotQuery {
    /// Search origin.
    pub center: GeoPoint,
    /// Radius in meters; the configured default when absent.
    pub radius_m: Option<f64>,
    /// Requested interval; "now" when absent.
    pub window: Option<TimeWindow>,
    /// Drop slots that are not free.
    pub available_only: bool,
}

impl SlotQuery {
    /// Query around `center` with default radius, evaluated now.
    #[must_use]
    pub const fn near(center: GeoPoint) -> Self {
        Self {
            center,
            radius_m: None,
            window: None,
            available_only: false,
        }
    }

    /// Sets the radius.
    #[must_use]
    pub const fn with_radius(mut self, meters: f64) -> Self {
        self.radius_m = Some(meters);
        self
    }

    /// Evaluates availability for `window` instead of now.
    #[must_use]
    pub const fn with_window(mut self, window: TimeWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Keeps only free slots.
    #[must_use]
    pub const fn available_only(mut self, yes: bool) -> Self {
        self.available_only = yes;
        self
    }
}

/// A slot as shown in search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotListing {
    /// The slot.
    #[serde(flatten)]
    pub slot: Slot,
    /// Distance from the query origin (meters).
    pub distance_m: f64,
    /// Availability for the queried time.
    pub availability: AvailabilityCheck,
    /// Quote for the queried duration.
    pub quote: PriceQuote,
}

/// Result of a slot search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SlotSearch {
    /// Matching slots, nearest first.
    pub slots: Vec<SlotListing>,
    /// Candidates or reservations older than the scan window may be missing.
    pub possibly_incomplete: bool,
    /// Some reads failed; results were computed from what could be read.
    pub degraded: bool,
}

/// Reservations with a completeness flag.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReservationList {
    /// Reservations, latest start first.
    pub reservations: Vec<Reservation>,
    /// Some reservations may be missing.
    pub possibly_incomplete: bool,
}

/// Ranked recommendations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    /// Ranking over free candidates.
    #[serde(flatten)]
    pub ranking: Ranking,
    /// See [`SlotSearch::possibly_incomplete`].
    pub possibly_incomplete: bool,
    /// See [`SlotSearch::degraded`].
    pub degraded: bool,
}

/// Read-side entry point of the marketplace.
#[derive(Debug)]
pub struct Marketplace<L> {
    ctx: LedgerContext<L>,
    config: MarketConfig,
    availability: AvailabilityEngine<L>,
    pricing: PricingService<L>,
    profiles: ProfileDirectory<L>,
    clock: Clock,
}

impl<L: LedgerReader> Marketplace<L> {
    /// Creates a marketplace over a ledger context.
    pub fn new(ctx: LedgerContext<L>, config: MarketConfig) -> Self {
        Self {
            availability: AvailabilityEngine::new(ctx.clone()),
            pricing: PricingService::new(ctx.clone()),
            profiles: ProfileDirectory::new(ctx.clone()),
            ctx,
            config,
            clock: now_ms,
        }
    }

    /// Replaces the wall clock.
    #[must_use]
    pub const fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// The ledger context.
    pub const fn context(&self) -> &LedgerContext<L> {
        &self.ctx
    }

    /// Marketplace settings.
    pub const fn config(&self) -> &MarketConfig {
        &self.config
    }

    /// Current time according to the configured clock.
    pub fn now_ms(&self) -> u64 {
        (self.clock)()
    }

    /// Read-path counters.
    pub fn stats(&self) -> ReadStatsSnapshot {
        self.ctx.stats().snapshot()
    }

    /// The availability engine.
    pub const fn availability(&self) -> &AvailabilityEngine<L> {
        &self.availability
    }

    fn radius(&self, query: &SlotQuery) -> Result<f64> {
        let radius = query.radius_m.unwrap_or(self.config.default_radius_m);
        if !radius.is_finite() || radius <= 0.0 {
            return Err(MarketError::invalid("radius must be a positive number of meters"));
        }
        if radius > self.config.max_radius_m {
            return Err(MarketError::invalid(format!(
                "radius may not exceed {} meters",
                self.config.max_radius_m
            )));
        }
        Ok(radius)
    }

    /// Slots within the query radius, annotated with distance, availability
    /// and a quote.
    ///
    /// Without a window, availability is evaluated at the current instant
    /// and the quote covers the default duration. With one, the interval
    /// overlap rule applies and the quote covers the window's billable hours.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid radius or when the candidate scan
    /// fails.
    pub async fn query_slots_near(&self, query: &SlotQuery) -> Result<SlotSearch> {
        let radius = self.radius(query)?;
        let scan = self
            .ctx
            .indexer()
            .find_identifiers(EventKind::SlotCreated, any_event)
            .await?;
        let batch = self.ctx.resolver().resolve_many::<Slot>(&scan.ids).await;
        let mut degraded = !batch.failed.is_empty();
        for (id, e) in &batch.failed {
            warn!(slot_id = %id, error = %e, "slot read failed; leaving it out");
        }

        let nearby: Vec<(Slot, f64)> = batch
            .resolved
            .into_iter()
            .filter_map(|slot| {
                let distance = query.center.distance_to(slot.location);
                (distance <= radius).then_some((slot, distance))
            })
            .collect();

        let target = query
            .window
            .map_or_else(|| AvailabilityTarget::Now(self.now_ms()), AvailabilityTarget::Interval);
        let ids: Vec<ObjectId> = nearby.iter().map(|(s, _)| s.id.clone()).collect();
        let report = if ids.is_empty() {
            Default::default()
        } else {
            self.availability.check_many(&ids, target).await
        };

        let kept: Vec<(Slot, f64, AvailabilityCheck)> = nearby
            .into_iter()
            .map(|(slot, distance)| {
                let check = report.get(&slot.id);
                (slot, distance, check)
            })
            .filter(|(_, _, check)| !query.available_only || check.is_free())
            .collect();
        degraded |= kept.iter().any(|(_, _, check)| check.degraded);

        let hours = query
            .window
            .map_or(self.config.default_quote_hours, |w| w.billable_hours());
        let pricing = &self.pricing;
        let mut slots: Vec<SlotListing> = stream::iter(kept)
            .map(|(slot, distance_m, availability)| async move {
                let quote = pricing.quote(&slot, hours).await;
                SlotListing {
                    slot,
                    distance_m,
                    availability,
                    quote,
                }
            })
            .buffered(self.ctx.resolver_config().max_in_flight)
            .collect()
            .await;
        slots.sort_by(|a, b| {
            a.distance_m
                .total_cmp(&b.distance_m)
                .then_with(|| a.slot.id.cmp(&b.slot.id))
        });

        let possibly_incomplete = scan.possibly_incomplete || report.possibly_incomplete;
        debug!(
            candidates = scan.ids.len(),
            returned = slots.len(),
            radius_m = radius,
            possibly_incomplete,
            degraded,
            "slot query answered"
        );
        Ok(SlotSearch {
            slots,
            possibly_incomplete,
            degraded,
        })
    }

    /// One slot.
    ///
    /// # Errors
    ///
    /// [`MarketError::NotFound`] if absent or undecodable.
    pub async fn get_slot(&self, slot_id: &ObjectId) -> Result<Slot> {
        self.ctx
            .resolver()
            .resolve::<Slot>(slot_id)
            .await?
            .ok_or_else(|| MarketError::not_found("slot", slot_id))
    }

    /// Slots controlled by `owner`, found through their capability objects.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the capability listing fails.
    pub async fn slots_by_owner(&self, owner: &Address) -> Result<Vec<Slot>> {
        let resolver = self.ctx.resolver();
        let caps = resolver.owned_by::<OwnerCap>(owner).await?;
        let ids: Vec<ObjectId> = caps.into_iter().map(|cap| cap.slot_id).collect();
        let batch = resolver.resolve_many::<Slot>(&ids).await;
        if !batch.is_complete() {
            warn!(
                owner = %owner,
                missing = batch.missing.len(),
                failed = batch.failed.len(),
                "some owned slots could not be read"
            );
        }
        Ok(batch.resolved)
    }

    /// Quote for `hours` on a slot.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid duration or an unknown slot.
    pub async fn quote(&self, slot_id: &ObjectId, hours: u64) -> Result<PriceQuote> {
        park_core::window::validate_duration(hours)?;
        let slot = self.get_slot(slot_id).await?;
        Ok(self.pricing.quote(&slot, hours).await)
    }

    /// Demand coefficient of a zone, from the ledger program.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the program cannot be asked.
    pub async fn demand_factor(&self, zone_id: &ObjectId) -> Result<u64> {
        Ok(self.pricing.demand_factor(zone_id).await?)
    }

    /// One reservation.
    ///
    /// # Errors
    ///
    /// [`MarketError::NotFound`] if absent.
    pub async fn reservation(&self, reservation_id: &ObjectId) -> Result<Reservation> {
        self.ctx
            .resolver()
            .resolve::<Reservation>(reservation_id)
            .await?
            .ok_or_else(|| MarketError::not_found("reservation", reservation_id))
    }

    /// Reservations where `user` is driver or owner.
    ///
    /// Drivers own their reservations, owners do not, and the event scan is
    /// bounded, so neither source is complete alone. Both are read and the
    /// union is returned.
    ///
    /// # Errors
    ///
    /// Returns an error only when both sources fail.
    pub async fn reservations_for_user(&self, user: &Address) -> Result<ReservationList> {
        let resolver = self.ctx.resolver();
        let indexer = self.ctx.indexer();
        let who = user.as_str();
        let (owned, scan) = futures::join!(
            resolver.owned_by::<Reservation>(user),
            indexer.find_identifiers(EventKind::ReservationCreated, |e| {
                field_is(e, "driver", who) || field_is(e, "owner", who)
            }),
        );

        let mut by_id: BTreeMap<ObjectId, Reservation> = BTreeMap::new();
        let mut possibly_incomplete = false;
        let owned_error = match owned {
            Ok(reservations) => {
                by_id.extend(reservations.into_iter().map(|r| (r.id.clone(), r)));
                None
            }
            Err(e) => {
                warn!(user = %user, error = %e, "owned reservation listing failed");
                possibly_incomplete = true;
                Some(e)
            }
        };

        match scan {
            Ok(scan) => {
                possibly_incomplete |= scan.possibly_incomplete;
                let unseen: Vec<ObjectId> = scan
                    .ids
                    .into_iter()
                    .filter(|id| !by_id.contains_key(id))
                    .collect();
                let batch = resolver.resolve_many::<Reservation>(&unseen).await;
                possibly_incomplete |= !batch.failed.is_empty();
                by_id.extend(batch.resolved.into_iter().map(|r| (r.id.clone(), r)));
            }
            Err(e) => match owned_error {
                Some(_) => return Err(e.into()),
                None => {
                    warn!(user = %user, error = %e, "reservation scan failed; returning owned reservations only");
                    possibly_incomplete = true;
                }
            },
        }

        let mut reservations: Vec<Reservation> = by_id
            .into_values()
            .filter(|r| &r.driver == user || &r.owner == user)
            .collect();
        reservations.sort_by(|a, b| b.start_time_ms.cmp(&a.start_time_ms));
        Ok(ReservationList {
            reservations,
            possibly_incomplete,
        })
    }

    /// Reservations referencing a slot.
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the scan fails.
    pub async fn reservations_for_slot(&self, slot_id: &ObjectId) -> Result<ReservationList> {
        let mut found = self
            .availability
            .reservations_for(std::slice::from_ref(slot_id))
            .await?;
        let mut reservations = found.by_slot.remove(slot_id).unwrap_or_default();
        reservations.sort_by(|a, b| b.start_time_ms.cmp(&a.start_time_ms));
        Ok(ReservationList {
            reservations,
            possibly_incomplete: found.possibly_incomplete || found.read_failures > 0,
        })
    }

    /// One escrow.
    ///
    /// # Errors
    ///
    /// [`MarketError::NotFound`] if absent.
    pub async fn escrow(&self, escrow_id: &ObjectId) -> Result<Escrow> {
        self.ctx
            .resolver()
            .resolve::<Escrow>(escrow_id)
            .await?
            .ok_or_else(|| MarketError::not_found("escrow", escrow_id))
    }

    /// The escrow funding a reservation.
    ///
    /// Uses the reservation's escrow reference, falling back to the lock
    /// events when a node served the reservation before the reference was
    /// written.
    ///
    /// # Errors
    ///
    /// [`MarketError::NotFound`] if the reservation is unknown or unfunded.
    pub async fn escrow_for_reservation(&self, reservation_id: &ObjectId) -> Result<Escrow> {
        let reservation = self.reservation(reservation_id).await?;
        if let Some(escrow_id) = &reservation.escrow_id {
            return self.escrow(escrow_id).await;
        }

        let scan = self
            .ctx
            .indexer()
            .find_identifiers(EventKind::EscrowLocked, |e| {
                field_is(e, "reservation_id", reservation_id.as_str())
            })
            .await?;
        for id in &scan.ids {
            if let Some(escrow) = self.ctx.resolver().resolve::<Escrow>(id).await? {
                if &escrow.reservation_id == reservation_id {
                    debug!(reservation_id = %reservation_id, escrow_id = %escrow.id, "escrow found through lock events");
                    return Ok(escrow);
                }
            }
        }
        Err(MarketError::not_found("escrow", reservation_id))
    }

    /// Availability of a slot at this instant.
    ///
    /// # Errors
    ///
    /// [`MarketError::NotFound`] if the slot is unknown.
    pub async fn slot_status_now(&self, slot_id: &ObjectId) -> Result<AvailabilityCheck> {
        self.get_slot(slot_id).await?;
        Ok(self
            .availability
            .check(slot_id, AvailabilityTarget::Now(self.now_ms()))
            .await)
    }

    /// A user's profile.
    ///
    /// # Errors
    ///
    /// [`MarketError::NotFound`] if the user never registered.
    pub async fn profile(&self, user: &Address) -> Result<UserProfile> {
        self.profiles
            .profile(user)
            .await?
            .ok_or_else(|| MarketError::not_found("profile", user))
    }

    /// Reputation annotation for an owner; never fails.
    pub async fn owner_reputation(&self, owner: &Address) -> ReputationLookup {
        self.profiles.reputation(owner).await
    }

    /// Free slots matching `query`, ranked.
    ///
    /// Owner reputation is looked up once per distinct owner; owners whose
    /// lookup fails rank with a neutral score.
    ///
    /// # Errors
    ///
    /// As [`Self::query_slots_near`].
    pub async fn recommend_slots(&self, query: &SlotQuery, criteria: &RankingCriteria) -> Result<Recommendation> {
        let search = self.query_slots_near(&query.available_only(true)).await?;

        let mut owners: Vec<Address> = search.slots.iter().map(|l| l.slot.owner.clone()).collect();
        owners.sort();
        owners.dedup();
        let profiles = &self.profiles;
        let scores: HashMap<Address, Option<Score>> = stream::iter(owners)
            .map(|owner| async move {
                let score = profiles.reputation(&owner).await.summary().map(|s| s.score);
                (owner, score)
            })
            .buffered(self.ctx.resolver_config().max_in_flight)
            .collect()
            .await;

        let candidates = search
            .slots
            .iter()
            .map(|listing| Candidate {
                slot_id: listing.slot.id.clone(),
                distance_m: listing.distance_m,
                price: listing.quote.price,
                owner_score: scores.get(&listing.slot.owner).copied().flatten(),
            })
            .collect();
        let ranking = rank(candidates, criteria);
        info!(
            mode = %criteria.mode,
            candidates = search.slots.len(),
            recommended = ranking.recommended.len(),
            "recommendations ranked"
        );
        Ok(Recommendation {
            ranking,
            possibly_incomplete: search.possibly_incomplete,
            degraded: search.degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Harness, T0, driver, fixed_now, hours, owner};
    use park_core::{AvailabilityStatus, RankMode};
    use park_ledger::Fault;

    fn market(h: &Harness) -> Marketplace<park_ledger::SimulatedLedger> {
        Marketplace::new(h.ctx.clone(), MarketConfig::default()).with_clock(fixed_now)
    }

    fn origin() -> GeoPoint {
        GeoPoint::from_micro(0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_query_filters_by_radius_and_sorts_by_distance() {
        let h = Harness::new();
        let far = h.slot_at(10_000, 0, 100);
        let near = h.slot_at(1_000, 0, 100);
        h.slot_at(30_000, 0, 100);

        let search = market(&h).query_slots_near(&SlotQuery::near(origin())).await.unwrap();
        let ids: Vec<&ObjectId> = search.slots.iter().map(|l| &l.slot.id).collect();
        assert_eq!(ids, vec![&near, &far]);
        assert!(search.slots[0].distance_m < search.slots[1].distance_m);
        assert!(!search.possibly_incomplete);
        assert!(!search.degraded);
    }

    #[tokio::test]
    async fn test_interval_query_excludes_overlap_and_keeps_touching() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        h.reserve(&slot, T0 + hours(10), 2).await;
        let market = market(&h);

        let overlapping = TimeWindow::from_hours(T0 + hours(11), 2).unwrap();
        let query = SlotQuery::near(origin()).with_window(overlapping).available_only(true);
        assert!(market.query_slots_near(&query).await.unwrap().slots.is_empty());

        let touching = TimeWindow::from_hours(T0 + hours(12), 2).unwrap();
        let query = SlotQuery::near(origin()).with_window(touching).available_only(true);
        let search = market.query_slots_near(&query).await.unwrap();
        assert_eq!(search.slots.len(), 1);
        assert_eq!(search.slots[0].quote.duration_hours, 2);
    }

    #[tokio::test]
    async fn test_candidate_scan_failure_is_an_error() {
        let h = Harness::new();
        h.slot_at(0, 0, 100);
        h.ledger.set_fault(Fault::EventQueries, true);
        let result = market(&h).query_slots_near(&SlotQuery::near(origin())).await;
        assert!(matches!(result, Err(MarketError::Ledger(e)) if e.is_transient()));
    }

    #[tokio::test]
    async fn test_invalid_radius() {
        let h = Harness::new();
        let market = market(&h);
        for radius in [0.0, -5.0, f64::NAN, 1_000_000.0] {
            let query = SlotQuery::near(origin()).with_radius(radius);
            assert!(matches!(
                market.query_slots_near(&query).await,
                Err(MarketError::InvalidInput(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_status_now() {
        let h = Harness::new();
        let busy = h.slot_at(0, 0, 100);
        let idle = h.slot_at(0, 10, 100);
        h.reserve(&busy, T0 - hours(1), 2).await;
        let market = market(&h);

        assert_eq!(market.slot_status_now(&busy).await.unwrap().status, AvailabilityStatus::Reserved);
        assert_eq!(market.slot_status_now(&idle).await.unwrap().status, AvailabilityStatus::Free);
        let unknown = ObjectId::parse("0x404").unwrap();
        assert!(matches!(market.slot_status_now(&unknown).await, Err(MarketError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_slots_by_owner_uses_capabilities() {
        let h = Harness::new();
        let a = h.slot_at(0, 0, 100);
        let b = h.slot_at(0, 10, 100);
        let mut slots: Vec<ObjectId> = market(&h)
            .slots_by_owner(&owner())
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        slots.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(slots, expected);
        assert!(market(&h).slots_by_owner(&driver()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_reservations_for_user_unions_sources() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        h.reserve(&slot, T0 + hours(1), 1).await;
        h.reserve(&slot, T0 + hours(5), 1).await;
        let market = market(&h);

        let as_driver = market.reservations_for_user(&driver()).await.unwrap();
        assert_eq!(as_driver.reservations.len(), 2);
        assert!(as_driver.reservations[0].start_time_ms > as_driver.reservations[1].start_time_ms);

        let as_owner = market.reservations_for_user(&owner()).await.unwrap();
        assert_eq!(as_owner.reservations.len(), 2);

        h.ledger.set_fault(Fault::EventQueries, true);
        let owned_only = market.reservations_for_user(&driver()).await.unwrap();
        assert_eq!(owned_only.reservations.len(), 2);
        assert!(owned_only.possibly_incomplete);
    }

    #[tokio::test]
    async fn test_escrow_for_reservation() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 1_000);
        let reservation = h.reserve(&slot, T0 + hours(1), 2).await;
        let market = market(&h);
        assert!(matches!(
            market.escrow_for_reservation(&reservation).await,
            Err(MarketError::NotFound { kind: "escrow", .. })
        ));

        let escrow_id = h.lock(&reservation, &slot).await;
        let escrow = market.escrow_for_reservation(&reservation).await.unwrap();
        assert_eq!(escrow.id, escrow_id);
        assert_eq!(escrow.payment, 2_000);
    }

    #[tokio::test]
    async fn test_quote_rejects_zero_hours() {
        let h = Harness::new();
        let slot = h.slot_at(0, 0, 100);
        assert!(matches!(market(&h).quote(&slot, 0).await, Err(MarketError::InvalidInput(_))));
        assert_eq!(market(&h).quote(&slot, 3).await.unwrap().price, 300);
    }

    #[tokio::test]
    async fn test_recommend_closest() {
        let h = Harness::new();
        let near = h.slot_at(1_000, 0, 500);
        let cheap = h.slot_at(9_000, 0, 100);
        let market = market(&h);

        let closest = market
            .recommend_slots(&SlotQuery::near(origin()), &RankingCriteria::new(RankMode::Closest))
            .await
            .unwrap();
        assert_eq!(closest.ranking.best().unwrap().slot_id, near);

        let cheapest = market
            .recommend_slots(&SlotQuery::near(origin()), &RankingCriteria::new(RankMode::Cheapest).with_limit(1))
            .await
            .unwrap();
        assert_eq!(cheapest.ranking.recommended, vec![cheap]);
        assert!(cheapest.ranking.has_more);
    }
}
