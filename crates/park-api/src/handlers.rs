//! HTTP request handlers.
//!
//! Identities are taken from the request body. Signing is done by the
//! caller's wallet; these endpoints only orchestrate.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use park_core::{
    Address, AvailabilityStatus, Escrow, GeoPoint, ObjectId, PriceQuote, RankMode, RankingCriteria,
    Reservation, Slot, TimeWindow,
};
use park_ledger::{ReadStatsSnapshot, TxReceipt};
use park_market::{
    Recommendation, Registration, ReputationLookup, ReservationList, ReservationRequest, SlotQuery,
    SlotSearch,
};
use serde::{Deserialize, Serialize};

use crate::envelope::{Envelope, ok};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

type Reply<T> = ApiResult<Json<Envelope<T>>>;

fn parse_id(kind: &str, raw: &str) -> ApiResult<ObjectId> {
    ObjectId::parse(raw).map_err(|_| ApiError::invalid(format!("invalid {kind} id: {raw}")))
}

fn parse_address(raw: &str) -> ApiResult<Address> {
    Address::parse(raw).map_err(|_| ApiError::invalid(format!("invalid address: {raw}")))
}

fn parse_coins(raw: &[String]) -> ApiResult<Vec<ObjectId>> {
    raw.iter().map(|c| parse_id("coin", c)).collect()
}

fn center(lat: Option<f64>, lng: Option<f64>) -> ApiResult<GeoPoint> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Ok(GeoPoint::from_degrees(lat, lng)?),
        _ => Err(ApiError::invalid("lat and lng are required")),
    }
}

fn window(start: Option<u64>, end: Option<u64>) -> ApiResult<Option<TimeWindow>> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => Ok(Some(TimeWindow::new(start, end)?)),
        _ => Err(ApiError::invalid("start and end must be given together")),
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthBody {
    /// Status message.
    pub status: &'static str,
    /// Ledger backend in use.
    pub backend: &'static str,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Server time.
    pub time: String,
    /// Read-path counters.
    pub stats: ReadStatsSnapshot,
}

/// Handle GET /api/health.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<Envelope<HealthBody>> {
    ok(HealthBody {
        status: "ok",
        backend: state.backend(),
        uptime_secs: state.uptime_secs(),
        time: Utc::now().to_rfc3339(),
        stats: state.market().stats(),
    })
}

/// Query parameters for slot search.
#[derive(Debug, Deserialize)]
pub struct SlotsParams {
    /// Latitude in degrees.
    pub lat: Option<f64>,
    /// Longitude in degrees.
    pub lng: Option<f64>,
    /// Radius in meters.
    pub radius: Option<f64>,
    /// Only return free slots.
    #[serde(default)]
    pub available_only: bool,
    /// Interval start (ms since epoch).
    pub start: Option<u64>,
    /// Interval end (ms since epoch).
    pub end: Option<u64>,
}

fn slot_query(lat: Option<f64>, lng: Option<f64>, radius: Option<f64>, window: Option<TimeWindow>) -> ApiResult<SlotQuery> {
    let mut query = SlotQuery::near(center(lat, lng)?);
    query.radius_m = radius;
    query.window = window;
    Ok(query)
}

/// Handle GET /api/slots.
pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    params: Result<Query<SlotsParams>, QueryRejection>,
) -> Reply<SlotSearch> {
    let Query(params) = params?;
    let window = window(params.start, params.end)?;
    let query = slot_query(params.lat, params.lng, params.radius, window)?.available_only(params.available_only);
    Ok(ok(state.market().query_slots_near(&query).await?))
}

/// Query parameters for recommendations.
#[derive(Debug, Deserialize)]
pub struct RecommendParams {
    /// Latitude in degrees.
    pub lat: Option<f64>,
    /// Longitude in degrees.
    pub lng: Option<f64>,
    /// Radius in meters.
    pub radius: Option<f64>,
    /// Interval start (ms since epoch).
    pub start: Option<u64>,
    /// Interval end (ms since epoch).
    pub end: Option<u64>,
    /// `balanced`, `closest` or `cheapest`.
    pub mode: Option<String>,
    /// Highest acceptable total price.
    pub max_price: Option<u64>,
    /// Number of recommendations.
    pub limit: Option<usize>,
}

/// Handle GET /api/slots/recommend.
pub async fn recommend_slots(
    State(state): State<Arc<AppState>>,
    params: Result<Query<RecommendParams>, QueryRejection>,
) -> Reply<Recommendation> {
    let Query(params) = params?;
    let window = window(params.start, params.end)?;
    let query = slot_query(params.lat, params.lng, params.radius, window)?;

    let mode: RankMode = params.mode.as_deref().map(str::parse).transpose()?.unwrap_or_default();
    let mut criteria = RankingCriteria::new(mode);
    if let Some(max_price) = params.max_price {
        criteria = criteria.with_max_price(max_price);
    }
    if let Some(limit) = params.limit {
        criteria = criteria.with_limit(limit);
    }
    Ok(ok(state.market().recommend_slots(&query, &criteria).await?))
}

/// A single slot.
#[derive(Debug, Serialize)]
pub struct SlotBody {
    /// The slot.
    pub slot: Slot,
}

/// Handle GET /api/slots/{id}.
pub async fn get_slot(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Reply<SlotBody> {
    let slot_id = parse_id("slot", &id)?;
    let slot = state.market().get_slot(&slot_id).await?;
    Ok(ok(SlotBody { slot }))
}

/// Current availability of a slot.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    /// Slot checked.
    pub slot_id: ObjectId,
    /// Derived status.
    pub status: AvailabilityStatus,
    /// The answer assumed "free" because reads failed.
    pub degraded: bool,
}

/// Handle GET /api/slots/{id}/status.
pub async fn slot_status(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Reply<StatusBody> {
    let slot_id = parse_id("slot", &id)?;
    let check = state.market().slot_status_now(&slot_id).await?;
    Ok(ok(StatusBody {
        slot_id,
        status: check.status,
        degraded: check.degraded,
    }))
}

/// Query parameters for a quote.
#[derive(Debug, Deserialize)]
pub struct QuoteParams {
    /// Duration in whole hours.
    pub hours: Option<u64>,
}

/// A price quote.
#[derive(Debug, Serialize)]
pub struct QuoteBody {
    /// The quote.
    pub quote: PriceQuote,
}

/// Handle GET /api/slots/{id}/quote.
pub async fn quote(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    params: Result<Query<QuoteParams>, QueryRejection>,
) -> Reply<QuoteBody> {
    let Query(params) = params?;
    let slot_id = parse_id("slot", &id)?;
    let hours = params.hours.unwrap_or(state.market().config().default_quote_hours);
    let quote = state.market().quote(&slot_id, hours).await?;
    Ok(ok(QuoteBody { quote }))
}

/// Handle GET /api/slots/{id}/reservations.
pub async fn slot_reservations(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply<ReservationList> {
    let slot_id = parse_id("slot", &id)?;
    Ok(ok(state.market().reservations_for_slot(&slot_id).await?))
}

/// Slots of one owner.
#[derive(Debug, Serialize)]
pub struct SlotsBody {
    /// The slots.
    pub slots: Vec<Slot>,
}

/// Handle GET /api/owners/{address}/slots.
pub async fn owner_slots(State(state): State<Arc<AppState>>, Path(address): Path<String>) -> Reply<SlotsBody> {
    let owner = parse_address(&address)?;
    let slots = state.market().slots_by_owner(&owner).await?;
    Ok(ok(SlotsBody { slots }))
}

/// Handle GET /api/users/{address}/reservations.
pub async fn user_reservations(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Reply<ReservationList> {
    let user = parse_address(&address)?;
    Ok(ok(state.market().reservations_for_user(&user).await?))
}

/// Reputation annotation.
#[derive(Debug, Serialize)]
pub struct ReputationBody {
    /// User looked up.
    pub address: Address,
    /// Outcome.
    pub reputation: ReputationLookup,
}

/// Handle GET /api/users/{address}/reputation.
///
/// Lookup failures are reported inside a successful envelope as
/// `"status": "unavailable"`.
pub async fn user_reputation(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
) -> Reply<ReputationBody> {
    let address = parse_address(&address)?;
    let reputation = state.market().owner_reputation(&address).await;
    Ok(ok(ReputationBody { address, reputation }))
}

/// A single reservation.
#[derive(Debug, Serialize)]
pub struct ReservationBody {
    /// The reservation.
    pub reservation: Reservation,
    /// Funds were never locked.
    pub awaiting_escrow: bool,
}

/// Handle GET /api/reservations/{id}.
pub async fn get_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Reply<ReservationBody> {
    let reservation_id = parse_id("reservation", &id)?;
    let reservation = state.market().reservation(&reservation_id).await?;
    Ok(ok(ReservationBody {
        awaiting_escrow: reservation.awaiting_escrow(),
        reservation,
    }))
}

/// A single escrow.
#[derive(Debug, Serialize)]
pub struct EscrowBody {
    /// The escrow.
    pub escrow: Escrow,
}

/// Handle GET /api/reservations/{id}/escrow.
pub async fn reservation_escrow(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Reply<EscrowBody> {
    let reservation_id = parse_id("reservation", &id)?;
    let escrow = state.market().escrow_for_reservation(&reservation_id).await?;
    Ok(ok(EscrowBody { escrow }))
}

/// Handle GET /api/escrows/{id}.
pub async fn get_escrow(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Reply<EscrowBody> {
    let escrow_id = parse_id("escrow", &id)?;
    let escrow = state.market().escrow(&escrow_id).await?;
    Ok(ok(EscrowBody { escrow }))
}

/// Zone demand.
#[derive(Debug, Serialize)]
pub struct DemandBody {
    /// Zone asked about.
    pub zone_id: ObjectId,
    /// Demand coefficient in basis points.
    pub demand_factor_bps: u64,
}

/// Handle GET /api/zones/{id}/demand.
pub async fn zone_demand(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Reply<DemandBody> {
    let zone_id = parse_id("zone", &id)?;
    let demand_factor_bps = state.market().demand_factor(&zone_id).await?;
    Ok(ok(DemandBody {
        zone_id,
        demand_factor_bps,
    }))
}

/// Body of POST /api/reservations.
#[derive(Debug, Deserialize)]
pub struct CreateReservationBody {
    /// Slot to reserve.
    pub slot_id: String,
    /// Reserving driver.
    pub driver: String,
    /// Start (ms since epoch).
    pub start_ms: u64,
    /// Duration in whole hours.
    pub duration_hours: u64,
    /// Coins funding the escrow; when given, funds are locked right away.
    #[serde(default)]
    pub coins: Vec<String>,
}

/// A created reservation.
#[derive(Debug, Serialize)]
pub struct CreatedReservationBody {
    /// The reservation.
    pub reservation_id: ObjectId,
    /// Its escrow, when funds were locked in the same request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub escrow_id: Option<ObjectId>,
}

/// Handle POST /api/reservations.
pub async fn create_reservation(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateReservationBody>, JsonRejection>,
) -> Reply<CreatedReservationBody> {
    let Json(body) = body?;
    let request = ReservationRequest {
        slot_id: parse_id("slot", &body.slot_id)?,
        driver: parse_address(&body.driver)?,
        start_ms: body.start_ms,
        duration_hours: body.duration_hours,
    };

    if body.coins.is_empty() {
        let reservation_id = state.flow().create_reservation(&request).await?;
        return Ok(ok(CreatedReservationBody {
            reservation_id,
            escrow_id: None,
        }));
    }
    let coins = parse_coins(&body.coins)?;
    let booking = state.flow().reserve_and_lock(&request, coins).await?;
    Ok(ok(CreatedReservationBody {
        reservation_id: booking.reservation_id,
        escrow_id: Some(booking.escrow_id),
    }))
}

/// Body of POST /api/reservations/{id}/lock.
#[derive(Debug, Deserialize)]
pub struct LockBody {
    /// Driver funding the reservation.
    pub driver: String,
    /// Reserved slot.
    pub slot_id: String,
    /// Coins to lock.
    pub coins: Vec<String>,
}

/// A created escrow.
#[derive(Debug, Serialize)]
pub struct LockedBody {
    /// The escrow.
    pub escrow_id: ObjectId,
}

/// Handle POST /api/reservations/{id}/lock.
pub async fn lock_funds(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<LockBody>, JsonRejection>,
) -> Reply<LockedBody> {
    let Json(body) = body?;
    let reservation_id = parse_id("reservation", &id)?;
    let escrow_id = state
        .flow()
        .lock_funds(
            &parse_address(&body.driver)?,
            &reservation_id,
            &parse_id("slot", &body.slot_id)?,
            parse_coins(&body.coins)?,
        )
        .await?;
    Ok(ok(LockedBody { escrow_id }))
}

/// An executed transaction.
#[derive(Debug, Serialize)]
pub struct TxBody {
    /// The receipt.
    pub transaction: TxReceipt,
}

fn tx(receipt: TxReceipt) -> Json<Envelope<TxBody>> {
    ok(TxBody { transaction: receipt })
}

/// Body of POST /api/reservations/{id}/cancel.
#[derive(Debug, Deserialize)]
pub struct CancelBody {
    /// Driver who made the reservation.
    pub driver: String,
}

/// Handle POST /api/reservations/{id}/cancel.
pub async fn cancel_reservation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<CancelBody>, JsonRejection>,
) -> Reply<TxBody> {
    let Json(body) = body?;
    let reservation_id = parse_id("reservation", &id)?;
    let driver = parse_address(&body.driver)?;
    Ok(tx(state.flow().cancel_reservation(&driver, &reservation_id).await?))
}

/// Body naming the sending party.
#[derive(Debug, Deserialize)]
pub struct SenderBody {
    /// Sender address.
    pub sender: String,
}

/// Handle POST /api/escrows/{id}/use.
pub async fn mark_used(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<SenderBody>, JsonRejection>,
) -> Reply<TxBody> {
    let Json(body) = body?;
    let escrow_id = parse_id("escrow", &id)?;
    let sender = parse_address(&body.sender)?;
    Ok(tx(state.flow().mark_used(&sender, &escrow_id).await?))
}

/// Handle POST /api/escrows/{id}/settle.
pub async fn settle(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<SenderBody>, JsonRejection>,
) -> Reply<TxBody> {
    let Json(body) = body?;
    let escrow_id = parse_id("escrow", &id)?;
    let sender = parse_address(&body.sender)?;
    Ok(tx(state.flow().settle(&sender, &escrow_id).await?))
}

/// Body of POST /api/escrows/{id}/dispute.
#[derive(Debug, Deserialize)]
pub struct DisputeBody {
    /// Party opening the dispute.
    pub sender: String,
    /// Free-text reason.
    pub reason: Option<String>,
}

/// Handle POST /api/escrows/{id}/dispute.
pub async fn open_dispute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<DisputeBody>, JsonRejection>,
) -> Reply<TxBody> {
    let Json(body) = body?;
    let escrow_id = parse_id("escrow", &id)?;
    let sender = parse_address(&body.sender)?;
    Ok(tx(state
        .flow()
        .open_dispute(&sender, &escrow_id, body.reason.as_deref())
        .await?))
}

/// Body of POST /api/escrows/{id}/decide.
#[derive(Debug, Deserialize)]
pub struct DecideBody {
    /// Arbiter address.
    pub arbiter: String,
    /// Rule for the driver (slash the owner) instead of the owner.
    pub favor_driver: bool,
}

/// Handle POST /api/escrows/{id}/decide.
pub async fn decide_dispute(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Result<Json<DecideBody>, JsonRejection>,
) -> Reply<TxBody> {
    let Json(body) = body?;
    let escrow_id = parse_id("escrow", &id)?;
    let arbiter = parse_address(&body.arbiter)?;
    Ok(tx(state
        .flow()
        .decide_dispute(&arbiter, &escrow_id, body.favor_driver)
        .await?))
}

/// Body of POST /api/profiles.
#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    /// User registering.
    pub user: String,
    /// Optional display name.
    pub display_name: Option<String>,
}

/// Registration outcome.
#[derive(Debug, Serialize)]
pub struct RegisteredBody {
    /// Outcome.
    pub registration: Registration,
}

/// Handle POST /api/profiles.
pub async fn register_profile(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Reply<RegisteredBody> {
    let Json(body) = body?;
    let user = parse_address(&body.user)?;
    let registration = state
        .flow()
        .register_profile(&user, body.display_name.as_deref())
        .await?;
    Ok(ok(RegisteredBody { registration }))
}

/// Body of POST /api/users/{address}/ratings.
#[derive(Debug, Deserialize)]
pub struct RatingBody {
    /// User giving the rating.
    pub rater: String,
    /// Rating in basis points (0 to 10000).
    pub rating_bps: u64,
}

/// Handle POST /api/users/{address}/ratings.
pub async fn rate_user(
    State(state): State<Arc<AppState>>,
    Path(address): Path<String>,
    body: Result<Json<RatingBody>, JsonRejection>,
) -> Reply<TxBody> {
    let Json(body) = body?;
    let target = parse_address(&address)?;
    let rater = parse_address(&body.rater)?;
    Ok(tx(state.flow().rate_user(&rater, &target, body.rating_bps).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_requires_both_ends() {
        assert!(window(None, None).unwrap().is_none());
        assert!(window(Some(1), None).is_err());
        assert!(window(Some(5), Some(5)).is_err());
        assert_eq!(window(Some(1), Some(2)).unwrap().unwrap().end_ms, 2);
    }

    #[test]
    fn test_center_validation() {
        assert!(center(None, Some(1.0)).is_err());
        assert!(center(Some(91.0), Some(0.0)).is_err());
        assert!(center(Some(-1e13), Some(0.0)).is_err());
        assert!(center(Some(46.766), Some(23.599)).is_ok());
    }

    #[test]
    fn test_bad_ids_are_invalid_requests() {
        assert!(matches!(parse_id("slot", "nope"), Err(ApiError::InvalidRequest(_))));
        assert!(matches!(parse_address("0xzz"), Err(ApiError::InvalidRequest(_))));
    }
}
