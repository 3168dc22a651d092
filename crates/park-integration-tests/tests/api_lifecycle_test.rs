//! End-to-end tests through the HTTP API.
//!
//! Drives a reservation from search to settlement and through a dispute,
//! checking the `{ "success": ... }` envelope at every step.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use park_api::{ApiConfig, ApiServer, AppState, LedgerBackend, demo};
use park_core::window::MS_PER_HOUR;
use park_core::{Address, ObjectId};
use park_ledger::{Fault, LedgerContext, ProgramConfig, SimulatedLedger};
use park_market::{MarketConfig, MarketError, OrphanPolicy, ReservationFlow, ReservationRequest};
use serde_json::{Value, json};
use tower::ServiceExt;

// ============================================================================
// Helper Functions
// ============================================================================

const NOW: u64 = 1_700_000_000_000;
const ARBITER: &str = "0xa7b";
const DRIVER: &str = "0xd1";

const fn fixed_now() -> u64 {
    NOW
}

struct Api {
    router: Router,
    ledger: Arc<SimulatedLedger>,
    slots: Vec<ObjectId>,
}

async fn start() -> Api {
    let program = ProgramConfig::new(ObjectId::parse("0x2a").unwrap());
    let ledger = Arc::new(SimulatedLedger::new(program.clone()).with_arbiter(Address::parse(ARBITER).unwrap()));
    ledger.set_now(Some(NOW));
    let slots = demo::seed(&ledger).await.unwrap();

    let backend = LedgerBackend::Simulated(Arc::clone(&ledger));
    let ctx = LedgerContext::new(Arc::new(backend), program);
    let state = AppState::new(ApiConfig::default(), ctx, MarketConfig::default()).with_clock(fixed_now);
    Api {
        router: ApiServer::new(state).router(),
        ledger,
        slots,
    }
}

impl Api {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    async fn book(&self, slot: &ObjectId, start_hour: u64, hours: u64) -> (String, String) {
        let (status, json) = self
            .post(
                "/api/reservations",
                json!({
                    "slot_id": slot.to_string(),
                    "driver": DRIVER,
                    "start_ms": NOW + start_hour * MS_PER_HOUR,
                    "duration_hours": hours,
                    "coins": ["0xc01"],
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{json}");
        (
            json["reservation_id"].as_str().unwrap().to_string(),
            json["escrow_id"].as_str().unwrap().to_string(),
        )
    }
}

fn score(json: &Value) -> u64 {
    json["reputation"]["score"].as_u64().unwrap()
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn search_book_use_settle() {
    let api = start().await;
    let (_, before) = api.get("/api/users/0xa11ce/reputation").await;

    let (status, found) = api
        .get(&format!("/api/slots?lat={}&lng={}&radius=500", demo::CENTER.0, demo::CENTER.1))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["success"], true);
    let first = found["slots"][0]["id"].as_str().unwrap();
    assert_eq!(first, api.slots[0].to_string());

    let (reservation, escrow) = api.book(&api.slots[0], 1, 2).await;

    let (_, res) = api.get(&format!("/api/reservations/{reservation}")).await;
    assert_eq!(res["awaiting_escrow"], false);

    let (status, _) = api
        .post(&format!("/api/escrows/{escrow}/use"), json!({ "sender": DRIVER }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, settled) = api
        .post(&format!("/api/escrows/{escrow}/settle"), json!({ "sender": DRIVER }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(settled["transaction"]["digest"].is_string());

    let (_, escrow_json) = api.get(&format!("/api/escrows/{escrow}")).await;
    assert_eq!(escrow_json["escrow"]["state"], "SETTLED");

    let (_, after) = api.get("/api/users/0xa11ce/reputation").await;
    assert!(score(&after) > score(&before));
}

#[tokio::test]
async fn settling_twice_is_a_conflict() {
    let api = start().await;
    let (_, escrow) = api.book(&api.slots[1], 1, 1).await;
    api.post(&format!("/api/escrows/{escrow}/use"), json!({ "sender": DRIVER }))
        .await;
    api.post(&format!("/api/escrows/{escrow}/settle"), json!({ "sender": DRIVER }))
        .await;

    let (status, json) = api
        .post(&format!("/api/escrows/{escrow}/settle"), json!({ "sender": DRIVER }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["success"], false);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn dispute_decided_for_driver() {
    let api = start().await;
    api.post("/api/profiles", json!({ "user": DRIVER })).await;
    let (_, escrow) = api.book(&api.slots[2], 1, 1).await;

    let (status, _) = api
        .post(
            &format!("/api/escrows/{escrow}/dispute"),
            json!({ "sender": DRIVER, "reason": "spot occupied" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = api
        .post(
            &format!("/api/escrows/{escrow}/decide"),
            json!({ "arbiter": DRIVER, "favor_driver": true }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = api
        .post(
            &format!("/api/escrows/{escrow}/decide"),
            json!({ "arbiter": ARBITER, "favor_driver": true }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, json) = api.get(&format!("/api/escrows/{escrow}")).await;
    assert_eq!(json["escrow"]["state"], "SLASHED");

    let (_, owner) = api.get("/api/users/0xb0b/reputation").await;
    assert_eq!(owner["reputation"]["trusted"], false);
    assert_eq!(owner["reputation"]["dispute_count"], 1);
}

#[tokio::test]
async fn event_outage_keeps_search_answering() {
    let api = start().await;
    api.ledger.set_fault(Fault::EventQueries, true);

    let (status, json) = api
        .get(&format!("/api/slots/{}/status", api.slots[0]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "free");
    assert_eq!(json["degraded"], true);

    let (status, json) = api
        .get(&format!("/api/slots?lat={}&lng={}", demo::CENTER.0, demo::CENTER.1))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["success"], false);

    let (_, health) = api.get("/api/health").await;
    assert!(health["stats"]["scan_failures"].as_u64().unwrap() >= 2);
}

// ============================================================================
// Orphaned reservations
// ============================================================================

fn flow_over(ledger: &Arc<SimulatedLedger>, policy: OrphanPolicy) -> ReservationFlow<SimulatedLedger> {
    let ctx = LedgerContext::new(Arc::clone(ledger), ledger.program().clone());
    ReservationFlow::new(ctx, &MarketConfig::default().with_orphan_policy(policy))
}

fn request(slot: &ObjectId) -> ReservationRequest {
    ReservationRequest {
        slot_id: slot.clone(),
        driver: Address::parse(DRIVER).unwrap(),
        start_ms: NOW + MS_PER_HOUR,
        duration_hours: 1,
    }
}

#[tokio::test]
async fn unfunded_reservation_is_cancelled() {
    let api = start().await;
    let flow = flow_over(&api.ledger, OrphanPolicy::Cancel);

    // No coins: the lock is rejected after the reservation exists.
    let err = flow.reserve_and_lock(&request(&api.slots[0]), Vec::new()).await.unwrap_err();
    let MarketError::FundsNotLocked {
        reservation_id,
        cancelled,
        ..
    } = err
    else {
        unreachable!("expected an orphaned reservation");
    };
    assert!(cancelled);

    let (_, json) = api.get(&format!("/api/reservations/{reservation_id}")).await;
    assert_eq!(json["reservation"]["state"], "CANCELLED");

    // The slot is bookable again.
    api.book(&api.slots[0], 1, 1).await;
}

#[tokio::test]
async fn unfunded_reservation_can_be_left() {
    let api = start().await;
    let flow = flow_over(&api.ledger, OrphanPolicy::Leave);

    let err = flow.reserve_and_lock(&request(&api.slots[3]), Vec::new()).await.unwrap_err();
    let MarketError::FundsNotLocked {
        reservation_id,
        cancelled,
        ..
    } = err
    else {
        unreachable!("expected an orphaned reservation");
    };
    assert!(!cancelled);

    let (_, json) = api.get(&format!("/api/reservations/{reservation_id}")).await;
    assert_eq!(json["awaiting_escrow"], true);

    let (status, json) = api
        .post(
            &format!("/api/reservations/{reservation_id}/lock"),
            json!({ "driver": DRIVER, "slot_id": api.slots[3].to_string(), "coins": ["0xc02"] }),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert!(json["escrow_id"].is_string());
}
