//! Route configuration for the HTTP API.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::handlers::{
    cancel_reservation, create_reservation, decide_dispute, get_escrow, get_reservation, get_slot,
    health_check, list_slots, lock_funds, mark_used, open_dispute, owner_slots, quote, rate_user,
    recommend_slots, register_profile, reservation_escrow, settle, slot_reservations, slot_status,
    user_reputation, user_reservations, zone_demand,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = build_cors_layer(state.config());

    let api_routes = Router::new()
        .route("/health", get(health_check))
        // Slots
        .route("/slots", get(list_slots))
        .route("/slots/recommend", get(recommend_slots))
        .route("/slots/{id}", get(get_slot))
        .route("/slots/{id}/status", get(slot_status))
        .route("/slots/{id}/quote", get(quote))
        .route("/slots/{id}/reservations", get(slot_reservations))
        .route("/owners/{address}/slots", get(owner_slots))
        .route("/zones/{id}/demand", get(zone_demand))
        // Users
        .route("/users/{address}/reservations", get(user_reservations))
        .route("/users/{address}/reputation", get(user_reputation))
        .route("/users/{address}/ratings", post(rate_user))
        .route("/profiles", post(register_profile))
        // Reservations and escrows
        .route("/reservations", post(create_reservation))
        .route("/reservations/{id}", get(get_reservation))
        .route("/reservations/{id}/escrow", get(reservation_escrow))
        .route("/reservations/{id}/lock", post(lock_funds))
        .route("/reservations/{id}/cancel", post(cancel_reservation))
        .route("/escrows/{id}", get(get_escrow))
        .route("/escrows/{id}/use", post(mark_used))
        .route("/escrows/{id}/settle", post(settle))
        .route("/escrows/{id}/dispute", post(open_dispute))
        .route("/escrows/{id}/decide", post(decide_dispute));

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
