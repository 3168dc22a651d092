//! # park-api
//!
//! HTTP API and command-line entry point for the parkmesh marketplace.
//!
//! Every response is a JSON object with a boolean `success`. Successful
//! payload fields sit next to it; failures carry a short `error` message.
//!
//! ## API Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/api/health` | GET | Liveness, backend and read counters |
//! | `/api/slots` | GET | Slots near `lat`/`lng` with availability and quotes |
//! | `/api/slots/recommend` | GET | Ranked recommendations |
//! | `/api/slots/{id}` | GET | One slot |
//! | `/api/slots/{id}/status` | GET | Availability right now |
//! | `/api/slots/{id}/quote` | GET | Price quote for `hours` |
//! | `/api/slots/{id}/reservations` | GET | Reservations on a slot |
//! | `/api/owners/{address}/slots` | GET | Slots of an owner |
//! | `/api/users/{address}/reservations` | GET | Reservations of a driver |
//! | `/api/users/{address}/reputation` | GET | Reputation annotation |
//! | `/api/reservations/{id}` | GET | One reservation |
//! | `/api/reservations/{id}/escrow` | GET | Escrow of a reservation |
//! | `/api/escrows/{id}` | GET | One escrow |
//! | `/api/zones/{id}/demand` | GET | Zone demand coefficient |
//! | `/api/reservations` | POST | Reserve, optionally locking funds |
//! | `/api/reservations/{id}/lock` | POST | Lock funds |
//! | `/api/reservations/{id}/cancel` | POST | Cancel before funding |
//! | `/api/escrows/{id}/use` | POST | Mark used |
//! | `/api/escrows/{id}/settle` | POST | Settle |
//! | `/api/escrows/{id}/dispute` | POST | Open a dispute |
//! | `/api/escrows/{id}/decide` | POST | Arbiter decision |
//! | `/api/profiles` | POST | Register a profile |
//! | `/api/users/{address}/ratings` | POST | Rate a user |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod backend;
pub mod cli;
pub mod config;
pub mod demo;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod routes;
pub mod server;
pub mod state;

pub use backend::LedgerBackend;
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use server::ApiServer;
pub use state::AppState;
