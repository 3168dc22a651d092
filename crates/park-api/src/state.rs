//! Shared state for the API server.

use std::time::Instant;

use park_ledger::LedgerContext;
use park_market::{MarketConfig, Marketplace, ReservationFlow};

use crate::backend::LedgerBackend;
use crate::config::ApiConfig;

/// Shared state for the API server.
#[derive(Debug)]
pub struct AppState {
    config: ApiConfig,
    market: Marketplace<LedgerBackend>,
    flow: ReservationFlow<LedgerBackend>,
    backend: &'static str,
    start_time: Instant,
}

impl AppState {
    /// Builds the marketplace and reservation flow over one context.
    pub fn new(config: ApiConfig, ctx: LedgerContext<LedgerBackend>, market_config: MarketConfig) -> Self {
        let backend = ctx.ledger().kind();
        Self {
            config,
            flow: ReservationFlow::new(ctx.clone(), &market_config),
            market: Marketplace::new(ctx, market_config),
            backend,
            start_time: Instant::now(),
        }
    }

    /// Replaces the marketplace clock.
    #[must_use]
    pub fn with_clock(mut self, clock: park_market::facade::Clock) -> Self {
        self.market = self.market.with_clock(clock);
        self
    }

    /// Server configuration.
    pub const fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// Read side.
    pub const fn market(&self) -> &Marketplace<LedgerBackend> {
        &self.market
    }

    /// Write side.
    pub const fn flow(&self) -> &ReservationFlow<LedgerBackend> {
        &self.flow
    }

    /// Which ledger backs the server.
    pub const fn backend(&self) -> &'static str {
        self.backend
    }

    /// Seconds since start-up.
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
