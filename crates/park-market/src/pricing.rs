//! Quotes with the ledger program's own deposit and collateral figures.
//!
//! The price is computed locally. Deposit, collateral and zone demand are
//! asked of the program so the figures shown match what settlement
//! enforces; when those calls fail the quote is still returned, without
//! them.

use park_core::{ObjectId, PriceQuote, Slot};
use park_ledger::decode::value_as_u64;
use park_ledger::{CallArg, LedgerContext, LedgerError, LedgerReader, ViewCall, ViewFunction};
use tracing::{debug, warn};

/// Prices slots.
#[derive(Debug)]
pub struct PricingService<L> {
    ctx: LedgerContext<L>,
}

impl<L: LedgerReader> PricingService<L> {
    /// Creates a pricing service.
    pub const fn new(ctx: LedgerContext<L>) -> Self {
        Self { ctx }
    }

    async fn view_u64(&self, function: ViewFunction, arg: CallArg) -> Result<u64, LedgerError> {
        let call = ViewCall::new(function, vec![arg]);
        let value = self.ctx.ledger().view_call(&call).await?;
        value_as_u64(&value).ok_or_else(|| LedgerError::Decode {
            kind: "view result",
            id: format!("{function:?}"),
            message: format!("expected an unsigned integer, got {value}"),
        })
    }

    /// Quote for `hours` on `slot`.
    pub async fn quote(&self, slot: &Slot, hours: u64) -> PriceQuote {
        let mut quote = PriceQuote::for_slot(slot, hours);
        let price = quote.price;

        let (deposit, collateral) = futures::join!(
            self.view_u64(ViewFunction::CalculateDeposit, CallArg::U64(price)),
            self.view_u64(ViewFunction::CalculateCollateral, CallArg::U64(price)),
        );
        quote.deposit = deposit
            .inspect_err(|e| warn!(slot_id = %slot.id, error = %e, "deposit unavailable"))
            .ok();
        quote.collateral = collateral
            .inspect_err(|e| warn!(slot_id = %slot.id, error = %e, "collateral unavailable"))
            .ok();
        debug!(slot_id = %slot.id, hours, price, "quoted");
        quote
    }

    /// Current demand coefficient of a zone (basis points).
    ///
    /// # Errors
    ///
    /// Returns the ledger error if the program cannot be asked.
    pub async fn demand_factor(&self, zone_id: &ObjectId) -> Result<u64, LedgerError> {
        self.view_u64(ViewFunction::DemandFactor, CallArg::Object(zone_id.clone()))
            .await
    }
}
