//! Local price quotes.
//!
//! The formula is `price = round(base_per_hour × hours × coeff_bps / 10000)`
//! evaluated in integers with `u128` intermediates. Rounding is half-up.
//!
//! Deposit and collateral are deliberately absent here: the ledger program
//! computes them on settlement and the market layer asks it for the figures
//! rather than keeping a second copy of the percentages.

use serde::{Deserialize, Serialize};

use crate::ids::ObjectId;
use crate::slot::Slot;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Price for `duration_hours` at `base_per_hour` scaled by `coeff_bps`.
///
/// Saturates at `u64::MAX` rather than overflowing.
///
/// # Examples
/// ```
/// use park_core::pricing::quote_price;
///
/// // 1.5x demand, two hours at 100_000_000 per hour.
/// assert_eq!(quote_price(100_000_000, 2, 15_000), 300_000_000);
/// ```
#[must_use]
pub const fn quote_price(base_per_hour: u64, duration_hours: u64, coeff_bps: u64) -> u64 {
    if base_per_hour == 0 || duration_hours == 0 || coeff_bps == 0 {
        return 0;
    }

    let Some(hourly) = (base_per_hour as u128).checked_mul(duration_hours as u128) else {
        return u64::MAX;
    };
    let Some(numerator) = hourly.checked_mul(coeff_bps as u128) else {
        return u64::MAX;
    };
    let mut price = numerator / BPS_DENOMINATOR;
    if numerator % BPS_DENOMINATOR >= BPS_DENOMINATOR / 2 {
        price += 1;
    }

    if price > u64::MAX as u128 {
        u64::MAX
    } else {
        price as u64
    }
}

/// A quote for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Quoted slot.
    pub slot_id: ObjectId,
    /// Requested duration.
    pub duration_hours: u64,
    /// Base hourly price used.
    pub base_price_per_hour: u64,
    /// Demand coefficient used (basis points).
    pub dynamic_coeff_bps: u64,
    /// Total price (minor units).
    pub price: u64,
    /// Driver deposit as computed by the ledger program, when available.
    pub deposit: Option<u64>,
    /// Owner collateral as computed by the ledger program, when available.
    pub collateral: Option<u64>,
}

impl PriceQuote {
    /// Quote a slot locally; deposit and collateral are left unset.
    #[must_use]
    pub fn for_slot(slot: &Slot, duration_hours: u64) -> Self {
        Self {
            slot_id: slot.id.clone(),
            duration_hours,
            base_price_per_hour: slot.base_price_per_hour,
            dynamic_coeff_bps: slot.dynamic_coeff_bps,
            price: quote_price(slot.base_price_per_hour, duration_hours, slot.dynamic_coeff_bps),
            deposit: None,
            collateral: None,
        }
    }

    /// Total the driver must fund (price plus deposit), if the deposit is known.
    #[must_use]
    pub fn driver_total(&self) -> Option<u64> {
        self.deposit.map(|d| self.price.saturating_add(d))
    }
}
