//! Sample inventory for running against the in-memory ledger.

use park_core::{Address, GeoPoint, ObjectId};
use park_ledger::{CallArg, EntryCall, EntryFunction, LedgerWriter, NewSlot, SimulatedLedger};
use tracing::info;

/// Centre of the sample inventory (degrees).
pub const CENTER: (f64, f64) = (46.766, 23.599);

struct Listing {
    owner: &'static str,
    name: &'static str,
    street: &'static str,
    lat_micro: i64,
    lng_micro: i64,
    base_price: u64,
    coeff_bps: u64,
}

const LISTINGS: &[Listing] = &[
    Listing {
        owner: "0xa11ce",
        name: "Courtyard spot",
        street: "Strada Memorandumului 12",
        lat_micro: 46_767_000,
        lng_micro: 23_598_000,
        base_price: 5_000_000,
        coeff_bps: 10_000,
    },
    Listing {
        owner: "0xa11ce",
        name: "Garage B2",
        street: "Strada Napoca 4",
        lat_micro: 46_768_000,
        lng_micro: 23_600_000,
        base_price: 8_000_000,
        coeff_bps: 12_500,
    },
    Listing {
        owner: "0xb0b",
        name: "Driveway",
        street: "Strada Horea 31",
        lat_micro: 46_772_500,
        lng_micro: 23_589_000,
        base_price: 3_500_000,
        coeff_bps: 10_000,
    },
    Listing {
        owner: "0xb0b",
        name: "Stadium lot 7",
        street: "Aleea Stadionului 2",
        lat_micro: 46_768_900,
        lng_micro: 23_572_000,
        base_price: 6_000_000,
        coeff_bps: 15_000,
    },
];

/// Lists the sample slots and registers their owners' profiles.
///
/// # Errors
///
/// Returns an error if any listing or registration fails.
pub async fn seed(ledger: &SimulatedLedger) -> anyhow::Result<Vec<ObjectId>> {
    let mut slots = Vec::with_capacity(LISTINGS.len());
    for listing in LISTINGS {
        let owner = Address::parse(listing.owner)?;
        let location = GeoPoint::from_micro(listing.lat_micro, listing.lng_micro)?;
        let spot = NewSlot::new(location, listing.base_price)
            .with_coeff(listing.coeff_bps)
            .with_name(listing.name)
            .with_address(listing.street);
        slots.push(ledger.list_slot(&owner, spot)?);
    }

    for owner in ["0xa11ce", "0xb0b"] {
        let call = EntryCall::new(
            EntryFunction::RegisterProfile,
            Address::parse(owner)?,
            vec![CallArg::Bytes(Vec::new())],
        );
        match ledger.submit(&call).await {
            Ok(_) => {}
            Err(e) if e.is_already_registered() => {}
            Err(e) => return Err(e.into()),
        }
    }

    info!(slots = slots.len(), "sample inventory listed");
    Ok(slots)
}
