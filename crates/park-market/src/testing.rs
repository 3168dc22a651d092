//! Shared fixtures for unit tests.

use std::sync::Arc;

use park_core::window::MS_PER_HOUR;
use park_core::{Address, GeoPoint, ObjectId, Slot};
use park_ledger::{
    CallArg, EntityKind, EntryCall, EntryFunction, LedgerContext, LedgerWriter, NewSlot,
    ProgramConfig, SimulatedLedger,
};

/// Frozen ledger clock.
pub const T0: u64 = 1_700_000_000_000;

pub const fn fixed_now() -> u64 {
    T0
}

pub const fn hours(n: u64) -> u64 {
    n * MS_PER_HOUR
}

pub fn addr(s: &str) -> Address {
    Address::parse(s).unwrap()
}

pub fn owner() -> Address {
    addr("0xa")
}

pub fn arbiter() -> Address {
    addr("0xb")
}

pub fn driver() -> Address {
    addr("0xd")
}

pub struct Harness {
    pub ledger: Arc<SimulatedLedger>,
    pub ctx: LedgerContext<SimulatedLedger>,
}

impl Harness {
    pub fn new() -> Self {
        let program = ProgramConfig::new(ObjectId::parse("0x2a").unwrap());
        let ledger = Arc::new(SimulatedLedger::new(program.clone()).with_arbiter(arbiter()));
        ledger.set_now(Some(T0));
        let ctx = LedgerContext::new(Arc::clone(&ledger), program);
        Self { ledger, ctx }
    }

    pub fn slot_at(&self, lat_micro: i64, lng_micro: i64, base: u64) -> ObjectId {
        let location = GeoPoint::from_micro(lat_micro, lng_micro).unwrap();
        self.ledger.list_slot(&owner(), NewSlot::new(location, base)).unwrap()
    }

    pub async fn slot_with(&self, base: u64, coeff_bps: u64) -> Slot {
        let location = GeoPoint::from_micro(0, 0).unwrap();
        let id = self
            .ledger
            .list_slot(&owner(), NewSlot::new(location, base).with_coeff(coeff_bps))
            .unwrap();
        self.ctx.resolver().resolve::<Slot>(&id).await.unwrap().unwrap()
    }

    pub async fn reserve(&self, slot: &ObjectId, start_ms: u64, hours: u64) -> ObjectId {
        let call = EntryCall::new(
            EntryFunction::CreateReservation,
            driver(),
            vec![CallArg::Object(slot.clone()), CallArg::U64(start_ms), CallArg::U64(hours)],
        );
        let receipt = self.ledger.submit(&call).await.unwrap();
        receipt.created_of(EntityKind::Reservation).unwrap().clone()
    }

    pub async fn lock(&self, reservation: &ObjectId, slot: &ObjectId) -> ObjectId {
        let call = EntryCall::new(
            EntryFunction::LockFunds,
            driver(),
            vec![
                CallArg::Object(reservation.clone()),
                CallArg::Object(slot.clone()),
                CallArg::Objects(vec![ObjectId::parse("0xc0").unwrap()]),
            ],
        );
        let receipt = self.ledger.submit(&call).await.unwrap();
        receipt.created_of(EntityKind::Escrow).unwrap().clone()
    }

    pub async fn register(&self, user: &Address) {
        let call = EntryCall::new(EntryFunction::RegisterProfile, user.clone(), vec![CallArg::Bytes(vec![])]);
        self.ledger.submit(&call).await.unwrap();
    }
}
