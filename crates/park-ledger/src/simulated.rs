//! In-memory ledger program for development and tests.
//!
//! Mirrors the program's observable behaviour: objects are versioned and
//! served in the node's loosely typed JSON, creation events are appended to
//! a log, and entry calls are validated the way the program validates them
//! (atomic interval conflict check, forward-only escrow, duplicate profile
//! rejection, clamped score updates). Faults can be switched on to emulate
//! an unhealthy node.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use park_core::pricing::{BPS_DENOMINATOR, quote_price};
use park_core::window::{now_ms, validate_duration};
use park_core::{
    Address, DisputeInfo, Escrow, EscrowState, GeoPoint, ObjectId, Reservation, ReservationState,
    Score, Slot, SlotStatus, TimeWindow, UserProfile,
};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::client::{LedgerReader, LedgerWriter};
use crate::config::ProgramConfig;
use crate::decode::OptionShape;
use crate::entity::{LedgerEntity, OwnerCap, to_raw};
use crate::error::{LedgerError, Result, abort};
use crate::raw::{
    CallArg, CreatedObject, EntityKind, EntryCall, EntryFunction, EventCursor, EventKind,
    EventPage, RawEvent, RawObject, TxReceipt, ViewCall, ViewFunction,
};

/// Driver deposit as a share of the price (basis points).
pub const DEPOSIT_BPS: u64 = 1_000;

/// Owner collateral as a share of the price (basis points).
pub const COLLATERAL_BPS: u64 = 2_000;

/// Score change for each party on a normal settlement.
const SETTLEMENT_REWARD: i64 = 100;

/// Score change for the winner of a dispute.
const DISPUTE_WIN_REWARD: i64 = 50;

/// Score change for the loser of a dispute.
const DISPUTE_LOSS_PENALTY: i64 = -500;

/// Deposit for a price, as the program computes it.
#[must_use]
pub const fn deposit_for(price: u64) -> u64 {
    share(price, DEPOSIT_BPS)
}

/// Collateral for a price, as the program computes it.
#[must_use]
pub const fn collateral_for(price: u64) -> u64 {
    share(price, COLLATERAL_BPS)
}

const fn share(price: u64, bps: u64) -> u64 {
    ((price as u128 * bps as u128) / BPS_DENOMINATOR as u128) as u64
}

/// Node operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// `query_events`.
    EventQueries,
    /// `get_object` and `owned_objects`.
    ObjectReads,
    /// `view_call`.
    ViewCalls,
    /// `submit`.
    Submits,
}

#[derive(Debug, Default)]
struct Faults {
    events: AtomicBool,
    objects: AtomicBool,
    views: AtomicBool,
    submits: AtomicBool,
}

impl Faults {
    const fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::EventQueries => &self.events,
            Fault::ObjectReads => &self.objects,
            Fault::ViewCalls => &self.views,
            Fault::Submits => &self.submits,
        }
    }

    fn check(&self, fault: Fault, operation: &str) -> Result<()> {
        if self.flag(fault).load(Ordering::Relaxed) {
            Err(LedgerError::transient(operation, "simulated node failure"))
        } else {
            Ok(())
        }
    }
}

/// Parameters for listing a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSlot {
    /// Position.
    pub location: GeoPoint,
    /// Base hourly price.
    pub base_price_per_hour: u64,
    /// Demand coefficient (basis points).
    pub dynamic_coeff_bps: u64,
    /// Display name.
    pub name: Option<String>,
    /// Street address.
    pub address: Option<String>,
    /// Pricing zone.
    pub zone_id: Option<ObjectId>,
}

impl NewSlot {
    /// A slot at neutral demand.
    #[must_use]
    pub const fn new(location: GeoPoint, base_price_per_hour: u64) -> Self {
        Self {
            location,
            base_price_per_hour,
            dynamic_coeff_bps: park_core::slot::NEUTRAL_COEFF_BPS,
            name: None,
            address: None,
            zone_id: None,
        }
    }

    /// Sets the demand coefficient.
    #[must_use]
    pub const fn with_coeff(mut self, coeff_bps: u64) -> Self {
        self.dynamic_coeff_bps = coeff_bps;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the street address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Places the slot in a pricing zone.
    #[must_use]
    pub fn with_zone(mut self, zone_id: ObjectId) -> Self {
        self.zone_id = Some(zone_id);
        self
    }
}

#[derive(Debug, Clone)]
struct Stored<T> {
    value: T,
    version: u64,
    owner: Option<Address>,
}

impl<T> Stored<T> {
    const fn new(value: T, version: u64, owner: Option<Address>) -> Self {
        Self {
            value,
            version,
            owner,
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    slots: HashMap<ObjectId, Stored<Slot>>,
    caps: HashMap<ObjectId, Stored<OwnerCap>>,
    reservations: HashMap<ObjectId, Stored<Reservation>>,
    escrows: HashMap<ObjectId, Stored<Escrow>>,
    profiles: HashMap<ObjectId, Stored<UserProfile>>,
    profile_by_user: HashMap<Address, ObjectId>,
    events: Vec<RawEvent>,
    version: u64,
    nonce: u64,
    fixed_now_ms: Option<u64>,
    arbiter: Option<Address>,
}

/// An open transaction against the simulated state.
struct Tx<'a> {
    state: &'a mut SimState,
    digest: String,
    version: u64,
    now_ms: u64,
    sender: Address,
    created: Vec<CreatedObject>,
    event_seq: u64,
}

impl Tx<'_> {
    fn new_id(&mut self, label: &str) -> Result<ObjectId> {
        self.state.nonce += 1;
        let hash = blake3::hash(format!("{label}:{}:{}", self.digest, self.state.nonce).as_bytes());
        ObjectId::from_bytes(hash.as_bytes())
            .map_err(|e| LedgerError::transient("simulated ledger", e.to_string()))
    }

    fn created(&mut self, id: &ObjectId, type_tag: String) {
        self.created.push(CreatedObject {
            id: id.clone(),
            type_tag,
        });
    }

    fn emit(&mut self, event_type: String, parsed: Value) {
        self.state.events.push(RawEvent {
            id: EventCursor {
                tx_digest: self.digest.clone(),
                event_seq: self.event_seq,
            },
            event_type,
            sender: Some(self.sender.to_string()),
            timestamp_ms: Some(self.now_ms),
            parsed,
        });
        self.event_seq += 1;
    }

    fn receipt(self) -> TxReceipt {
        TxReceipt {
            digest: self.digest,
            created: self.created,
        }
    }
}

fn reject(code: u64, reason: &str) -> LedgerError {
    LedgerError::rejected(code, reason)
}

fn arg<'a>(args: &'a [CallArg], index: usize) -> Result<&'a CallArg> {
    args.get(index)
        .ok_or_else(|| reject(abort::INVALID_ARGUMENT, "E_MISSING_ARGUMENT"))
}

fn arg_object(args: &[CallArg], index: usize) -> Result<&ObjectId> {
    match arg(args, index)? {
        CallArg::Object(id) => Ok(id),
        _ => Err(reject(abort::INVALID_ARGUMENT, "E_EXPECTED_OBJECT")),
    }
}

fn arg_u64(args: &[CallArg], index: usize) -> Result<u64> {
    match arg(args, index)? {
        CallArg::U64(n) => Ok(*n),
        _ => Err(reject(abort::INVALID_ARGUMENT, "E_EXPECTED_U64")),
    }
}

fn arg_bool(args: &[CallArg], index: usize) -> Result<bool> {
    match arg(args, index)? {
        CallArg::Bool(b) => Ok(*b),
        _ => Err(reject(abort::INVALID_ARGUMENT, "E_EXPECTED_BOOL")),
    }
}

fn arg_text(args: &[CallArg], index: usize) -> Result<Option<String>> {
    match arg(args, index)? {
        CallArg::Bytes(bytes) if bytes.is_empty() => Ok(None),
        CallArg::Bytes(bytes) => String::from_utf8(bytes.clone())
            .map(Some)
            .map_err(|_| reject(abort::INVALID_ARGUMENT, "E_INVALID_UTF8")),
        _ => Err(reject(abort::INVALID_ARGUMENT, "E_EXPECTED_BYTES")),
    }
}

fn arg_address(args: &[CallArg], index: usize) -> Result<&Address> {
    match arg(args, index)? {
        CallArg::Address(address) => Ok(address),
        _ => Err(reject(abort::INVALID_ARGUMENT, "E_EXPECTED_ADDRESS")),
    }
}

fn arg_objects(args: &[CallArg], index: usize) -> Result<&[ObjectId]> {
    match arg(args, index)? {
        CallArg::Objects(ids) => Ok(ids),
        _ => Err(reject(abort::INVALID_ARGUMENT, "E_EXPECTED_OBJECTS")),
    }
}

impl SimState {
    fn now(&self) -> u64 {
        self.fixed_now_ms.unwrap_or_else(now_ms)
    }

    fn score_of(&self, user: &Address) -> u64 {
        self.profile_by_user
            .get(user)
            .and_then(|id| self.profiles.get(id))
            .map_or(Score::BASE.bps(), |p| p.value.score.bps())
    }

    fn update_profile(&mut self, user: &Address, version: u64, now: u64, f: impl FnOnce(&mut UserProfile)) {
        let Some(id) = self.profile_by_user.get(user) else {
            return;
        };
        if let Some(stored) = self.profiles.get_mut(id) {
            f(&mut stored.value);
            stored.value.updated_at_ms = now;
            stored.version = version;
        }
    }

    /// Recomputes a slot's coarse status from its live reservations.
    fn refresh_slot_status(&mut self, slot_id: &ObjectId, version: u64, now: u64) {
        let live = self
            .reservations
            .values()
            .map(|r| &r.value)
            .filter(|r| &r.slot_id == slot_id && r.is_blocking());
        let mut status = SlotStatus::Free;
        for r in live {
            if r.state == ReservationState::Active {
                status = SlotStatus::Occupied;
                break;
            }
            if r.window().is_some_and(|w| w.contains(now)) {
                status = SlotStatus::Reserved;
            }
        }
        if let Some(slot) = self.slots.get_mut(slot_id) {
            if slot.value.status != status {
                slot.value.status = status;
                slot.version = version;
            }
        }
    }

    fn escrow_parties(&self, escrow_id: &ObjectId, sender: &Address) -> Result<Escrow> {
        let escrow = self
            .escrows
            .get(escrow_id)
            .map(|e| e.value.clone())
            .ok_or_else(|| reject(abort::INVALID_ARGUMENT, "E_ESCROW_NOT_FOUND"))?;
        if sender != &escrow.driver && sender != &escrow.owner {
            return Err(reject(abort::NOT_AUTHORIZED, "E_NOT_PARTY"));
        }
        Ok(escrow)
    }

    fn set_escrow_state(&mut self, escrow_id: &ObjectId, target: EscrowState, version: u64) -> Result<()> {
        let stored = self
            .escrows
            .get_mut(escrow_id)
            .ok_or_else(|| reject(abort::INVALID_ARGUMENT, "E_ESCROW_NOT_FOUND"))?;
        stored
            .value
            .transition_to(target)
            .map_err(|_| reject(abort::INVALID_STATE, "E_INVALID_ESCROW_STATE"))?;
        stored.version = version;
        Ok(())
    }

    fn set_reservation_state(&mut self, reservation_id: &ObjectId, state: ReservationState, version: u64) {
        if let Some(stored) = self.reservations.get_mut(reservation_id) {
            stored.value.state = state;
            stored.version = version;
        }
    }
}

/// In-memory ledger node and program.
#[derive(Debug)]
pub struct SimulatedLedger {
    program: ProgramConfig,
    shape: OptionShape,
    state: Mutex<SimState>,
    faults: Faults,
}

impl SimulatedLedger {
    /// Creates an empty ledger serving optional values directly.
    #[must_use]
    pub fn new(program: ProgramConfig) -> Self {
        Self {
            program,
            shape: OptionShape::default(),
            state: Mutex::new(SimState::default()),
            faults: Faults::default(),
        }
    }

    /// Serves optional values in `shape`.
    #[must_use]
    pub fn with_option_shape(mut self, shape: OptionShape) -> Self {
        self.shape = shape;
        self
    }

    /// Appoints the arbiter recorded on new escrows.
    #[must_use]
    pub fn with_arbiter(self, arbiter: Address) -> Self {
        self.state.lock().arbiter = Some(arbiter);
        self
    }

    /// The program layout this ledger serves.
    #[must_use]
    pub const fn program(&self) -> &ProgramConfig {
        &self.program
    }

    /// Freezes the ledger clock; `None` follows the wall clock.
    pub fn set_now(&self, now_ms: Option<u64>) {
        self.state.lock().fixed_now_ms = now_ms;
    }

    /// Switches a fault on or off.
    pub fn set_fault(&self, fault: Fault, enabled: bool) {
        self.faults.flag(fault).store(enabled, Ordering::Relaxed);
    }

    /// Number of events in the log.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.state.lock().events.len()
    }

    fn begin<'a>(&self, state: &'a mut SimState, sender: &Address, label: &str) -> Tx<'a> {
        state.version += 1;
        let version = state.version;
        let now_ms = state.now();
        let seed = format!("{label}:{sender}:{version}");
        let digest = bs58::encode(blake3::hash(seed.as_bytes()).as_bytes()).into_string();
        Tx {
            state,
            digest,
            version,
            now_ms,
            sender: sender.clone(),
            created: Vec::new(),
            event_seq: 0,
        }
    }

    fn event_type(&self, kind: EventKind) -> String {
        kind.event_type(&self.program)
    }

    fn struct_type(&self, kind: EntityKind) -> String {
        kind.struct_type(&self.program)
    }

    /// Lists a slot for `owner` and hands them its capability.
    ///
    /// # Errors
    ///
    /// Returns an error if identifiers cannot be derived.
    pub fn list_slot(&self, owner: &Address, listing: NewSlot) -> Result<ObjectId> {
        let mut guard = self.state.lock();
        let mut tx = self.begin(&mut guard, owner, "list_slot");
        let slot_id = tx.new_id("slot")?;
        let cap_id = tx.new_id("owner_cap")?;
        let slot = Slot {
            id: slot_id.clone(),
            owner: owner.clone(),
            location: listing.location,
            base_price_per_hour: listing.base_price_per_hour,
            dynamic_coeff_bps: listing.dynamic_coeff_bps,
            status: SlotStatus::Free,
            name: listing.name,
            address: listing.address,
            zone_id: listing.zone_id,
            completed_reservations: 0,
            total_revenue: 0,
        };
        let version = tx.version;
        tx.state.slots.insert(slot_id.clone(), Stored::new(slot, version, None));
        tx.state.caps.insert(
            cap_id.clone(),
            Stored::new(
                OwnerCap {
                    id: cap_id.clone(),
                    slot_id: slot_id.clone(),
                },
                version,
                Some(owner.clone()),
            ),
        );
        tx.created(&slot_id, self.struct_type(EntityKind::Slot));
        tx.created(&cap_id, self.struct_type(EntityKind::OwnerCap));
        tx.emit(
            self.event_type(EventKind::SlotCreated),
            json!({ "slot_id": slot_id.as_str(), "owner": owner.as_str() }),
        );
        info!(slot_id = %slot_id, owner = %owner, "slot listed");
        Ok(slot_id)
    }

    fn raw_object(&self, state: &SimState, id: &ObjectId) -> Option<RawObject> {
        fn raw<T: LedgerEntity>(stored: &Stored<T>, type_tag: String, shape: OptionShape) -> RawObject {
            to_raw(&stored.value, type_tag, stored.version, stored.owner.as_ref(), shape)
        }
        let shape = self.shape;
        if let Some(s) = state.slots.get(id) {
            return Some(raw(s, self.struct_type(EntityKind::Slot), shape));
        }
        if let Some(s) = state.caps.get(id) {
            return Some(raw(s, self.struct_type(EntityKind::OwnerCap), shape));
        }
        if let Some(s) = state.reservations.get(id) {
            return Some(raw(s, self.struct_type(EntityKind::Reservation), shape));
        }
        if let Some(s) = state.escrows.get(id) {
            return Some(raw(s, self.struct_type(EntityKind::Escrow), shape));
        }
        state
            .profiles
            .get(id)
            .map(|s| raw(s, self.struct_type(EntityKind::Profile), shape))
    }

    fn create_reservation(&self, tx: &mut Tx<'_>, args: &[CallArg]) -> Result<()> {
        let slot_id = arg_object(args, 0)?;
        let start_ms = arg_u64(args, 1)?;
        let hours = arg_u64(args, 2)?;

        let slot = tx
            .state
            .slots
            .get(slot_id)
            .map(|s| s.value.clone())
            .ok_or_else(|| reject(abort::INVALID_ARGUMENT, "E_SLOT_NOT_FOUND"))?;
        validate_duration(hours).map_err(|_| reject(abort::INVALID_ARGUMENT, "E_INVALID_DURATION"))?;
        let window = TimeWindow::from_hours(start_ms, hours)
            .map_err(|_| reject(abort::INVALID_ARGUMENT, "E_INVALID_DURATION"))?;
        if window.end_ms <= tx.now_ms {
            return Err(reject(abort::INVALID_ARGUMENT, "E_START_IN_PAST"));
        }
        if slot.owner == tx.sender {
            return Err(reject(abort::NOT_AUTHORIZED, "E_OWN_SLOT"));
        }
        let conflict = tx.state.reservations.values().any(|r| {
            r.value.slot_id == *slot_id
                && r.value.is_blocking()
                && r.value.window().is_some_and(|w| w.overlaps(&window))
        });
        if conflict {
            return Err(reject(abort::SLOT_UNAVAILABLE, "E_SLOT_UNAVAILABLE"));
        }

        let id = tx.new_id("reservation")?;
        let reservation = Reservation {
            id: id.clone(),
            slot_id: slot_id.clone(),
            driver: tx.sender.clone(),
            owner: slot.owner.clone(),
            start_time_ms: start_ms,
            duration_hours: hours,
            locked_price: quote_price(slot.base_price_per_hour, hours, slot.dynamic_coeff_bps),
            state: ReservationState::Requested,
            escrow_id: None,
        };
        let event = json!({
            "reservation_id": id.as_str(),
            "slot_id": slot_id.as_str(),
            "driver": reservation.driver.as_str(),
            "owner": reservation.owner.as_str(),
            "start_time": start_ms.to_string(),
            "duration_hours": hours.to_string(),
            "price": reservation.locked_price.to_string(),
        });
        let (version, now) = (tx.version, tx.now_ms);
        let sender = tx.sender.clone();
        tx.state
            .reservations
            .insert(id.clone(), Stored::new(reservation, version, Some(sender)));
        tx.state.refresh_slot_status(slot_id, version, now);
        tx.created(&id, self.struct_type(EntityKind::Reservation));
        tx.emit(self.event_type(EventKind::ReservationCreated), event);
        Ok(())
    }

    fn lock_funds(&self, tx: &mut Tx<'_>, args: &[CallArg]) -> Result<()> {
        let reservation_id = arg_object(args, 0)?;
        let slot_id = arg_object(args, 1)?;
        let coins = arg_objects(args, 2)?;

        let reservation = tx
            .state
            .reservations
            .get(reservation_id)
            .map(|r| r.value.clone())
            .ok_or_else(|| reject(abort::INVALID_ARGUMENT, "E_RESERVATION_NOT_FOUND"))?;
        if reservation.driver != tx.sender {
            return Err(reject(abort::NOT_AUTHORIZED, "E_NOT_DRIVER"));
        }
        if reservation.escrow_id.is_some() {
            return Err(reject(abort::ESCROW_LOCKED, "E_ALREADY_LOCKED"));
        }
        if reservation.state != ReservationState::Requested {
            return Err(reject(abort::INVALID_STATE, "E_INVALID_RESERVATION_STATE"));
        }
        if &reservation.slot_id != slot_id {
            return Err(reject(abort::INVALID_ARGUMENT, "E_SLOT_MISMATCH"));
        }
        if coins.is_empty() {
            return Err(reject(abort::INSUFFICIENT_FUNDS, "E_INSUFFICIENT_FUNDS"));
        }

        let id = tx.new_id("escrow")?;
        let price = reservation.locked_price;
        let escrow = Escrow {
            id: id.clone(),
            reservation_id: reservation_id.clone(),
            driver: reservation.driver.clone(),
            owner: reservation.owner.clone(),
            driver_deposit: deposit_for(price),
            payment: price,
            owner_collateral: collateral_for(price),
            state: EscrowState::Locked,
            dispute: None,
            arbiter: tx.state.arbiter.clone(),
            driver_reputation_weight: tx.state.score_of(&reservation.driver),
            owner_reputation_weight: tx.state.score_of(&reservation.owner),
        };
        let event = json!({
            "escrow_id": id.as_str(),
            "reservation_id": reservation_id.as_str(),
            "driver": escrow.driver.as_str(),
            "owner": escrow.owner.as_str(),
            "amount": escrow.total_held().to_string(),
        });
        let version = tx.version;
        tx.state.escrows.insert(id.clone(), Stored::new(escrow, version, None));
        if let Some(stored) = tx.state.reservations.get_mut(reservation_id) {
            stored.value.escrow_id = Some(id.clone());
            stored.version = version;
        }
        tx.created(&id, self.struct_type(EntityKind::Escrow));
        tx.emit(self.event_type(EventKind::EscrowLocked), event);
        Ok(())
    }

    fn cancel_reservation(tx: &mut Tx<'_>, args: &[CallArg]) -> Result<()> {
        let reservation_id = arg_object(args, 0)?;
        let reservation = tx
            .state
            .reservations
            .get(reservation_id)
            .map(|r| r.value.clone())
            .ok_or_else(|| reject(abort::INVALID_ARGUMENT, "E_RESERVATION_NOT_FOUND"))?;
        if reservation.driver != tx.sender {
            return Err(reject(abort::NOT_AUTHORIZED, "E_NOT_DRIVER"));
        }
        if reservation.escrow_id.is_some() {
            return Err(reject(abort::ESCROW_LOCKED, "E_ESCROW_LOCKED"));
        }
        if reservation.state != ReservationState::Requested {
            return Err(reject(abort::INVALID_STATE, "E_INVALID_RESERVATION_STATE"));
        }
        let (version, now) = (tx.version, tx.now_ms);
        tx.state
            .set_reservation_state(reservation_id, ReservationState::Cancelled, version);
        tx.state.refresh_slot_status(&reservation.slot_id, version, now);
        Ok(())
    }

    fn mark_used(tx: &mut Tx<'_>, args: &[CallArg]) -> Result<()> {
        let escrow_id = arg_object(args, 0)?;
        let escrow = tx.state.escrow_parties(escrow_id, &tx.sender)?;
        if escrow.driver != tx.sender {
            return Err(reject(abort::NOT_AUTHORIZED, "E_NOT_DRIVER"));
        }
        let (version, now) = (tx.version, tx.now_ms);
        tx.state.set_escrow_state(escrow_id, EscrowState::Used, version)?;
        tx.state
            .set_reservation_state(&escrow.reservation_id, ReservationState::Active, version);
        if let Some(slot_id) = tx.state.reservations.get(&escrow.reservation_id).map(|r| r.value.slot_id.clone()) {
            tx.state.refresh_slot_status(&slot_id, version, now);
        }
        Ok(())
    }

    fn settle(tx: &mut Tx<'_>, args: &[CallArg]) -> Result<()> {
        let escrow_id = arg_object(args, 0)?;
        let escrow = tx.state.escrow_parties(escrow_id, &tx.sender)?;
        let (version, now) = (tx.version, tx.now_ms);
        if escrow.state != EscrowState::Used {
            return Err(reject(abort::INVALID_STATE, "E_INVALID_ESCROW_STATE"));
        }
        tx.state.set_escrow_state(escrow_id, EscrowState::Settled, version)?;
        tx.state
            .set_reservation_state(&escrow.reservation_id, ReservationState::Completed, version);

        let payment = escrow.payment;
        if let Some(slot_id) = tx.state.reservations.get(&escrow.reservation_id).map(|r| r.value.slot_id.clone()) {
            if let Some(slot) = tx.state.slots.get_mut(&slot_id) {
                slot.value.completed_reservations += 1;
                slot.value.total_revenue = slot.value.total_revenue.saturating_add(payment);
                slot.version = version;
            }
            tx.state.refresh_slot_status(&slot_id, version, now);
        }
        tx.state.update_profile(&escrow.driver, version, now, |p| {
            p.successful_parkings += 1;
            p.total_spent = p.total_spent.saturating_add(payment);
            p.score = p.score.adjusted(SETTLEMENT_REWARD);
        });
        tx.state.update_profile(&escrow.owner, version, now, |p| {
            p.successful_rentals += 1;
            p.total_earned = p.total_earned.saturating_add(payment);
            p.score = p.score.adjusted(SETTLEMENT_REWARD);
        });
        Ok(())
    }

    fn open_dispute(tx: &mut Tx<'_>, args: &[CallArg]) -> Result<()> {
        let escrow_id = arg_object(args, 0)?;
        let reason = arg_text(args, 1)?;
        let escrow = tx.state.escrow_parties(escrow_id, &tx.sender)?;
        let (version, now) = (tx.version, tx.now_ms);
        tx.state.set_escrow_state(escrow_id, EscrowState::Dispute, version)?;
        if let Some(stored) = tx.state.escrows.get_mut(escrow_id) {
            stored.value.dispute = Some(DisputeInfo {
                initiator: tx.sender.clone(),
                reason,
            });
        }
        tx.state
            .set_reservation_state(&escrow.reservation_id, ReservationState::Disputed, version);

        let counterparty = if tx.sender == escrow.driver {
            escrow.owner.clone()
        } else {
            escrow.driver.clone()
        };
        let sender = tx.sender.clone();
        tx.state.update_profile(&sender, version, now, |p| p.disputes_filed += 1);
        tx.state
            .update_profile(&counterparty, version, now, |p| p.disputes_received += 1);
        Ok(())
    }

    fn decide_dispute(tx: &mut Tx<'_>, args: &[CallArg]) -> Result<()> {
        let escrow_id = arg_object(args, 0)?;
        let favor_driver = arg_bool(args, 1)?;
        let escrow = tx
            .state
            .escrows
            .get(escrow_id)
            .map(|e| e.value.clone())
            .ok_or_else(|| reject(abort::INVALID_ARGUMENT, "E_ESCROW_NOT_FOUND"))?;
        if escrow.arbiter.as_ref() != Some(&tx.sender) {
            return Err(reject(abort::NOT_AUTHORIZED, "E_NOT_ARBITER"));
        }
        let (version, now) = (tx.version, tx.now_ms);
        let target = if favor_driver {
            EscrowState::Slashed
        } else {
            EscrowState::Settled
        };
        tx.state.set_escrow_state(escrow_id, target, version)?;

        let (winner, loser) = if favor_driver {
            (&escrow.driver, &escrow.owner)
        } else {
            (&escrow.owner, &escrow.driver)
        };
        tx.state.update_profile(winner, version, now, |p| {
            p.disputes_won += 1;
            p.score = p.score.adjusted(DISPUTE_WIN_REWARD);
        });
        tx.state.update_profile(loser, version, now, |p| {
            p.disputes_lost += 1;
            p.score = p.score.adjusted(DISPUTE_LOSS_PENALTY);
        });
        if let Some(slot_id) = tx.state.reservations.get(&escrow.reservation_id).map(|r| r.value.slot_id.clone()) {
            tx.state.refresh_slot_status(&slot_id, version, now);
        }
        Ok(())
    }

    fn register_profile(&self, tx: &mut Tx<'_>, args: &[CallArg]) -> Result<()> {
        let display_name = arg_text(args, 0)?;
        if tx.state.profile_by_user.contains_key(&tx.sender) {
            return Err(reject(
                abort::ALREADY_REGISTERED,
                "E_ALREADY_REGISTERED: profile already registered",
            ));
        }
        let id = tx.new_id("profile")?;
        let mut profile = UserProfile::new(id.clone(), tx.sender.clone(), tx.now_ms);
        profile.display_name = display_name;
        let (version, sender) = (tx.version, tx.sender.clone());
        tx.state.profile_by_user.insert(sender.clone(), id.clone());
        tx.state
            .profiles
            .insert(id.clone(), Stored::new(profile, version, Some(sender.clone())));
        tx.created(&id, self.struct_type(EntityKind::Profile));
        tx.emit(
            self.event_type(EventKind::ProfileCreated),
            json!({ "profile_id": id.as_str(), "user": sender.as_str() }),
        );
        Ok(())
    }

    fn rate_user(tx: &mut Tx<'_>, args: &[CallArg]) -> Result<()> {
        let target = arg_address(args, 0)?.clone();
        let rating = arg_u64(args, 1)?;
        if rating > Score::MAX.bps() {
            return Err(reject(abort::INVALID_ARGUMENT, "E_INVALID_RATING"));
        }
        if target == tx.sender {
            return Err(reject(abort::NOT_AUTHORIZED, "E_SELF_RATING"));
        }
        if !tx.state.profile_by_user.contains_key(&target) {
            return Err(reject(abort::INVALID_ARGUMENT, "E_PROFILE_NOT_FOUND"));
        }
        let (version, now) = (tx.version, tx.now_ms);
        let delta = (rating as i64 - Score::BASE.bps() as i64) / 20;
        tx.state.update_profile(&target, version, now, |p| {
            p.rating_count += 1;
            p.rating_sum = p.rating_sum.saturating_add(rating);
            p.score = p.score.adjusted(delta);
        });
        Ok(())
    }
}

impl LedgerReader for SimulatedLedger {
    async fn get_object(&self, id: &ObjectId) -> Result<Option<RawObject>> {
        self.faults.check(Fault::ObjectReads, "get_object")?;
        let state = self.state.lock();
        Ok(self.raw_object(&state, id))
    }

    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<&EventCursor>,
        limit: usize,
        descending: bool,
    ) -> Result<EventPage> {
        self.faults.check(Fault::EventQueries, "query_events")?;
        let state = self.state.lock();
        let mut matching: Vec<&RawEvent> = state
            .events
            .iter()
            .filter(|e| e.event_type == event_type)
            .collect();
        if descending {
            matching.reverse();
        }
        let start = match cursor {
            Some(cursor) => matching
                .iter()
                .position(|e| &e.id == cursor)
                .map_or(matching.len(), |i| i + 1),
            None => 0,
        };
        let rest = &matching[start.min(matching.len())..];
        let data: Vec<RawEvent> = rest.iter().take(limit).map(|e| (*e).clone()).collect();
        let has_next_page = rest.len() > data.len();
        Ok(EventPage {
            next_cursor: data.last().map(|e| e.id.clone()),
            has_next_page,
            data,
        })
    }

    async fn owned_objects(&self, owner: &Address, struct_type: &str) -> Result<Vec<RawObject>> {
        self.faults.check(Fault::ObjectReads, "owned_objects")?;
        let state = self.state.lock();
        let owned_ids: Vec<&ObjectId> = if struct_type == self.struct_type(EntityKind::OwnerCap) {
            owned_by(&state.caps, owner)
        } else if struct_type == self.struct_type(EntityKind::Reservation) {
            owned_by(&state.reservations, owner)
        } else if struct_type == self.struct_type(EntityKind::Profile) {
            owned_by(&state.profiles, owner)
        } else {
            Vec::new()
        };
        Ok(owned_ids
            .into_iter()
            .filter_map(|id| self.raw_object(&state, id))
            .collect())
    }

    async fn view_call(&self, call: &ViewCall) -> Result<Value> {
        self.faults.check(Fault::ViewCalls, "view_call")?;
        match call.function {
            ViewFunction::CalculateDeposit => Ok(json!(deposit_for(arg_u64(&call.args, 0)?).to_string())),
            ViewFunction::CalculateCollateral => {
                Ok(json!(collateral_for(arg_u64(&call.args, 0)?).to_string()))
            }
            ViewFunction::DemandFactor => {
                let zone_id = arg_object(&call.args, 0)?;
                let state = self.state.lock();
                let (total, busy) = state
                    .slots
                    .values()
                    .filter(|s| s.value.zone_id.as_ref() == Some(zone_id))
                    .fold((0u64, 0u64), |(total, busy), s| {
                        (total + 1, busy + u64::from(s.value.status != SlotStatus::Free))
                    });
                let neutral = park_core::slot::NEUTRAL_COEFF_BPS;
                let factor = if total == 0 {
                    neutral
                } else {
                    neutral + busy * neutral / (2 * total)
                };
                Ok(json!(factor.to_string()))
            }
        }
    }
}

fn owned_by<'a, T>(objects: &'a HashMap<ObjectId, Stored<T>>, owner: &Address) -> Vec<&'a ObjectId> {
    objects
        .iter()
        .filter(|(_, stored)| stored.owner.as_ref() == Some(owner))
        .map(|(id, _)| id)
        .collect()
}

impl LedgerWriter for SimulatedLedger {
    async fn submit(&self, call: &EntryCall) -> Result<TxReceipt> {
        self.faults.check(Fault::Submits, "submit")?;
        let (_, name) = call.function.target();
        let mut guard = self.state.lock();
        let mut tx = self.begin(&mut guard, &call.sender, name);
        let args = call.args.as_slice();

        let outcome = match call.function {
            EntryFunction::CreateReservation => self.create_reservation(&mut tx, args),
            EntryFunction::LockFunds => self.lock_funds(&mut tx, args),
            EntryFunction::CancelReservation => Self::cancel_reservation(&mut tx, args),
            EntryFunction::MarkUsed => Self::mark_used(&mut tx, args),
            EntryFunction::Settle => Self::settle(&mut tx, args),
            EntryFunction::OpenDispute => Self::open_dispute(&mut tx, args),
            EntryFunction::DecideDispute => Self::decide_dispute(&mut tx, args),
            EntryFunction::RegisterProfile => self.register_profile(&mut tx, args),
            EntryFunction::RateUser => Self::rate_user(&mut tx, args),
        };

        match outcome {
            Ok(()) => {
                let receipt = tx.receipt();
                debug!(function = name, digest = %receipt.digest, "transaction executed");
                Ok(receipt)
            }
            Err(e) => {
                debug!(function = name, error = %e, "transaction aborted");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::decode_entity;
    use park_core::window::MS_PER_HOUR;

    const T0: u64 = 1_700_000_000_000;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn ledger() -> SimulatedLedger {
        let program = ProgramConfig::new(ObjectId::parse("0x2a").unwrap());
        let ledger = SimulatedLedger::new(program).with_arbiter(addr("0xb"));
        ledger.set_now(Some(T0));
        ledger
    }

    fn listed(ledger: &SimulatedLedger) -> ObjectId {
        let spot = NewSlot::new(GeoPoint::from_micro(37_774_900, -122_419_400).unwrap(), 1_000)
            .with_coeff(15_000)
            .with_name("Dock 4");
        ledger.list_slot(&addr("0xa"), spot).unwrap()
    }

    async fn reserve(ledger: &SimulatedLedger, slot: &ObjectId, start: u64, hours: u64) -> Result<ObjectId> {
        let call = EntryCall::new(
            EntryFunction::CreateReservation,
            addr("0xd"),
            vec![CallArg::Object(slot.clone()), CallArg::U64(start), CallArg::U64(hours)],
        );
        let receipt = ledger.submit(&call).await?;
        Ok(receipt.created_of(EntityKind::Reservation).unwrap().clone())
    }

    async fn lock(ledger: &SimulatedLedger, reservation: &ObjectId, slot: &ObjectId) -> Result<ObjectId> {
        let call = EntryCall::new(
            EntryFunction::LockFunds,
            addr("0xd"),
            vec![
                CallArg::Object(reservation.clone()),
                CallArg::Object(slot.clone()),
                CallArg::Objects(vec![ObjectId::parse("0xc0").unwrap()]),
            ],
        );
        let receipt = ledger.submit(&call).await?;
        Ok(receipt.created_of(EntityKind::Escrow).unwrap().clone())
    }

    async fn escrow_call(ledger: &SimulatedLedger, function: EntryFunction, sender: &str, args: Vec<CallArg>) -> Result<TxReceipt> {
        ledger.submit(&EntryCall::new(function, addr(sender), args)).await
    }

    async fn read<T: LedgerEntity>(ledger: &SimulatedLedger, id: &ObjectId) -> T {
        decode_entity(&ledger.get_object(id).await.unwrap().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_list_slot_emits_event_and_cap() {
        let ledger = ledger();
        let slot_id = listed(&ledger);
        let ty = EventKind::SlotCreated.event_type(ledger.program());
        let page = ledger.query_events(&ty, None, 10, true).await.unwrap();
        assert_eq!(page.data.len(), 1);

        let caps = ledger
            .owned_objects(&addr("0xa"), &EntityKind::OwnerCap.struct_type(ledger.program()))
            .await
            .unwrap();
        let cap: OwnerCap = decode_entity(&caps[0]).unwrap();
        assert_eq!(cap.slot_id, slot_id);
    }

    #[tokio::test]
    async fn test_reservation_price_and_conflicts() {
        let ledger = ledger();
        let slot_id = listed(&ledger);
        let start = T0 + MS_PER_HOUR;

        let first = reserve(&ledger, &slot_id, start, 2).await.unwrap();
        let reservation: Reservation = read(&ledger, &first).await;
        assert_eq!(reservation.locked_price, 3_000);
        assert_eq!(reservation.escrow_id, None);

        let overlap = reserve(&ledger, &slot_id, start + MS_PER_HOUR, 2).await.unwrap_err();
        assert!(matches!(overlap, LedgerError::Rejected { code: abort::SLOT_UNAVAILABLE, .. }));

        reserve(&ledger, &slot_id, start + 2 * MS_PER_HOUR, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_lock_funds_computes_deposit_and_collateral() {
        let ledger = ledger();
        let slot_id = listed(&ledger);
        let reservation_id = reserve(&ledger, &slot_id, T0 + MS_PER_HOUR, 2).await.unwrap();
        let escrow_id = lock(&ledger, &reservation_id, &slot_id).await.unwrap();

        let escrow: Escrow = read(&ledger, &escrow_id).await;
        assert_eq!(escrow.payment, 3_000);
        assert_eq!(escrow.driver_deposit, 300);
        assert_eq!(escrow.owner_collateral, 600);
        assert_eq!(escrow.state, EscrowState::Locked);

        let reservation: Reservation = read(&ledger, &reservation_id).await;
        assert_eq!(reservation.escrow_id, Some(escrow_id));

        let again = lock(&ledger, &reservation_id, &slot_id).await.unwrap_err();
        assert!(matches!(again, LedgerError::Rejected { code: abort::ESCROW_LOCKED, .. }));
    }

    #[tokio::test]
    async fn test_escrow_only_moves_forward() {
        let ledger = ledger();
        let slot_id = listed(&ledger);
        let reservation_id = reserve(&ledger, &slot_id, T0 + MS_PER_HOUR, 1).await.unwrap();
        let escrow_id = lock(&ledger, &reservation_id, &slot_id).await.unwrap();
        let target = || vec![CallArg::Object(escrow_id.clone())];

        let early = escrow_call(&ledger, EntryFunction::Settle, "0xd", target()).await.unwrap_err();
        assert!(matches!(early, LedgerError::Rejected { code: abort::INVALID_STATE, .. }));

        escrow_call(&ledger, EntryFunction::MarkUsed, "0xd", target()).await.unwrap();
        let slot: Slot = read(&ledger, &slot_id).await;
        assert_eq!(slot.status, SlotStatus::Occupied);

        escrow_call(&ledger, EntryFunction::Settle, "0xa", target()).await.unwrap();
        let twice = escrow_call(&ledger, EntryFunction::MarkUsed, "0xd", target()).await.unwrap_err();
        assert!(matches!(twice, LedgerError::Rejected { code: abort::INVALID_STATE, .. }));

        let slot: Slot = read(&ledger, &slot_id).await;
        assert_eq!(slot.status, SlotStatus::Free);
        assert_eq!(slot.completed_reservations, 1);
        assert_eq!(slot.total_revenue, 1_500);
    }

    #[tokio::test]
    async fn test_duplicate_registration_is_rejected() {
        let ledger = ledger();
        let register = || EntryCall::new(EntryFunction::RegisterProfile, addr("0xd"), vec![CallArg::Bytes(b"dee".to_vec())]);
        let receipt = ledger.submit(&register()).await.unwrap();
        let profile_id = receipt.created_of(EntityKind::Profile).unwrap().clone();

        let err = ledger.submit(&register()).await.unwrap_err();
        assert!(err.is_already_registered());

        let profile: UserProfile = read(&ledger, &profile_id).await;
        assert_eq!(profile.display_name.as_deref(), Some("dee"));
        assert_eq!(profile.score, Score::BASE);
    }

    #[tokio::test]
    async fn test_dispute_updates_both_profiles() {
        let ledger = ledger();
        for user in ["0xa", "0xd"] {
            let call = EntryCall::new(EntryFunction::RegisterProfile, addr(user), vec![CallArg::Bytes(vec![])]);
            ledger.submit(&call).await.unwrap();
        }
        let slot_id = listed(&ledger);
        let reservation_id = reserve(&ledger, &slot_id, T0 + MS_PER_HOUR, 1).await.unwrap();
        let escrow_id = lock(&ledger, &reservation_id, &slot_id).await.unwrap();

        escrow_call(
            &ledger,
            EntryFunction::OpenDispute,
            "0xd",
            vec![CallArg::Object(escrow_id.clone()), CallArg::Bytes(b"blocked".to_vec())],
        )
        .await
        .unwrap();
        let not_arbiter = escrow_call(
            &ledger,
            EntryFunction::DecideDispute,
            "0xd",
            vec![CallArg::Object(escrow_id.clone()), CallArg::Bool(true)],
        )
        .await
        .unwrap_err();
        assert!(matches!(not_arbiter, LedgerError::Rejected { code: abort::NOT_AUTHORIZED, .. }));

        escrow_call(
            &ledger,
            EntryFunction::DecideDispute,
            "0xb",
            vec![CallArg::Object(escrow_id.clone()), CallArg::Bool(true)],
        )
        .await
        .unwrap();

        let escrow: Escrow = read(&ledger, &escrow_id).await;
        assert_eq!(escrow.state, EscrowState::Slashed);
        assert_eq!(escrow.dispute.unwrap().reason.as_deref(), Some("blocked"));

        let ty = EntityKind::Profile.struct_type(ledger.program());
        let owner = &ledger.owned_objects(&addr("0xa"), &ty).await.unwrap()[0];
        let owner: UserProfile = decode_entity(owner).unwrap();
        assert_eq!(owner.disputes_received, 1);
        assert_eq!(owner.disputes_lost, 1);
        assert_eq!(owner.score.bps(), 4_500);
    }

    #[tokio::test]
    async fn test_rating_is_clamped_and_accumulated() {
        let ledger = ledger();
        let call = EntryCall::new(EntryFunction::RegisterProfile, addr("0xa"), vec![CallArg::Bytes(vec![])]);
        ledger.submit(&call).await.unwrap();
        let rate = |bps| EntryCall::new(EntryFunction::RateUser, addr("0xd"), vec![CallArg::Address(addr("0xa")), CallArg::U64(bps)]);

        ledger.submit(&rate(10_000)).await.unwrap();
        ledger.submit(&rate(9_000)).await.unwrap();
        assert!(ledger.submit(&rate(10_001)).await.is_err());

        let ty = EntityKind::Profile.struct_type(ledger.program());
        let raw = &ledger.owned_objects(&addr("0xa"), &ty).await.unwrap()[0];
        let profile: UserProfile = decode_entity(raw).unwrap();
        assert_eq!(profile.rating_count, 2);
        assert_eq!(profile.rating_sum, 19_000);
        assert_eq!(profile.score.bps(), 5_000 + 250 + 200);
    }

    #[tokio::test]
    async fn test_event_pagination() {
        let ledger = ledger();
        for _ in 0..5 {
            listed(&ledger);
        }
        let ty = EventKind::SlotCreated.event_type(ledger.program());
        let first = ledger.query_events(&ty, None, 2, true).await.unwrap();
        assert_eq!(first.data.len(), 2);
        assert!(first.has_next_page);
        let second = ledger
            .query_events(&ty, first.next_cursor.as_ref(), 10, true)
            .await
            .unwrap();
        assert_eq!(second.data.len(), 3);
        assert!(!second.has_next_page);
    }

    #[tokio::test]
    async fn test_faults() {
        let ledger = ledger();
        let slot_id = listed(&ledger);
        ledger.set_fault(Fault::ObjectReads, true);
        assert!(ledger.get_object(&slot_id).await.unwrap_err().is_transient());
        ledger.set_fault(Fault::ObjectReads, false);
        assert!(ledger.get_object(&slot_id).await.unwrap().is_some());

        ledger.set_fault(Fault::ViewCalls, true);
        let call = ViewCall::new(ViewFunction::CalculateDeposit, vec![CallArg::U64(100)]);
        assert!(ledger.view_call(&call).await.is_err());
    }

    #[tokio::test]
    async fn test_view_calls() {
        let ledger = ledger();
        let deposit = ViewCall::new(ViewFunction::CalculateDeposit, vec![CallArg::U64(300_000_000)]);
        assert_eq!(ledger.view_call(&deposit).await.unwrap(), json!("30000000"));
        let zone = ViewCall::new(ViewFunction::DemandFactor, vec![CallArg::Object(ObjectId::parse("0x20").unwrap())]);
        assert_eq!(ledger.view_call(&zone).await.unwrap(), json!("10000"));
    }

    #[tokio::test]
    async fn test_serves_configured_shape() {
        let program = ProgramConfig::new(ObjectId::parse("0x2a").unwrap());
        let ledger = SimulatedLedger::new(program).with_option_shape(OptionShape::Vector);
        let slot_id = listed(&ledger);
        let raw = ledger.get_object(&slot_id).await.unwrap().unwrap();
        assert_eq!(raw.fields["zone_id"], json!({ "vec": [] }));
    }
}
