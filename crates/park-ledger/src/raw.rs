//! Loosely typed values exchanged with the ledger node.
//!
//! Objects and events arrive as JSON whose exact shape depends on the node
//! version and on how the program's types serialise. Nothing here interprets
//! field contents; see [`crate::decode`] for that.

use park_core::{Address, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{Module, ProgramConfig};

/// An object as returned by the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObject {
    /// Object identifier as reported.
    pub object_id: String,
    /// Object version; grows with every mutation.
    pub version: u64,
    /// Full type string, e.g. `0x..::parking::ParkingSlot`.
    pub type_tag: String,
    /// Owning address for address-owned objects.
    pub owner: Option<String>,
    /// Field map.
    pub fields: Value,
}

impl RawObject {
    /// The struct name without package, module or type parameters.
    #[must_use]
    pub fn struct_name(&self) -> &str {
        struct_name(&self.type_tag)
    }
}

/// Strips package, module and generics from a type string.
#[must_use]
pub fn struct_name(type_tag: &str) -> &str {
    let base = type_tag.split('<').next().unwrap_or(type_tag);
    base.rsplit("::").next().unwrap_or(base)
}

/// Position of an event in the log.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventCursor {
    /// Digest of the emitting transaction.
    pub tx_digest: String,
    /// Sequence number within that transaction.
    #[serde(with = "u64_string")]
    pub event_seq: u64,
}

/// An event emitted by the ledger program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    /// Log position.
    pub id: EventCursor,
    /// Full event type string.
    pub event_type: String,
    /// Transaction sender.
    pub sender: Option<String>,
    /// Emission time (ms since epoch).
    pub timestamp_ms: Option<u64>,
    /// Event payload.
    pub parsed: Value,
}

/// One page of an event query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventPage {
    /// Events in the requested order.
    pub data: Vec<RawEvent>,
    /// Where the next page starts.
    pub next_cursor: Option<EventCursor>,
    /// Whether more events exist beyond this page.
    pub has_next_page: bool,
}

/// Creation events used to discover entity identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A slot was listed.
    SlotCreated,
    /// A reservation was made.
    ReservationCreated,
    /// Funds were locked into an escrow.
    EscrowLocked,
    /// A user registered a profile.
    ProfileCreated,
}

impl EventKind {
    /// Module emitting the event.
    #[must_use]
    pub const fn module(self) -> Module {
        match self {
            Self::SlotCreated => Module::Parking,
            Self::ReservationCreated => Module::Reservation,
            Self::EscrowLocked => Module::Escrow,
            Self::ProfileCreated => Module::Reputation,
        }
    }

    /// Event struct name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::SlotCreated => "SlotCreated",
            Self::ReservationCreated => "ReservationCreated",
            Self::EscrowLocked => "EscrowLocked",
            Self::ProfileCreated => "ProfileCreated",
        }
    }

    /// Payload field carrying the new entity's identifier.
    #[must_use]
    pub const fn id_field(self) -> &'static str {
        match self {
            Self::SlotCreated => "slot_id",
            Self::ReservationCreated => "reservation_id",
            Self::EscrowLocked => "escrow_id",
            Self::ProfileCreated => "profile_id",
        }
    }

    /// Full event type string for a program.
    #[must_use]
    pub fn event_type(self, program: &ProgramConfig) -> String {
        program.qualified(self.module(), self.name())
    }
}

/// Object types of the ledger program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A parking slot.
    Slot,
    /// Capability proving ownership of a slot.
    OwnerCap,
    /// A reservation.
    Reservation,
    /// An escrow.
    Escrow,
    /// A user profile.
    Profile,
}

impl EntityKind {
    /// Module defining the type.
    #[must_use]
    pub const fn module(self) -> Module {
        match self {
            Self::Slot | Self::OwnerCap => Module::Parking,
            Self::Reservation => Module::Reservation,
            Self::Escrow => Module::Escrow,
            Self::Profile => Module::Reputation,
        }
    }

    /// Struct name.
    #[must_use]
    pub const fn struct_name(self) -> &'static str {
        match self {
            Self::Slot => "ParkingSlot",
            Self::OwnerCap => "OwnerCap",
            Self::Reservation => "Reservation",
            Self::Escrow => "Escrow",
            Self::Profile => "UserProfile",
        }
    }

    /// Full struct type string for a program.
    #[must_use]
    pub fn struct_type(self, program: &ProgramConfig) -> String {
        program.qualified(self.module(), self.struct_name())
    }
}

/// Read-only program functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewFunction {
    /// Driver deposit for a price.
    CalculateDeposit,
    /// Owner collateral for a price.
    CalculateCollateral,
    /// Current demand coefficient of a zone.
    DemandFactor,
}

impl ViewFunction {
    /// Module and function name.
    #[must_use]
    pub const fn target(self) -> (Module, &'static str) {
        match self {
            Self::CalculateDeposit => (Module::Escrow, "calculate_deposit"),
            Self::CalculateCollateral => (Module::Escrow, "calculate_collateral"),
            Self::DemandFactor => (Module::Parking, "demand_factor"),
        }
    }
}

/// State-changing program entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryFunction {
    /// Reserve a slot: `[slot, start_ms, hours]`.
    CreateReservation,
    /// Fund a reservation: `[reservation, slot, coins]`.
    LockFunds,
    /// Cancel an unfunded reservation: `[reservation]`.
    CancelReservation,
    /// Driver checks in: `[escrow]`.
    MarkUsed,
    /// Release funds normally: `[escrow]`.
    Settle,
    /// Open a dispute: `[escrow, reason]`.
    OpenDispute,
    /// Arbiter ruling: `[escrow, favor_driver]`.
    DecideDispute,
    /// Create the sender's profile: `[display_name]`.
    RegisterProfile,
    /// Rate another user: `[user, rating_bps]`.
    RateUser,
}

impl EntryFunction {
    /// Module and function name.
    #[must_use]
    pub const fn target(self) -> (Module, &'static str) {
        match self {
            Self::CreateReservation => (Module::Reservation, "create_reservation"),
            Self::CancelReservation => (Module::Reservation, "cancel_reservation"),
            Self::LockFunds => (Module::Escrow, "lock_funds"),
            Self::MarkUsed => (Module::Escrow, "mark_used"),
            Self::Settle => (Module::Escrow, "settle"),
            Self::OpenDispute => (Module::Escrow, "open_dispute"),
            Self::DecideDispute => (Module::Escrow, "decide_dispute"),
            Self::RegisterProfile => (Module::Reputation, "register"),
            Self::RateUser => (Module::Reputation, "rate_user"),
        }
    }
}

/// A typed call argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// Object reference.
    Object(ObjectId),
    /// Several object references.
    Objects(Vec<ObjectId>),
    /// Account address.
    Address(Address),
    /// Unsigned integer.
    U64(u64),
    /// Boolean.
    Bool(bool),
    /// Byte string.
    Bytes(Vec<u8>),
}

/// A call to a read-only function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewCall {
    /// Function to call.
    pub function: ViewFunction,
    /// Positional arguments.
    pub args: Vec<CallArg>,
}

impl ViewCall {
    /// Creates a view call.
    #[must_use]
    pub const fn new(function: ViewFunction, args: Vec<CallArg>) -> Self {
        Self { function, args }
    }
}

/// A call to a state-changing entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryCall {
    /// Function to call.
    pub function: EntryFunction,
    /// Signing account.
    pub sender: Address,
    /// Positional arguments.
    pub args: Vec<CallArg>,
}

impl EntryCall {
    /// Creates an entry call.
    #[must_use]
    pub const fn new(function: EntryFunction, sender: Address, args: Vec<CallArg>) -> Self {
        Self {
            function,
            sender,
            args,
        }
    }
}

/// An object created by a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedObject {
    /// New object.
    pub id: ObjectId,
    /// Its full type.
    pub type_tag: String,
}

/// Outcome of an executed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    /// Transaction digest.
    pub digest: String,
    /// Objects the transaction created.
    pub created: Vec<CreatedObject>,
}

impl TxReceipt {
    /// First created object of the given kind.
    #[must_use]
    pub fn created_of(&self, kind: EntityKind) -> Option<&ObjectId> {
        self.created
            .iter()
            .find(|o| struct_name(&o.type_tag) == kind.struct_name())
            .map(|o| &o.id)
    }
}

mod u64_string {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Text(String),
            Number(u64),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(n) => Ok(n),
            Repr::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
