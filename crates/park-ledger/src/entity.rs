//! Mapping between ledger objects and domain entities.
//!
//! Decoding never fails loudly. A missing or malformed structural field
//! (identifier, parties, state) makes the object read as absent; a bad
//! non-critical field is dropped with a warning and the entity survives.

use park_core::{
    Address, DisputeInfo, Escrow, EscrowState, GeoPoint, ObjectId, Reservation,
    ReservationState, Score, Slot, SlotStatus, UserProfile,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use crate::decode::{
    EnumRepr, FieldReader, OptionShape, encode_optional, text_as_value, value_as_address,
    value_as_enum, value_as_i64, value_as_id, value_as_u64,
};
use crate::raw::{EntityKind, RawObject};

/// A domain entity stored as a ledger object.
pub trait LedgerEntity: Sized + Send + 'static {
    /// Object type of the entity.
    const KIND: EntityKind;

    /// Reads the entity from its fields.
    ///
    /// Callers should use [`decode_entity`], which also checks the type.
    fn from_fields(fields: &FieldReader<'_>) -> Option<Self>;

    /// Writes the entity's fields, encoding optional values in `shape`.
    fn to_fields(&self, shape: OptionShape) -> Value;

    /// The entity's object identifier.
    fn object_id(&self) -> &ObjectId;
}

/// Decodes `raw` as `T`, or `None` if it is another type or malformed.
pub fn decode_entity<T: LedgerEntity>(raw: &RawObject) -> Option<T> {
    if raw.struct_name() != T::KIND.struct_name() {
        debug!(
            object_id = %raw.object_id,
            expected = T::KIND.struct_name(),
            found = %raw.type_tag,
            "object has unexpected type"
        );
        return None;
    }
    let reader = FieldReader::new(T::KIND.struct_name(), raw)?;
    T::from_fields(&reader)
}

/// Capability object proving ownership of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerCap {
    /// Capability identifier.
    pub id: ObjectId,
    /// Slot it controls.
    pub slot_id: ObjectId,
}

fn enum_parser<T>(
    from_code: fn(u64) -> park_core::Result<T>,
    from_name: fn(&str) -> park_core::Result<T>,
) -> impl Fn(&Value) -> Option<T> {
    move |value| match value_as_enum(value)? {
        EnumRepr::Code(code) => from_code(code).ok(),
        EnumRepr::Name(name) => from_name(&name).ok(),
    }
}

fn uid(id: &ObjectId) -> Value {
    json!({ "id": id.as_str() })
}

fn opt_id(id: Option<&ObjectId>, shape: OptionShape) -> Value {
    encode_optional(id.map(|id| json!(id.as_str())), shape)
}

fn opt_text(text: Option<&str>, shape: OptionShape) -> Value {
    encode_optional(text.map(text_as_value), shape)
}

impl LedgerEntity for Slot {
    const KIND: EntityKind = EntityKind::Slot;

    fn from_fields(f: &FieldReader<'_>) -> Option<Self> {
        let id = f.object_id()?;
        let owner = f.required(&["owner"], value_as_address)?;
        let lat = f.required(&["latitude", "lat"], value_as_i64)?;
        let lng = f.required(&["longitude", "lng"], value_as_i64)?;
        let Ok(location) = GeoPoint::from_micro(lat, lng) else {
            debug!(slot_id = %id, lat, lng, "slot coordinates out of range");
            return None;
        };
        let base_price_per_hour = f.required(&["base_price_per_hour", "price_per_hour"], value_as_u64)?;
        let status = f.required(&["status"], enum_parser(SlotStatus::from_code, SlotStatus::from_name))?;

        Some(Self {
            id,
            owner,
            location,
            base_price_per_hour,
            dynamic_coeff_bps: f.number_or(
                &["dynamic_coeff", "dynamic_coeff_bps"],
                park_core::slot::NEUTRAL_COEFF_BPS,
            ),
            status,
            name: f.text(&["name", "location_name"]),
            address: f.text(&["address", "location_address"]),
            zone_id: f.optional(&["zone_id"], value_as_id),
            completed_reservations: f.number_or(&["total_reservations", "completed_reservations"], 0),
            total_revenue: f.number_or(&["total_revenue"], 0),
        })
    }

    fn to_fields(&self, shape: OptionShape) -> Value {
        json!({
            "id": uid(&self.id),
            "owner": self.owner.as_str(),
            "latitude": self.location.lat_micro.to_string(),
            "longitude": self.location.lng_micro.to_string(),
            "base_price_per_hour": self.base_price_per_hour.to_string(),
            "dynamic_coeff": self.dynamic_coeff_bps.to_string(),
            "status": self.status.code(),
            "name": opt_text(self.name.as_deref(), shape),
            "address": opt_text(self.address.as_deref(), shape),
            "zone_id": opt_id(self.zone_id.as_ref(), shape),
            "total_reservations": self.completed_reservations.to_string(),
            "total_revenue": self.total_revenue.to_string(),
        })
    }

    fn object_id(&self) -> &ObjectId {
        &self.id
    }
}

impl LedgerEntity for Reservation {
    const KIND: EntityKind = EntityKind::Reservation;

    fn from_fields(f: &FieldReader<'_>) -> Option<Self> {
        Some(Self {
            id: f.object_id()?,
            slot_id: f.required(&["slot_id"], value_as_id)?,
            driver: f.required(&["driver"], value_as_address)?,
            owner: f.required(&["owner"], value_as_address)?,
            start_time_ms: f.required(&["start_time", "start_time_ms"], value_as_u64)?,
            duration_hours: f.required(&["duration_hours", "duration"], value_as_u64)?,
            locked_price: f.required(&["locked_price", "price"], value_as_u64)?,
            state: f.required(
                &["state", "status"],
                enum_parser(ReservationState::from_code, ReservationState::from_name),
            )?,
            escrow_id: f.optional(&["escrow_id"], value_as_id),
        })
    }

    fn to_fields(&self, shape: OptionShape) -> Value {
        json!({
            "id": uid(&self.id),
            "slot_id": self.slot_id.as_str(),
            "driver": self.driver.as_str(),
            "owner": self.owner.as_str(),
            "start_time": self.start_time_ms.to_string(),
            "duration_hours": self.duration_hours.to_string(),
            "locked_price": self.locked_price.to_string(),
            "state": self.state.code(),
            "escrow_id": opt_id(self.escrow_id.as_ref(), shape),
        })
    }

    fn object_id(&self) -> &ObjectId {
        &self.id
    }
}

impl LedgerEntity for Escrow {
    const KIND: EntityKind = EntityKind::Escrow;

    fn from_fields(f: &FieldReader<'_>) -> Option<Self> {
        let id = f.object_id()?;
        let driver = f.required(&["driver"], value_as_address)?;
        let state = f.required(
            &["state", "status"],
            enum_parser(EscrowState::from_code, EscrowState::from_name),
        )?;

        let initiator = f.optional(&["dispute_initiator"], value_as_address);
        let flagged = f.flag(&["dispute_flag", "disputed"]);
        let dispute = match initiator {
            Some(initiator) => Some(DisputeInfo {
                initiator,
                reason: f.text(&["dispute_reason"]),
            }),
            None => {
                if flagged {
                    debug!(escrow_id = %id, "dispute flag set without an initiator");
                }
                None
            }
        };

        Some(Self {
            reservation_id: f.required(&["reservation_id"], value_as_id)?,
            owner: f.required(&["owner"], value_as_address)?,
            driver_deposit: f.number_or(&["driver_deposit", "deposit"], 0),
            payment: f.number_or(&["payment", "payment_amount"], 0),
            owner_collateral: f.number_or(&["owner_collateral", "collateral"], 0),
            arbiter: f.optional(&["arbiter"], value_as_address),
            driver_reputation_weight: f.number_or(&["driver_reputation_weight"], Score::BASE.bps()),
            owner_reputation_weight: f.number_or(&["owner_reputation_weight"], Score::BASE.bps()),
            id,
            driver,
            state,
            dispute,
        })
    }

    fn to_fields(&self, shape: OptionShape) -> Value {
        let initiator = self.dispute.as_ref().map(|d| json!(d.initiator.as_str()));
        let reason = self.dispute.as_ref().and_then(|d| d.reason.as_deref());
        json!({
            "id": uid(&self.id),
            "reservation_id": self.reservation_id.as_str(),
            "driver": self.driver.as_str(),
            "owner": self.owner.as_str(),
            "driver_deposit": self.driver_deposit.to_string(),
            "payment": self.payment.to_string(),
            "owner_collateral": self.owner_collateral.to_string(),
            "state": self.state.code(),
            "dispute_flag": self.dispute.is_some(),
            "dispute_initiator": encode_optional(initiator, shape),
            "dispute_reason": opt_text(reason, shape),
            "arbiter": encode_optional(self.arbiter.as_ref().map(|a| json!(a.as_str())), shape),
            "driver_reputation_weight": self.driver_reputation_weight.to_string(),
            "owner_reputation_weight": self.owner_reputation_weight.to_string(),
        })
    }

    fn object_id(&self) -> &ObjectId {
        &self.id
    }
}

impl LedgerEntity for UserProfile {
    const KIND: EntityKind = EntityKind::Profile;

    fn from_fields(f: &FieldReader<'_>) -> Option<Self> {
        let score = f.required(&["reputation_score", "score"], value_as_u64)?;
        let created_at_ms = f.number_or(&["created_at"], 0);
        Some(Self {
            id: f.object_id()?,
            address: f.required(&["owner", "user"], value_as_address)?,
            display_name: f.text(&["display_name", "name"]),
            score: Score::clamped(score),
            successful_parkings: f.number_or(&["successful_parkings"], 0),
            successful_rentals: f.number_or(&["successful_rentals"], 0),
            disputes_filed: f.number_or(&["disputes_filed"], 0),
            disputes_received: f.number_or(&["disputes_received"], 0),
            disputes_won: f.number_or(&["disputes_won"], 0),
            disputes_lost: f.number_or(&["disputes_lost"], 0),
            no_shows: f.number_or(&["no_shows"], 0),
            late_arrivals: f.number_or(&["late_arrivals"], 0),
            total_spent: f.number_or(&["total_spent"], 0),
            total_earned: f.number_or(&["total_earned"], 0),
            rating_count: f.number_or(&["rating_count"], 0),
            rating_sum: f.number_or(&["rating_sum"], 0),
            created_at_ms,
            updated_at_ms: f.number_or(&["updated_at", "last_updated"], created_at_ms),
        })
    }

    fn to_fields(&self, shape: OptionShape) -> Value {
        json!({
            "id": uid(&self.id),
            "owner": self.address.as_str(),
            "display_name": opt_text(self.display_name.as_deref(), shape),
            "reputation_score": self.score.bps().to_string(),
            "successful_parkings": self.successful_parkings.to_string(),
            "successful_rentals": self.successful_rentals.to_string(),
            "disputes_filed": self.disputes_filed.to_string(),
            "disputes_received": self.disputes_received.to_string(),
            "disputes_won": self.disputes_won.to_string(),
            "disputes_lost": self.disputes_lost.to_string(),
            "no_shows": self.no_shows.to_string(),
            "late_arrivals": self.late_arrivals.to_string(),
            "total_spent": self.total_spent.to_string(),
            "total_earned": self.total_earned.to_string(),
            "rating_count": self.rating_count.to_string(),
            "rating_sum": self.rating_sum.to_string(),
            "created_at": self.created_at_ms.to_string(),
            "updated_at": self.updated_at_ms.to_string(),
        })
    }

    fn object_id(&self) -> &ObjectId {
        &self.id
    }
}

impl LedgerEntity for OwnerCap {
    const KIND: EntityKind = EntityKind::OwnerCap;

    fn from_fields(f: &FieldReader<'_>) -> Option<Self> {
        Some(Self {
            id: f.object_id()?,
            slot_id: f.required(&["slot_id"], value_as_id)?,
        })
    }

    fn to_fields(&self, _shape: OptionShape) -> Value {
        json!({
            "id": uid(&self.id),
            "slot_id": self.slot_id.as_str(),
        })
    }

    fn object_id(&self) -> &ObjectId {
        &self.id
    }
}

/// Wraps an entity into the raw form the node returns.
#[must_use]
pub fn to_raw<T: LedgerEntity>(
    entity: &T,
    type_tag: String,
    version: u64,
    owner: Option<&Address>,
    shape: OptionShape,
) -> RawObject {
    RawObject {
        object_id: entity.object_id().to_string(),
        version,
        type_tag,
        owner: owner.map(ToString::to_string),
        fields: entity.to_fields(shape),
    }
}
