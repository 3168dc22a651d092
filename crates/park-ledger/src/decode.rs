//! Reading the node's loosely typed JSON.
//!
//! # Optional values
//!
//! An optional field can reach us in several shapes depending on the node
//! and the program's types. Each shape is tried in this order:
//!
//! | Shape | Present | Absent |
//! |---|---|---|
//! | [`OptionShape::Direct`] | `"0xab.."` | `null` / missing |
//! | [`OptionShape::Vector`] | `{"vec": ["0xab.."]}` | `{"vec": []}` |
//! | [`OptionShape::FieldsVector`] | `{"type": "..", "fields": {"vec": ["0xab.."]}}` | `{"fields": {"vec": []}}` |
//! | [`OptionShape::Tagged`] | `{"Some": "0xab.."}` | `{"None": ..}` or `"None"` |
//!
//! A shape only matches if it yields an explicit absence or a value the
//! field parser accepts; otherwise the next shape is tried. Complete absence
//! (`null` or a missing key) is always "absent", never an error.

use std::fmt;

use park_core::{Address, ObjectId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::raw::RawObject;

/// Encodings of an optional value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionShape {
    /// The value itself.
    #[default]
    Direct,
    /// `{"vec": [value]}`.
    Vector,
    /// `{"fields": {"vec": [value]}}`.
    FieldsVector,
    /// `{"Some": value}` / `{"None": ..}`.
    Tagged,
}

impl OptionShape {
    /// Decoding priority.
    pub const PRIORITY: [Self; 4] = [Self::Direct, Self::Vector, Self::FieldsVector, Self::Tagged];

    /// Applies this shape to `value`.
    ///
    /// Returns `None` if the shape does not apply, `Some(None)` for an
    /// explicit absence and `Some(Some(inner))` for a present value.
    fn unwrap<'a>(self, value: &'a Value) -> Option<Option<&'a Value>> {
        match self {
            Self::Direct => match value {
                Value::Null => Some(None),
                Value::String(s) if s == "None" => None,
                other => Some(Some(other)),
            },
            Self::Vector => vec_contents(value),
            Self::FieldsVector => value.get("fields").and_then(vec_contents),
            Self::Tagged => tagged_contents(value),
        }
    }
}

impl fmt::Display for OptionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Vector => write!(f, "vector"),
            Self::FieldsVector => write!(f, "fields_vector"),
            Self::Tagged => write!(f, "tagged"),
        }
    }
}

fn vec_contents(value: &Value) -> Option<Option<&Value>> {
    match value.get("vec")?.as_array()?.as_slice() {
        [] => Some(None),
        [inner] => Some(Some(inner)),
        _ => None,
    }
}

fn tagged_contents(value: &Value) -> Option<Option<&Value>> {
    match value {
        Value::String(s) if s == "None" => Some(None),
        Value::Object(map) => {
            if let Some(inner) = map.get("Some") {
                return Some(Some(inner));
            }
            if map.contains_key("None") {
                return Some(None);
            }
            match map.get("variant").and_then(Value::as_str)? {
                "None" => Some(None),
                "Some" => {
                    let fields = map.get("fields")?;
                    ["0", "pos0", "value"]
                        .iter()
                        .find_map(|k| fields.get(*k))
                        .map(Some)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Result of decoding an optional field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionalField<T> {
    /// No value, by absence or explicit encoding.
    Absent,
    /// A value, with the shape it was found in.
    Present(T, OptionShape),
    /// Something was there but no shape produced a valid value.
    Unrecognized,
}

impl<T> OptionalField<T> {
    /// The value, treating an unrecognized encoding as absent.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Present(value, _) => Some(value),
            Self::Absent | Self::Unrecognized => None,
        }
    }
}

/// Decodes an optional field, trying every shape in priority order.
pub fn decode_optional<T>(
    value: Option<&Value>,
    parse: impl Fn(&Value) -> Option<T>,
) -> OptionalField<T> {
    let Some(value) = value.filter(|v| !v.is_null()) else {
        return OptionalField::Absent;
    };

    for shape in OptionShape::PRIORITY {
        match shape.unwrap(value) {
            None => {}
            Some(None) => return OptionalField::Absent,
            Some(Some(inner)) => {
                if let Some(parsed) = parse(inner) {
                    return OptionalField::Present(parsed, shape);
                }
            }
        }
    }
    OptionalField::Unrecognized
}

/// Encodes an optional value in the given shape.
#[must_use]
pub fn encode_optional(value: Option<Value>, shape: OptionShape) -> Value {
    match (shape, value) {
        (OptionShape::Direct, value) => value.unwrap_or(Value::Null),
        (OptionShape::Vector, value) => json!({ "vec": value.into_iter().collect::<Vec<_>>() }),
        (OptionShape::FieldsVector, value) => json!({
            "type": "0x1::option::Option",
            "fields": { "vec": value.into_iter().collect::<Vec<_>>() },
        }),
        (OptionShape::Tagged, Some(inner)) => json!({ "Some": inner }),
        (OptionShape::Tagged, None) => json!({ "None": null }),
    }
}

/// Reads an unsigned integer from a number, a decimal string or a
/// `{"value": ..}` / `{"fields": ..}` wrapper (as used by balances).
#[must_use]
pub fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => map
            .get("value")
            .or_else(|| map.get("fields"))
            .and_then(value_as_u64),
        _ => None,
    }
}

/// Reads a signed integer from a number, a decimal string or a
/// sign/magnitude pair.
#[must_use]
pub fn value_as_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Object(map) => {
            if let Some(inner) = map.get("fields") {
                return value_as_i64(inner);
            }
            let magnitude = map.get("magnitude").or_else(|| map.get("value")).and_then(value_as_u64)?;
            let magnitude = i64::try_from(magnitude).ok()?;
            let negative = map
                .get("negative")
                .or_else(|| map.get("is_negative"))
                .and_then(value_as_bool)
                .unwrap_or(false);
            Some(if negative { -magnitude } else { magnitude })
        }
        _ => None,
    }
}

/// Reads an object identifier from a string, a `UID` (`{"id": ..}`) or an
/// `ID` (`{"bytes": ..}`).
#[must_use]
pub fn value_as_id(value: &Value) -> Option<ObjectId> {
    match value {
        Value::String(s) => ObjectId::parse(s).ok(),
        Value::Object(map) => map
            .get("id")
            .or_else(|| map.get("bytes"))
            .or_else(|| map.get("fields"))
            .and_then(value_as_id),
        _ => None,
    }
}

/// Reads an account address.
#[must_use]
pub fn value_as_address(value: &Value) -> Option<Address> {
    value.as_str().and_then(|s| Address::parse(s).ok())
}

/// Reads a boolean from `true`/`false`, `"true"`/`"false"` or `0`/`1`.
#[must_use]
pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => match n.as_u64()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        },
        _ => None,
    }
}

/// Reads text from a string or a UTF-8 byte array.
///
/// Empty input yields `Some("")`; invalid UTF-8 or non-byte arrays yield
/// `None`.
#[must_use]
pub fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let bytes = items
                .iter()
                .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
                .collect::<Option<Vec<u8>>>()?;
            String::from_utf8(bytes).ok()
        }
        Value::Object(map) => map.get("bytes").and_then(value_as_text),
        _ => None,
    }
}

/// Text as the byte array the program stores.
#[must_use]
pub fn text_as_value(text: &str) -> Value {
    Value::Array(text.bytes().map(Value::from).collect())
}

/// An enum discriminant as either a numeric code or a variant name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnumRepr {
    /// Numeric discriminant.
    Code(u64),
    /// Variant name.
    Name(String),
}

/// Reads an enum from a code, a name or `{"variant": name}`.
#[must_use]
pub fn value_as_enum(value: &Value) -> Option<EnumRepr> {
    match value {
        Value::Number(n) => n.as_u64().map(EnumRepr::Code),
        Value::String(s) => Some(
            s.trim()
                .parse()
                .map_or_else(|_| EnumRepr::Name(s.clone()), EnumRepr::Code),
        ),
        Value::Object(map) => map
            .get("variant")
            .or_else(|| map.get("value"))
            .or_else(|| map.get("fields"))
            .and_then(value_as_enum),
        _ => None,
    }
}

/// Field access over one raw object, with diagnostics.
pub struct FieldReader<'a> {
    kind: &'static str,
    object_id: &'a str,
    fields: &'a Map<String, Value>,
}

impl<'a> FieldReader<'a> {
    /// Reader over `raw`, unwrapping a nested `{"fields": ..}` layer.
    pub fn new(kind: &'static str, raw: &'a RawObject) -> Option<Self> {
        let top = raw.fields.as_object()?;
        let fields = match top.get("fields").and_then(Value::as_object) {
            Some(inner) => inner,
            None => top,
        };
        Some(Self {
            kind,
            object_id: &raw.object_id,
            fields,
        })
    }

    /// First non-null value among `names`.
    pub fn get(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .find_map(|name| self.fields.get(*name).filter(|v| !v.is_null()))
    }

    /// A structural field; failure drops the whole entity.
    pub fn required<T>(&self, names: &[&str], parse: impl Fn(&Value) -> Option<T>) -> Option<T> {
        let parsed = self.get(names).and_then(parse);
        if parsed.is_none() {
            debug!(
                kind = self.kind,
                object_id = self.object_id,
                field = names.first().copied().unwrap_or_default(),
                "structural field missing or malformed; treating object as absent"
            );
        }
        parsed
    }

    /// An optional field in any recognised shape.
    pub fn optional<T>(&self, names: &[&str], parse: impl Fn(&Value) -> Option<T>) -> Option<T> {
        match decode_optional(self.get(names), parse) {
            OptionalField::Unrecognized => {
                warn!(
                    kind = self.kind,
                    object_id = self.object_id,
                    field = names.first().copied().unwrap_or_default(),
                    "unrecognized optional value; leaving field empty"
                );
                None
            }
            other => other.into_option(),
        }
    }

    /// Optional text; empty text reads as absent.
    pub fn text(&self, names: &[&str]) -> Option<String> {
        self.optional(names, value_as_text).filter(|s| !s.is_empty())
    }

    /// A non-critical counter, defaulting when missing or malformed.
    pub fn number_or(&self, names: &[&str], default: u64) -> u64 {
        match self.get(names) {
            None => default,
            Some(value) => value_as_u64(value).unwrap_or_else(|| {
                warn!(
                    kind = self.kind,
                    object_id = self.object_id,
                    field = names.first().copied().unwrap_or_default(),
                    "malformed counter; using default"
                );
                default
            }),
        }
    }

    /// A non-critical flag, defaulting to false.
    pub fn flag(&self, names: &[&str]) -> bool {
        self.get(names).and_then(value_as_bool).unwrap_or(false)
    }

    /// The object's own identifier, from the `id` field or the object id.
    pub fn object_id(&self) -> Option<ObjectId> {
        self.get(&["id"])
            .and_then(value_as_id)
            .or_else(|| ObjectId::parse(self.object_id).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    fn id(n: u8) -> ObjectId {
        ObjectId::from_bytes(&[n; 32]).unwrap()
    }

    #[test]
    fn test_direct_shape() {
        let value = json!(id(1).as_str());
        assert_eq!(
            decode_optional(Some(&value), value_as_id),
            OptionalField::Present(id(1), OptionShape::Direct)
        );
    }

    #[test]
    fn test_vector_shape() {
        let present = json!({ "vec": [id(2).as_str()] });
        let absent = json!({ "vec": [] });
        assert_eq!(
            decode_optional(Some(&present), value_as_id),
            OptionalField::Present(id(2), OptionShape::Vector)
        );
        assert_eq!(decode_optional(Some(&absent), value_as_id), OptionalField::Absent);
    }

    #[test]
    fn test_fields_vector_shape() {
        let present = json!({
            "type": "0x1::option::Option<0x2::object::ID>",
            "fields": { "vec": [id(3).as_str()] }
        });
        let absent = json!({ "type": "0x1::option::Option", "fields": { "vec": [] } });
        assert_eq!(
            decode_optional(Some(&present), value_as_id),
            OptionalField::Present(id(3), OptionShape::FieldsVector)
        );
        assert_eq!(decode_optional(Some(&absent), value_as_id), OptionalField::Absent);
    }

    #[test_case(json!({ "Some": "0x4" }), Some(4) ; "some key")]
    #[test_case(json!({ "variant": "Some", "fields": { "0": "0x4" } }), Some(4) ; "variant some")]
    #[test_case(json!({ "None": null }), None ; "none key")]
    #[test_case(json!({ "variant": "None" }), None ; "variant none")]
    #[test_case(json!("None"), None ; "bare none")]
    fn test_tagged_shape(value: Value, expected: Option<u64>) {
        let decoded = decode_optional(Some(&value), value_as_id);
        match expected {
            Some(n) => assert_eq!(
                decoded,
                OptionalField::Present(ObjectId::parse(&format!("0x{n}")).unwrap(), OptionShape::Tagged)
            ),
            None => assert_eq!(decoded, OptionalField::Absent),
        }
    }

    #[test]
    fn test_null_and_missing_are_absent() {
        assert_eq!(decode_optional(None, value_as_id), OptionalField::Absent);
        assert_eq!(decode_optional(Some(&Value::Null), value_as_id), OptionalField::Absent);
    }

    #[test]
    fn test_garbage_is_unrecognized() {
        let value = json!({ "vec": [1, 2] });
        assert_eq!(decode_optional(Some(&value), value_as_id), OptionalField::Unrecognized);
        let value = json!("not-an-id");
        assert_eq!(decode_optional(Some(&value), value_as_id), OptionalField::Unrecognized);
    }

    #[test]
    fn test_uid_and_id_structs() {
        assert_eq!(value_as_id(&json!({ "id": "0x7" })), ObjectId::parse("0x7").ok());
        assert_eq!(value_as_id(&json!({ "bytes": "0x7" })), ObjectId::parse("0x7").ok());
    }

    #[test_case(json!(42), Some(42))]
    #[test_case(json!("42"), Some(42))]
    #[test_case(json!({ "value": "42" }), Some(42) ; "balance")]
    #[test_case(json!({ "fields": { "value": 42 } }), Some(42) ; "nested balance")]
    #[test_case(json!(-1), None)]
    #[test_case(json!("x"), None)]
    fn test_value_as_u64(value: Value, expected: Option<u64>) {
        assert_eq!(value_as_u64(&value), expected);
    }

    #[test_case(json!(-122_419_400), Some(-122_419_400))]
    #[test_case(json!("-33"), Some(-33))]
    #[test_case(json!({ "magnitude": "5", "negative": true }), Some(-5))]
    #[test_case(json!({ "value": 5 }), Some(5))]
    fn test_value_as_i64(value: Value, expected: Option<i64>) {
        assert_eq!(value_as_i64(&value), expected);
    }

    #[test]
    fn test_text_from_bytes() {
        assert_eq!(value_as_text(&json!([104, 105])), Some("hi".to_string()));
        assert_eq!(value_as_text(&json!([])), Some(String::new()));
        assert_eq!(value_as_text(&json!([0xff, 0xfe])), None);
        assert_eq!(value_as_text(&json!([300])), None);
        assert_eq!(value_as_text(&text_as_value("Dock 4")), Some("Dock 4".to_string()));
    }

    #[test_case(json!(2), EnumRepr::Code(2))]
    #[test_case(json!("1"), EnumRepr::Code(1))]
    #[test_case(json!("ACTIVE"), EnumRepr::Name("ACTIVE".into()))]
    #[test_case(json!({ "variant": "Locked" }), EnumRepr::Name("Locked".into()))]
    fn test_value_as_enum(value: Value, expected: EnumRepr) {
        assert_eq!(value_as_enum(&value), Some(expected));
    }

    #[test]
    fn test_bare_none_is_not_direct_text() {
        let raw = json!("None");
        assert_eq!(decode_optional(Some(&raw), value_as_text), OptionalField::Absent);
    }

    fn shape() -> impl Strategy<Value = OptionShape> {
        prop::sample::select(OptionShape::PRIORITY.to_vec())
    }

    proptest! {
        #[test]
        fn prop_optional_id_round_trips(bytes in proptest::option::of(any::<[u8; 32]>()), shape in shape()) {
            let original = bytes.map(|b| ObjectId::from_bytes(&b).unwrap());
            let encoded = encode_optional(original.as_ref().map(|id| json!(id.as_str())), shape);
            let decoded = decode_optional(Some(&encoded), value_as_id).into_option();
            prop_assert_eq!(decoded, original);
        }

        #[test]
        fn prop_present_values_report_their_shape(bytes in any::<[u8; 32]>(), shape in shape()) {
            let id = ObjectId::from_bytes(&bytes).unwrap();
            let encoded = encode_optional(Some(json!(id.as_str())), shape);
            prop_assert_eq!(decode_optional(Some(&encoded), value_as_id), OptionalField::Present(id, shape));
        }
    }
}
