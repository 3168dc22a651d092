//! Read-only program calls through transaction inspection.
//!
//! A view call travels as a programmable transaction holding one move call,
//! which the node executes against current state without committing. Only
//! the transaction kind is built here, in BCS; gas, signatures and the
//! sender's coins play no part in an inspection.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use park_core::ObjectId;
use serde_json::{Value, json};

use crate::config::ProgramConfig;
use crate::error::{LedgerError, Result};
use crate::raw::{CallArg, ViewCall};

/// Sender used for inspections; any address works since nothing is signed.
pub const INSPECT_SENDER: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

const KIND_PROGRAMMABLE: u8 = 0;
const COMMAND_MOVE_CALL: u8 = 0;
const ARGUMENT_INPUT: u8 = 1;
const CALL_ARG_PURE: u8 = 0;
const CALL_ARG_OBJECT: u8 = 1;
const OBJECT_ARG_OWNED: u8 = 0;
const OBJECT_ARG_SHARED: u8 = 1;

/// Length of identifiers, addresses and digests.
const ID_LEN: usize = 32;

/// An object argument pinned to its current ledger state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectInput {
    /// Shared object, taken by immutable reference.
    Shared {
        /// Object identifier.
        id: ObjectId,
        /// Version at which the object became shared.
        initial_shared_version: u64,
    },
    /// Owned or frozen object at an exact version.
    Owned {
        /// Object identifier.
        id: ObjectId,
        /// Current version.
        version: u64,
        /// Current digest.
        digest: [u8; ID_LEN],
    },
}

impl ObjectInput {
    /// Reads the owner and version of a `sui_getObject` data block.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Decode`] if neither a shared owner nor a
    /// version and digest pair is present.
    pub fn from_object_data(id: &ObjectId, data: &Value) -> Result<Self> {
        let shared_version = data
            .pointer("/owner/Shared/initial_shared_version")
            .and_then(crate::decode::value_as_u64);
        if let Some(initial_shared_version) = shared_version {
            return Ok(Self::Shared {
                id: id.clone(),
                initial_shared_version,
            });
        }

        let version = data.get("version").and_then(crate::decode::value_as_u64);
        let digest = data
            .get("digest")
            .and_then(Value::as_str)
            .and_then(|d| bs58::decode(d).into_vec().ok())
            .and_then(|bytes| <[u8; ID_LEN]>::try_from(bytes).ok());
        match (version, digest) {
            (Some(version), Some(digest)) => Ok(Self::Owned {
                id: id.clone(),
                version,
                digest,
            }),
            _ => Err(LedgerError::Decode {
                kind: "view argument",
                id: id.to_string(),
                message: "object has no usable version or digest".to_string(),
            }),
        }
    }
}

/// One input of the inspected transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// BCS-encoded plain value.
    Pure(Vec<u8>),
    /// Object reference.
    Object(ObjectInput),
}

impl Input {
    /// Encodes a non-object argument.
    ///
    /// # Errors
    ///
    /// Object arguments need ledger state and are refused here, as are
    /// object vectors, which view functions never take.
    pub fn pure(arg: &CallArg) -> Result<Self> {
        let mut out = Vec::new();
        match arg {
            CallArg::U64(n) => out.extend_from_slice(&n.to_le_bytes()),
            CallArg::Bool(b) => out.push(u8::from(*b)),
            CallArg::Address(address) => out.extend_from_slice(&id_bytes(address.as_str())?),
            CallArg::Bytes(bytes) => {
                uleb128(&mut out, bytes.len());
                out.extend_from_slice(bytes);
            }
            CallArg::Object(_) | CallArg::Objects(_) => {
                return Err(LedgerError::unsupported("object argument as plain value"));
            }
        }
        Ok(Self::Pure(out))
    }

    fn encode(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Pure(bytes) => {
                out.push(CALL_ARG_PURE);
                uleb128(out, bytes.len());
                out.extend_from_slice(bytes);
            }
            Self::Object(ObjectInput::Shared {
                id,
                initial_shared_version,
            }) => {
                out.push(CALL_ARG_OBJECT);
                out.push(OBJECT_ARG_SHARED);
                out.extend_from_slice(&id_bytes(id.as_str())?);
                out.extend_from_slice(&initial_shared_version.to_le_bytes());
                out.push(0);
            }
            Self::Object(ObjectInput::Owned { id, version, digest }) => {
                out.push(CALL_ARG_OBJECT);
                out.push(OBJECT_ARG_OWNED);
                out.extend_from_slice(&id_bytes(id.as_str())?);
                out.extend_from_slice(&version.to_le_bytes());
                uleb128(out, digest.len());
                out.extend_from_slice(digest);
            }
        }
        Ok(())
    }
}

/// Builds the base64 transaction kind for `call` with prepared `inputs`.
///
/// Inputs are passed to the function in order.
///
/// # Errors
///
/// Returns an error if an identifier is not valid hex or there are more
/// inputs than a transaction can address.
pub fn encode_view_call(program: &ProgramConfig, call: &ViewCall, inputs: &[Input]) -> Result<String> {
    let (module, function) = call.function.target();
    let mut out = vec![KIND_PROGRAMMABLE];

    uleb128(&mut out, inputs.len());
    for input in inputs {
        input.encode(&mut out)?;
    }

    uleb128(&mut out, 1);
    out.push(COMMAND_MOVE_CALL);
    out.extend_from_slice(&id_bytes(program.package_id.as_str())?);
    identifier(&mut out, program.module_name(module));
    identifier(&mut out, function);
    uleb128(&mut out, 0);
    uleb128(&mut out, inputs.len());
    for index in 0..inputs.len() {
        let index = u16::try_from(index)
            .map_err(|_| LedgerError::unsupported(format!("{} view arguments", inputs.len())))?;
        out.push(ARGUMENT_INPUT);
        out.extend_from_slice(&index.to_le_bytes());
    }

    Ok(STANDARD.encode(out))
}

/// Extracts the first return value of an inspection result.
///
/// Integers come back as decimal strings and booleans as JSON booleans,
/// the same shapes object fields use.
///
/// # Errors
///
/// A program abort becomes [`LedgerError::Rejected`]; other execution
/// failures become [`LedgerError::Rpc`]; a missing or unknown return value
/// is a [`LedgerError::Decode`].
pub fn parse_return_value(result: &Value) -> Result<Value> {
    let failure = result.get("error").and_then(Value::as_str).or_else(|| {
        result
            .pointer("/effects/status")
            .filter(|s| s.get("status").and_then(Value::as_str) == Some("failure"))
            .map(|s| s.get("error").and_then(Value::as_str).unwrap_or("execution failed"))
    });
    if let Some(message) = failure {
        return Err(execution_error(message));
    }

    let entry = result
        .pointer("/results/0/returnValues/0")
        .ok_or_else(|| return_decode_error("no return value"))?;
    let bytes = entry
        .get(0)
        .and_then(Value::as_array)
        .ok_or_else(|| return_decode_error("return value has no bytes"))?
        .iter()
        .map(|b| b.as_u64().and_then(|b| u8::try_from(b).ok()))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| return_decode_error("return value bytes out of range"))?;
    let type_tag = entry.get(1).and_then(Value::as_str).unwrap_or_default();

    match type_tag {
        "u64" => <[u8; 8]>::try_from(bytes.as_slice())
            .map(|le| json!(u64::from_le_bytes(le).to_string()))
            .map_err(|_| return_decode_error("u64 needs 8 bytes")),
        "bool" => match bytes.as_slice() {
            [b] => Ok(json!(*b != 0)),
            _ => Err(return_decode_error("bool needs 1 byte")),
        },
        other => Err(return_decode_error(&format!("unsupported return type {other:?}"))),
    }
}

fn execution_error(message: &str) -> LedgerError {
    match abort_code(message) {
        Some(code) => LedgerError::rejected(code, message),
        None => LedgerError::Rpc {
            code: -1,
            message: message.to_string(),
        },
    }
}

/// Abort code of a `MoveAbort(<location>, <code>)` failure.
fn abort_code(message: &str) -> Option<u64> {
    let start = message.find("MoveAbort(")?;
    let body = &message[start..];
    let body = body.find(") in command").map_or(body, |end| &body[..end]);
    body.trim_end_matches(')')
        .rsplit(',')
        .next()?
        .trim()
        .parse()
        .ok()
}

fn return_decode_error(message: &str) -> LedgerError {
    LedgerError::Decode {
        kind: "view result",
        id: String::new(),
        message: message.to_string(),
    }
}

fn id_bytes(hex: &str) -> Result<[u8; ID_LEN]> {
    let invalid = || LedgerError::Decode {
        kind: "identifier",
        id: hex.to_string(),
        message: "expected 0x-prefixed hex".to_string(),
    };
    let digits = hex.strip_prefix("0x").unwrap_or(hex);
    if digits.is_empty() || digits.len() > ID_LEN * 2 || !digits.is_ascii() {
        return Err(invalid());
    }
    let padded = format!("{digits:0>width$}", width = ID_LEN * 2);
    let mut out = [0u8; ID_LEN];
    for (byte, pair) in out.iter_mut().zip(padded.as_bytes().chunks(2)) {
        let pair = std::str::from_utf8(pair).map_err(|_| invalid())?;
        *byte = u8::from_str_radix(pair, 16).map_err(|_| invalid())?;
    }
    Ok(out)
}

fn identifier(out: &mut Vec<u8>, name: &str) {
    uleb128(out, name.len());
    out.extend_from_slice(name.as_bytes());
}

#[allow(clippy::cast_possible_truncation)]
fn uleb128(out: &mut Vec<u8>, mut value: usize) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}
