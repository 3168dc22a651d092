//! Ledger identifiers and account addresses.
//!
//! Both are 32-byte values rendered as `0x`-prefixed lowercase hex. Short
//! forms such as `0x2` are accepted and left-padded to the canonical
//! 64-digit form so that identifiers compare equal regardless of how the
//! node happened to print them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Number of hex digits in a canonical identifier.
pub const HEX_LEN: usize = 64;

fn normalize_hex(input: &str) -> Option<String> {
    let trimmed = input.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))?;
    if digits.is_empty() || digits.len() > HEX_LEN {
        return None;
    }
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{:0>width$}", digits.to_ascii_lowercase(), width = HEX_LEN))
}

/// Identifier of a versioned ledger object (slot, reservation, escrow, profile).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and normalize an object identifier.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidId`] if the input is not `0x`-prefixed hex
    /// of at most 64 digits.
    pub fn parse(input: &str) -> Result<Self> {
        normalize_hex(input)
            .map(Self)
            .ok_or_else(|| CoreError::InvalidId(input.to_string()))
    }

    /// Build an identifier from raw bytes (at most 32).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidId`] if more than 32 bytes are supplied.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() || bytes.len() > HEX_LEN / 2 {
            return Err(CoreError::InvalidId(format!("{} bytes", bytes.len())));
        }
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self::parse(&format!("0x{hex}"))
    }

    /// The canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines (`0x1234…abcd`).
    #[must_use]
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ObjectId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An account address on the ledger (driver, owner, arbiter).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidId`] if the input is not `0x`-prefixed hex.
    pub fn parse(input: &str) -> Result<Self> {
        normalize_hex(input)
            .map(Self)
            .ok_or_else(|| CoreError::InvalidId(input.to_string()))
    }

    /// The canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(addr: Address) -> Self {
        addr.0
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
