//! Store and event-parameter values.
//!
//! [`Value`] is the single dynamic value type shared by entity fields, event
//! parameters, call arguments and data-source contexts. Integers follow the
//! chain's 256-bit width: `BigInt` is a signed [`I256`], so running totals can
//! go negative the same way the hosted `BigInt` type does instead of wrapping.
//! `Uint256` carries raw `uint256` parameters and call outputs over the full
//! unsigned range; it converts to `BigInt` only when the value fits.
//!
//! On the wire a value is `{"kind": "...", "value": ...}`. Big integers are
//! written as decimal strings and accepted as either strings or JSON numbers.

use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, Bytes, I256, U256};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::MappingError;

/// A dynamically typed field, parameter or context value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// UTF-8 string (also used for entity id references).
    String(String),
    /// 32-bit signed integer.
    Int(i32),
    /// Signed 256-bit integer.
    #[serde(alias = "bigint", alias = "int256")]
    BigInt(#[serde(with = "big_int_str")] I256),
    /// Unsigned 256-bit integer, as decoded from `uint256` parameters.
    #[serde(rename = "uint256", alias = "uint")]
    Uint256(#[serde(with = "uint_str")] U256),
    /// Boolean flag.
    Bool(bool),
    /// Arbitrary byte string, hex encoded on the wire.
    Bytes(#[serde(with = "display_str")] Bytes),
    /// 20-byte account or contract address.
    Address(#[serde(with = "display_str")] Address),
    /// Homogeneous or mixed list of values.
    List(Vec<Value>),
    /// Explicit absence of a value.
    Null,
}

impl Value {
    /// Short name of this value's kind, used in type-mismatch errors.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Int(_) => "int",
            Self::BigInt(_) => "bigint",
            Self::Uint256(_) => "uint256",
            Self::Bool(_) => "bool",
            Self::Bytes(_) => "bytes",
            Self::Address(_) => "address",
            Self::List(_) => "list",
            Self::Null => "null",
        }
    }

    /// Returns `true` for [`Value::Null`].
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Try to get as a string slice.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as an `i32`.
    #[must_use]
    pub const fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as a signed 256-bit integer. `Int` values widen losslessly;
    /// `Uint256` values convert only below 2^255.
    #[must_use]
    pub fn as_big_int(&self) -> Option<I256> {
        match self {
            Self::BigInt(v) => Some(*v),
            Self::Uint256(v) => I256::try_from(*v).ok(),
            Self::Int(v) => Some(i256_from_i64(i64::from(*v))),
            _ => None,
        }
    }

    /// Try to get as an unsigned 256-bit integer. Negative values are `None`.
    #[must_use]
    pub fn as_uint256(&self) -> Option<U256> {
        match self {
            Self::Uint256(v) => Some(*v),
            Self::BigInt(v) if !v.is_negative() => Some(v.into_raw()),
            Self::Int(v) => u64::try_from(*v).ok().map(U256::from),
            _ => None,
        }
    }

    /// Checked conversion to a signed 256-bit integer for `field`.
    ///
    /// # Errors
    ///
    /// [`MappingError::OutOfRange`] for a `Uint256` at or above 2^255,
    /// [`MappingError::TypeMismatch`] for non-numeric values.
    pub fn to_big_int(&self, field: &str) -> Result<I256, MappingError> {
        match (self, self.as_big_int()) {
            (_, Some(v)) => Ok(v),
            (Self::Uint256(v), None) => Err(MappingError::OutOfRange {
                field: field.to_owned(),
                value: v.to_string(),
            }),
            _ => Err(MappingError::type_mismatch(field, "bigint", self.kind())),
        }
    }

    /// Try to get as a bool.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as bytes. Addresses are viewed as their 20 raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            Self::Address(a) => Some(a.as_slice()),
            _ => None,
        }
    }

    /// Try to get as an address.
    #[must_use]
    pub const fn as_address(&self) -> Option<Address> {
        match self {
            Self::Address(a) => Some(*a),
            _ => None,
        }
    }

    /// Try to get as a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns `true` if this value is `String(id)` or a list containing it.
    ///
    /// This is the match rule for derived (reverse) relations.
    #[must_use]
    pub fn references(&self, id: &str) -> bool {
        match self {
            Self::String(s) => s == id,
            Self::List(items) => items.iter().any(|v| v.as_str() == Some(id)),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Int(v) => write!(f, "{v}"),
            Self::BigInt(v) => write!(f, "{v}"),
            Self::Uint256(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Bytes(b) => write!(f, "{b}"),
            Self::Address(a) => write!(f, "{a:#x}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Null => f.write_str("null"),
        }
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_owned())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<I256> for Value {
    fn from(v: I256) -> Self {
        Self::BigInt(v)
    }
}

impl From<U256> for Value {
    fn from(v: U256) -> Self {
        Self::Uint256(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Self::Bytes(v)
    }
}

impl From<Address> for Value {
    fn from(v: Address) -> Self {
        Self::Address(v)
    }
}

impl From<Vec<Self>> for Value {
    fn from(v: Vec<Self>) -> Self {
        Self::List(v)
    }
}

/// Build an [`I256`] from an `i64` without a fallible conversion.
#[must_use]
pub fn i256_from_i64(v: i64) -> I256 {
    let magnitude = I256::from_raw(U256::from(v.unsigned_abs()));
    if v < 0 { -magnitude } else { magnitude }
}

/// Build an [`I256`] from a `u64`.
#[must_use]
pub fn i256_from_u64(v: u64) -> I256 {
    I256::from_raw(U256::from(v))
}

/// Parse a decimal or `0x`-prefixed hex string into an [`I256`].
///
/// # Errors
///
/// Returns the parse error message if `s` is not a valid signed 256-bit integer.
pub fn parse_i256(s: &str) -> Result<I256, String> {
    let s = s.trim();
    let unsigned = s.trim_start_matches('-');
    if unsigned.starts_with("0x") || unsigned.starts_with("0X") {
        I256::from_hex_str(s).map_err(|e| e.to_string())
    } else {
        I256::from_dec_str(s).map_err(|e| e.to_string())
    }
}

/// Serde helpers for [`I256`]: decimal string out, string or number in.
pub(crate) mod big_int_str {
    use super::{Deserialize, Deserializer, I256, Serializer, i256_from_i64, parse_i256};

    pub(crate) fn serialize<S: Serializer>(v: &I256, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<I256, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNum {
            Num(i64),
            Str(String),
        }
        match StringOrNum::deserialize(deserializer)? {
            StringOrNum::Num(n) => Ok(i256_from_i64(n)),
            StringOrNum::Str(s) => parse_i256(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// Parse a decimal or `0x`-prefixed hex string into a [`U256`].
///
/// # Errors
///
/// Returns the parse error message if `s` is not a valid unsigned 256-bit integer.
pub fn parse_u256(s: &str) -> Result<U256, String> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => U256::from_str_radix(s, 10).map_err(|e| e.to_string()),
    }
}

/// Serde helpers for [`U256`]: decimal string out, string or number in.
pub(crate) mod uint_str {
    use super::{Deserialize, Deserializer, Serializer, U256, parse_u256};

    pub(crate) fn serialize<S: Serializer>(v: &U256, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(v)
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNum {
            Num(u64),
            Str(String),
        }
        match StringOrNum::deserialize(deserializer)? {
            StringOrNum::Num(n) => Ok(U256::from(n)),
            StringOrNum::Str(s) => parse_u256(&s).map_err(serde::de::Error::custom),
        }
    }
}

/// Serde helpers for types whose wire form is their `Display`/`FromStr` text.
pub(crate) mod display_str {
    use super::{Deserialize, Deserializer, FromStr, Serializer, fmt};

    pub(crate) fn serialize<T, S>(v: &T, s: S) -> Result<S::Ok, S::Error>
    where
        T: fmt::Display,
        S: Serializer,
    {
        s.collect_str(v)
    }

    pub(crate) fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        T: FromStr,
        T::Err: fmt::Display,
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.trim().parse().map_err(serde::de::Error::custom)
    }
}
