// Typed observables read from, and arguments written to, the target system

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Kind of value a read is expected to return
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Address,
    Uint,
    Int,
    Bool,
    Bytes,
    Str,
}

impl ValueKind {
    /// Solidity return type used when querying a chain client
    pub fn abi_type(&self) -> &'static str {
        match self {
            ValueKind::Address => "address",
            ValueKind::Uint => "uint256",
            ValueKind::Int => "int256",
            ValueKind::Bool => "bool",
            ValueKind::Bytes => "bytes",
            ValueKind::Str => "string",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    #[error("cannot parse {raw:?} as {kind:?}")]
    Unparseable { kind: ValueKind, raw: String },
    #[error("malformed address: {raw}")]
    MalformedAddress { raw: String },
}

/// A value observed on, or sent to, the target system.
///
/// Addresses compare case-insensitively, so checksummed and lowercase forms
/// are equal. Byte blobs compare byte-exact.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Address(String),
    Uint(u128),
    Int(i128),
    Bool(bool),
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    Str(String),
    Tuple(Vec<Value>),
}

impl Value {
    pub fn address(raw: &str) -> Result<Self, ValueError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| ValueError::MalformedAddress {
                raw: raw.to_string(),
            })?;
        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ValueError::MalformedAddress {
                raw: raw.to_string(),
            });
        }
        Ok(Value::Address(format!("0x{}", digits.to_ascii_lowercase())))
    }

    pub fn zero_address() -> Self {
        Value::Address(ZERO_ADDRESS.to_string())
    }

    /// Parse client output (decimal numbers, `true`/`false`, hex blobs)
    pub fn parse(kind: ValueKind, raw: &str) -> Result<Self, ValueError> {
        // Chain clients sometimes annotate numbers, e.g. `1000000000 [1e9]`
        let token = raw.split_whitespace().next().unwrap_or("");
        let unparseable = || ValueError::Unparseable {
            kind,
            raw: raw.to_string(),
        };

        match kind {
            ValueKind::Address => Value::address(token),
            ValueKind::Uint => token.parse().map(Value::Uint).map_err(|_| unparseable()),
            ValueKind::Int => token.parse().map(Value::Int).map_err(|_| unparseable()),
            ValueKind::Bool => match token {
                "true" => Ok(Value::Bool(true)),
                "false" => Ok(Value::Bool(false)),
                _ => Err(unparseable()),
            },
            ValueKind::Bytes => {
                let digits = token.strip_prefix("0x").unwrap_or(token);
                hex::decode(digits).map(Value::Bytes).map_err(|_| unparseable())
            }
            ValueKind::Str => Ok(Value::Str(raw.trim().trim_matches('"').to_string())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u128> {
        match self {
            Value::Uint(n) => Some(*n),
            _ => None,
        }
    }

    /// Render as a positional argument for an ABI-encoding client
    pub fn to_arg(&self) -> String {
        match self {
            Value::Tuple(items) => format!(
                "({})",
                items.iter().map(Value::to_arg).collect::<Vec<_>>().join(",")
            ),
            other => other.to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Address(a), Value::Address(b)) => a.eq_ignore_ascii_case(b),
            (Value::Uint(a), Value::Uint(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Address(a) => write!(f, "{a}"),
            Value::Uint(n) => write!(f, "{n}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<u128> for Value {
    fn from(n: u128) -> Self {
        Value::Uint(n)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Uint(n as u128)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let digits = raw.strip_prefix("0x").unwrap_or(&raw);
        hex::decode(digits).map_err(serde::de::Error::custom)
    }
}
