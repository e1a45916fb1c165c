//! Normalized ledger account addresses.
//!
//! The ledger prints the same account in several forms (`0x00ab`, `0xAB`,
//! `ab`). `Address` stores one canonical form: lowercase hex, `0x` prefix,
//! leading zeros dropped, so equality and hashing work across sources.

use crate::error::{DecodeError, DecodeResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(String);

impl Address {
    /// Parse and normalize an address string.
    pub fn parse(raw: &str) -> DecodeResult<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DecodeError::InvalidAddress(raw.to_string()));
        }

        let significant = digits.trim_start_matches('0');
        let canonical = if significant.is_empty() {
            "0x0".to_string()
        } else {
            format!("0x{}", significant.to_ascii_lowercase())
        };
        Ok(Address(canonical))
    }

    /// The all-zero address, used on-ledger as "nobody".
    pub fn zero() -> Self {
        Address("0x0".to_string())
    }

    pub fn is_zero(&self) -> bool {
        self.0 == "0x0"
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Address {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.0)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leading_zeros_and_case_are_ignored() {
        let a = Address::parse("0x00AB").unwrap();
        let b = Address::parse("0xab").unwrap();
        let c = Address::parse("ab").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_str(), "0xab");
    }

    #[test]
    fn zero_forms() {
        assert!(Address::parse("0x0").unwrap().is_zero());
        assert!(Address::parse("0x0000000000").unwrap().is_zero());
        assert!(!Address::parse("0x10").unwrap().is_zero());
    }

    #[test]
    fn rejects_non_hex() {
        assert!(Address::parse("").is_err());
        assert!(Address::parse("0x").is_err());
        assert!(Address::parse("0xzz").is_err());
        assert!(Address::parse("alice").is_err());
    }

    #[test]
    fn serde_normalizes() {
        let addr: Address = serde_json::from_str("\"0x0001F\"").unwrap();
        assert_eq!(serde_json::to_string(&addr).unwrap(), "\"0x1f\"");
    }
}
