//! Protocol address parsing and formatting.
//!
//! An address is the 32-byte digest of an account's public keys and salt.
//! Its text form is `0x` followed by 64 lowercase hex digits.

use crate::constants::KEY_SIZE;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AddressError {
    #[error("address must be a non-empty string")]
    Empty,

    #[error("address must start with 0x")]
    MissingPrefix,

    #[error("invalid address length: expected {expected} hex digits, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// A protocol address derived from an account's public keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; KEY_SIZE]);

impl Address {
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; KEY_SIZE] {
        self.0
    }

    /// Storage key for one tagged buffer of this account: `{address}-{tag}`.
    pub fn storage_key(&self, tag: &str) -> String {
        format!("{}-{}", self, tag)
    }

    /// Prefix shared by every storage key of this account.
    pub fn storage_prefix(&self) -> String {
        format!("{}-", self)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(AddressError::Empty);
        }
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .ok_or(AddressError::MissingPrefix)?;
        if digits.len() != KEY_SIZE * 2 {
            return Err(AddressError::InvalidLength {
                expected: KEY_SIZE * 2,
                actual: digits.len(),
            });
        }
        let mut bytes = [0u8; KEY_SIZE];
        hex::decode_to_slice(digits, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl From<[u8; KEY_SIZE]> for Address {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_parse_roundtrip() {
        let addr = Address::from_bytes([0xAB; 32]);
        let text = addr.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.len(), 66);
        assert_eq!(text.parse::<Address>().unwrap(), addr);
    }

    #[test]
    fn test_parse_uppercase_hex() {
        let text = format!("0x{}", "AB".repeat(32));
        let addr: Address = text.parse().unwrap();
        assert_eq!(addr.as_bytes(), &[0xAB; 32]);
    }

    #[test]
    fn test_parse_rejects_missing_prefix() {
        let text = "ab".repeat(32);
        assert_eq!(text.parse::<Address>(), Err(AddressError::MissingPrefix));
    }

    #[test]
    fn test_parse_rejects_wrong_length() {
        let result = "0x1234".parse::<Address>();
        assert_eq!(
            result,
            Err(AddressError::InvalidLength { expected: 64, actual: 4 })
        );
    }

    #[test]
    fn test_parse_rejects_empty() {
        assert_eq!("  ".parse::<Address>(), Err(AddressError::Empty));
    }

    #[test]
    fn test_parse_rejects_non_hex() {
        let text = format!("0x{}", "zz".repeat(32));
        assert!(matches!(text.parse::<Address>(), Err(AddressError::Hex(_))));
        assert_eq!(
            text.parse::<Address>().unwrap_err(),
            AddressError::Hex(hex::FromHexError::InvalidHexCharacter { c: 'z', index: 0 })
        );
    }

    #[test]
    fn test_storage_keys() {
        let addr = Address::from_bytes([1u8; 32]);
        let key = addr.storage_key("nsk_m");
        assert!(key.starts_with(&addr.storage_prefix()));
        assert!(key.ends_with("-nsk_m"));
    }

    #[test]
    fn test_serde_as_string() {
        let addr = Address::from_bytes([7u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr));
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }
}
