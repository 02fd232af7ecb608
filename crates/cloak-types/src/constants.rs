//! Key roles, storage tags, and domain separators.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Key and Data Sizes
// =============================================================================

/// Size of a secret scalar, compressed point, hash, or address in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an authorization signature (`R || s`).
pub const SIGNATURE_SIZE: usize = 64;

// =============================================================================
// Domain Separators
// =============================================================================

pub const DOMAIN_NULLIFIER_KEY: &[u8] = b"cloak nullifier master key";
pub const DOMAIN_INCOMING_VIEWING_KEY: &[u8] = b"cloak incoming viewing master key";
pub const DOMAIN_OUTGOING_VIEWING_KEY: &[u8] = b"cloak outgoing viewing master key";
pub const DOMAIN_TAGGING_KEY: &[u8] = b"cloak tagging master key";
pub const DOMAIN_SIGNING_KEY: &[u8] = b"cloak signing key";

pub const DOMAIN_SILO_NULLIFIER: &[u8] = b"cloak app nullifier secret";
pub const DOMAIN_SILO_INCOMING_VIEWING: &[u8] = b"cloak app incoming viewing secret";
pub const DOMAIN_SILO_OUTGOING_VIEWING: &[u8] = b"cloak app outgoing viewing secret";
pub const DOMAIN_SILO_TAGGING: &[u8] = b"cloak app tagging secret";
pub const DOMAIN_SILO_SIGNING: &[u8] = b"cloak app signing secret";

pub const DOMAIN_PUBLIC_KEY_HASH: &[u8] = b"cloak public key hash";
pub const DOMAIN_ADDRESS: &[u8] = b"cloak address";

// =============================================================================
// Key Roles
// =============================================================================

/// A master key capability held by every account.
///
/// Only [`KeyRole::Nullifier`] may hold more than one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    Nullifier,
    IncomingViewing,
    OutgoingViewing,
    Tagging,
    Signing,
}

impl KeyRole {
    pub const ALL: [KeyRole; 5] = [
        KeyRole::Nullifier,
        KeyRole::IncomingViewing,
        KeyRole::OutgoingViewing,
        KeyRole::Tagging,
        KeyRole::Signing,
    ];

    /// Role whose presence marks an account as stored.
    pub const CANONICAL: KeyRole = KeyRole::IncomingViewing;

    pub fn is_rotatable(self) -> bool {
        matches!(self, KeyRole::Nullifier)
    }

    /// Storage tag of the secret-key buffer.
    pub fn secret_tag(self) -> &'static str {
        match self {
            KeyRole::Nullifier => "nsk_m",
            KeyRole::IncomingViewing => "ivsk_m",
            KeyRole::OutgoingViewing => "ovsk_m",
            KeyRole::Tagging => "tsk_m",
            KeyRole::Signing => "ssk_m",
        }
    }

    /// Storage tag of the public-key buffer.
    pub fn public_tag(self) -> &'static str {
        match self {
            KeyRole::Nullifier => "npk_m",
            KeyRole::IncomingViewing => "ivpk_m",
            KeyRole::OutgoingViewing => "ovpk_m",
            KeyRole::Tagging => "tpk_m",
            KeyRole::Signing => "spk_m",
        }
    }

    /// Storage tag of the public-key hash buffer.
    pub fn hash_tag(self) -> String {
        format!("{}_hash", self.public_tag())
    }

    /// Domain separator used when deriving this role's master secret.
    pub fn derivation_domain(self) -> &'static [u8] {
        match self {
            KeyRole::Nullifier => DOMAIN_NULLIFIER_KEY,
            KeyRole::IncomingViewing => DOMAIN_INCOMING_VIEWING_KEY,
            KeyRole::OutgoingViewing => DOMAIN_OUTGOING_VIEWING_KEY,
            KeyRole::Tagging => DOMAIN_TAGGING_KEY,
            KeyRole::Signing => DOMAIN_SIGNING_KEY,
        }
    }

    /// Domain separator used when siloing this role's secret to a context.
    pub fn silo_domain(self) -> &'static [u8] {
        match self {
            KeyRole::Nullifier => DOMAIN_SILO_NULLIFIER,
            KeyRole::IncomingViewing => DOMAIN_SILO_INCOMING_VIEWING,
            KeyRole::OutgoingViewing => DOMAIN_SILO_OUTGOING_VIEWING,
            KeyRole::Tagging => DOMAIN_SILO_TAGGING,
            KeyRole::Signing => DOMAIN_SILO_SIGNING,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyRole::Nullifier => "nullifier",
            KeyRole::IncomingViewing => "incoming-viewing",
            KeyRole::OutgoingViewing => "outgoing-viewing",
            KeyRole::Tagging => "tagging",
            KeyRole::Signing => "signing",
        }
    }
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KeyRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "nullifier" | "nsk" | "npk" => Ok(KeyRole::Nullifier),
            "incoming-viewing" | "incoming" | "ivsk" | "ivpk" => Ok(KeyRole::IncomingViewing),
            "outgoing-viewing" | "outgoing" | "ovsk" | "ovpk" => Ok(KeyRole::OutgoingViewing),
            "tagging" | "tsk" | "tpk" => Ok(KeyRole::Tagging),
            "signing" | "ssk" | "spk" => Ok(KeyRole::Signing),
            _ => Err(format!(
                "unknown key role: {} (use nullifier, incoming-viewing, outgoing-viewing, tagging, or signing)",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_only_nullifier_rotates() {
        let rotatable: Vec<_> = KeyRole::ALL.iter().filter(|r| r.is_rotatable()).collect();
        assert_eq!(rotatable, vec![&KeyRole::Nullifier]);
        assert!(!KeyRole::CANONICAL.is_rotatable());
    }

    #[test]
    fn test_tags_are_unique() {
        let mut tags = HashSet::new();
        for role in KeyRole::ALL {
            assert!(tags.insert(role.secret_tag().to_string()));
            assert!(tags.insert(role.public_tag().to_string()));
            assert!(tags.insert(role.hash_tag()));
        }
        assert_eq!(tags.len(), 15);
    }

    #[test]
    fn test_domains_are_unique() {
        let mut domains = HashSet::new();
        for role in KeyRole::ALL {
            assert!(domains.insert(role.derivation_domain()));
            assert!(domains.insert(role.silo_domain()));
        }
    }

    #[test]
    fn test_role_name_roundtrip() {
        for role in KeyRole::ALL {
            assert_eq!(role.to_string().parse::<KeyRole>().unwrap(), role);
        }
        assert!("spending".parse::<KeyRole>().is_err());
    }

    #[test]
    fn test_hash_tag_format() {
        assert_eq!(KeyRole::Nullifier.hash_tag(), "npk_m_hash");
    }
}
