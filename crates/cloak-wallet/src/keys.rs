//! Account key material.
//!
//! Derives the master key hierarchy and address of an account from its
//! 32-byte secret. Secrets are zeroized on drop and never printed.

use std::fmt;
use std::str::FromStr;

use cloak_crypto::{MasterSecrets, PublicKeySet};
use cloak_types::constants::KEY_SIZE;
use cloak_types::{Address, KeyRole};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::WalletError;

fn parse_hex_32(s: &str) -> Result<[u8; KEY_SIZE], String> {
    let digits = s.trim();
    let digits = digits.strip_prefix("0x").unwrap_or(digits);
    let bytes = hex::decode(digits).map_err(|e| e.to_string())?;
    if bytes.len() != KEY_SIZE {
        return Err(format!("expected {} bytes, got {}", KEY_SIZE, bytes.len()));
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

/// 32-byte secret, wiped from memory on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Uniformly random scalar.
    pub fn random() -> Self {
        use rand::RngCore;
        let mut wide = [0u8; 64];
        rand::thread_rng().fill_bytes(&mut wide);
        let secret = Self(cloak_crypto::reduce_wide(&wide));
        wide.zeroize();
        secret
    }

    pub fn from_hex(s: &str) -> Result<Self, WalletError> {
        parse_hex_32(s).map(Self).map_err(WalletError::InvalidSecret)
    }

    /// Borrow the raw bytes. Do not store the returned reference.
    pub fn expose_secret(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey").field("value", &"[REDACTED]").finish()
    }
}

macro_rules! hex_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; KEY_SIZE]);

        impl $name {
            pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, String> {
                parse_hex_32(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_newtype!(
    /// Compressed public key of one role generation.
    PublicKey
);

hex_newtype!(
    /// Reverse-lookup digest of a [`PublicKey`].
    PublicKeyHash
);

impl PublicKey {
    pub fn hash(&self) -> PublicKeyHash {
        PublicKeyHash(cloak_crypto::hash_public_key(&self.0))
    }
}

/// Complete key set of one account, as derived from its secret.
pub struct AccountKeys {
    pub address: Address,
    pub public_keys: PublicKeySet,
    secrets: MasterSecrets,
}

impl AccountKeys {
    pub fn from_secret(secret: &SecretKey, salt: &[u8; KEY_SIZE]) -> Self {
        let secrets = cloak_crypto::derive_master_keys(secret.expose_secret());
        let public_keys = secrets.public_keys();
        let address = Address::from_bytes(cloak_crypto::compute_address(&public_keys, salt));
        Self {
            address,
            public_keys,
            secrets,
        }
    }

    pub fn secret(&self, role: KeyRole) -> SecretKey {
        SecretKey(*self.secrets.get(role))
    }

    pub fn public_key(&self, role: KeyRole) -> PublicKey {
        PublicKey(*self.public_keys.get(role))
    }
}

impl Drop for AccountKeys {
    fn drop(&mut self) {
        self.secrets.wipe();
    }
}
