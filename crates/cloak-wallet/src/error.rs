//! Wallet error types.

use cloak_types::{Address, EncodingError, KeyRole};
use thiserror::Error;

use crate::storage::StoreError;

/// Coarse failure category, for callers that choose a recovery path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Account, role, key, or selection absent. Recoverable by user action.
    NotFound,
    /// Already present. Caller decides whether that counts as success.
    Duplicate,
    /// A derived public value does not match what was stored. Always fatal
    /// for the call.
    Integrity,
    /// A persisted record is malformed. Needs reset or re-import.
    Corruption,
    /// Bad input from the caller.
    Invalid,
    /// Backend, cipher, or external wallet failure.
    Storage,
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("account not found: {0}")]
    AccountNotFound(Address),

    #[error("no stored key matches public key hash {0}")]
    KeyNotFound(String),

    #[error("account already exists: {0}")]
    DuplicateAccount(Address),

    #[error("key already stored: {0}")]
    DuplicateKey(String),

    #[error("no account selected")]
    NoAccountSelected,

    #[error("directory index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("external wallet for {0} is not connected")]
    WalletDisconnected(Address),

    #[error("integrity check failed for {address} {role} generation {generation}: {reason}")]
    Integrity {
        address: Address,
        role: KeyRole,
        generation: usize,
        reason: String,
    },

    #[error("corrupt buffer at {key}: {source}")]
    Corruption {
        key: String,
        #[source]
        source: EncodingError,
    },

    #[error("corrupt record at {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("{0} keys cannot be rotated")]
    RoleNotRotatable(KeyRole),

    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    #[error("could not generate an unused account after {0} attempts")]
    CreationExhausted(u32),

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption failed (wrong password or corrupted data)")]
    DecryptionFailed,

    #[error("invalid backup file: {0}")]
    InvalidFile(String),

    #[error("external wallet error: {0}")]
    External(String),

    #[error("vault lock poisoned")]
    LockPoisoned,
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::AccountNotFound(_)
            | WalletError::KeyNotFound(_)
            | WalletError::NoAccountSelected
            | WalletError::IndexOutOfRange { .. }
            | WalletError::WalletDisconnected(_) => ErrorKind::NotFound,
            WalletError::DuplicateAccount(_) | WalletError::DuplicateKey(_) => ErrorKind::Duplicate,
            WalletError::Integrity { .. } => ErrorKind::Integrity,
            WalletError::Corruption { .. } | WalletError::CorruptRecord { .. } => ErrorKind::Corruption,
            WalletError::RoleNotRotatable(_)
            | WalletError::InvalidSecret(_)
            | WalletError::InvalidFile(_)
            | WalletError::DecryptionFailed => ErrorKind::Invalid,
            WalletError::CreationExhausted(_)
            | WalletError::Storage(_)
            | WalletError::Encryption(_)
            | WalletError::External(_)
            | WalletError::LockPoisoned => ErrorKind::Storage,
        }
    }

    /// True for failures the caller must never paper over.
    pub fn is_fatal(&self) -> bool {
        matches!(self.kind(), ErrorKind::Integrity | ErrorKind::Corruption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloak_types::ElementKind;

    #[test]
    fn test_kind_mapping() {
        let addr = Address::from_bytes([1u8; 32]);
        assert_eq!(WalletError::AccountNotFound(addr).kind(), ErrorKind::NotFound);
        assert_eq!(WalletError::DuplicateAccount(addr).kind(), ErrorKind::Duplicate);
        assert_eq!(
            WalletError::Integrity {
                address: addr,
                role: KeyRole::Nullifier,
                generation: 0,
                reason: "mismatch".into(),
            }
            .kind(),
            ErrorKind::Integrity
        );
        let corrupt = WalletError::Corruption {
            key: "k".into(),
            source: EncodingError::MisalignedBuffer {
                kind: ElementKind::Point,
                len: 3,
                width: 32,
            },
        };
        assert_eq!(corrupt.kind(), ErrorKind::Corruption);
        assert!(corrupt.is_fatal());
        assert!(!WalletError::NoAccountSelected.is_fatal());
    }

    #[test]
    fn test_messages_name_the_account() {
        let addr = Address::from_bytes([2u8; 32]);
        let msg = WalletError::AccountNotFound(addr).to_string();
        assert!(msg.contains(&addr.to_string()));
    }
}
