//! Cloak wallet core.
//!
//! Provides the local key vault (derive, persist, rotate, reverse-resolve
//! per-account master keys), the account directory that multiplexes local
//! and externally delegated wallets behind one current selection, durable
//! key-value storage, and the per-account transaction log.

pub mod config;
pub mod directory;
pub mod encryption;
pub mod error;
pub mod keys;
pub mod signer;
pub mod storage;
pub mod txlog;
pub mod vault;

pub use config::{KdfParams, VaultConfig};
pub use directory::{AccountDirectory, CurrentAccount, DirectoryEntry, Provenance};
pub use error::{ErrorKind, WalletError};
pub use keys::{AccountKeys, PublicKey, PublicKeyHash, SecretKey};
pub use signer::{Authorization, ExternalWallet, LocalSigner, Receipt, SignerHandle};
pub use storage::{KvStore, MemoryStore, SqliteStore, StoreError, WriteBatch};
pub use txlog::TxLog;
pub use vault::{KeyLocation, KeyVault};

pub use cloak_types::{Address, KeyRole};
