//! Per-account transaction log.
//!
//! Entries are opaque JSON records kept in insertion order under
//! `{address}-txs`, so removing an account from the vault removes its log
//! with it. Log access goes through the vault lock and only reaches
//! accounts the vault holds.

use std::sync::Arc;

use cloak_types::Address;
use serde_json::Value;

use crate::error::WalletError;
use crate::storage::KvStore;
use crate::vault::KeyVault;

pub const TX_LOG_TAG: &str = "txs";

pub struct TxLog<S: KvStore> {
    vault: Arc<KeyVault<S>>,
}

impl<S: KvStore> TxLog<S> {
    pub fn new(vault: Arc<KeyVault<S>>) -> Self {
        Self { vault }
    }

    /// Append `entry` to the account's log. Returns the new entry count.
    pub fn record(&self, address: &Address, entry: Value) -> Result<usize, WalletError> {
        let _guard = self.vault.write()?;
        if !self.vault.contains(address)? {
            return Err(WalletError::AccountNotFound(*address));
        }
        let key = address.storage_key(TX_LOG_TAG);
        let mut entries = self.load(&key)?;
        entries.push(entry);
        let bytes = serde_json::to_vec(&entries).map_err(|e| WalletError::CorruptRecord {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        self.vault.store().set(&key, bytes)?;
        log::debug!("recorded transaction #{} for {}", entries.len(), address);
        Ok(entries.len())
    }

    /// All entries for the account, oldest first. Empty if none were recorded.
    pub fn entries(&self, address: &Address) -> Result<Vec<Value>, WalletError> {
        let _guard = self.vault.read()?;
        if !self.vault.contains(address)? {
            return Err(WalletError::AccountNotFound(*address));
        }
        self.load(&address.storage_key(TX_LOG_TAG))
    }

    /// Drop the account's log. Returns whether one existed.
    pub fn clear(&self, address: &Address) -> Result<bool, WalletError> {
        let _guard = self.vault.write()?;
        let key = address.storage_key(TX_LOG_TAG);
        if self.vault.store().get(&key)?.is_none() {
            return Ok(false);
        }
        self.vault.store().delete(&key)?;
        Ok(true)
    }

    fn load(&self, key: &str) -> Result<Vec<Value>, WalletError> {
        match self.vault.store().get(key)? {
            None => Ok(Vec::new()),
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| WalletError::CorruptRecord {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
