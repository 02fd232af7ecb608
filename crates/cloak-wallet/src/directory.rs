//! Ordered account list and the current selection.
//!
//! The directory holds no key material. Local entries point into the
//! [`KeyVault`]; external entries are bound to session wallet handles that
//! the host re-attaches after every reload.
//!
//! Persisted under two keys, always written together:
//!
//! ```text
//! directory:accounts  [{"address": "0x..", "provenance": "local"}, ...]
//! directory:selected  null | <index>
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use cloak_types::Address;
use serde::{Deserialize, Serialize};

use crate::error::WalletError;
use crate::signer::{ExternalWallet, LocalSigner, SignerHandle};
use crate::storage::{KvStore, WriteBatch};
use crate::vault::KeyVault;

const ACCOUNTS_KEY: &str = "directory:accounts";
const SELECTED_KEY: &str = "directory:selected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Keys held in the local vault.
    Local,
    /// Signing delegated to a session wallet.
    External,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Local => write!(f, "local"),
            Provenance::External => write!(f, "external"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub address: Address,
    pub provenance: Provenance,
}

/// The selected account together with its signing authority.
#[derive(Debug)]
pub struct CurrentAccount {
    pub address: Address,
    pub provenance: Provenance,
    pub signer: SignerHandle,
}

pub struct AccountDirectory<S: KvStore> {
    vault: Arc<KeyVault<S>>,
    store: Arc<S>,
    entries: Vec<DirectoryEntry>,
    selected: Option<usize>,
    handles: HashMap<Address, Arc<dyn ExternalWallet>>,
}

impl<S: KvStore> AccountDirectory<S> {
    /// Load the directory persisted in the vault's store, repairing any
    /// state that no longer matches the vault.
    pub fn open(vault: Arc<KeyVault<S>>) -> Result<Self, WalletError> {
        let store = Arc::clone(vault.store());
        let stored: Vec<DirectoryEntry> = load_json(store.as_ref(), ACCOUNTS_KEY)?.unwrap_or_default();
        let stored_selected = load_json::<S, Option<usize>>(store.as_ref(), SELECTED_KEY)?.flatten();

        let selected_address = stored_selected.and_then(|i| stored.get(i)).map(|e| e.address);
        let mut repaired = false;

        if let Some(index) = stored_selected {
            if index >= stored.len() {
                log::warn!("directory selection {} out of range (len {}), clearing", index, stored.len());
                repaired = true;
            }
        }

        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(stored.len());
        for entry in stored {
            if !seen.insert(entry.address) {
                log::warn!("dropping duplicate directory entry {}", entry.address);
                repaired = true;
                continue;
            }
            if entry.provenance == Provenance::Local && !vault.has_account(&entry.address)? {
                log::warn!("dropping directory entry {}: not in vault", entry.address);
                repaired = true;
                continue;
            }
            entries.push(entry);
        }

        let selected = selected_address.and_then(|a| entries.iter().position(|e| e.address == a));
        if selected_address.is_some() && selected.is_none() {
            log::warn!("selected account was dropped, clearing selection");
            repaired = true;
        }

        let directory = Self {
            vault,
            store,
            entries,
            selected,
            handles: HashMap::new(),
        };
        if repaired {
            directory.persist(&directory.entries, directory.selected)?;
        }
        log::debug!(
            "opened directory with {} entries, selection {:?}",
            directory.entries.len(),
            directory.selected
        );
        Ok(directory)
    }

    pub fn vault(&self) -> &Arc<KeyVault<S>> {
        &self.vault
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn position(&self, address: &Address) -> Option<usize> {
        self.entries.iter().position(|e| e.address == *address)
    }

    /// Whether an external entry currently has a live handle.
    pub fn is_attached(&self, address: &Address) -> bool {
        self.handles.contains_key(address)
    }

    /// List a vault account and select it. Already-listed local accounts are
    /// left where they are.
    pub fn append_local(&mut self, address: Address) -> Result<usize, WalletError> {
        if !self.vault.has_account(&address)? {
            return Err(WalletError::AccountNotFound(address));
        }
        if let Some(index) = self.position(&address) {
            return match self.entries[index].provenance {
                Provenance::Local => Ok(index),
                Provenance::External => Err(WalletError::DuplicateAccount(address)),
            };
        }
        self.push(DirectoryEntry {
            address,
            provenance: Provenance::Local,
        })
    }

    /// List a delegated wallet and select it.
    pub fn append_external(&mut self, handle: Arc<dyn ExternalWallet>) -> Result<usize, WalletError> {
        let address = handle.address();
        if let Some(index) = self.position(&address) {
            return match self.entries[index].provenance {
                Provenance::External => {
                    self.handles.insert(address, handle);
                    Ok(index)
                }
                Provenance::Local => Err(WalletError::DuplicateAccount(address)),
            };
        }
        let index = self.push(DirectoryEntry {
            address,
            provenance: Provenance::External,
        })?;
        self.handles.insert(address, handle);
        Ok(index)
    }

    /// Rebind a session handle to an already-listed external entry.
    pub fn attach_external(&mut self, handle: Arc<dyn ExternalWallet>) -> Result<usize, WalletError> {
        let address = handle.address();
        let index = self
            .entries
            .iter()
            .position(|e| e.address == address && e.provenance == Provenance::External)
            .ok_or(WalletError::AccountNotFound(address))?;
        self.handles.insert(address, handle);
        log::debug!("attached external wallet {}", address);
        Ok(index)
    }

    pub fn select(&mut self, index: Option<usize>) -> Result<(), WalletError> {
        if let Some(i) = index {
            if i >= self.entries.len() {
                return Err(WalletError::IndexOutOfRange {
                    index: i,
                    len: self.entries.len(),
                });
            }
        }
        self.persist(&self.entries, index)?;
        self.selected = index;
        Ok(())
    }

    /// Drop the entry at `index`. Local accounts are also removed from the
    /// vault, deleting their keys and transaction log.
    pub fn remove(&mut self, index: usize) -> Result<DirectoryEntry, WalletError> {
        let entry = *self.entries.get(index).ok_or(WalletError::IndexOutOfRange {
            index,
            len: self.entries.len(),
        })?;

        if entry.provenance == Provenance::Local {
            self.vault.remove_account(&entry.address)?;
        }

        let mut entries = self.entries.clone();
        entries.remove(index);
        let selected = match self.selected {
            Some(s) if s == index => {
                if entries.is_empty() {
                    None
                } else {
                    Some(0)
                }
            }
            Some(s) if s > index => Some(s - 1),
            other => other,
        };

        self.persist(&entries, selected)?;
        self.entries = entries;
        self.selected = selected;
        self.handles.remove(&entry.address);
        log::info!("removed {} account {} from directory", entry.provenance, entry.address);
        Ok(entry)
    }

    /// The selected account and a signer for it.
    pub fn resolve_current(&self) -> Result<CurrentAccount, WalletError> {
        let index = self.selected.ok_or(WalletError::NoAccountSelected)?;
        let entry = self.entries.get(index).ok_or(WalletError::IndexOutOfRange {
            index,
            len: self.entries.len(),
        })?;

        let signer = match entry.provenance {
            Provenance::Local => {
                let secret = self.vault.signing_key(&entry.address)?;
                SignerHandle::Local(LocalSigner::new(entry.address, secret))
            }
            Provenance::External => {
                let handle = self
                    .handles
                    .get(&entry.address)
                    .ok_or(WalletError::WalletDisconnected(entry.address))?;
                SignerHandle::External(Arc::clone(handle))
            }
        };

        Ok(CurrentAccount {
            address: entry.address,
            provenance: entry.provenance,
            signer,
        })
    }

    fn push(&mut self, entry: DirectoryEntry) -> Result<usize, WalletError> {
        let mut entries = self.entries.clone();
        entries.push(entry);
        let index = entries.len() - 1;
        self.persist(&entries, Some(index))?;
        self.entries = entries;
        self.selected = Some(index);
        log::info!("listed {} account {} at index {}", entry.provenance, entry.address, index);
        Ok(index)
    }

    fn persist(&self, entries: &[DirectoryEntry], selected: Option<usize>) -> Result<(), WalletError> {
        let encode = |key: &str, result: serde_json::Result<Vec<u8>>| {
            result.map_err(|e| WalletError::CorruptRecord {
                key: key.to_string(),
                reason: e.to_string(),
            })
        };
        let mut batch = WriteBatch::new();
        batch
            .put(ACCOUNTS_KEY, encode(ACCOUNTS_KEY, serde_json::to_vec(entries))?)
            .put(SELECTED_KEY, encode(SELECTED_KEY, serde_json::to_vec(&selected))?);
        self.store.commit(batch)?;
        log::debug!("persisted directory: {} entries, selection {:?}", entries.len(), selected);
        Ok(())
    }
}

fn load_json<S: KvStore, T: serde::de::DeserializeOwned>(store: &S, key: &str) -> Result<Option<T>, WalletError> {
    match store.get(key)? {
        None => Ok(None),
        Some(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| WalletError::CorruptRecord {
                key: key.to_string(),
                reason: e.to_string(),
            }),
    }
}
