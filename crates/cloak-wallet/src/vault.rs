//! Local credential vault.
//!
//! Owns every account's master key material. Each role of each account is
//! persisted as three buffers of concatenated 32-byte generations:
//!
//! ```text
//! {address}-{secretTag}       scalar  | scalar  | ...
//! {address}-{publicTag}       point   | point   | ...
//! {address}-{publicTag}_hash  hash    | hash    | ...
//! ```
//!
//! Only the nullifier role ever holds more than one generation, and its
//! buffers are append-only. Reverse lookup scans the hash buffers of every
//! account; the cost is bounded by accounts × roles × generations.
//!
//! Mutations hold the vault write lock for their whole read-check-commit
//! sequence and land as one store batch, so readers never observe a
//! partially written account.

use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use cloak_crypto::PublicKeySet;
use cloak_types::constants::KEY_SIZE;
use cloak_types::encoding::{append_generation, split_generations};
use cloak_types::{Address, ElementKind, EncodingError, KeyRole};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::config::VaultConfig;
use crate::encryption;
use crate::error::WalletError;
use crate::keys::{AccountKeys, PublicKey, PublicKeyHash, SecretKey};
use crate::storage::{KvStore, WriteBatch};

/// Where a public-key hash lives in the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyLocation {
    pub address: Address,
    pub role: KeyRole,
    /// 0 = original key.
    pub generation: usize,
}

/// Decrypted backup payload: every generation of every role.
#[derive(Serialize, Deserialize)]
struct AccountBackup {
    address: Address,
    salt: String,
    roles: Vec<RoleBackup>,
}

#[derive(Serialize, Deserialize)]
struct RoleBackup {
    role: KeyRole,
    secrets: Vec<String>,
}

impl Drop for AccountBackup {
    fn drop(&mut self) {
        for role in &mut self.roles {
            role.secrets.iter_mut().for_each(|s| s.zeroize());
        }
    }
}

pub struct KeyVault<S: KvStore> {
    store: Arc<S>,
    config: VaultConfig,
    lock: RwLock<()>,
}

impl<S: KvStore> KeyVault<S> {
    pub fn new(store: Arc<S>, config: VaultConfig) -> Self {
        Self {
            store,
            config,
            lock: RwLock::new(()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub(crate) fn read(&self) -> Result<RwLockReadGuard<'_, ()>, WalletError> {
        self.lock.read().map_err(|_| WalletError::LockPoisoned)
    }

    pub(crate) fn write(&self) -> Result<RwLockWriteGuard<'_, ()>, WalletError> {
        self.lock.write().map_err(|_| WalletError::LockPoisoned)
    }

    // ── Account lifecycle ───────────────────────────────────────────────

    /// Derive and store the full key set of the account owned by `secret`.
    pub fn add_account(&self, secret: &SecretKey) -> Result<Address, WalletError> {
        let _guard = self.write()?;
        let keys = AccountKeys::from_secret(secret, &self.config.address_salt);
        let address = keys.address;

        if self.contains(&address)? {
            return Err(WalletError::DuplicateAccount(address));
        }
        // The same secret under another address salt yields new addresses
        // over the same public keys.
        let hashes: Vec<PublicKeyHash> = KeyRole::ALL
            .iter()
            .map(|role| keys.public_key(*role).hash())
            .collect();
        self.ensure_unclaimed(&hashes)?;

        let mut batch = WriteBatch::new();
        for role in KeyRole::ALL {
            let public_key = keys.public_key(role);
            batch
                .put(address.storage_key(role.secret_tag()), keys.secret(role).expose_secret().to_vec())
                .put(address.storage_key(role.public_tag()), public_key.as_bytes().to_vec())
                .put(address.storage_key(&role.hash_tag()), public_key.hash().as_bytes().to_vec());
        }
        self.store.commit(batch)?;

        log::info!("added account {}", address);
        Ok(address)
    }

    /// Generate a fresh secret and add its account, retrying on collision.
    ///
    /// Returns the secret so the caller can back it up.
    pub fn create_account(&self) -> Result<(Address, SecretKey), WalletError> {
        for attempt in 1..=self.config.max_create_attempts {
            let secret = SecretKey::random();
            match self.add_account(&secret) {
                Ok(address) => return Ok((address, secret)),
                Err(WalletError::DuplicateAccount(address)) => {
                    log::warn!("generated secret collides with {} (attempt {})", address, attempt);
                }
                Err(e) => return Err(e),
            }
        }
        Err(WalletError::CreationExhausted(self.config.max_create_attempts))
    }

    /// Delete every entry stored under `address`. Removing an absent account
    /// is not an error.
    pub fn remove_account(&self, address: &Address) -> Result<(), WalletError> {
        let _guard = self.write()?;
        let keys = self.store.keys_with_prefix(&address.storage_prefix())?;
        if keys.is_empty() {
            log::debug!("remove {}: nothing stored", address);
            return Ok(());
        }
        let mut batch = WriteBatch::new();
        for key in keys {
            batch.delete(key);
        }
        let count = batch.len();
        self.store.commit(batch)?;
        log::info!("removed account {} ({} entries)", address, count);
        Ok(())
    }

    pub fn has_account(&self, address: &Address) -> Result<bool, WalletError> {
        let _guard = self.read()?;
        self.contains(address)
    }

    /// Addresses with a stored canonical-role entry.
    pub fn list_accounts(&self) -> Result<BTreeSet<Address>, WalletError> {
        let _guard = self.read()?;
        self.addresses()
    }

    // ── Public keys ─────────────────────────────────────────────────────

    /// Latest generation of `role`'s public key.
    pub fn get_public_key(&self, address: &Address, role: KeyRole) -> Result<PublicKey, WalletError> {
        let _guard = self.read()?;
        self.latest_public_key(address, role)
    }

    /// Latest public key of every role.
    pub fn public_keys(&self, address: &Address) -> Result<PublicKeySet, WalletError> {
        let _guard = self.read()?;
        Ok(PublicKeySet {
            nullifier: *self.latest_public_key(address, KeyRole::Nullifier)?.as_bytes(),
            incoming_viewing: *self.latest_public_key(address, KeyRole::IncomingViewing)?.as_bytes(),
            outgoing_viewing: *self.latest_public_key(address, KeyRole::OutgoingViewing)?.as_bytes(),
            tagging: *self.latest_public_key(address, KeyRole::Tagging)?.as_bytes(),
            signing: *self.latest_public_key(address, KeyRole::Signing)?.as_bytes(),
        })
    }

    /// Every generation of `role`'s public key, oldest first.
    pub fn public_key_history(&self, address: &Address, role: KeyRole) -> Result<Vec<PublicKey>, WalletError> {
        let _guard = self.read()?;
        self.read_public_keys(address, role)?
            .ok_or(WalletError::AccountNotFound(*address))
    }

    // ── Rotation ────────────────────────────────────────────────────────

    /// Append a new generation to a rotatable role.
    ///
    /// Uses `new_secret` when given (reduced mod ℓ), else a random scalar.
    /// Earlier generations stay resolvable.
    pub fn rotate_role(
        &self,
        address: &Address,
        role: KeyRole,
        new_secret: Option<SecretKey>,
    ) -> Result<PublicKey, WalletError> {
        if !role.is_rotatable() {
            return Err(WalletError::RoleNotRotatable(role));
        }
        let _guard = self.write()?;

        let secret_key = address.storage_key(role.secret_tag());
        let public_key_key = address.storage_key(role.public_tag());
        let hash_key = address.storage_key(&role.hash_tag());

        let secrets_buf = self
            .store
            .get(&secret_key)?
            .ok_or(WalletError::AccountNotFound(*address))?;
        let publics_buf = self.store.get(&public_key_key)?.unwrap_or_default();
        let hashes_buf = self.store.get(&hash_key)?.unwrap_or_default();

        let generation = self.check_generation_counts(
            address,
            role,
            [(&secret_key, &secrets_buf), (&public_key_key, &publics_buf), (&hash_key, &hashes_buf)],
        )?;
        if generation == 0 {
            return Err(WalletError::AccountNotFound(*address));
        }

        let secret = match new_secret {
            Some(s) => SecretKey::from_bytes(cloak_crypto::sc_reduce32(s.expose_secret())),
            None => SecretKey::random(),
        };
        if cloak_crypto::sc_is_zero(secret.expose_secret()) {
            return Err(WalletError::InvalidSecret("secret reduces to zero".into()));
        }
        let public_key = PublicKey::from_bytes(cloak_crypto::derive_public_key(secret.expose_secret()));
        let hash = public_key.hash();
        self.ensure_unclaimed(&[hash])?;

        let corrupt = |key: &str| {
            let key = key.to_string();
            move |source: EncodingError| WalletError::Corruption { key, source }
        };
        let mut batch = WriteBatch::new();
        batch
            .put(
                secret_key.clone(),
                append_generation(ElementKind::Scalar, &secrets_buf, secret.expose_secret())
                    .map_err(corrupt(&secret_key))?,
            )
            .put(
                public_key_key.clone(),
                append_generation(ElementKind::Point, &publics_buf, public_key.as_bytes())
                    .map_err(corrupt(&public_key_key))?,
            )
            .put(
                hash_key.clone(),
                append_generation(ElementKind::Hash, &hashes_buf, hash.as_bytes())
                    .map_err(corrupt(&hash_key))?,
            );
        self.store.commit(batch)?;

        log::info!("rotated {} key of {} to generation {}", role, address, generation);
        Ok(public_key)
    }

    // ── Reverse lookup ──────────────────────────────────────────────────

    /// Find the account, role, and generation whose public key hashes to `hash`.
    pub fn locate_public_key_hash(&self, hash: &PublicKeyHash) -> Result<KeyLocation, WalletError> {
        let _guard = self.read()?;
        self.find_hash(hash)?
            .ok_or_else(|| WalletError::KeyNotFound(hash.to_string()))
    }

    /// Resolve a public-key hash to the matching master secret siloed to
    /// `context`.
    ///
    /// The candidate secret must re-derive to a public key with exactly this
    /// hash; otherwise the call fails with `Integrity`.
    pub fn resolve_secret_by_public_key_hash(
        &self,
        hash: &PublicKeyHash,
        context: &Address,
    ) -> Result<SecretKey, WalletError> {
        let _guard = self.read()?;
        let location = self
            .find_hash(hash)?
            .ok_or_else(|| WalletError::KeyNotFound(hash.to_string()))?;
        log::debug!(
            "hash {} resolves to {} {} generation {}",
            hash,
            location.address,
            location.role,
            location.generation
        );

        let master = self.verified_secret(&location, |pk| pk.hash() == *hash)?;
        let siloed = cloak_crypto::siloed_secret(
            master.expose_secret(),
            context.as_bytes(),
            location.role.silo_domain(),
        );
        Ok(SecretKey::from_bytes(siloed))
    }

    /// Master secret for a stored public key of any role or generation.
    pub fn master_secret_for_public_key(&self, public_key: &PublicKey) -> Result<SecretKey, WalletError> {
        let _guard = self.read()?;
        let hash = public_key.hash();
        let location = self
            .find_hash(&hash)?
            .ok_or_else(|| WalletError::KeyNotFound(hash.to_string()))?;
        self.verified_secret(&location, |pk| pk == *public_key)
    }

    /// The account's signing secret, checked against its stored public key.
    pub fn signing_key(&self, address: &Address) -> Result<SecretKey, WalletError> {
        let _guard = self.read()?;
        let stored = self.latest_public_key(address, KeyRole::Signing)?;
        let location = KeyLocation {
            address: *address,
            role: KeyRole::Signing,
            generation: 0,
        };
        self.verified_secret(&location, |pk| pk == stored)
    }

    // ── Backups ─────────────────────────────────────────────────────────

    /// Password-encrypted snapshot of every generation of every role.
    pub fn export_backup(&self, address: &Address, password: &[u8]) -> Result<Vec<u8>, WalletError> {
        let _guard = self.read()?;
        if !self.contains(address)? {
            return Err(WalletError::AccountNotFound(*address));
        }

        let mut roles = Vec::with_capacity(KeyRole::ALL.len());
        for role in KeyRole::ALL {
            let secrets = self
                .read_generations(address, role.secret_tag(), ElementKind::Scalar)?
                .ok_or_else(|| WalletError::CorruptRecord {
                    key: address.storage_key(role.secret_tag()),
                    reason: "missing role buffer".into(),
                })?;
            roles.push(RoleBackup {
                role,
                secrets: secrets.into_iter().map(hex::encode).collect(),
            });
        }
        let backup = AccountBackup {
            address: *address,
            salt: hex::encode(self.config.address_salt),
            roles,
        };

        let mut plaintext =
            serde_json::to_vec(&backup).map_err(|e| WalletError::Encryption(e.to_string()))?;
        let result = encryption::encrypt_backup(&plaintext, password, &self.config.kdf);
        plaintext.zeroize();
        log::info!("exported backup of {}", address);
        result
    }

    /// Restore an account from [`KeyVault::export_backup`] output.
    ///
    /// Every generation is re-derived and the address recomputed before
    /// anything is written.
    pub fn import_backup(&self, data: &[u8], password: &[u8]) -> Result<Address, WalletError> {
        let mut plaintext = encryption::decrypt_backup(data, password)?;
        let parsed: Result<AccountBackup, _> = serde_json::from_slice(&plaintext);
        plaintext.zeroize();
        let backup = parsed.map_err(|e| WalletError::InvalidFile(e.to_string()))?;

        let salt = decode_32(&backup.salt).map_err(WalletError::InvalidFile)?;
        let address = backup.address;

        let mut batch = WriteBatch::new();
        let mut originals = [[0u8; KEY_SIZE]; 5];
        let mut claimed = Vec::new();
        for (slot, role) in KeyRole::ALL.into_iter().enumerate() {
            let entry = backup
                .roles
                .iter()
                .find(|r| r.role == role)
                .ok_or_else(|| WalletError::InvalidFile(format!("missing {} keys", role)))?;
            let count = entry.secrets.len();
            if count == 0 || (!role.is_rotatable() && count != 1) {
                return Err(WalletError::InvalidFile(format!(
                    "{} keys have {} generations",
                    role, count
                )));
            }

            let mut secrets = Vec::with_capacity(count * KEY_SIZE);
            let mut publics = Vec::with_capacity(count * KEY_SIZE);
            let mut hashes = Vec::with_capacity(count * KEY_SIZE);
            for (generation, hex_secret) in entry.secrets.iter().enumerate() {
                let secret = SecretKey::from_bytes(decode_32(hex_secret).map_err(WalletError::InvalidFile)?);
                if !cloak_crypto::sc_check(secret.expose_secret()) {
                    return Err(WalletError::Integrity {
                        address,
                        role,
                        generation,
                        reason: "secret is not a canonical scalar".into(),
                    });
                }
                let public_key = PublicKey::from_bytes(cloak_crypto::derive_public_key(secret.expose_secret()));
                if generation == 0 {
                    originals[slot] = *public_key.as_bytes();
                }
                let hash = public_key.hash();
                secrets.extend_from_slice(secret.expose_secret());
                publics.extend_from_slice(public_key.as_bytes());
                hashes.extend_from_slice(hash.as_bytes());
                claimed.push(hash);
            }
            batch
                .put(address.storage_key(role.secret_tag()), secrets)
                .put(address.storage_key(role.public_tag()), publics)
                .put(address.storage_key(&role.hash_tag()), hashes);
        }

        let original_keys = PublicKeySet {
            nullifier: originals[0],
            incoming_viewing: originals[1],
            outgoing_viewing: originals[2],
            tagging: originals[3],
            signing: originals[4],
        };
        if cloak_crypto::compute_address(&original_keys, &salt) != address.to_bytes() {
            return Err(WalletError::Integrity {
                address,
                role: KeyRole::CANONICAL,
                generation: 0,
                reason: "keys do not derive the backed-up address".into(),
            });
        }

        let _guard = self.write()?;
        if self.contains(&address)? {
            return Err(WalletError::DuplicateAccount(address));
        }
        self.ensure_unclaimed(&claimed)?;
        self.store.commit(batch)?;
        log::info!("imported account {} from backup", address);
        Ok(address)
    }

    // ── Unlocked helpers (caller holds the lock) ────────────────────────

    pub(crate) fn contains(&self, address: &Address) -> Result<bool, WalletError> {
        Ok(self
            .store
            .get(&address.storage_key(KeyRole::CANONICAL.secret_tag()))?
            .is_some())
    }

    fn addresses(&self) -> Result<BTreeSet<Address>, WalletError> {
        let suffix = format!("-{}", KeyRole::CANONICAL.secret_tag());
        let mut out = BTreeSet::new();
        for key in self.store.keys_with_prefix("0x")? {
            if let Some(addr) = key.strip_suffix(&suffix) {
                match addr.parse::<Address>() {
                    Ok(a) => {
                        out.insert(a);
                    }
                    Err(e) => log::debug!("skipping key {}: {}", key, e),
                }
            }
        }
        Ok(out)
    }

    fn read_generations(
        &self,
        address: &Address,
        tag: &str,
        kind: ElementKind,
    ) -> Result<Option<Vec<[u8; KEY_SIZE]>>, WalletError> {
        let key = address.storage_key(tag);
        match self.store.get(&key)? {
            None => Ok(None),
            Some(buf) => split_generations(kind, &buf)
                .map(Some)
                .map_err(|source| WalletError::Corruption { key, source }),
        }
    }

    /// Stored public keys of `role`, each checked to be a curve point.
    fn read_public_keys(&self, address: &Address, role: KeyRole) -> Result<Option<Vec<PublicKey>>, WalletError> {
        let Some(gens) = self.read_generations(address, role.public_tag(), ElementKind::Point)? else {
            return Ok(None);
        };
        if let Some(generation) = gens.iter().position(|p| !cloak_crypto::is_valid_point(p)) {
            return Err(WalletError::CorruptRecord {
                key: address.storage_key(role.public_tag()),
                reason: format!("generation {} is not a curve point", generation),
            });
        }
        Ok(Some(gens.into_iter().map(PublicKey::from_bytes).collect()))
    }

    fn latest_public_key(&self, address: &Address, role: KeyRole) -> Result<PublicKey, WalletError> {
        self.read_public_keys(address, role)?
            .and_then(|keys| keys.last().copied())
            .ok_or(WalletError::AccountNotFound(*address))
    }

    fn find_hash(&self, hash: &PublicKeyHash) -> Result<Option<KeyLocation>, WalletError> {
        for address in self.addresses()? {
            for role in KeyRole::ALL {
                let Some(hashes) = self.read_generations(&address, &role.hash_tag(), ElementKind::Hash)? else {
                    continue;
                };
                if let Some(generation) = hashes.iter().position(|h| h == hash.as_bytes()) {
                    return Ok(Some(KeyLocation {
                        address,
                        role,
                        generation,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Fail with `DuplicateKey` if any of `hashes` is already stored under
    /// some account, or appears twice in `hashes`.
    fn ensure_unclaimed(&self, hashes: &[PublicKeyHash]) -> Result<(), WalletError> {
        let mut seen = HashSet::new();
        for address in self.addresses()? {
            for role in KeyRole::ALL {
                if let Some(stored) = self.read_generations(&address, &role.hash_tag(), ElementKind::Hash)? {
                    seen.extend(stored.into_iter().map(PublicKeyHash::from_bytes));
                }
            }
        }
        for hash in hashes {
            if !seen.insert(*hash) {
                return Err(WalletError::DuplicateKey(hash.to_string()));
            }
        }
        Ok(())
    }

    /// Load the secret at `location` and require its derived public key to
    /// satisfy `matches`.
    fn verified_secret(
        &self,
        location: &KeyLocation,
        matches: impl Fn(PublicKey) -> bool,
    ) -> Result<SecretKey, WalletError> {
        let KeyLocation {
            address,
            role,
            generation,
        } = *location;
        let integrity = |reason: &str| WalletError::Integrity {
            address,
            role,
            generation,
            reason: reason.to_string(),
        };

        let secret = self
            .read_generations(&address, role.secret_tag(), ElementKind::Scalar)?
            .and_then(|gens| gens.get(generation).copied())
            .map(SecretKey::from_bytes)
            .ok_or_else(|| integrity("no secret stored for this generation"))?;

        let derived = PublicKey::from_bytes(cloak_crypto::derive_public_key(secret.expose_secret()));
        if !matches(derived) {
            log::warn!(
                "secret of {} {} generation {} does not derive the expected public key",
                address,
                role,
                generation
            );
            return Err(integrity("derived public key does not match"));
        }
        Ok(secret)
    }

    /// Generation count shared by a role's three buffers.
    fn check_generation_counts(
        &self,
        address: &Address,
        role: KeyRole,
        buffers: [(&String, &Vec<u8>); 3],
    ) -> Result<usize, WalletError> {
        let kinds = [ElementKind::Scalar, ElementKind::Point, ElementKind::Hash];
        let mut counts = [0usize; 3];
        for (i, ((key, buf), kind)) in buffers.iter().zip(kinds).enumerate() {
            counts[i] = cloak_types::encoding::generation_count(kind, buf).map_err(|source| {
                WalletError::Corruption {
                    key: (*key).clone(),
                    source,
                }
            })?;
        }
        if counts[0] != counts[1] || counts[1] != counts[2] {
            return Err(WalletError::CorruptRecord {
                key: address.storage_key(role.secret_tag()),
                reason: format!(
                    "generation counts differ: {} secrets, {} public keys, {} hashes",
                    counts[0], counts[1], counts[2]
                ),
            });
        }
        Ok(counts[0])
    }
}

fn decode_32(s: &str) -> Result<[u8; KEY_SIZE], String> {
    let bytes = hex::decode(s).map_err(|e| e.to_string())?;
    if bytes.len() != KEY_SIZE {
        return Err(format!("expected {} bytes, got {}", KEY_SIZE, bytes.len()));
    }
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KdfParams;
    use crate::error::ErrorKind;
    use crate::storage::MemoryStore;

    fn vault() -> KeyVault<MemoryStore> {
        let config = VaultConfig::default().with_kdf(KdfParams::insecure_fast());
        KeyVault::new(Arc::new(MemoryStore::new()), config)
    }

    fn secret(byte: u8) -> SecretKey {
        SecretKey::from_bytes([byte; 32])
    }

    fn ctx() -> Address {
        Address::from_bytes([0xC0; 32])
    }

    #[test]
    fn test_add_account_persists_every_role() {
        let vault = vault();
        let address = vault.add_account(&secret(1)).unwrap();
        let keys = vault.store().keys_with_prefix(&address.storage_prefix()).unwrap();
        assert_eq!(keys.len(), KeyRole::ALL.len() * 3);
        for role in KeyRole::ALL {
            assert!(keys.contains(&address.storage_key(role.secret_tag())));
            assert!(keys.contains(&address.storage_key(role.public_tag())));
            assert!(keys.contains(&address.storage_key(&role.hash_tag())));
        }
    }

    #[test]
    fn test_add_account_matches_derivation() {
        let vault = vault();
        let address = vault.add_account(&secret(1)).unwrap();
        let expected = AccountKeys::from_secret(&secret(1), &[0u8; 32]);
        assert_eq!(address, expected.address);
        assert_eq!(vault.public_keys(&address).unwrap(), expected.public_keys);
    }

    #[test]
    fn test_duplicate_account_rejected() {
        let vault = vault();
        let address = vault.add_account(&secret(2)).unwrap();
        let err = vault.add_account(&secret(2)).unwrap_err();
        assert!(matches!(err, WalletError::DuplicateAccount(a) if a == address));
        assert_eq!(err.kind(), ErrorKind::Duplicate);
    }

    #[test]
    fn test_create_account_returns_usable_secret() {
        let vault = vault();
        let (address, secret) = vault.create_account().unwrap();
        assert!(vault.has_account(&address).unwrap());
        assert_eq!(AccountKeys::from_secret(&secret, &[0u8; 32]).address, address);
    }

    #[test]
    fn test_get_public_key_unknown_account() {
        let vault = vault();
        let missing = Address::from_bytes([9u8; 32]);
        assert!(matches!(
            vault.get_public_key(&missing, KeyRole::Nullifier),
            Err(WalletError::AccountNotFound(a)) if a == missing
        ));
    }

    #[test]
    fn test_rotate_non_rotatable_role() {
        let vault = vault();
        let address = vault.add_account(&secret(3)).unwrap();
        assert!(matches!(
            vault.rotate_role(&address, KeyRole::IncomingViewing, None),
            Err(WalletError::RoleNotRotatable(KeyRole::IncomingViewing))
        ));
    }

    #[test]
    fn test_rotate_unknown_account() {
        let vault = vault();
        let missing = Address::from_bytes([9u8; 32]);
        assert!(matches!(
            vault.rotate_role(&missing, KeyRole::Nullifier, None),
            Err(WalletError::AccountNotFound(_))
        ));
    }

    #[test]
    fn test_rotate_appends_generation() {
        let vault = vault();
        let address = vault.add_account(&secret(4)).unwrap();
        let p0 = vault.get_public_key(&address, KeyRole::Nullifier).unwrap();
        let p1 = vault.rotate_role(&address, KeyRole::Nullifier, Some(secret(40))).unwrap();

        assert_ne!(p0, p1);
        assert_eq!(vault.get_public_key(&address, KeyRole::Nullifier).unwrap(), p1);
        assert_eq!(vault.public_key_history(&address, KeyRole::Nullifier).unwrap(), vec![p0, p1]);
        assert_eq!(
            p1,
            PublicKey::from_bytes(cloak_crypto::derive_public_key(&cloak_crypto::sc_reduce32(&[40u8; 32])))
        );
    }

    #[test]
    fn test_rotate_rejects_reused_secret() {
        let vault = vault();
        let address = vault.add_account(&secret(5)).unwrap();
        vault.rotate_role(&address, KeyRole::Nullifier, Some(secret(50))).unwrap();
        assert!(matches!(
            vault.rotate_role(&address, KeyRole::Nullifier, Some(secret(50))),
            Err(WalletError::DuplicateKey(_))
        ));
        assert_eq!(vault.public_key_history(&address, KeyRole::Nullifier).unwrap().len(), 2);
    }

    #[test]
    fn test_rotate_rejects_zero_secret() {
        let vault = vault();
        let address = vault.add_account(&secret(6)).unwrap();
        assert!(matches!(
            vault.rotate_role(&address, KeyRole::Nullifier, Some(SecretKey::from_bytes([0u8; 32]))),
            Err(WalletError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_locate_each_role() {
        let vault = vault();
        let address = vault.add_account(&secret(7)).unwrap();
        for role in KeyRole::ALL {
            let pk = vault.get_public_key(&address, role).unwrap();
            let loc = vault.locate_public_key_hash(&pk.hash()).unwrap();
            assert_eq!(loc, KeyLocation { address, role, generation: 0 });
        }
    }

    #[test]
    fn test_resolve_matches_siloed_derivation() {
        let vault = vault();
        let address = vault.add_account(&secret(8)).unwrap();
        let keys = AccountKeys::from_secret(&secret(8), &[0u8; 32]);
        let pk = vault.get_public_key(&address, KeyRole::Tagging).unwrap();

        let siloed = vault.resolve_secret_by_public_key_hash(&pk.hash(), &ctx()).unwrap();
        let expected = cloak_crypto::siloed_secret(
            keys.secret(KeyRole::Tagging).expose_secret(),
            ctx().as_bytes(),
            KeyRole::Tagging.silo_domain(),
        );
        assert_eq!(siloed.expose_secret(), &expected);
    }

    #[test]
    fn test_resolve_unknown_hash() {
        let vault = vault();
        vault.add_account(&secret(9)).unwrap();
        let err = vault
            .resolve_secret_by_public_key_hash(&PublicKeyHash::from_bytes([0xEE; 32]), &ctx())
            .unwrap_err();
        assert!(matches!(err, WalletError::KeyNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_resolve_detects_tampered_secret() {
        let vault = vault();
        let address = vault.add_account(&secret(10)).unwrap();
        let pk = vault.get_public_key(&address, KeyRole::OutgoingViewing).unwrap();
        vault
            .store()
            .set(&address.storage_key(KeyRole::OutgoingViewing.secret_tag()), vec![0x11; 32])
            .unwrap();

        let err = vault.resolve_secret_by_public_key_hash(&pk.hash(), &ctx()).unwrap_err();
        assert!(matches!(
            err,
            WalletError::Integrity { role: KeyRole::OutgoingViewing, generation: 0, .. }
        ));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_misaligned_buffer_is_corruption() {
        let vault = vault();
        let address = vault.add_account(&secret(11)).unwrap();
        vault
            .store()
            .set(&address.storage_key(KeyRole::Nullifier.public_tag()), vec![0u8; 40])
            .unwrap();
        let err = vault.get_public_key(&address, KeyRole::Nullifier).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
        assert!(matches!(
            vault.rotate_role(&address, KeyRole::Nullifier, None),
            Err(WalletError::Corruption { .. })
        ));
    }

    #[test]
    fn test_uneven_generations_is_corruption() {
        let vault = vault();
        let address = vault.add_account(&secret(12)).unwrap();
        vault
            .store()
            .set(&address.storage_key(&KeyRole::Nullifier.hash_tag()), vec![0u8; 64])
            .unwrap();
        assert!(matches!(
            vault.rotate_role(&address, KeyRole::Nullifier, None),
            Err(WalletError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_master_secret_for_public_key() {
        let vault = vault();
        let address = vault.add_account(&secret(13)).unwrap();
        let keys = AccountKeys::from_secret(&secret(13), &[0u8; 32]);
        let pk = vault.get_public_key(&address, KeyRole::IncomingViewing).unwrap();
        let master = vault.master_secret_for_public_key(&pk).unwrap();
        assert_eq!(master, keys.secret(KeyRole::IncomingViewing));
    }

    #[test]
    fn test_signing_key() {
        let vault = vault();
        let address = vault.add_account(&secret(14)).unwrap();
        let keys = AccountKeys::from_secret(&secret(14), &[0u8; 32]);
        assert_eq!(vault.signing_key(&address).unwrap(), keys.secret(KeyRole::Signing));
    }

    #[test]
    fn test_remove_account_idempotent() {
        let vault = vault();
        let keep = vault.add_account(&secret(15)).unwrap();
        let gone = vault.add_account(&secret(16)).unwrap();
        vault.remove_account(&gone).unwrap();
        vault.remove_account(&gone).unwrap();

        let listed = vault.list_accounts().unwrap();
        assert!(listed.contains(&keep));
        assert!(!listed.contains(&gone));
        assert!(vault.store().keys_with_prefix(&gone.storage_prefix()).unwrap().is_empty());
    }

    #[test]
    fn test_list_ignores_foreign_keys() {
        let vault = vault();
        let address = vault.add_account(&secret(17)).unwrap();
        vault.store().set("directory:accounts", b"[]".to_vec()).unwrap();
        vault.store().set("0xnothex-ivsk_m", vec![0u8; 32]).unwrap();
        let listed: Vec<_> = vault.list_accounts().unwrap().into_iter().collect();
        assert_eq!(listed, vec![address]);
    }

    #[test]
    fn test_backup_roundtrip_keeps_rotations() {
        let source = vault();
        let address = source.add_account(&secret(18)).unwrap();
        source.rotate_role(&address, KeyRole::Nullifier, Some(secret(180))).unwrap();
        let history = source.public_key_history(&address, KeyRole::Nullifier).unwrap();

        let blob = source.export_backup(&address, b"backup-pw").unwrap();
        assert!(encryption::is_encrypted_backup(&blob));

        let target = vault();
        assert_eq!(target.import_backup(&blob, b"backup-pw").unwrap(), address);
        assert_eq!(target.public_key_history(&address, KeyRole::Nullifier).unwrap(), history);
        assert_eq!(target.public_keys(&address).unwrap(), source.public_keys(&address).unwrap());

        assert!(matches!(
            target.import_backup(&blob, b"backup-pw"),
            Err(WalletError::DuplicateAccount(_))
        ));
        assert!(matches!(
            vault().import_backup(&blob, b"wrong"),
            Err(WalletError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_import_rejects_forged_address() {
        let config = VaultConfig::default().with_kdf(KdfParams::insecure_fast());
        let backup = AccountBackup {
            address: Address::from_bytes([0x42; 32]),
            salt: hex::encode([0u8; 32]),
            roles: KeyRole::ALL
                .iter()
                .map(|role| RoleBackup {
                    role: *role,
                    secrets: vec![hex::encode(cloak_crypto::sc_reduce32(&[0x21; 32]))],
                })
                .collect(),
        };
        let plaintext = serde_json::to_vec(&backup).unwrap();
        let blob = encryption::encrypt_backup(&plaintext, b"pw", &config.kdf).unwrap();

        let vault = vault();
        assert!(matches!(
            vault.import_backup(&blob, b"pw"),
            Err(WalletError::Integrity { .. })
        ));
        assert!(vault.list_accounts().unwrap().is_empty());
    }

    #[test]
    fn test_same_secret_under_another_salt_rejected() {
        let store = Arc::new(MemoryStore::new());
        let fast = KdfParams::insecure_fast();
        let first = KeyVault::new(Arc::clone(&store), VaultConfig::default().with_kdf(fast));
        let second = KeyVault::new(Arc::clone(&store), VaultConfig::default().with_salt([7u8; 32]).with_kdf(fast));

        let address = first.add_account(&secret(1)).unwrap();
        let err = second.add_account(&secret(1)).unwrap_err();
        assert!(matches!(err, WalletError::DuplicateKey(_)));
        assert_eq!(err.kind(), ErrorKind::Duplicate);

        assert_eq!(second.list_accounts().unwrap().len(), 1);
        let pk = first.get_public_key(&address, KeyRole::Tagging).unwrap();
        assert_eq!(second.locate_public_key_hash(&pk.hash()).unwrap().address, address);
    }

    #[test]
    fn test_import_rejects_keys_held_under_another_address() {
        let fast = KdfParams::insecure_fast();
        let salted = KeyVault::new(
            Arc::new(MemoryStore::new()),
            VaultConfig::default().with_salt([7u8; 32]).with_kdf(fast),
        );
        let salted_address = salted.add_account(&secret(19)).unwrap();
        let blob = salted.export_backup(&salted_address, b"pw").unwrap();

        let target = vault();
        let existing = target.add_account(&secret(19)).unwrap();
        assert_ne!(existing, salted_address);
        assert!(matches!(
            target.import_backup(&blob, b"pw"),
            Err(WalletError::DuplicateKey(_))
        ));
        assert!(!target.has_account(&salted_address).unwrap());
        assert!(target.store().keys_with_prefix(&salted_address.storage_prefix()).unwrap().is_empty());
    }

    #[test]
    fn test_import_uses_costs_recorded_in_backup() {
        let source = vault();
        let address = source.add_account(&secret(20)).unwrap();
        let blob = source.export_backup(&address, b"pw").unwrap();

        let target = KeyVault::new(Arc::new(MemoryStore::new()), VaultConfig::default());
        assert_eq!(target.config().kdf, KdfParams::default());
        assert_eq!(target.import_backup(&blob, b"pw").unwrap(), address);
        assert!(matches!(
            vault().import_backup(&blob, b"not-pw"),
            Err(WalletError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_stored_public_key_off_curve_is_corruption() {
        let vault = vault();
        let address = vault.add_account(&secret(21)).unwrap();
        let mut off_curve = [0u8; 32];
        off_curve[0] = 2;
        vault
            .store()
            .set(&address.storage_key(KeyRole::Signing.public_tag()), off_curve.to_vec())
            .unwrap();

        let err = vault.get_public_key(&address, KeyRole::Signing).unwrap_err();
        assert!(matches!(err, WalletError::CorruptRecord { .. }));
        assert!(err.is_fatal());
        assert!(matches!(
            vault.public_key_history(&address, KeyRole::Signing),
            Err(WalletError::CorruptRecord { .. })
        ));
    }

    #[test]
    fn test_export_unknown_account() {
        let vault = vault();
        assert!(matches!(
            vault.export_backup(&Address::from_bytes([1u8; 32]), b"pw"),
            Err(WalletError::AccountNotFound(_))
        ));
    }
}
