//! Backup and value encryption.
//!
//! Account backups use Argon2id key derivation + AES-256-GCM in a
//! self-contained format carrying everything needed for decryption except
//! the password, including the Argon2 costs they were written with. Store values are sealed under a key derived once per store,
//! with the storage key bound in as associated data so sealed values cannot
//! be swapped between entries.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use rand::RngCore;
use zeroize::Zeroize;

use crate::config::KdfParams;
use crate::error::WalletError;

/// Magic bytes identifying a cloak account backup.
const MAGIC: &[u8; 4] = b"CLKB";

/// Current backup format version.
const VERSION: u8 = 2;

const KDF_OFFSET: usize = 5;
const SALT_OFFSET: usize = KDF_OFFSET + KdfParams::ENCODED_LEN;
const NONCE_OFFSET: usize = SALT_OFFSET + 32;

/// Header size: 4 (magic) + 1 (version) + 12 (kdf costs) + 32 (salt) + 12 (nonce) = 61 bytes.
const HEADER_SIZE: usize = NONCE_OFFSET + NONCE_SIZE;

const NONCE_SIZE: usize = 12;

const ARGON2_DK_LEN: u32 = 32;

/// Derive a 32-byte AES key from a password.
pub fn derive_key(password: &[u8], salt: &[u8], kdf: &KdfParams) -> Result<[u8; 32], WalletError> {
    let mut hash = cloak_crypto::argon2id_hash(
        password,
        salt,
        kdf.t_cost,
        kdf.m_cost,
        kdf.parallelism,
        ARGON2_DK_LEN,
    )
    .map_err(|e| WalletError::Encryption(e.to_string()))?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&hash[..32]);
    hash.zeroize();
    Ok(key)
}

/// Encrypt backup data with a password.
///
/// Returns the complete backup contents (header + ciphertext).
#[allow(deprecated)] // aes-gcm 0.10 uses generic-array 0.x
pub fn encrypt_backup(plaintext: &[u8], password: &[u8], kdf: &KdfParams) -> Result<Vec<u8>, WalletError> {
    let mut rng = rand::thread_rng();

    let mut salt = [0u8; 32];
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut nonce_bytes);

    let mut key_bytes = derive_key(password, &salt, kdf)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    key_bytes.zeroize();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| WalletError::Encryption(e.to_string()))?;

    let mut output = Vec::with_capacity(HEADER_SIZE + ciphertext.len());
    output.extend_from_slice(MAGIC);
    output.push(VERSION);
    output.extend_from_slice(&kdf.to_bytes());
    output.extend_from_slice(&salt);
    output.extend_from_slice(&nonce_bytes);
    output.extend_from_slice(&ciphertext);
    Ok(output)
}

/// Check if data looks like an encrypted backup (has CLKB magic).
pub fn is_encrypted_backup(data: &[u8]) -> bool {
    data.len() >= HEADER_SIZE && &data[0..4] == MAGIC
}

/// Decrypt a backup with a password, using the costs in its header.
#[allow(deprecated)] // aes-gcm 0.10 uses generic-array 0.x
pub fn decrypt_backup(encrypted: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    if encrypted.len() < HEADER_SIZE {
        return Err(WalletError::InvalidFile("file too short".into()));
    }
    if &encrypted[0..4] != MAGIC {
        return Err(WalletError::InvalidFile("invalid magic bytes".into()));
    }
    let version = encrypted[4];
    if version != VERSION {
        return Err(WalletError::InvalidFile(format!("unsupported version: {}", version)));
    }

    let kdf = KdfParams::from_bytes(&encrypted[KDF_OFFSET..SALT_OFFSET])
        .ok_or_else(|| WalletError::InvalidFile("invalid key derivation costs".into()))?;
    let salt = &encrypted[SALT_OFFSET..NONCE_OFFSET];
    let nonce_bytes = &encrypted[NONCE_OFFSET..HEADER_SIZE];
    let ciphertext = &encrypted[HEADER_SIZE..];
    if ciphertext.is_empty() {
        return Err(WalletError::InvalidFile("no ciphertext".into()));
    }

    let mut key_bytes = derive_key(password, salt, &kdf)?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
    key_bytes.zeroize();
    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| WalletError::DecryptionFailed)
}

/// AES-256-GCM sealing of individual store values.
///
/// Sealed layout: `nonce (12) || ciphertext+tag`.
pub struct ValueSealer {
    cipher: Aes256Gcm,
}

impl ValueSealer {
    #[allow(deprecated)] // aes-gcm 0.10 uses generic-array 0.x
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    #[allow(deprecated)]
    pub fn seal(&self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: plaintext, aad })
            .map_err(|e| e.to_string())?;
        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    #[allow(deprecated)]
    pub fn open(&self, aad: &[u8], sealed: &[u8]) -> Result<Vec<u8>, String> {
        if sealed.len() < NONCE_SIZE {
            return Err("sealed value too short".into());
        }
        let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), Payload { msg: ciphertext, aad })
            .map_err(|_| "authentication failed".to_string())
    }
}
