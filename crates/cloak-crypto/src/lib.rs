//! Crypto primitives for the cloak key vault.
//!
//! Scalars are little-endian 32-byte values reduced mod ℓ, points are
//! compressed Edwards-Y encodings on Ed25519. Everything here is pure and
//! deterministic except where a caller supplies randomness.

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::CompressedEdwardsY;
use curve25519_dalek::scalar::Scalar;
use tiny_keccak::{Hasher, Keccak};

use cloak_types::constants::{DOMAIN_ADDRESS, DOMAIN_PUBLIC_KEY_HASH, KEY_SIZE};

pub mod master_keys;
pub mod signature;

pub use master_keys::{derive_master_keys, MasterSecrets, PublicKeySet};
pub use signature::{sign, verify};

// ─── Hashing ────────────────────────────────────────────────────────────────

/// Keccak-256 (original padding, not SHA3).
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut keccak = Keccak::v256();
    let mut output = [0u8; 32];
    keccak.update(data);
    keccak.finalize(&mut output);
    output
}

/// Keccak-256 over several parts without an intermediate buffer.
fn keccak256_parts(parts: &[&[u8]]) -> [u8; 32] {
    let mut keccak = Keccak::v256();
    for part in parts {
        keccak.update(part);
    }
    let mut output = [0u8; 32];
    keccak.finalize(&mut output);
    output
}

/// Build `[domain_len_byte] + domain + data`.
fn build_transcript(domain: &[u8], data: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + domain.len() + data.len());
    buf.push(domain.len() as u8);
    buf.extend_from_slice(domain);
    buf.extend_from_slice(data);
    buf
}

/// H_n: blake2b-512 over the domain transcript, keyed with `key` when given,
/// then reduced to a scalar.
pub(crate) fn hash_to_scalar(domain: &[u8], key: Option<&[u8]>, data: &[u8]) -> Scalar {
    let transcript = build_transcript(domain, data);
    let mut params = blake2b_simd::Params::new();
    params.hash_length(64);
    if let Some(key) = key {
        params.key(key);
    }
    let hash = params.hash(&transcript);
    let mut wide = [0u8; 64];
    wide.copy_from_slice(hash.as_bytes());
    Scalar::from_bytes_mod_order_wide(&wide)
}

// ─── Helpers ────────────────────────────────────────────────────────────────

pub(crate) fn to32(s: &[u8]) -> [u8; 32] {
    let mut buf = [0u8; 32];
    let len = s.len().min(32);
    buf[..len].copy_from_slice(&s[..len]);
    buf
}

// ─── Scalar Operations (mod ℓ) ──────────────────────────────────────────────

/// Reduce 64 uniformly random bytes to a scalar.
pub fn reduce_wide(bytes: &[u8; 64]) -> [u8; KEY_SIZE] {
    Scalar::from_bytes_mod_order_wide(bytes).to_bytes()
}

pub fn sc_reduce32(s: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    Scalar::from_bytes_mod_order(*s).to_bytes()
}

/// True when `s` is a canonical scalar encoding.
pub fn sc_check(s: &[u8; KEY_SIZE]) -> bool {
    bool::from(Scalar::from_canonical_bytes(*s).is_some())
}

pub fn sc_is_zero(s: &[u8; KEY_SIZE]) -> bool {
    Scalar::from_bytes_mod_order(*s) == Scalar::ZERO
}

// ─── Point Operations ───────────────────────────────────────────────────────

/// Public key for a secret scalar: `s·G`.
pub fn derive_public_key(secret: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    let scalar = Scalar::from_bytes_mod_order(*secret);
    (ED25519_BASEPOINT_TABLE * &scalar).compress().to_bytes()
}

/// True when `p` decompresses to a curve point.
pub fn is_valid_point(p: &[u8; KEY_SIZE]) -> bool {
    CompressedEdwardsY(*p).decompress().is_some()
}

// ─── Protocol Derivations ───────────────────────────────────────────────────

/// Reverse-lookup index value of a public key.
pub fn hash_public_key(public_key: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    keccak256_parts(&[DOMAIN_PUBLIC_KEY_HASH, public_key])
}

/// Protocol address of an account: `keccak(domain || Npk || Ivpk || Ovpk || Tpk || Spk || salt)`.
pub fn compute_address(keys: &PublicKeySet, salt: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    keccak256_parts(&[
        DOMAIN_ADDRESS,
        &keys.nullifier,
        &keys.incoming_viewing,
        &keys.outgoing_viewing,
        &keys.tagging,
        &keys.signing,
        salt,
    ])
}

/// Secret bound to one target context: `H_n(domain, key = master, context)`.
///
/// Proves ownership of `master` to the holder of `context` without
/// revealing it.
pub fn siloed_secret(
    master_secret: &[u8; KEY_SIZE],
    context: &[u8; KEY_SIZE],
    domain: &[u8],
) -> [u8; KEY_SIZE] {
    hash_to_scalar(domain, Some(master_secret), context).to_bytes()
}

// ─── Password KDF ───────────────────────────────────────────────────────────

/// Argon2id (v0x13) password hash with explicit cost parameters.
pub fn argon2id_hash(
    password: &[u8],
    salt: &[u8],
    t_cost: u32,
    m_cost: u32,
    parallelism: u32,
    dk_len: u32,
) -> Result<Vec<u8>, argon2::Error> {
    let params = argon2::Params::new(m_cost, t_cost, parallelism, Some(dk_len as usize))?;
    let argon = argon2::Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);
    let mut out = vec![0u8; dk_len as usize];
    argon.hash_password_into(password, salt, &mut out)?;
    Ok(out)
}
