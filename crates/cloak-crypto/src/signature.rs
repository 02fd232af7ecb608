//! Schnorr authorization signatures over Ed25519 points.
//!
//! sig = R || s where
//!   r = H_n("cloak signature nonce", key = x, msg)
//!   R = r·G
//!   c = H_n("cloak signature challenge", R || P || msg)
//!   s = r + c·x
//! and verification checks `s·G - c·P == R`.

use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::edwards::{CompressedEdwardsY, EdwardsPoint};
use curve25519_dalek::scalar::Scalar;

use cloak_types::constants::{KEY_SIZE, SIGNATURE_SIZE};

use crate::{hash_to_scalar, to32};

const DOMAIN_NONCE: &[u8] = b"cloak signature nonce";
const DOMAIN_CHALLENGE: &[u8] = b"cloak signature challenge";

fn challenge(r: &[u8; KEY_SIZE], public_key: &[u8; KEY_SIZE], message: &[u8]) -> Scalar {
    let mut data = Vec::with_capacity(2 * KEY_SIZE + message.len());
    data.extend_from_slice(r);
    data.extend_from_slice(public_key);
    data.extend_from_slice(message);
    hash_to_scalar(DOMAIN_CHALLENGE, None, &data)
}

/// Sign `message` with secret scalar `secret`.
pub fn sign(secret: &[u8; KEY_SIZE], message: &[u8]) -> [u8; SIGNATURE_SIZE] {
    let x = Scalar::from_bytes_mod_order(*secret);
    let public_key = (ED25519_BASEPOINT_TABLE * &x).compress().to_bytes();

    let r = hash_to_scalar(DOMAIN_NONCE, Some(secret), message);
    let big_r = (ED25519_BASEPOINT_TABLE * &r).compress().to_bytes();
    let c = challenge(&big_r, &public_key, message);
    let s = r + c * x;

    let mut sig = [0u8; SIGNATURE_SIZE];
    sig[..KEY_SIZE].copy_from_slice(&big_r);
    sig[KEY_SIZE..].copy_from_slice(&s.to_bytes());
    sig
}

/// Verify a signature produced by [`sign`].
pub fn verify(public_key: &[u8; KEY_SIZE], message: &[u8], signature: &[u8]) -> bool {
    if signature.len() != SIGNATURE_SIZE {
        return false;
    }
    let big_r_bytes = to32(&signature[..KEY_SIZE]);
    let s = match Option::<Scalar>::from(Scalar::from_canonical_bytes(to32(&signature[KEY_SIZE..]))) {
        Some(s) => s,
        None => return false,
    };
    let p = match CompressedEdwardsY(*public_key).decompress() {
        Some(p) => p,
        None => return false,
    };
    let big_r = match CompressedEdwardsY(big_r_bytes).decompress() {
        Some(r) => r,
        None => return false,
    };

    let c = challenge(&big_r_bytes, public_key, message);
    // s·G + (-c)·P
    let check = EdwardsPoint::vartime_double_scalar_mul_basepoint(&(-c), &p, &s);
    check == big_r
}
