//! Master key hierarchy: single-call derivation.
//!
//! Every master secret is `H_n(role domain, key = account secret)`:
//!   nullifier        = H_n("cloak nullifier master key", s)
//!   incoming viewing = H_n("cloak incoming viewing master key", s)
//!   outgoing viewing = H_n("cloak outgoing viewing master key", s)
//!   tagging          = H_n("cloak tagging master key", s)
//!   signing          = H_n("cloak signing key", s)
//! and each public key is `k·G`.

use cloak_types::constants::KEY_SIZE;
use cloak_types::KeyRole;

use crate::{derive_public_key, hash_to_scalar};

/// The five master secrets derived from one account secret.
#[derive(Clone, PartialEq, Eq)]
pub struct MasterSecrets {
    pub nullifier: [u8; KEY_SIZE],
    pub incoming_viewing: [u8; KEY_SIZE],
    pub outgoing_viewing: [u8; KEY_SIZE],
    pub tagging: [u8; KEY_SIZE],
    pub signing: [u8; KEY_SIZE],
}

/// One public key per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublicKeySet {
    pub nullifier: [u8; KEY_SIZE],
    pub incoming_viewing: [u8; KEY_SIZE],
    pub outgoing_viewing: [u8; KEY_SIZE],
    pub tagging: [u8; KEY_SIZE],
    pub signing: [u8; KEY_SIZE],
}

impl MasterSecrets {
    pub fn get(&self, role: KeyRole) -> &[u8; KEY_SIZE] {
        match role {
            KeyRole::Nullifier => &self.nullifier,
            KeyRole::IncomingViewing => &self.incoming_viewing,
            KeyRole::OutgoingViewing => &self.outgoing_viewing,
            KeyRole::Tagging => &self.tagging,
            KeyRole::Signing => &self.signing,
        }
    }

    pub fn public_keys(&self) -> PublicKeySet {
        PublicKeySet {
            nullifier: derive_public_key(&self.nullifier),
            incoming_viewing: derive_public_key(&self.incoming_viewing),
            outgoing_viewing: derive_public_key(&self.outgoing_viewing),
            tagging: derive_public_key(&self.tagging),
            signing: derive_public_key(&self.signing),
        }
    }

    /// Overwrite every secret with zeros.
    pub fn wipe(&mut self) {
        for key in [
            &mut self.nullifier,
            &mut self.incoming_viewing,
            &mut self.outgoing_viewing,
            &mut self.tagging,
            &mut self.signing,
        ] {
            key.iter_mut().for_each(|b| *b = 0);
        }
    }
}

impl std::fmt::Debug for MasterSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecrets").field("value", &"[REDACTED]").finish()
    }
}

impl PublicKeySet {
    pub fn get(&self, role: KeyRole) -> &[u8; KEY_SIZE] {
        match role {
            KeyRole::Nullifier => &self.nullifier,
            KeyRole::IncomingViewing => &self.incoming_viewing,
            KeyRole::OutgoingViewing => &self.outgoing_viewing,
            KeyRole::Tagging => &self.tagging,
            KeyRole::Signing => &self.signing,
        }
    }
}

fn derive_role_secret(role: KeyRole, secret: &[u8; KEY_SIZE]) -> [u8; KEY_SIZE] {
    hash_to_scalar(role.derivation_domain(), Some(secret), &[]).to_bytes()
}

/// Derive all five master secrets from an account secret.
pub fn derive_master_keys(secret: &[u8; KEY_SIZE]) -> MasterSecrets {
    MasterSecrets {
        nullifier: derive_role_secret(KeyRole::Nullifier, secret),
        incoming_viewing: derive_role_secret(KeyRole::IncomingViewing, secret),
        outgoing_viewing: derive_role_secret(KeyRole::OutgoingViewing, secret),
        tagging: derive_role_secret(KeyRole::Tagging, secret),
        signing: derive_role_secret(KeyRole::Signing, secret),
    }
}
