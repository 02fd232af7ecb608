//! Vault configuration.

use cloak_types::constants::KEY_SIZE;

/// Argon2id cost parameters for passphrase-derived keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub t_cost: u32,
    /// Memory cost in KiB.
    pub m_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// OWASP recommended minimums: 3 passes, 64 MiB, 4 lanes.
    fn default() -> Self {
        Self {
            t_cost: 3,
            m_cost: 65536,
            parallelism: 4,
        }
    }
}

impl KdfParams {
    /// Serialized width: three little-endian `u32`s.
    pub const ENCODED_LEN: usize = 12;

    /// Largest memory cost accepted from a file header (4 GiB).
    pub const MAX_M_COST: u32 = 1 << 22;

    /// Minimal costs. Only for tests and throwaway stores.
    pub fn insecure_fast() -> Self {
        Self {
            t_cost: 1,
            m_cost: 64,
            parallelism: 1,
        }
    }

    /// `t_cost || m_cost || parallelism`, each little-endian.
    pub fn to_bytes(&self) -> [u8; Self::ENCODED_LEN] {
        let mut out = [0u8; Self::ENCODED_LEN];
        out[0..4].copy_from_slice(&self.t_cost.to_le_bytes());
        out[4..8].copy_from_slice(&self.m_cost.to_le_bytes());
        out[8..12].copy_from_slice(&self.parallelism.to_le_bytes());
        out
    }

    /// Parse [`KdfParams::to_bytes`] output. `None` for a wrong length, a
    /// zero cost, or a memory cost above [`KdfParams::MAX_M_COST`].
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() != Self::ENCODED_LEN {
            return None;
        }
        let word = |i: usize| u32::from_le_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let params = Self {
            t_cost: word(0),
            m_cost: word(4),
            parallelism: word(8),
        };
        if params.t_cost == 0 || params.parallelism == 0 || params.m_cost == 0 || params.m_cost > Self::MAX_M_COST {
            return None;
        }
        Some(params)
    }
}

/// Settings for a [`crate::KeyVault`].
#[derive(Debug, Clone)]
pub struct VaultConfig {
    /// Salt mixed into every locally derived address.
    pub address_salt: [u8; KEY_SIZE],
    /// Fresh secrets drawn by `create_account` before giving up on collisions.
    pub max_create_attempts: u32,
    /// Costs for newly written backups. Reading uses the costs recorded in
    /// the backup itself.
    pub kdf: KdfParams,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address_salt: [0u8; KEY_SIZE],
            max_create_attempts: 8,
            kdf: KdfParams::default(),
        }
    }
}

impl VaultConfig {
    pub fn with_salt(mut self, salt: [u8; KEY_SIZE]) -> Self {
        self.address_salt = salt;
        self
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kdf_params_bytes() {
        let params = KdfParams::default();
        assert_eq!(KdfParams::from_bytes(&params.to_bytes()), Some(params));
        assert_eq!(
            KdfParams::from_bytes(&KdfParams::insecure_fast().to_bytes()),
            Some(KdfParams::insecure_fast())
        );
    }

    #[test]
    fn test_kdf_params_rejects_bad_encodings() {
        assert_eq!(KdfParams::from_bytes(&[1u8; 11]), None);

        let zero_passes = KdfParams { t_cost: 0, ..KdfParams::default() };
        assert_eq!(KdfParams::from_bytes(&zero_passes.to_bytes()), None);

        let huge = KdfParams {
            m_cost: KdfParams::MAX_M_COST + 1,
            ..KdfParams::default()
        };
        assert_eq!(KdfParams::from_bytes(&huge.to_bytes()), None);
    }
}
