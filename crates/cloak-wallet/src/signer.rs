//! Signing authority behind the current account.
//!
//! Local accounts sign with the vault's signing key. External accounts
//! delegate to a session wallet supplied by the host.

use std::fmt;
use std::sync::Arc;

use cloak_types::Address;

use crate::directory::Provenance;
use crate::error::WalletError;
use crate::keys::{PublicKey, SecretKey};

/// Proof that the holder of `public_key` approved an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub address: Address,
    pub public_key: PublicKey,
    pub signature: Vec<u8>,
}

impl Authorization {
    /// Check the signature over `intent`.
    pub fn verify(&self, intent: &[u8]) -> bool {
        cloak_crypto::verify(self.public_key.as_bytes(), intent, &self.signature)
    }
}

/// Acknowledgement of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: String,
}

/// A delegated wallet living outside the vault, e.g. a paired browser session.
pub trait ExternalWallet: Send + Sync {
    fn address(&self) -> Address;

    fn authorize(&self, intent: &[u8]) -> Result<Authorization, WalletError>;

    fn submit(&self, tx: &[u8]) -> Result<Receipt, WalletError>;
}

/// Signer backed by a vault-held signing key.
pub struct LocalSigner {
    address: Address,
    secret: SecretKey,
    public_key: PublicKey,
}

impl LocalSigner {
    pub fn new(address: Address, secret: SecretKey) -> Self {
        let public_key = PublicKey::from_bytes(cloak_crypto::derive_public_key(secret.expose_secret()));
        Self {
            address,
            secret,
            public_key,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn public_key(&self) -> PublicKey {
        self.public_key
    }

    pub fn authorize(&self, intent: &[u8]) -> Authorization {
        let signature = cloak_crypto::sign(self.secret.expose_secret(), intent);
        Authorization {
            address: self.address,
            public_key: self.public_key,
            signature: signature.to_vec(),
        }
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

pub enum SignerHandle {
    Local(LocalSigner),
    External(Arc<dyn ExternalWallet>),
}

impl SignerHandle {
    pub fn address(&self) -> Address {
        match self {
            SignerHandle::Local(signer) => signer.address(),
            SignerHandle::External(wallet) => wallet.address(),
        }
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            SignerHandle::Local(_) => Provenance::Local,
            SignerHandle::External(_) => Provenance::External,
        }
    }

    pub fn authorize(&self, intent: &[u8]) -> Result<Authorization, WalletError> {
        match self {
            SignerHandle::Local(signer) => Ok(signer.authorize(intent)),
            SignerHandle::External(wallet) => wallet.authorize(intent),
        }
    }
}

impl fmt::Debug for SignerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignerHandle::Local(signer) => f.debug_tuple("Local").field(signer).finish(),
            SignerHandle::External(wallet) => f.debug_tuple("External").field(&wallet.address()).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoWallet(Address);

    impl ExternalWallet for EchoWallet {
        fn address(&self) -> Address {
            self.0
        }

        fn authorize(&self, _intent: &[u8]) -> Result<Authorization, WalletError> {
            Err(WalletError::External("user rejected".into()))
        }

        fn submit(&self, tx: &[u8]) -> Result<Receipt, WalletError> {
            Ok(Receipt {
                tx_hash: hex::encode(cloak_crypto::keccak256(tx)),
            })
        }
    }

    #[test]
    fn test_local_authorization_verifies() {
        let secret = SecretKey::from_bytes(cloak_crypto::sc_reduce32(&[0x44; 32]));
        let signer = LocalSigner::new(Address::from_bytes([1u8; 32]), secret);
        let auth = signer.authorize(b"transfer 10");
        assert!(auth.verify(b"transfer 10"));
        assert!(!auth.verify(b"transfer 11"));
        assert_eq!(auth.public_key, signer.public_key());
    }

    #[test]
    fn test_handle_dispatch() {
        let local = SignerHandle::Local(LocalSigner::new(
            Address::from_bytes([1u8; 32]),
            SecretKey::from_bytes(cloak_crypto::sc_reduce32(&[0x45; 32])),
        ));
        assert_eq!(local.provenance(), Provenance::Local);
        assert!(local.authorize(b"x").unwrap().verify(b"x"));

        let wallet = Arc::new(EchoWallet(Address::from_bytes([2u8; 32])));
        let external = SignerHandle::External(wallet.clone());
        assert_eq!(external.provenance(), Provenance::External);
        assert_eq!(external.address(), Address::from_bytes([2u8; 32]));
        assert!(matches!(external.authorize(b"x"), Err(WalletError::External(_))));
        assert_eq!(wallet.submit(b"tx").unwrap().tx_hash.len(), 64);
    }

    #[test]
    fn test_debug_hides_secret() {
        let signer = LocalSigner::new(Address::from_bytes([1u8; 32]), SecretKey::from_bytes([0x46; 32]));
        assert!(!format!("{:?}", signer).contains(&hex::encode([0x46u8; 32])));
    }
}
