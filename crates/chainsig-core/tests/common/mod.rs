//! Shared test fixtures
//!
//! `LocalMpcSigner` stands in for the threshold-signing network: it holds the
//! root secret directly and answers sign requests with the same response
//! shape the real network produces, including the compressed `big_r` point.

use async_trait::async_trait;
use chainsig_core::{
    kdf, DerivationPath, Error, MpcSigner, MpcSignature, Result, RootPublicKey,
};
use k256::ecdsa::SigningKey;
use k256::{ProjectivePoint, SecretKey};

pub struct LocalMpcSigner {
    root_secret: SecretKey,
}

impl LocalMpcSigner {
    pub fn new(seed: [u8; 32]) -> Self {
        let root_secret = SecretKey::from_slice(&seed).expect("valid test seed");
        Self { root_secret }
    }

    pub fn root(&self) -> RootPublicKey {
        let point =
            ProjectivePoint::GENERATOR * *self.root_secret.to_nonzero_scalar().as_ref();
        RootPublicKey::from_sec1_bytes(&kdf::to_uncompressed(&point)).expect("valid root key")
    }
}

#[async_trait]
impl MpcSigner for LocalMpcSigner {
    async fn root_public_key(&self) -> Result<RootPublicKey> {
        Ok(self.root())
    }

    async fn sign(
        &self,
        payload: &[u8; 32],
        path: &DerivationPath,
        _key_version: u32,
    ) -> Result<MpcSignature> {
        let derived = kdf::derive_secret_key(&self.root_secret, path);
        let signing_key = SigningKey::from(&derived);

        let (sig, recid) = signing_key
            .sign_prehash_recoverable(payload)
            .map_err(|e| Error::Upstream(e.to_string()))?;

        let r_bytes: [u8; 32] = sig.r().to_bytes().into();
        let s_bytes: [u8; 32] = sig.s().to_bytes().into();

        // Compressed R point: parity prefix from the recovery id, then r
        let mut big_r = vec![0x02 | (recid.to_byte() & 1)];
        big_r.extend_from_slice(&r_bytes);

        Ok(MpcSignature {
            big_r: hex::encode(big_r),
            s: hex::encode(s_bytes),
            recovery_id: recid.to_byte(),
        })
    }
}

/// Signer with a fixed seed so derived addresses are stable across tests
pub fn test_signer() -> LocalMpcSigner {
    LocalMpcSigner::new([0x42u8; 32])
}

pub fn test_path(label: &str) -> DerivationPath {
    DerivationPath::new("alice.near", label)
}
