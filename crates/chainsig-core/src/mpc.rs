//! MPC signer abstraction
//!
//! The adapters never hold key material; every signature comes from an
//! external threshold-signing network reached through [`MpcSigner`]. The
//! trait is the seam where a production contract client, a relayer, or a
//! local test signer plugs in.

use crate::chain::UnsignedTx;
use crate::{DerivationPath, Error, IndexedSignature, MpcSignature, Result, RootPublicKey};
use async_trait::async_trait;

/// A service that signs 32-byte payloads under keys derived from its root key
#[async_trait]
pub trait MpcSigner: Send + Sync {
    /// Fetch the network's root public key for the key version this signer
    /// serves
    async fn root_public_key(&self) -> Result<RootPublicKey>;

    /// Request a signature over `payload` with the key at `path`
    async fn sign(
        &self,
        payload: &[u8; 32],
        path: &DerivationPath,
        key_version: u32,
    ) -> Result<MpcSignature>;
}

/// Obtain one signature per signing payload of an unsigned transaction.
///
/// Payloads are signed one at a time in index order and each response is
/// normalized and tagged with the payload's index, so the result can be
/// handed straight to [`ChainAdapter::add_signature`] without any
/// re-matching.
///
/// [`ChainAdapter::add_signature`]: crate::chain::ChainAdapter::add_signature
pub async fn collect_signatures<S: MpcSigner + ?Sized>(
    signer: &S,
    unsigned: &UnsignedTx,
    path: &DerivationPath,
    key_version: u32,
) -> Result<Vec<IndexedSignature>> {
    let mut signatures = Vec::with_capacity(unsigned.payloads.len());

    for (position, signing_payload) in unsigned.payloads.iter().enumerate() {
        // Payload order and indices must agree before anything is signed.
        if signing_payload.index as usize != position {
            return Err(Error::IndexMismatch {
                index: signing_payload.index,
                reason: format!("payload at position {} carries this index", position),
            });
        }

        tracing::debug!(
            index = signing_payload.index,
            path = %path,
            "requesting MPC signature"
        );
        let raw = signer
            .sign(&signing_payload.payload, path, key_version)
            .await?;

        signatures.push(IndexedSignature {
            index: signing_payload.index,
            signature: crate::signature::normalize(&raw)?,
        });
    }

    Ok(signatures)
}
