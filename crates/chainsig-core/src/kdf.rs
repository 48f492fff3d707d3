//! Deterministic key derivation from the MPC network root key
//!
//! The network exposes a single secp256k1 custody key per key version. Every
//! caller-visible key is that root point plus a scalar offset ("epsilon")
//! hashed from the derivation path, so the full key tree is recomputable
//! from public data and no derived key ever needs to be stored.

use crate::{DerivationPath, Error, Result, RootPublicKey};
use k256::{
    elliptic_curve::{
        bigint::U256,
        ops::Reduce,
        point::AffineCoordinates,
        sec1::{FromEncodedPoint, ToEncodedPoint},
        Group,
    },
    AffinePoint, EncodedPoint, ProjectivePoint, Scalar, SecretKey,
};
use sha3::{Digest, Sha3_256};

/// Domain-separation prefix fixed by the signing network's published
/// derivation scheme. Changing it breaks address compatibility with keys
/// already derived on the network.
const EPSILON_DERIVATION_PREFIX: &str = "near-mpc-recovery v0.1.0 epsilon derivation:";

/// Hash a derivation path into a scalar offset.
///
/// `','` terminates the predecessor account id, mirroring the trie-key
/// separator the network uses on its side of the derivation. Deterministic:
/// the same path always produces the same scalar.
pub fn derive_epsilon(path: &DerivationPath) -> Scalar {
    let input = format!(
        "{EPSILON_DERIVATION_PREFIX}{},{}",
        path.predecessor, path.path
    );
    let mut hasher = Sha3_256::new();
    hasher.update(input);
    let hash: [u8; 32] = hasher.finalize().into();
    <Scalar as Reduce<U256>>::reduce_bytes(&hash.into())
}

/// Derive the public key for a path: `G * epsilon + root`.
///
/// Rejects a degenerate result (the identity element) instead of handing a
/// non-key back to the caller.
pub fn derive_public_key(root: &RootPublicKey, path: &DerivationPath) -> Result<ProjectivePoint> {
    let root_point = root.to_point().map_err(|e| Error::Derivation {
        path: path.to_string(),
        reason: e.to_string(),
    })?;

    let epsilon = derive_epsilon(path);
    let derived = ProjectivePoint::GENERATOR * epsilon + root_point;

    if bool::from(derived.is_identity()) {
        return Err(Error::Derivation {
            path: path.to_string(),
            reason: "derived key is the identity point".to_string(),
        });
    }

    Ok(derived)
}

/// Derive the secret counterpart of [`derive_public_key`].
///
/// Only holders of the root secret can call this; the adapters never do.
/// It exists for local signers standing in for the network in tests and
/// tooling.
pub fn derive_secret_key(root_secret: &SecretKey, path: &DerivationPath) -> SecretKey {
    let epsilon = derive_epsilon(path);
    SecretKey::new((epsilon + root_secret.to_nonzero_scalar().as_ref()).into())
}

/// Uncompressed SEC1 encoding of a point (65 bytes, `04` prefix)
pub fn to_uncompressed(point: &ProjectivePoint) -> Vec<u8> {
    point.to_affine().to_encoded_point(false).as_bytes().to_vec()
}

/// Compressed SEC1 encoding of a point (33 bytes, `02`/`03` prefix)
pub fn to_compressed(point: &ProjectivePoint) -> [u8; 33] {
    let encoded = point.to_affine().to_encoded_point(true);
    let mut out = [0u8; 33];
    out.copy_from_slice(encoded.as_bytes());
    out
}

/// Convert any SEC1 public key encoding to its 33-byte compressed form
pub fn compress_sec1(bytes: &[u8]) -> Result<[u8; 33]> {
    let point = parse_sec1(bytes)?;
    Ok(to_compressed(&point))
}

/// Convert any SEC1 public key encoding to its 65-byte uncompressed form
pub fn decompress_sec1(bytes: &[u8]) -> Result<Vec<u8>> {
    let point = parse_sec1(bytes)?;
    Ok(to_uncompressed(&point))
}

fn parse_sec1(bytes: &[u8]) -> Result<ProjectivePoint> {
    let encoded = EncodedPoint::from_bytes(bytes)
        .map_err(|e| Error::Encoding(format!("invalid SEC1 public key: {}", e)))?;
    let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
    let affine =
        affine.ok_or_else(|| Error::Encoding("bytes do not encode a curve point".to_string()))?;
    Ok(ProjectivePoint::from(affine))
}

/// X-coordinate of an affine point, reduced into the scalar field
pub fn x_coordinate(point: &AffinePoint) -> Scalar {
    <Scalar as Reduce<U256>>::reduce_bytes(&point.x())
}
