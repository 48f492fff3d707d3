//! Normalization and verification of raw MPC signatures
//!
//! The signing contract returns `(big_r, s, recovery_id)` where `big_r` is a
//! compressed SEC1 point. Every chain consumes `(r, s)` scalars instead, so
//! the first step after any signing round is normalization: strip the parity
//! prefix off `big_r`, keep its x-coordinate as `r`, and carry `s` and the
//! recovery id through unchanged.

use crate::{Error, MpcSignature, NormalizedSignature, Result};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};

/// Convert a raw MPC signature into the chain-agnostic `(r, s, v)` triple.
///
/// `big_r` must be exactly 33 bytes with a `02`/`03` parity prefix; anything
/// else is rejected rather than guessed at. The input is never mutated.
pub fn normalize(sig: &MpcSignature) -> Result<NormalizedSignature> {
    let big_r = strip_0x(&sig.big_r);
    let big_r_bytes = hex::decode(big_r)?;

    if big_r_bytes.len() != 33 {
        return Err(Error::InvalidSignatureLength {
            expected: 33,
            actual: big_r_bytes.len(),
        });
    }
    if big_r_bytes[0] != 0x02 && big_r_bytes[0] != 0x03 {
        return Err(Error::Encoding(format!(
            "big_r is not a compressed SEC1 point (prefix {:#04x})",
            big_r_bytes[0]
        )));
    }

    let s = strip_0x(&sig.s);
    let s_bytes = hex::decode(s)?;
    if s_bytes.len() > 32 {
        return Err(Error::InvalidSignatureLength {
            expected: 32,
            actual: s_bytes.len(),
        });
    }

    if sig.recovery_id > 3 {
        return Err(Error::Encoding(format!(
            "recovery id {} out of range",
            sig.recovery_id
        )));
    }

    Ok(NormalizedSignature::new(
        hex::encode(&big_r_bytes[1..]),
        hex::encode(&s_bytes),
        sig.recovery_id,
    ))
}

/// Check that a signature over `payload` recovers to `expected_public_key`.
///
/// Recover-and-compare catches both an invalid signature and a valid
/// signature paired with the wrong payload or key, which is exactly the
/// failure mode of a misindexed multi-input submission.
pub fn verify_recoverable(
    payload: &[u8; 32],
    signature: &NormalizedSignature,
    expected_public_key: &[u8],
) -> Result<bool> {
    let raw = signature.to_raw_bytes()?;
    let ecdsa_sig = EcdsaSignature::from_slice(&raw)
        .map_err(|e| Error::Encoding(format!("invalid (r, s) pair: {}", e)))?;
    let recovery_id = RecoveryId::from_byte(signature.v)
        .ok_or_else(|| Error::Encoding(format!("recovery id {} out of range", signature.v)))?;

    let recovered = match VerifyingKey::recover_from_prehash(payload, &ecdsa_sig, recovery_id) {
        Ok(key) => key,
        // Recovery failure means the signature does not fit the payload at
        // all; report "does not match" rather than a hard error.
        Err(_) => return Ok(false),
    };

    let expected = crate::kdf::compress_sec1(expected_public_key)?;
    let recovered_sec1 = recovered.to_sec1_bytes();

    Ok(recovered_sec1.as_ref() == expected)
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").unwrap_or(s)
}
