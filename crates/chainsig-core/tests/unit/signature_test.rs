//! Signature normalization and collection against a local signer

use crate::common::{test_path, test_signer};
use chainsig_core::chain::{TxSummary, UnsignedTx};
use chainsig_core::{
    mpc, signature, ChainType, Error, MpcSigner, SigningPayload, DEFAULT_KEY_VERSION,
};

fn unsigned_with_payloads(payloads: Vec<SigningPayload>) -> UnsignedTx {
    UnsignedTx {
        chain: ChainType::Bitcoin,
        raw: vec![],
        payloads,
        summary: TxSummary {
            from: "from".to_string(),
            to: "to".to_string(),
            value: "1".to_string(),
            estimated_fee: "0.0001".to_string(),
        },
    }
}

#[tokio::test]
async fn test_signer_response_normalizes_and_verifies() {
    let signer = test_signer();
    let path = test_path("sig-0");
    let payload = [0x11u8; 32];

    let raw = signer
        .sign(&payload, &path, DEFAULT_KEY_VERSION)
        .await
        .unwrap();

    // The raw response carries a 33-byte compressed point
    assert_eq!(hex::decode(&raw.big_r).unwrap().len(), 33);

    let normalized = signature::normalize(&raw).unwrap();
    assert_eq!(normalized.to_raw_bytes().unwrap().len(), 64);

    // It verifies against the key derived for the same path, and only that
    let root = signer.root();
    let derived = chainsig_core::kdf::derive_public_key(&root, &path).unwrap();
    let public_key = chainsig_core::kdf::to_uncompressed(&derived);
    assert!(signature::verify_recoverable(&payload, &normalized, &public_key).unwrap());

    let other = chainsig_core::kdf::derive_public_key(&root, &test_path("sig-1")).unwrap();
    let other_key = chainsig_core::kdf::to_uncompressed(&other);
    assert!(!signature::verify_recoverable(&payload, &normalized, &other_key).unwrap());
}

#[tokio::test]
async fn test_collect_signatures_tags_by_index() {
    let signer = test_signer();
    let path = test_path("sig-2");

    let unsigned = unsigned_with_payloads(vec![
        SigningPayload {
            index: 0,
            payload: [0xaau8; 32],
        },
        SigningPayload {
            index: 1,
            payload: [0xbbu8; 32],
        },
    ]);

    let signatures = mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
        .await
        .unwrap();

    assert_eq!(signatures.len(), 2);
    assert_eq!(signatures[0].index, 0);
    assert_eq!(signatures[1].index, 1);

    // Distinct payloads produce distinct signatures
    assert_ne!(signatures[0].signature, signatures[1].signature);
}

#[tokio::test]
async fn test_collect_signatures_rejects_misordered_payloads() {
    let signer = test_signer();
    let path = test_path("sig-3");

    let unsigned = unsigned_with_payloads(vec![
        SigningPayload {
            index: 1,
            payload: [0xaau8; 32],
        },
        SigningPayload {
            index: 0,
            payload: [0xbbu8; 32],
        },
    ]);

    match mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION).await {
        Err(Error::IndexMismatch { index, .. }) => assert_eq!(index, 1),
        other => panic!("expected IndexMismatch, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_same_payload_same_path_gives_stable_signature() {
    // RFC 6979 nonces make the local signer deterministic, which keeps
    // assembled transactions reproducible in tests.
    let signer = test_signer();
    let path = test_path("sig-4");
    let payload = [0x77u8; 32];

    let a = signer
        .sign(&payload, &path, DEFAULT_KEY_VERSION)
        .await
        .unwrap();
    let b = signer
        .sign(&payload, &path, DEFAULT_KEY_VERSION)
        .await
        .unwrap();
    assert_eq!(a, b);
}
