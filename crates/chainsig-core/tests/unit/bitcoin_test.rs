//! Bitcoin PSBT building and multi-input signature assembly
//!
//! UTXOs and fee rates come in on the request, so building never touches the
//! network. The multi-input tests exercise the index-tagging contract:
//! signatures may arrive in any order, but each must belong to its index.

use crate::common::{test_path, test_signer};
use chainsig_core::chain::{BitcoinAdapter, BitcoinConfig};
use chainsig_core::{
    ChainAdapter, ChainType, DerivedKey, Error, IndexedSignature, TransferRequest, Utxo,
    DEFAULT_KEY_VERSION,
};

fn adapter() -> BitcoinAdapter {
    BitcoinAdapter::new(BitcoinConfig::testnet()).unwrap()
}

fn derived_key(adapter: &BitcoinAdapter, label: &str) -> DerivedKey {
    adapter
        .derive_address_and_public_key(&test_signer().root(), &test_path(label))
        .unwrap()
}

fn utxo(txid_byte: u8, vout: u32, value: u64) -> Utxo {
    Utxo {
        txid: hex::encode([txid_byte; 32]),
        vout,
        value,
    }
}

/// Two-input transfer: amount forces both UTXOs to be selected
fn two_input_request(from: &DerivedKey, to: &DerivedKey) -> TransferRequest {
    TransferRequest::new(ChainType::Bitcoin, &from.address, &to.address, "70000")
        .with_utxos(vec![utxo(1, 0, 50_000), utxo(2, 1, 40_000)])
        .with_fee_rate(1.0)
}

#[tokio::test]
async fn test_build_emits_one_payload_per_input() {
    let adapter = adapter();
    let key = derived_key(&adapter, "btc-0");
    let to = derived_key(&adapter, "btc-1");

    let unsigned = adapter
        .build_transaction(&two_input_request(&key, &to), &key)
        .await
        .unwrap();

    assert_eq!(unsigned.chain, ChainType::Bitcoin);
    assert_eq!(unsigned.payloads.len(), 2);
    assert_eq!(unsigned.payloads[0].index, 0);
    assert_eq!(unsigned.payloads[1].index, 1);
    // Per-input sighashes differ
    assert_ne!(unsigned.payloads[0].payload, unsigned.payloads[1].payload);
}

#[tokio::test]
async fn test_build_rejects_insufficient_funds() {
    let adapter = adapter();
    let key = derived_key(&adapter, "btc-0");
    let to = derived_key(&adapter, "btc-1");

    let request = TransferRequest::new(ChainType::Bitcoin, &key.address, &to.address, "100000")
        .with_utxos(vec![utxo(1, 0, 50_000)])
        .with_fee_rate(1.0);

    assert!(matches!(
        adapter.build_transaction(&request, &key).await,
        Err(Error::InsufficientFunds { .. })
    ));
}

#[tokio::test]
async fn test_assemble_accepts_permuted_signatures() {
    let adapter = adapter();
    let signer = test_signer();
    let path = test_path("btc-0");
    let key = derived_key(&adapter, "btc-0");
    let to = derived_key(&adapter, "btc-1");

    let unsigned = adapter
        .build_transaction(&two_input_request(&key, &to), &key)
        .await
        .unwrap();

    let mut signatures =
        chainsig_core::mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
            .await
            .unwrap();
    // Submit in reverse order; the index tags route them correctly
    signatures.reverse();

    let signed = adapter.add_signature(&unsigned, &key, &signatures).unwrap();
    assert_eq!(signed.chain, ChainType::Bitcoin);
    assert_eq!(signed.tx_hash.len(), 64);
    assert!(!signed.raw.is_empty());
}

#[tokio::test]
async fn test_assemble_rejects_swapped_indices() {
    let adapter = adapter();
    let signer = test_signer();
    let path = test_path("btc-0");
    let key = derived_key(&adapter, "btc-0");
    let to = derived_key(&adapter, "btc-1");

    let unsigned = adapter
        .build_transaction(&two_input_request(&key, &to), &key)
        .await
        .unwrap();

    let signatures =
        chainsig_core::mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
            .await
            .unwrap();

    // Same signatures, wrong tags: each now claims the other input
    let swapped = vec![
        IndexedSignature {
            index: 0,
            signature: signatures[1].signature.clone(),
        },
        IndexedSignature {
            index: 1,
            signature: signatures[0].signature.clone(),
        },
    ];

    assert!(matches!(
        adapter.add_signature(&unsigned, &key, &swapped),
        Err(Error::IndexMismatch { .. })
    ));
}

#[tokio::test]
async fn test_assemble_rejects_duplicate_index() {
    let adapter = adapter();
    let signer = test_signer();
    let path = test_path("btc-0");
    let key = derived_key(&adapter, "btc-0");
    let to = derived_key(&adapter, "btc-1");

    let unsigned = adapter
        .build_transaction(&two_input_request(&key, &to), &key)
        .await
        .unwrap();
    let signatures =
        chainsig_core::mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
            .await
            .unwrap();

    let duplicated = vec![signatures[0].clone(), signatures[0].clone()];

    assert!(matches!(
        adapter.add_signature(&unsigned, &key, &duplicated),
        Err(Error::IndexMismatch { index: 0, .. })
    ));
}

#[tokio::test]
async fn test_assemble_rejects_out_of_range_index() {
    let adapter = adapter();
    let signer = test_signer();
    let path = test_path("btc-0");
    let key = derived_key(&adapter, "btc-0");
    let to = derived_key(&adapter, "btc-1");

    let unsigned = adapter
        .build_transaction(&two_input_request(&key, &to), &key)
        .await
        .unwrap();
    let signatures =
        chainsig_core::mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
            .await
            .unwrap();

    let out_of_range = vec![
        signatures[0].clone(),
        IndexedSignature {
            index: 5,
            signature: signatures[1].signature.clone(),
        },
    ];

    assert!(matches!(
        adapter.add_signature(&unsigned, &key, &out_of_range),
        Err(Error::IndexMismatch { index: 5, .. })
    ));
}

#[tokio::test]
async fn test_assemble_requires_every_input_signed() {
    let adapter = adapter();
    let signer = test_signer();
    let path = test_path("btc-0");
    let key = derived_key(&adapter, "btc-0");
    let to = derived_key(&adapter, "btc-1");

    let unsigned = adapter
        .build_transaction(&two_input_request(&key, &to), &key)
        .await
        .unwrap();
    let signatures =
        chainsig_core::mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
            .await
            .unwrap();

    let partial = vec![signatures[1].clone()];

    assert!(matches!(
        adapter.add_signature(&unsigned, &key, &partial),
        Err(Error::IncompleteSignature { index: 0 })
    ));
}

#[tokio::test]
async fn test_compact_signature_is_64_bytes() {
    let adapter = adapter();
    let signer = test_signer();
    let path = test_path("btc-0");
    let key = derived_key(&adapter, "btc-0");
    let to = derived_key(&adapter, "btc-1");

    let unsigned = adapter
        .build_transaction(&two_input_request(&key, &to), &key)
        .await
        .unwrap();
    let signatures =
        chainsig_core::mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
            .await
            .unwrap();

    for indexed in &signatures {
        assert_eq!(indexed.signature.to_raw_bytes().unwrap().len(), 64);
    }
}
