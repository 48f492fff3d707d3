//! End-to-end signing flows
//!
//! Each flow runs the complete pipeline against the local signer:
//! derive key -> build transaction -> collect signatures -> assemble.
//! Requests carry all chain data explicitly so no network is involved.

use crate::common::{test_path, test_signer};
use chainsig_core::chain::{BitcoinAdapter, BitcoinConfig, CosmosAdapter, CosmosConfig};
use chainsig_core::store::{MemoryTransactionStore, TransactionStore};
use chainsig_core::{
    mpc, ChainAdapter, ChainType, EvmAdapter, EvmConfig, TransferRequest, Utxo,
    DEFAULT_KEY_VERSION,
};

#[tokio::test]
async fn test_evm_full_flow() {
    let signer = test_signer();
    let root = signer.root();
    let adapter = EvmAdapter::new(EvmConfig::ethereum_sepolia()).unwrap();
    let path = test_path("flow-evm");

    let key = adapter.derive_address_and_public_key(&root, &path).unwrap();

    let request = TransferRequest::new(
        ChainType::Evm,
        &key.address,
        "0x742d35cc6634c0532925a3b844bc9e7595f4e123",
        "0.25",
    )
    .with_nonce(3)
    .with_fees(25_000_000_000, 1_500_000_000)
    .with_gas_limit(21_000);

    let unsigned = adapter.build_transaction(&request, &key).await.unwrap();
    let signatures = mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
        .await
        .unwrap();
    let signed = adapter.add_signature(&unsigned, &key, &signatures).unwrap();

    assert_eq!(signed.chain, ChainType::Evm);
    assert!(signed.tx_hash.starts_with("0x"));
}

#[tokio::test]
async fn test_bitcoin_full_flow_multi_input() {
    let signer = test_signer();
    let root = signer.root();
    let adapter = BitcoinAdapter::new(BitcoinConfig::testnet()).unwrap();
    let path = test_path("flow-btc");

    let key = adapter.derive_address_and_public_key(&root, &path).unwrap();
    let recipient = adapter
        .derive_address_and_public_key(&root, &test_path("flow-btc-recipient"))
        .unwrap();

    let request = TransferRequest::new(
        ChainType::Bitcoin,
        &key.address,
        &recipient.address,
        "120000",
    )
    .with_utxos(vec![
        Utxo {
            txid: hex::encode([0xaau8; 32]),
            vout: 0,
            value: 80_000,
        },
        Utxo {
            txid: hex::encode([0xbbu8; 32]),
            vout: 1,
            value: 60_000,
        },
    ])
    .with_fee_rate(2.0);

    let unsigned = adapter.build_transaction(&request, &key).await.unwrap();
    assert_eq!(unsigned.payloads.len(), 2);

    let signatures = mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
        .await
        .unwrap();
    let signed = adapter.add_signature(&unsigned, &key, &signatures).unwrap();

    assert_eq!(signed.chain, ChainType::Bitcoin);
    assert_eq!(signed.tx_hash.len(), 64);
}

#[tokio::test]
async fn test_cosmos_full_flow() {
    let signer = test_signer();
    let root = signer.root();
    let adapter = CosmosAdapter::new(CosmosConfig::cosmoshub()).unwrap();
    let path = test_path("flow-atom");

    let key = adapter.derive_address_and_public_key(&root, &path).unwrap();
    let recipient = adapter
        .derive_address_and_public_key(&root, &test_path("flow-atom-recipient"))
        .unwrap();

    let request = TransferRequest::new(
        ChainType::Cosmos,
        &key.address,
        &recipient.address,
        "2.5",
    )
    .with_account(1042, 19)
    .with_memo("integration flow");

    let unsigned = adapter.build_transaction(&request, &key).await.unwrap();
    let signatures = mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION)
        .await
        .unwrap();
    let signed = adapter.add_signature(&unsigned, &key, &signatures).unwrap();

    assert_eq!(signed.chain, ChainType::Cosmos);
    assert_eq!(signed.tx_hash.len(), 64);
}

#[tokio::test]
async fn test_flow_survives_store_round_trip() {
    // Building and assembling can happen in different processes; the
    // unsigned transaction must survive serialization in between.
    let signer = test_signer();
    let root = signer.root();
    let adapter = EvmAdapter::new(EvmConfig::ethereum_sepolia()).unwrap();
    let path = test_path("flow-store");
    let key = adapter.derive_address_and_public_key(&root, &path).unwrap();

    let request = TransferRequest::new(
        ChainType::Evm,
        &key.address,
        "0x742d35cc6634c0532925a3b844bc9e7595f4e123",
        "0.1",
    )
    .with_nonce(1)
    .with_fees(30_000_000_000, 1_000_000_000)
    .with_gas_limit(21_000);

    let unsigned = adapter.build_transaction(&request, &key).await.unwrap();

    let store = MemoryTransactionStore::new();
    store.put(&request.request_id, &unsigned).await.unwrap();
    let restored = store.get(&request.request_id).await.unwrap();
    assert_eq!(restored.raw, unsigned.raw);

    let signatures = mpc::collect_signatures(&signer, &restored, &path, DEFAULT_KEY_VERSION)
        .await
        .unwrap();
    let signed = adapter.add_signature(&restored, &key, &signatures).unwrap();
    assert!(signed.tx_hash.starts_with("0x"));

    store.remove(&request.request_id).await.unwrap();
    assert!(!store.exists(&request.request_id).await.unwrap());
}

#[tokio::test]
async fn test_same_path_same_key_across_chains() {
    let signer = test_signer();
    let root = signer.root();
    let path = test_path("flow-shared");

    let evm = EvmAdapter::new(EvmConfig::ethereum_sepolia()).unwrap();
    let btc = BitcoinAdapter::new(BitcoinConfig::testnet()).unwrap();

    let evm_key = evm.derive_address_and_public_key(&root, &path).unwrap();
    let btc_key = btc.derive_address_and_public_key(&root, &path).unwrap();

    assert_eq!(evm_key.public_key, btc_key.public_key);
}
