//! Key derivation through the chain adapters
//!
//! The same `(root, path)` pair must land on the same key everywhere, and
//! each adapter renders that key as its own chain-native address.

use crate::common::{test_path, test_signer};
use chainsig_core::chain::{BitcoinAdapter, BitcoinConfig, CosmosAdapter, CosmosConfig};
use chainsig_core::{ChainAdapter, EvmAdapter, EvmConfig};

#[test]
fn test_evm_derivation_is_deterministic() {
    let root = test_signer().root();
    let adapter = EvmAdapter::new(EvmConfig::ethereum_sepolia()).unwrap();
    let path = test_path("evm-0");

    let first = adapter.derive_address_and_public_key(&root, &path).unwrap();
    let second = adapter.derive_address_and_public_key(&root, &path).unwrap();

    assert_eq!(first, second);
    assert!(first.address.starts_with("0x"));
    assert_eq!(first.address.len(), 42);
}

#[test]
fn test_distinct_paths_yield_distinct_addresses() {
    let root = test_signer().root();
    let adapter = EvmAdapter::new(EvmConfig::ethereum_sepolia()).unwrap();

    let a = adapter
        .derive_address_and_public_key(&root, &test_path("evm-0"))
        .unwrap();
    let b = adapter
        .derive_address_and_public_key(&root, &test_path("evm-1"))
        .unwrap();

    assert_ne!(a.address, b.address);
    assert_ne!(a.public_key, b.public_key);
}

#[test]
fn test_adapters_agree_on_public_key() {
    let root = test_signer().root();
    let path = test_path("shared-0");

    let evm = EvmAdapter::new(EvmConfig::ethereum_sepolia()).unwrap();
    let btc = BitcoinAdapter::new(BitcoinConfig::testnet()).unwrap();
    let cosmos = CosmosAdapter::new(CosmosConfig::cosmoshub()).unwrap();

    let evm_key = evm.derive_address_and_public_key(&root, &path).unwrap();
    let btc_key = btc.derive_address_and_public_key(&root, &path).unwrap();
    let cosmos_key = cosmos.derive_address_and_public_key(&root, &path).unwrap();

    // One key, three address encodings
    assert_eq!(evm_key.public_key, btc_key.public_key);
    assert_eq!(evm_key.public_key, cosmos_key.public_key);
    assert_ne!(evm_key.address, btc_key.address);
    assert_ne!(btc_key.address, cosmos_key.address);
}

#[test]
fn test_public_key_encodings() {
    let root = test_signer().root();
    let adapter = BitcoinAdapter::new(BitcoinConfig::mainnet()).unwrap();
    let key = adapter
        .derive_address_and_public_key(&root, &test_path("btc-0"))
        .unwrap();

    // Uncompressed SEC1
    assert_eq!(key.public_key.len(), 65);
    assert_eq!(key.public_key[0], 0x04);

    // Compressed SEC1
    let compressed = key.compressed_public_key().unwrap();
    assert_eq!(compressed.len(), 33);
    assert!(compressed[0] == 0x02 || compressed[0] == 0x03);
}

#[test]
fn test_chain_native_address_formats() {
    let root = test_signer().root();
    let path = test_path("fmt-0");

    let btc = BitcoinAdapter::new(BitcoinConfig::mainnet()).unwrap();
    let btc_key = btc.derive_address_and_public_key(&root, &path).unwrap();
    assert!(btc_key.address.starts_with("bc1q"));

    let btc_testnet = BitcoinAdapter::new(BitcoinConfig::testnet()).unwrap();
    let testnet_key = btc_testnet
        .derive_address_and_public_key(&root, &path)
        .unwrap();
    assert!(testnet_key.address.starts_with("tb1q"));

    let cosmos = CosmosAdapter::new(CosmosConfig::cosmoshub()).unwrap();
    let cosmos_key = cosmos.derive_address_and_public_key(&root, &path).unwrap();
    assert!(cosmos_key.address.starts_with("cosmos1"));
}
