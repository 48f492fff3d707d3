//! # Chainsig Core
//!
//! Multichain transaction building and signature assembly on top of an MPC
//! threshold-signing network.
//!
//! ## Architecture
//!
//! This crate provides:
//! - **Key Derivation**: deterministic secp256k1 keys under the network root
//!   key, one per `(predecessor, path)` pair
//! - **Chain Adapters**: unified build/sign/assemble/broadcast interface for
//!   EVM, Bitcoin (P2WPKH), and Cosmos SDK chains
//! - **Signature Normalization**: raw `(big_r, s)` MPC responses into the
//!   `(r, s, v)` triples every chain consumes
//! - **Index-Preserving Assembly**: multi-input transactions fail loudly when
//!   a signature arrives under the wrong input index
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use chainsig_core::chain::{ChainAdapter, EvmAdapter, EvmConfig};
//! use chainsig_core::{mpc, DerivationPath, TransferRequest, ChainType, DEFAULT_KEY_VERSION};
//!
//! let adapter = EvmAdapter::new(EvmConfig::ethereum_sepolia())?;
//! let path = DerivationPath::new("alice.near", "evm-0");
//!
//! let root = signer.root_public_key().await?;
//! let key = adapter.derive_address_and_public_key(&root, &path)?;
//!
//! let request = TransferRequest::new(ChainType::Evm, &key.address, "0x...", "0.1");
//! let unsigned = adapter.build_transaction(&request, &key).await?;
//!
//! let signatures = mpc::collect_signatures(&signer, &unsigned, &path, DEFAULT_KEY_VERSION).await?;
//! let signed = adapter.add_signature(&unsigned, &key, &signatures)?;
//! let hash = adapter.broadcast(&signed).await?;
//! ```
//!
//! ## Security Model
//!
//! No key material ever enters this crate. Derivation works from the public
//! root key alone, and every signature is requested from the external signing
//! network and verified by recovery against the derived public key before it
//! is placed into a transaction.

pub mod chain;
pub mod error;
pub mod kdf;
pub mod mpc;
pub mod signature;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use mpc::MpcSigner;
pub use store::TransactionStore;
pub use types::{
    ChainType, DerivationPath, DerivedKey, IndexedSignature, MpcSignature, NormalizedSignature,
    RootPublicKey, SigningPayload, TransferRequest, Utxo,
};

// Re-export chain types for convenience
#[cfg(feature = "bitcoin")]
pub use chain::{BitcoinAdapter, BitcoinConfig};

#[cfg(feature = "cosmos")]
pub use chain::{CosmosAdapter, CosmosConfig};

#[cfg(feature = "evm")]
pub use chain::{EvmAdapter, EvmConfig};

pub use chain::{Balance, ChainAdapter, SignedTx, TxHash, UnsignedTx};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Key version used when a request does not pin one
pub const DEFAULT_KEY_VERSION: u32 = 0;
