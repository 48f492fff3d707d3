//! # Chain Adapters
//!
//! Chain-agnostic interfaces for turning a [`TransferRequest`] into bytes the
//! MPC network can sign and a signed transaction the chain will accept. Each
//! chain implements the common [`ChainAdapter`] trait.
//!
//! ## Supported Chains
//!
//! - **EVM** - Ethereum and EVM-compatible chains (EIP-1559 and legacy)
//! - **Bitcoin** - P2WPKH transfers via PSBT
//! - **Cosmos** - SIGN_MODE_DIRECT bank transfers
//!
//! ## Example
//!
//! ```rust,ignore
//! use chainsig_core::chain::{ChainAdapter, EvmAdapter, EvmConfig};
//!
//! let adapter = EvmAdapter::new(EvmConfig::ethereum_sepolia())?;
//! let key = adapter.derive_address_and_public_key(&root, &path)?;
//! let unsigned = adapter.build_transaction(&request, &key).await?;
//! // ... hand unsigned.payloads to the MPC signer ...
//! let signed = adapter.add_signature(&unsigned, &key, &signatures)?;
//! let hash = adapter.broadcast(&signed).await?;
//! ```

#[cfg(feature = "bitcoin")]
pub mod bitcoin;

#[cfg(feature = "cosmos")]
pub mod cosmos;

#[cfg(feature = "evm")]
pub mod evm;

use crate::{
    ChainType, DerivationPath, DerivedKey, Error, IndexedSignature, Result, RootPublicKey,
    SigningPayload, TransferRequest,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[cfg(feature = "bitcoin")]
pub use bitcoin::{BitcoinAdapter, BitcoinConfig};

#[cfg(feature = "cosmos")]
pub use cosmos::{CosmosAdapter, CosmosConfig};

#[cfg(feature = "evm")]
pub use evm::{EvmAdapter, EvmConfig};

// ============================================================================
// Core Types
// ============================================================================

/// Balance representation for any chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    /// Raw balance value (smallest unit: wei, satoshis, or the chain denom)
    pub raw: String,
    /// Human-readable balance with decimals
    pub formatted: String,
    /// Symbol of the native currency
    pub symbol: String,
    /// Number of decimals
    pub decimals: u8,
}

impl Balance {
    /// Create a new balance
    pub fn new(raw: impl Into<String>, decimals: u8, symbol: impl Into<String>) -> Self {
        let raw_str = raw.into();
        let symbol_str = symbol.into();
        let formatted = Self::format_balance(&raw_str, decimals);

        Self {
            raw: raw_str,
            formatted,
            symbol: symbol_str,
            decimals,
        }
    }

    /// Format a raw balance with decimals
    fn format_balance(raw: &str, decimals: u8) -> String {
        let raw_value: u128 = raw.parse().unwrap_or(0);
        if raw_value == 0 {
            return "0".to_string();
        }

        let divisor = 10u128.pow(decimals as u32);
        let whole = raw_value / divisor;
        let fraction = raw_value % divisor;

        if fraction == 0 {
            whole.to_string()
        } else {
            let fraction_str = format!("{:0>width$}", fraction, width = decimals as usize);
            let trimmed = fraction_str.trim_end_matches('0');
            format!("{}.{}", whole, trimmed)
        }
    }

    /// Check if balance is zero
    pub fn is_zero(&self) -> bool {
        self.raw == "0" || self.raw.is_empty()
    }

    /// Parse raw value as u128
    pub fn raw_value(&self) -> u128 {
        self.raw.parse().unwrap_or(0)
    }
}

/// Parse a transfer amount into the chain's smallest unit.
///
/// A plain integer is taken as the smallest unit directly; a decimal string
/// (`"1.5"`) is taken as whole units and scaled by `decimals`.
pub fn parse_amount(value: &str, decimals: u8) -> Result<u128> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidConfig("empty amount".to_string()));
    }

    match value.split_once('.') {
        None => value
            .parse::<u128>()
            .map_err(|e| Error::InvalidConfig(format!("invalid amount '{}': {}", value, e))),
        Some((whole, fraction)) => {
            if fraction.len() > decimals as usize {
                return Err(Error::InvalidConfig(format!(
                    "amount '{}' has more than {} decimal places",
                    value, decimals
                )));
            }
            let whole: u128 = if whole.is_empty() {
                0
            } else {
                whole.parse().map_err(|e| {
                    Error::InvalidConfig(format!("invalid amount '{}': {}", value, e))
                })?
            };
            let fraction_scaled: u128 = if fraction.is_empty() {
                0
            } else {
                let padded = format!("{:0<width$}", fraction, width = decimals as usize);
                padded.parse().map_err(|e| {
                    Error::InvalidConfig(format!("invalid amount '{}': {}", value, e))
                })?
            };
            whole
                .checked_mul(10u128.pow(decimals as u32))
                .and_then(|w| w.checked_add(fraction_scaled))
                .ok_or_else(|| Error::InvalidConfig(format!("amount '{}' overflows", value)))
        }
    }
}

/// Unsigned transaction paired with the payloads the MPC network must sign.
///
/// `payloads` is ordered by input index; every index must receive exactly one
/// signature before [`ChainAdapter::add_signature`] can produce a
/// broadcastable transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsignedTx {
    /// Target chain
    pub chain: ChainType,
    /// Serialized unsigned transaction (chain-specific: RLP envelope, PSBT,
    /// or protobuf SignDoc)
    pub raw: Vec<u8>,
    /// Signing payloads, ascending by index
    pub payloads: Vec<SigningPayload>,
    /// Human-readable transaction summary
    pub summary: TxSummary,
}

/// Human-readable transaction summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxSummary {
    /// From address
    pub from: String,
    /// To address
    pub to: String,
    /// Value being transferred, formatted in whole units
    pub value: String,
    /// Estimated fee, formatted in whole units
    pub estimated_fee: String,
}

/// Signed transaction ready for broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedTx {
    /// Target chain
    pub chain: ChainType,
    /// Serialized signed transaction in the chain's wire format
    pub raw: Vec<u8>,
    /// Transaction hash (pre-computed where the chain allows)
    pub tx_hash: String,
}

/// Transaction hash returned after broadcast
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxHash {
    /// The transaction hash
    pub hash: String,
    /// Explorer URL (if available)
    pub explorer_url: Option<String>,
}

impl TxHash {
    /// Create a new transaction hash
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            explorer_url: None,
        }
    }

    /// Add explorer URL
    pub fn with_explorer_url(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }
}

// ============================================================================
// Chain Adapter Trait
// ============================================================================

/// Trait for chain-specific operations.
///
/// The signing flow is split in three so the MPC round can happen anywhere in
/// between: `build_transaction` produces an unsigned transaction plus its
/// signing payloads, the caller obtains one signature per payload from the
/// network, and `add_signature` reassembles the broadcastable transaction.
/// Neither half touches key material.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Get the chain family this adapter serves
    fn chain_type(&self) -> ChainType;

    /// Get the native currency symbol
    fn native_symbol(&self) -> &str;

    /// Get the native currency decimals
    fn native_decimals(&self) -> u8;

    /// Derive the address and public key for a path under the network root
    /// key. Pure computation; never touches the network.
    fn derive_address_and_public_key(
        &self,
        root: &RootPublicKey,
        path: &DerivationPath,
    ) -> Result<DerivedKey>;

    /// Get the native balance for an address
    async fn get_balance(&self, address: &str) -> Result<Balance>;

    /// Build an unsigned transaction and its signing payloads
    async fn build_transaction(
        &self,
        request: &TransferRequest,
        key: &DerivedKey,
    ) -> Result<UnsignedTx>;

    /// Attach signatures and produce a broadcastable transaction.
    ///
    /// Signatures may arrive in any order but each must carry the index of
    /// the payload it answers; a signature that does not verify against its
    /// indexed payload is rejected rather than silently misplaced.
    fn add_signature(
        &self,
        unsigned: &UnsignedTx,
        key: &DerivedKey,
        signatures: &[IndexedSignature],
    ) -> Result<SignedTx>;

    /// Broadcast a signed transaction
    async fn broadcast(&self, signed: &SignedTx) -> Result<TxHash>;

    /// Get the explorer URL for a transaction
    fn explorer_tx_url(&self, tx_hash: &str) -> Option<String>;
}

// ============================================================================
// RPC Client
// ============================================================================

/// HTTP JSON-RPC client with failover support
#[derive(Clone)]
pub struct RpcClient {
    urls: Vec<String>,
    client: reqwest::Client,
    current_index: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

impl RpcClient {
    /// Create a new RPC client with failover URLs
    pub fn new(urls: Vec<String>) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::InvalidConfig("At least one RPC URL required".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Upstream(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            urls,
            client,
            current_index: std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0)),
        })
    }

    /// Get the current RPC URL
    fn current_url(&self) -> &str {
        let idx = self
            .current_index
            .load(std::sync::atomic::Ordering::Relaxed);
        &self.urls[idx % self.urls.len()]
    }

    /// Rotate to the next RPC URL
    fn rotate_url(&self) {
        self.current_index
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    }

    /// Make a JSON-RPC request with automatic failover
    pub async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let mut last_error = None;

        for _ in 0..self.urls.len() {
            let url = self.current_url();

            match self.make_request(url, method, params.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    tracing::warn!("RPC request failed on {}: {}", url, e);
                    last_error = Some(e);
                    self.rotate_url();
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| Error::UpstreamData("All RPC endpoints failed".into())))
    }

    async fn make_request<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let request_body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| Error::UpstreamData(format!("RPC request failed: {}", e)))?;

        let response_body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| Error::UpstreamData(format!("Failed to parse RPC response: {}", e)))?;

        if let Some(error) = response_body.get("error") {
            return Err(Error::UpstreamData(format!("RPC error: {}", error)));
        }

        let result = response_body
            .get("result")
            .ok_or_else(|| Error::UpstreamData("Missing result in RPC response".into()))?;

        serde_json::from_value(result.clone())
            .map_err(|e| Error::UpstreamData(format!("Failed to deserialize result: {}", e)))
    }
}

impl std::fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcClient")
            .field("urls", &self.urls)
            .field(
                "current_index",
                &self
                    .current_index
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .finish()
    }
}
