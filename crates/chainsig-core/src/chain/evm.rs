//! # EVM Chain Adapter
//!
//! Adapter for Ethereum and EVM-compatible chains with support for:
//! - EIP-1559 transaction building (legacy EIP-155 for chains without it)
//! - Fee estimation via `eth_feeHistory` / `eth_gasPrice`
//! - RPC failover
//!
//! An EVM transaction carries exactly one signature, so `build_transaction`
//! always emits a single signing payload at index 0.

use super::{
    parse_amount, Balance, ChainAdapter, RpcClient, SignedTx, TxHash, TxSummary, UnsignedTx,
};
use crate::{
    ChainType, DerivationPath, DerivedKey, Error, IndexedSignature, NormalizedSignature, Result,
    RootPublicKey, SigningPayload, TransferRequest,
};
use alloy_primitives::{Address, Bytes, U256};
use alloy_rlp::{Decodable, Encodable, RlpDecodable, RlpEncodable};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tiny_keccak::{Hasher, Keccak};

/// Gas for a plain value transfer
const TRANSFER_GAS: u64 = 21_000;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for EVM adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvmConfig {
    /// EIP-155 chain identifier
    pub chain_id: u64,
    /// RPC endpoint URLs (for failover)
    pub rpc_urls: Vec<String>,
    /// Block explorer URL (optional)
    pub explorer_url: Option<String>,
    /// Native currency symbol
    pub symbol: String,
    /// Native currency decimals (18 for most EVM chains)
    pub decimals: u8,
    /// Whether EIP-1559 is supported
    pub eip1559_supported: bool,
}

impl EvmConfig {
    /// Create config for Ethereum Mainnet
    pub fn ethereum_mainnet() -> Self {
        Self {
            chain_id: 1,
            rpc_urls: vec![
                "https://eth.llamarpc.com".to_string(),
                "https://rpc.ankr.com/eth".to_string(),
                "https://cloudflare-eth.com".to_string(),
            ],
            explorer_url: Some("https://etherscan.io".to_string()),
            symbol: "ETH".to_string(),
            decimals: 18,
            eip1559_supported: true,
        }
    }

    /// Create config for Ethereum Sepolia testnet
    pub fn ethereum_sepolia() -> Self {
        Self {
            chain_id: 11155111,
            rpc_urls: vec![
                "https://rpc.sepolia.org".to_string(),
                "https://rpc.ankr.com/eth_sepolia".to_string(),
            ],
            explorer_url: Some("https://sepolia.etherscan.io".to_string()),
            symbol: "ETH".to_string(),
            decimals: 18,
            eip1559_supported: true,
        }
    }

    /// Create config for Base
    pub fn base() -> Self {
        Self {
            chain_id: 8453,
            rpc_urls: vec![
                "https://mainnet.base.org".to_string(),
                "https://base.llamarpc.com".to_string(),
            ],
            explorer_url: Some("https://basescan.org".to_string()),
            symbol: "ETH".to_string(),
            decimals: 18,
            eip1559_supported: true,
        }
    }

    /// Create a custom config
    pub fn custom(chain_id: u64, rpc_urls: Vec<String>, symbol: &str) -> Self {
        Self {
            chain_id,
            rpc_urls,
            explorer_url: None,
            symbol: symbol.to_string(),
            decimals: 18,
            eip1559_supported: true,
        }
    }

    /// Set explorer URL
    pub fn with_explorer(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }

    /// Set EIP-1559 support
    pub fn with_eip1559(mut self, supported: bool) -> Self {
        self.eip1559_supported = supported;
        self
    }
}

// ============================================================================
// EIP-1559 Transaction Type
// ============================================================================

/// EIP-1559 transaction structure
#[derive(Debug, Clone, PartialEq, RlpEncodable, RlpDecodable)]
struct Eip1559Transaction {
    chain_id: u64,
    nonce: u64,
    max_priority_fee_per_gas: u128,
    max_fee_per_gas: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
    access_list: Vec<AccessListItem>,
}

/// Access list item for EIP-2930
#[derive(Debug, Clone, PartialEq, RlpEncodable, RlpDecodable)]
struct AccessListItem {
    address: Address,
    storage_keys: Vec<alloy_primitives::B256>,
}

impl Eip1559Transaction {
    /// Signing hash: keccak256 of the 0x02-typed unsigned envelope
    fn signing_hash(&self) -> [u8; 32] {
        let mut encoded = vec![0x02];
        self.encode(&mut encoded);
        keccak256(&encoded)
    }

    /// Encode the transaction with signature.
    ///
    /// Signed tx: `0x02 || rlp([chainId, nonce, maxPriorityFeePerGas,
    /// maxFeePerGas, gasLimit, to, value, data, accessList, yParity, r, s])`
    fn encode_signed(&self, signature: &NormalizedSignature) -> Result<Vec<u8>> {
        let y_parity = signature.y_parity();
        let r = U256::from_be_slice(&signature.r_bytes()?);
        let s = U256::from_be_slice(&signature.s_bytes()?);

        let mut stream = alloy_rlp::BytesMut::new();

        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_payload_length()
                + y_parity.length()
                + r.length()
                + s.length(),
        }
        .encode(&mut stream);

        self.chain_id.encode(&mut stream);
        self.nonce.encode(&mut stream);
        self.max_priority_fee_per_gas.encode(&mut stream);
        self.max_fee_per_gas.encode(&mut stream);
        self.gas_limit.encode(&mut stream);
        self.to.encode(&mut stream);
        self.value.encode(&mut stream);
        self.data.encode(&mut stream);
        self.access_list.encode(&mut stream);
        y_parity.encode(&mut stream);
        r.encode(&mut stream);
        s.encode(&mut stream);

        let mut result = vec![0x02];
        result.extend_from_slice(&stream);
        Ok(result)
    }

    fn rlp_payload_length(&self) -> usize {
        self.chain_id.length()
            + self.nonce.length()
            + self.max_priority_fee_per_gas.length()
            + self.max_fee_per_gas.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.data.length()
            + self.access_list.length()
    }
}

// ============================================================================
// Legacy Transaction Type
// ============================================================================

/// Legacy transaction for non-EIP-1559 chains
#[derive(Debug, Clone, PartialEq, RlpEncodable, RlpDecodable)]
struct LegacyTransaction {
    nonce: u64,
    gas_price: u128,
    gas_limit: u64,
    to: Address,
    value: U256,
    data: Bytes,
}

impl LegacyTransaction {
    /// Signing hash per EIP-155:
    /// `keccak256(rlp([nonce, gasprice, gas, to, value, data, chainId, 0, 0]))`
    fn signing_hash(&self, chain_id: u64) -> [u8; 32] {
        let mut stream = alloy_rlp::BytesMut::new();

        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_payload_length()
                + chain_id.length()
                + 0u8.length()
                + 0u8.length(),
        }
        .encode(&mut stream);

        self.nonce.encode(&mut stream);
        self.gas_price.encode(&mut stream);
        self.gas_limit.encode(&mut stream);
        self.to.encode(&mut stream);
        self.value.encode(&mut stream);
        self.data.encode(&mut stream);
        chain_id.encode(&mut stream);
        0u8.encode(&mut stream);
        0u8.encode(&mut stream);

        keccak256(&stream)
    }

    /// Encode the transaction with signature (EIP-155)
    fn encode_signed(&self, signature: &NormalizedSignature, chain_id: u64) -> Result<Vec<u8>> {
        let v = signature.legacy_v(chain_id);
        let r = U256::from_be_slice(&signature.r_bytes()?);
        let s = U256::from_be_slice(&signature.s_bytes()?);

        let mut stream = alloy_rlp::BytesMut::new();

        alloy_rlp::Header {
            list: true,
            payload_length: self.rlp_payload_length() + v.length() + r.length() + s.length(),
        }
        .encode(&mut stream);

        self.nonce.encode(&mut stream);
        self.gas_price.encode(&mut stream);
        self.gas_limit.encode(&mut stream);
        self.to.encode(&mut stream);
        self.value.encode(&mut stream);
        self.data.encode(&mut stream);
        v.encode(&mut stream);
        r.encode(&mut stream);
        s.encode(&mut stream);

        Ok(stream.to_vec())
    }

    fn rlp_payload_length(&self) -> usize {
        self.nonce.length()
            + self.gas_price.length()
            + self.gas_limit.length()
            + self.to.length()
            + self.value.length()
            + self.data.length()
    }
}

// ============================================================================
// EVM Adapter
// ============================================================================

/// EVM chain adapter implementation
#[derive(Debug, Clone)]
pub struct EvmAdapter {
    config: EvmConfig,
    rpc: RpcClient,
}

impl EvmAdapter {
    /// Create a new EVM adapter
    pub fn new(config: EvmConfig) -> Result<Self> {
        let rpc = RpcClient::new(config.rpc_urls.clone())?;
        Ok(Self { config, rpc })
    }

    /// Get the configuration
    pub fn config(&self) -> &EvmConfig {
        &self.config
    }

    /// Compute the EIP-55-agnostic (lowercase) address for a public key:
    /// keccak256 of the 64 coordinate bytes, last 20 bytes.
    pub fn address_from_public_key(public_key: &[u8]) -> Result<String> {
        let coordinates: Vec<u8> = match public_key.len() {
            65 => public_key[1..].to_vec(),
            64 => public_key.to_vec(),
            33 => crate::kdf::decompress_sec1(public_key)?[1..].to_vec(),
            len => {
                return Err(Error::Encoding(format!(
                    "invalid public key length: {}",
                    len
                )))
            }
        };

        let hash = keccak256(&coordinates);
        Ok(format!("0x{}", hex::encode(&hash[12..])))
    }

    /// Check basic address format: `0x` + 40 hex characters
    pub fn is_valid_address(address: &str) -> bool {
        address.starts_with("0x")
            && address.len() == 42
            && address[2..].chars().all(|c| c.is_ascii_hexdigit())
    }

    /// Get the current nonce for an address
    pub async fn get_nonce(&self, address: &str) -> Result<u64> {
        let result: String = self
            .rpc
            .request(
                "eth_getTransactionCount",
                serde_json::json!([address, "latest"]),
            )
            .await?;

        parse_hex_u64(&result)
    }

    /// Estimate gas for a transfer, with a 20% buffer
    async fn estimate_gas(&self, request: &TransferRequest, value: U256) -> Result<u64> {
        let tx_object = serde_json::json!({
            "from": request.from,
            "to": request.to,
            "value": format!("0x{:x}", value),
            "data": request.data.as_ref().map(|d| format!("0x{}", hex::encode(d))),
        });

        let result: String = self
            .rpc
            .request("eth_estimateGas", serde_json::json!([tx_object]))
            .await?;

        let gas = parse_hex_u64(&result)?;
        Ok(gas * 120 / 100)
    }

    /// Fetch `(max_fee_per_gas, max_priority_fee_per_gas)` from fee history.
    /// For legacy chains the gas price doubles as both.
    async fn fetch_fees(&self) -> Result<(u128, u128)> {
        if !self.config.eip1559_supported {
            let gas_price: String = self
                .rpc
                .request("eth_gasPrice", serde_json::json!([]))
                .await?;
            let price = parse_hex_u128(&gas_price)?;
            return Ok((price, price));
        }

        #[derive(Deserialize)]
        struct FeeHistory {
            #[serde(rename = "baseFeePerGas")]
            base_fee_per_gas: Vec<String>,
            reward: Option<Vec<Vec<String>>>,
        }

        let result: FeeHistory = self
            .rpc
            .request("eth_feeHistory", serde_json::json!([20, "latest", [50]]))
            .await?;

        // Last base fee entry is the prediction for the next block
        let base_fee = result
            .base_fee_per_gas
            .last()
            .and_then(|s| parse_hex_u128(s).ok())
            .ok_or_else(|| Error::UpstreamData("fee history has no base fee".to_string()))?;

        let tips: Vec<u128> = result
            .reward
            .unwrap_or_default()
            .iter()
            .filter_map(|r| r.first().and_then(|s| parse_hex_u128(s).ok()))
            .collect();
        let tip = median(&tips).unwrap_or(1_000_000_000); // 1 gwei

        Ok((base_fee * 2 + tip, tip))
    }

    fn payload_for_index(unsigned: &UnsignedTx, index: u32) -> Result<[u8; 32]> {
        unsigned
            .payloads
            .iter()
            .find(|p| p.index == index)
            .map(|p| p.payload)
            .ok_or_else(|| Error::IndexMismatch {
                index,
                reason: "no payload exists at this index".to_string(),
            })
    }

    fn finalize_eip1559(
        &self,
        unsigned: &UnsignedTx,
        signature: &NormalizedSignature,
    ) -> Result<Vec<u8>> {
        // Skip the 0x02 type byte and decode the unsigned envelope. Field
        // decoding must mirror the derived encoding exactly, access list
        // included, or the signature no longer matches the bytes.
        let mut rlp_data = &unsigned.raw[1..];
        let tx = Eip1559Transaction::decode(&mut rlp_data)
            .map_err(|e| Error::Encoding(format!("Failed to decode transaction: {}", e)))?;

        tx.encode_signed(signature)
    }

    fn finalize_legacy(
        &self,
        unsigned: &UnsignedTx,
        signature: &NormalizedSignature,
    ) -> Result<Vec<u8>> {
        let tx = LegacyTransaction::decode(&mut &unsigned.raw[..])
            .map_err(|e| Error::Encoding(format!("Failed to decode transaction: {}", e)))?;

        tx.encode_signed(signature, self.config.chain_id)
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
    fn chain_type(&self) -> ChainType {
        ChainType::Evm
    }

    fn native_symbol(&self) -> &str {
        &self.config.symbol
    }

    fn native_decimals(&self) -> u8 {
        self.config.decimals
    }

    fn derive_address_and_public_key(
        &self,
        root: &RootPublicKey,
        path: &DerivationPath,
    ) -> Result<DerivedKey> {
        let point = crate::kdf::derive_public_key(root, path)?;
        let public_key = crate::kdf::to_uncompressed(&point);
        let address = Self::address_from_public_key(&public_key)?;
        Ok(DerivedKey {
            public_key,
            address,
        })
    }

    async fn get_balance(&self, address: &str) -> Result<Balance> {
        let result: String = self
            .rpc
            .request("eth_getBalance", serde_json::json!([address, "latest"]))
            .await?;

        let raw_value = parse_hex_u128(&result)?;

        Ok(Balance::new(
            raw_value.to_string(),
            self.config.decimals,
            &self.config.symbol,
        ))
    }

    async fn build_transaction(
        &self,
        request: &TransferRequest,
        key: &DerivedKey,
    ) -> Result<UnsignedTx> {
        if !request.from.eq_ignore_ascii_case(&key.address) {
            return Err(Error::InvalidConfig(format!(
                "sender {} does not match derived address {}",
                request.from, key.address
            )));
        }
        if !Self::is_valid_address(&request.to) {
            return Err(Error::InvalidConfig(format!(
                "invalid to address: {}",
                request.to
            )));
        }

        let to = Address::from_str(&request.to)
            .map_err(|e| Error::InvalidConfig(format!("Invalid to address: {}", e)))?;
        let value = U256::from(parse_amount(&request.value, self.config.decimals)?);

        let nonce = match request.nonce {
            Some(n) => n,
            None => self.get_nonce(&request.from).await?,
        };

        let (max_fee, max_priority_fee) =
            match (request.max_fee_per_gas, request.max_priority_fee_per_gas) {
                (Some(max), Some(tip)) => (max, tip),
                _ => self.fetch_fees().await?,
            };

        let gas_limit = match request.gas_limit {
            Some(limit) => limit,
            None if request.data.is_none() => TRANSFER_GAS,
            None => self.estimate_gas(request, value).await?,
        };

        let data = request
            .data
            .as_ref()
            .map(|d| Bytes::from(d.clone()))
            .unwrap_or_default();

        let (signing_hash, raw) = if self.config.eip1559_supported {
            let tx = Eip1559Transaction {
                chain_id: self.config.chain_id,
                nonce,
                max_priority_fee_per_gas: max_priority_fee,
                max_fee_per_gas: max_fee,
                gas_limit,
                to,
                value,
                data,
                access_list: vec![],
            };

            let signing_hash = tx.signing_hash();
            let mut raw = vec![0x02];
            tx.encode(&mut raw);
            (signing_hash, raw)
        } else {
            let tx = LegacyTransaction {
                nonce,
                gas_price: max_fee,
                gas_limit,
                to,
                value,
                data,
            };

            let signing_hash = tx.signing_hash(self.config.chain_id);
            let mut raw = alloy_rlp::BytesMut::new();
            tx.encode(&mut raw);
            (signing_hash, raw.to_vec())
        };

        let estimated_fee_wei = max_fee * gas_limit as u128;
        let summary = TxSummary {
            from: request.from.clone(),
            to: request.to.clone(),
            value: Balance::new(value.to_string(), self.config.decimals, &self.config.symbol)
                .formatted,
            estimated_fee: Balance::new(
                estimated_fee_wei.to_string(),
                self.config.decimals,
                &self.config.symbol,
            )
            .formatted,
        };

        Ok(UnsignedTx {
            chain: ChainType::Evm,
            raw,
            payloads: vec![SigningPayload {
                index: 0,
                payload: signing_hash,
            }],
            summary,
        })
    }

    fn add_signature(
        &self,
        unsigned: &UnsignedTx,
        key: &DerivedKey,
        signatures: &[IndexedSignature],
    ) -> Result<SignedTx> {
        let indexed = match signatures {
            [single] => single,
            [] => return Err(Error::IncompleteSignature { index: 0 }),
            _ => {
                return Err(Error::IndexMismatch {
                    index: signatures[1].index,
                    reason: "EVM transactions take exactly one signature".to_string(),
                })
            }
        };
        if indexed.index != 0 {
            return Err(Error::IndexMismatch {
                index: indexed.index,
                reason: "EVM signing payload lives at index 0".to_string(),
            });
        }

        let payload = Self::payload_for_index(unsigned, 0)?;
        if !crate::signature::verify_recoverable(&payload, &indexed.signature, &key.public_key)? {
            return Err(Error::IndexMismatch {
                index: 0,
                reason: "signature does not verify against the signing payload".to_string(),
            });
        }

        let raw = if unsigned.raw.first() == Some(&0x02) {
            self.finalize_eip1559(unsigned, &indexed.signature)?
        } else {
            self.finalize_legacy(unsigned, &indexed.signature)?
        };

        let hash = keccak256(&raw);

        Ok(SignedTx {
            chain: ChainType::Evm,
            raw,
            tx_hash: format!("0x{}", hex::encode(hash)),
        })
    }

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxHash> {
        let raw_hex = format!("0x{}", hex::encode(&signed.raw));

        let result: String = self
            .rpc
            .request("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await
            .map_err(|e| Error::Broadcast(e.to_string()))?;

        let explorer_url = self.explorer_tx_url(&result);

        Ok(TxHash {
            hash: result,
            explorer_url,
        })
    }

    fn explorer_tx_url(&self, tx_hash: &str) -> Option<String> {
        self.config
            .explorer_url
            .as_ref()
            .map(|base| format!("{}/tx/{}", base, tx_hash))
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    hasher.update(data);
    let mut hash = [0u8; 32];
    hasher.finalize(&mut hash);
    hash
}

fn parse_hex_u128(s: &str) -> Result<u128> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u128::from_str_radix(s, 16)
        .map_err(|e| Error::UpstreamData(format!("Failed to parse hex: {}", e)))
}

fn parse_hex_u64(s: &str) -> Result<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16)
        .map_err(|e| Error::UpstreamData(format!("Failed to parse hex: {}", e)))
}

fn median(values: &[u128]) -> Option<u128> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort();
    Some(sorted[sorted.len() / 2])
}
