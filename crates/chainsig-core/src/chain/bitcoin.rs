//! # Bitcoin Chain Adapter
//!
//! P2WPKH transfers assembled as PSBTs, with signing hashes computed per
//! input (BIP-143). Each input gets its own signing payload, indexed by its
//! position in the transaction; signatures must come back under the same
//! indices.
//!
//! Chain data (UTXOs, fee estimates, broadcast) comes from an Esplora-style
//! REST API.

use super::{parse_amount, Balance, ChainAdapter, SignedTx, TxHash, TxSummary, UnsignedTx};
use crate::{
    ChainType, DerivationPath, DerivedKey, Error, IndexedSignature, Result, RootPublicKey,
    SigningPayload, TransferRequest, Utxo,
};
use async_trait::async_trait;
use bitcoin::{
    absolute::LockTime,
    hashes::Hash,
    psbt::Psbt,
    sighash::{EcdsaSighashType, SighashCache},
    transaction::Version,
    Address, Amount, CompressedPublicKey, Network, OutPoint, ScriptBuf, Sequence, Transaction,
    TxIn, TxOut, Txid, Witness,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

/// Outputs below this are uneconomical to spend (P2WPKH dust threshold)
const DUST_LIMIT_SATS: u64 = 546;

/// Default confirmation target for fee estimation, in blocks
const FEE_TARGET_BLOCKS: u16 = 3;

// Virtual size accounting for a 1-version, 1-locktime P2WPKH transaction:
// ~11 vbytes of overhead, ~68 per input, 31 per output.
const TX_OVERHEAD_VBYTES: u64 = 11;
const INPUT_VBYTES: u64 = 68;
const OUTPUT_VBYTES: u64 = 31;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for Bitcoin adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinConfig {
    /// Network (mainnet, testnet, signet, regtest)
    pub network: Network,
    /// Esplora REST API base URL
    pub esplora_url: String,
    /// Block explorer URL (optional)
    pub explorer_url: Option<String>,
}

impl BitcoinConfig {
    /// Create config for Bitcoin mainnet
    pub fn mainnet() -> Self {
        Self {
            network: Network::Bitcoin,
            esplora_url: "https://blockstream.info/api".to_string(),
            explorer_url: Some("https://blockstream.info".to_string()),
        }
    }

    /// Create config for Bitcoin testnet
    pub fn testnet() -> Self {
        Self {
            network: Network::Testnet,
            esplora_url: "https://blockstream.info/testnet/api".to_string(),
            explorer_url: Some("https://blockstream.info/testnet".to_string()),
        }
    }

    /// Create a custom config
    pub fn custom(network: Network, esplora_url: impl Into<String>) -> Self {
        Self {
            network,
            esplora_url: esplora_url.into(),
            explorer_url: None,
        }
    }

    /// Set explorer URL
    pub fn with_explorer(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }
}

// ============================================================================
// Esplora Client
// ============================================================================

/// Minimal Esplora REST client
#[derive(Debug, Clone)]
struct EsploraClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraAddressStats {
    chain_stats: EsploraTxoStats,
}

#[derive(Debug, Deserialize)]
struct EsploraTxoStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

impl EsploraClient {
    fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Upstream(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.into(),
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::UpstreamData(format!("GET {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::UpstreamData(format!(
                "GET {} returned {}",
                url,
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| Error::UpstreamData(format!("GET {}: invalid response: {}", url, e)))
    }

    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>> {
        let raw: Vec<EsploraUtxo> = self.get_json(&format!("/address/{}/utxo", address)).await?;
        Ok(raw
            .into_iter()
            .map(|u| Utxo {
                txid: u.txid,
                vout: u.vout,
                value: u.value,
            })
            .collect())
    }

    async fn confirmed_balance(&self, address: &str) -> Result<u64> {
        let stats: EsploraAddressStats = self.get_json(&format!("/address/{}", address)).await?;
        Ok(stats
            .chain_stats
            .funded_txo_sum
            .saturating_sub(stats.chain_stats.spent_txo_sum))
    }

    /// Fee rate in sat/vB for the configured confirmation target
    async fn fee_rate(&self) -> Result<f64> {
        let estimates: HashMap<String, f64> = self.get_json("/fee-estimates").await?;

        // Closest available target at or above the desired one, floored at
        // the relay minimum.
        let rate = estimates
            .iter()
            .filter_map(|(target, rate)| {
                target
                    .parse::<u16>()
                    .ok()
                    .filter(|t| *t >= FEE_TARGET_BLOCKS)
                    .map(|t| (t, *rate))
            })
            .min_by_key(|(t, _)| *t)
            .map(|(_, rate)| rate)
            .or_else(|| estimates.values().copied().reduce(f64::max))
            .ok_or_else(|| Error::UpstreamData("no fee estimates available".to_string()))?;

        Ok(rate.max(1.0))
    }

    async fn broadcast(&self, tx_hex: &str) -> Result<String> {
        let url = format!("{}/tx", self.base_url);
        let response = self
            .client
            .post(&url)
            .body(tx_hex.to_string())
            .send()
            .await
            .map_err(|e| Error::Broadcast(format!("POST {} failed: {}", url, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Broadcast(format!("POST {}: unreadable response: {}", url, e)))?;

        if !status.is_success() {
            return Err(Error::Broadcast(format!("node rejected tx: {}", body)));
        }

        Ok(body.trim().to_string())
    }
}

// ============================================================================
// Bitcoin Adapter
// ============================================================================

/// Bitcoin chain adapter implementation (P2WPKH)
#[derive(Debug, Clone)]
pub struct BitcoinAdapter {
    config: BitcoinConfig,
    esplora: EsploraClient,
}

impl BitcoinAdapter {
    /// Create a new Bitcoin adapter
    pub fn new(config: BitcoinConfig) -> Result<Self> {
        let esplora = EsploraClient::new(config.esplora_url.clone())?;
        Ok(Self { config, esplora })
    }

    /// Get the configuration
    pub fn config(&self) -> &BitcoinConfig {
        &self.config
    }

    fn compressed_key(key: &DerivedKey) -> Result<CompressedPublicKey> {
        let compressed = key.compressed_public_key()?;
        CompressedPublicKey::from_slice(&compressed)
            .map_err(|e| Error::Encoding(format!("invalid public key: {}", e)))
    }

    fn parse_address(&self, address: &str) -> Result<Address> {
        Address::from_str(address)
            .map_err(|e| Error::InvalidConfig(format!("invalid address '{}': {}", address, e)))?
            .require_network(self.config.network)
            .map_err(|e| Error::InvalidConfig(format!("wrong network for '{}': {}", address, e)))
    }

    /// Estimated virtual size of a P2WPKH transaction
    fn estimate_vsize(inputs: usize, outputs: usize) -> u64 {
        TX_OVERHEAD_VBYTES + INPUT_VBYTES * inputs as u64 + OUTPUT_VBYTES * outputs as u64
    }

    /// Largest-first coin selection.
    ///
    /// Returns the chosen UTXOs, the fee, and the change amount. The change
    /// amount is zero when it would fall below the dust limit, in which case
    /// it is absorbed into the fee.
    fn select_coins(
        mut candidates: Vec<Utxo>,
        amount_sats: u64,
        fee_rate: f64,
    ) -> Result<(Vec<Utxo>, u64, u64)> {
        candidates.sort_by(|a, b| b.value.cmp(&a.value));
        let available: u64 = candidates.iter().map(|u| u.value).sum();

        let mut selected = Vec::new();
        let mut selected_value = 0u64;

        for utxo in candidates {
            selected_value += utxo.value;
            selected.push(utxo);

            // Fee assuming a change output; ceil so we never underpay.
            let vsize = Self::estimate_vsize(selected.len(), 2);
            let fee = (vsize as f64 * fee_rate).ceil() as u64;

            if selected_value >= amount_sats + fee {
                let change = selected_value - amount_sats - fee;
                if change < DUST_LIMIT_SATS {
                    // Single-output transaction; dust goes to the miner.
                    let vsize = Self::estimate_vsize(selected.len(), 1);
                    let fee = (vsize as f64 * fee_rate).ceil() as u64;
                    if selected_value >= amount_sats + fee {
                        return Ok((selected, selected_value - amount_sats, 0));
                    }
                } else {
                    return Ok((selected, fee, change));
                }
            }
        }

        let vsize = Self::estimate_vsize(selected.len().max(1), 2);
        let fee = (vsize as f64 * fee_rate).ceil() as u64;
        Err(Error::InsufficientFunds {
            required: format!("{} sats", amount_sats + fee),
            available: format!("{} sats", available),
        })
    }

    fn payload_for_index(unsigned: &UnsignedTx, index: u32) -> Result<[u8; 32]> {
        unsigned
            .payloads
            .iter()
            .find(|p| p.index == index)
            .map(|p| p.payload)
            .ok_or_else(|| Error::IndexMismatch {
                index,
                reason: "no input exists at this index".to_string(),
            })
    }
}

#[async_trait]
impl ChainAdapter for BitcoinAdapter {
    fn chain_type(&self) -> ChainType {
        ChainType::Bitcoin
    }

    fn native_symbol(&self) -> &str {
        "BTC"
    }

    fn native_decimals(&self) -> u8 {
        8
    }

    fn derive_address_and_public_key(
        &self,
        root: &RootPublicKey,
        path: &DerivationPath,
    ) -> Result<DerivedKey> {
        let point = crate::kdf::derive_public_key(root, path)?;
        let public_key = crate::kdf::to_uncompressed(&point);
        let compressed = crate::kdf::to_compressed(&point);

        let pk = CompressedPublicKey::from_slice(&compressed)
            .map_err(|e| Error::Encoding(format!("invalid public key: {}", e)))?;
        let address = Address::p2wpkh(&pk, self.config.network);

        Ok(DerivedKey {
            public_key,
            address: address.to_string(),
        })
    }

    async fn get_balance(&self, address: &str) -> Result<Balance> {
        let sats = self.esplora.confirmed_balance(address).await?;
        Ok(Balance::new(sats.to_string(), 8, "BTC"))
    }

    async fn build_transaction(
        &self,
        request: &TransferRequest,
        key: &DerivedKey,
    ) -> Result<UnsignedTx> {
        if request.from != key.address {
            return Err(Error::InvalidConfig(format!(
                "sender {} does not match derived address {}",
                request.from, key.address
            )));
        }

        let from_address = self.parse_address(&request.from)?;
        let to_address = self.parse_address(&request.to)?;
        let amount_sats = u64::try_from(parse_amount(&request.value, 8)?)
            .map_err(|_| Error::InvalidConfig(format!("amount '{}' overflows", request.value)))?;
        if amount_sats < DUST_LIMIT_SATS {
            return Err(Error::InvalidConfig(format!(
                "amount {} sats is below the dust limit",
                amount_sats
            )));
        }

        let utxos = match &request.utxos {
            Some(utxos) if !utxos.is_empty() => utxos.clone(),
            _ => self.esplora.utxos(&request.from).await?,
        };
        if utxos.is_empty() {
            return Err(Error::InsufficientFunds {
                required: format!("{} sats", amount_sats),
                available: "0 sats".to_string(),
            });
        }

        let fee_rate = match request.fee_rate {
            Some(rate) => rate.max(1.0),
            None => self.esplora.fee_rate().await?,
        };

        let (selected, fee, change) = Self::select_coins(utxos, amount_sats, fee_rate)?;

        let inputs: Vec<TxIn> = selected
            .iter()
            .map(|utxo| {
                Ok(TxIn {
                    previous_output: OutPoint {
                        txid: Txid::from_str(&utxo.txid).map_err(|e| {
                            Error::Encoding(format!("invalid txid '{}': {}", utxo.txid, e))
                        })?,
                        vout: utxo.vout,
                    },
                    script_sig: ScriptBuf::new(),
                    sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
                    witness: Witness::new(),
                })
            })
            .collect::<Result<_>>()?;

        let mut outputs = vec![TxOut {
            value: Amount::from_sat(amount_sats),
            script_pubkey: to_address.script_pubkey(),
        }];
        if change > 0 {
            outputs.push(TxOut {
                value: Amount::from_sat(change),
                script_pubkey: from_address.script_pubkey(),
            });
        }

        let tx = Transaction {
            version: Version::TWO,
            lock_time: LockTime::ZERO,
            input: inputs,
            output: outputs,
        };

        let mut psbt = Psbt::from_unsigned_tx(tx)
            .map_err(|e| Error::Encoding(format!("failed to build PSBT: {}", e)))?;

        let spend_script = from_address.script_pubkey();
        for (i, utxo) in selected.iter().enumerate() {
            psbt.inputs[i].witness_utxo = Some(TxOut {
                value: Amount::from_sat(utxo.value),
                script_pubkey: spend_script.clone(),
            });
        }

        // One BIP-143 signing hash per input, ascending by input index
        let mut cache = SighashCache::new(&psbt.unsigned_tx);
        let mut payloads = Vec::with_capacity(selected.len());
        for (i, utxo) in selected.iter().enumerate() {
            let sighash = cache
                .p2wpkh_signature_hash(
                    i,
                    &spend_script,
                    Amount::from_sat(utxo.value),
                    EcdsaSighashType::All,
                )
                .map_err(|e| Error::Encoding(format!("sighash for input {}: {}", i, e)))?;
            payloads.push(SigningPayload {
                index: i as u32,
                payload: sighash.to_byte_array(),
            });
        }

        let summary = TxSummary {
            from: request.from.clone(),
            to: request.to.clone(),
            value: Balance::new(amount_sats.to_string(), 8, "BTC").formatted,
            estimated_fee: Balance::new(fee.to_string(), 8, "BTC").formatted,
        };

        Ok(UnsignedTx {
            chain: ChainType::Bitcoin,
            raw: psbt.serialize(),
            payloads,
            summary,
        })
    }

    fn add_signature(
        &self,
        unsigned: &UnsignedTx,
        key: &DerivedKey,
        signatures: &[IndexedSignature],
    ) -> Result<SignedTx> {
        let mut psbt = Psbt::deserialize(&unsigned.raw)
            .map_err(|e| Error::Encoding(format!("failed to deserialize PSBT: {}", e)))?;
        let input_count = psbt.inputs.len();

        let pk = Self::compressed_key(key)?;
        let secp_pk = bitcoin::secp256k1::PublicKey::from_slice(&pk.to_bytes())
            .map_err(|e| Error::Encoding(format!("invalid public key: {}", e)))?;

        // Slot signatures by index; order of arrival is irrelevant but every
        // index must be filled exactly once by a signature that verifies
        // against that input's sighash.
        let mut slots: Vec<Option<&IndexedSignature>> = vec![None; input_count];
        for indexed in signatures {
            let idx = indexed.index as usize;
            if idx >= input_count {
                return Err(Error::IndexMismatch {
                    index: indexed.index,
                    reason: format!("transaction has {} inputs", input_count),
                });
            }
            if slots[idx].is_some() {
                return Err(Error::IndexMismatch {
                    index: indexed.index,
                    reason: "duplicate signature for this input".to_string(),
                });
            }

            let payload = Self::payload_for_index(unsigned, indexed.index)?;
            if !crate::signature::verify_recoverable(
                &payload,
                &indexed.signature,
                &key.public_key,
            )? {
                return Err(Error::IndexMismatch {
                    index: indexed.index,
                    reason: "signature does not verify against this input's sighash".to_string(),
                });
            }

            slots[idx] = Some(indexed);
        }

        for (i, slot) in slots.iter().enumerate() {
            let indexed = slot.ok_or(Error::IncompleteSignature { index: i as u32 })?;

            let raw = indexed.signature.to_raw_bytes()?;
            let mut secp_sig = bitcoin::secp256k1::ecdsa::Signature::from_compact(&raw)
                .map_err(|e| Error::Encoding(format!("invalid compact signature: {}", e)))?;
            // Consensus requires low-s
            secp_sig.normalize_s();

            let btc_sig = bitcoin::ecdsa::Signature::sighash_all(secp_sig);
            psbt.inputs[i].final_script_witness = Some(Witness::p2wpkh(&btc_sig, &secp_pk));
        }

        let tx = psbt
            .extract_tx()
            .map_err(|e| Error::Encoding(format!("failed to extract transaction: {}", e)))?;

        Ok(SignedTx {
            chain: ChainType::Bitcoin,
            raw: bitcoin::consensus::serialize(&tx),
            tx_hash: tx.compute_txid().to_string(),
        })
    }

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxHash> {
        let txid = self.esplora.broadcast(&hex::encode(&signed.raw)).await?;
        let explorer_url = self.explorer_tx_url(&txid);

        Ok(TxHash {
            hash: txid,
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
