//! # Cosmos Chain Adapter
//!
//! Bank-send transfers for Cosmos SDK chains, signed with SIGN_MODE_DIRECT.
//! The signing payload is the SHA-256 of the protobuf-encoded `SignDoc`; the
//! signed transaction is a `TxRaw` carrying the 64-byte `r || s` signature.
//!
//! Chain data (balances, account metadata, broadcast) comes from the chain's
//! LCD REST endpoint.

use super::{parse_amount, Balance, ChainAdapter, SignedTx, TxHash, TxSummary, UnsignedTx};
use crate::{
    ChainType, DerivationPath, DerivedKey, Error, IndexedSignature, Result, RootPublicKey,
    SigningPayload, TransferRequest,
};
use async_trait::async_trait;
use base64::Engine;
use cosmrs::{
    bank::MsgSend,
    proto::traits::Message,
    tx::{Body, Fee, Msg, SignDoc, SignerInfo},
    AccountId, Coin, Denom,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::str::FromStr;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for Cosmos adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CosmosConfig {
    /// Chain identifier, e.g. `cosmoshub-4`
    pub chain_id: String,
    /// LCD REST endpoint
    pub lcd_url: String,
    /// Bech32 address prefix, e.g. `cosmos`
    pub account_prefix: String,
    /// Base denomination, e.g. `uatom`
    pub denom: String,
    /// Display symbol, e.g. `ATOM`
    pub symbol: String,
    /// Decimals between the base denom and the display unit
    pub decimals: u8,
    /// Gas price in the base denom per gas unit
    pub gas_price: f64,
    /// Gas limit used when the request does not carry one
    pub default_gas_limit: u64,
    /// Block explorer URL (optional)
    pub explorer_url: Option<String>,
}

impl CosmosConfig {
    /// Create config for the Cosmos Hub
    pub fn cosmoshub() -> Self {
        Self {
            chain_id: "cosmoshub-4".to_string(),
            lcd_url: "https://cosmos-rest.publicnode.com".to_string(),
            account_prefix: "cosmos".to_string(),
            denom: "uatom".to_string(),
            symbol: "ATOM".to_string(),
            decimals: 6,
            gas_price: 0.025,
            default_gas_limit: 200_000,
            explorer_url: Some("https://www.mintscan.io/cosmos".to_string()),
        }
    }

    /// Create a custom config
    pub fn custom(
        chain_id: impl Into<String>,
        lcd_url: impl Into<String>,
        account_prefix: impl Into<String>,
        denom: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            chain_id: chain_id.into(),
            lcd_url: lcd_url.into(),
            account_prefix: account_prefix.into(),
            denom: denom.into(),
            symbol: symbol.into(),
            decimals,
            gas_price: 0.025,
            default_gas_limit: 200_000,
            explorer_url: None,
        }
    }

    /// Set the gas price in the base denom per gas unit
    pub fn with_gas_price(mut self, price: f64) -> Self {
        self.gas_price = price;
        self
    }

    /// Set explorer URL
    pub fn with_explorer(mut self, url: impl Into<String>) -> Self {
        self.explorer_url = Some(url.into());
        self
    }
}

// ============================================================================
// LCD Client
// ============================================================================

#[derive(Debug, Deserialize)]
struct LcdBalanceResponse {
    balance: LcdCoin,
}

#[derive(Debug, Deserialize)]
struct LcdCoin {
    amount: String,
}

#[derive(Debug, Deserialize)]
struct LcdAccountResponse {
    account: LcdAccount,
}

#[derive(Debug, Deserialize)]
struct LcdAccount {
    account_number: String,
    sequence: String,
}

#[derive(Debug, Deserialize)]
struct LcdBroadcastResponse {
    tx_response: LcdTxResponse,
}

#[derive(Debug, Deserialize)]
struct LcdTxResponse {
    txhash: String,
    code: u32,
    #[serde(default)]
    raw_log: String,
}

/// Minimal LCD REST client
#[derive(Debug, Clone)]
struct LcdClient {
    base_url: String,
    client: reqwest::Client,
}

impl LcdClient {
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

    async fn balance(&self, address: &str, denom: &str) -> Result<u128> {
        let response: LcdBalanceResponse = self
            .get_json(&format!(
                "/cosmos/bank/v1beta1/balances/{}/by_denom?denom={}",
                address, denom
            ))
            .await?;
        response
            .balance
            .amount
            .parse()
            .map_err(|e| Error::UpstreamData(format!("invalid balance amount: {}", e)))
    }

    async fn account(&self, address: &str) -> Result<(u64, u64)> {
        let response: LcdAccountResponse = self
            .get_json(&format!("/cosmos/auth/v1beta1/accounts/{}", address))
            .await?;
        let account_number = response
            .account
            .account_number
            .parse()
            .map_err(|e| Error::UpstreamData(format!("invalid account number: {}", e)))?;
        let sequence = response
            .account
            .sequence
            .parse()
            .map_err(|e| Error::UpstreamData(format!("invalid sequence: {}", e)))?;
        Ok((account_number, sequence))
    }

    async fn broadcast(&self, tx_bytes: &[u8]) -> Result<String> {
        let url = format!("{}/cosmos/tx/v1beta1/txs", self.base_url);
        let body = serde_json::json!({
            "tx_bytes": base64::engine::general_purpose::STANDARD.encode(tx_bytes),
            "mode": "BROADCAST_MODE_SYNC",
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Broadcast(format!("POST {} failed: {}", url, e)))?;

        let parsed: LcdBroadcastResponse = response
            .json()
            .await
            .map_err(|e| Error::Broadcast(format!("invalid broadcast response: {}", e)))?;

        if parsed.tx_response.code != 0 {
            return Err(Error::Broadcast(format!(
                "node rejected tx (code {}): {}",
                parsed.tx_response.code, parsed.tx_response.raw_log
            )));
        }

        Ok(parsed.tx_response.txhash)
    }
}

// ============================================================================
// Cosmos Adapter
// ============================================================================

/// Cosmos SDK chain adapter implementation
#[derive(Debug, Clone)]
pub struct CosmosAdapter {
    config: CosmosConfig,
    lcd: LcdClient,
}

impl CosmosAdapter {
    /// Create a new Cosmos adapter
    pub fn new(config: CosmosConfig) -> Result<Self> {
        let lcd = LcdClient::new(config.lcd_url.clone())?;
        Ok(Self { config, lcd })
    }

    /// Get the configuration
    pub fn config(&self) -> &CosmosConfig {
        &self.config
    }

    fn tendermint_public_key(key: &DerivedKey) -> Result<cosmrs::crypto::PublicKey> {
        let compressed = key.compressed_public_key()?;
        let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&compressed)
            .map_err(|e| Error::Encoding(format!("invalid public key: {}", e)))?;
        Ok(cosmrs::crypto::PublicKey::from(verifying_key))
    }

    fn denom(&self) -> Result<Denom> {
        Denom::from_str(&self.config.denom)
            .map_err(|e| Error::InvalidConfig(format!("invalid denom: {}", e)))
    }

    fn fee_amount(&self, gas_limit: u64) -> u128 {
        (gas_limit as f64 * self.config.gas_price).ceil() as u128
    }

    fn parse_account_id(&self, address: &str) -> Result<AccountId> {
        let account = AccountId::from_str(address)
            .map_err(|e| Error::InvalidConfig(format!("invalid address '{}': {}", address, e)))?;
        if account.prefix() != self.config.account_prefix {
            return Err(Error::InvalidConfig(format!(
                "address '{}' has prefix '{}', expected '{}'",
                address,
                account.prefix(),
                self.config.account_prefix
            )));
        }
        Ok(account)
    }
}

#[async_trait]
impl ChainAdapter for CosmosAdapter {
    fn chain_type(&self) -> ChainType {
        ChainType::Cosmos
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
        let compressed = crate::kdf::to_compressed(&point);

        let verifying_key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&compressed)
            .map_err(|e| Error::Encoding(format!("invalid public key: {}", e)))?;
        let address = cosmrs::crypto::PublicKey::from(verifying_key)
            .account_id(&self.config.account_prefix)
            .map_err(|e| Error::Encoding(format!("failed to derive address: {}", e)))?;

        Ok(DerivedKey {
            public_key,
            address: address.to_string(),
        })
    }

    async fn get_balance(&self, address: &str) -> Result<Balance> {
        let amount = self.lcd.balance(address, &self.config.denom).await?;
        Ok(Balance::new(
            amount.to_string(),
            self.config.decimals,
            &self.config.symbol,
        ))
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

        let from = self.parse_account_id(&request.from)?;
        let to = self.parse_account_id(&request.to)?;
        let amount = parse_amount(&request.value, self.config.decimals)?;
        let denom = self.denom()?;

        let (account_number, sequence) = match (request.account_number, request.sequence) {
            (Some(number), Some(sequence)) => (number, sequence),
            _ => self.lcd.account(&request.from).await?,
        };

        let msg = MsgSend {
            from_address: from,
            to_address: to,
            amount: vec![Coin {
                denom: denom.clone(),
                amount,
            }],
        }
        .to_any()
        .map_err(|e| Error::Encoding(format!("failed to encode MsgSend: {}", e)))?;

        let memo = request.memo.clone().unwrap_or_default();
        let body = Body::new(vec![msg], memo, 0u32);

        let gas_limit = request.gas_limit.unwrap_or(self.config.default_gas_limit);
        let fee_amount = self.fee_amount(gas_limit);
        let fee = Fee::from_amount_and_gas(
            Coin {
                denom,
                amount: fee_amount,
            },
            gas_limit,
        );

        let public_key = Self::tendermint_public_key(key)?;
        let auth_info = SignerInfo::single_direct(Some(public_key), sequence).auth_info(fee);

        let chain_id = self
            .config
            .chain_id
            .parse()
            .map_err(|e| Error::InvalidConfig(format!("invalid chain id: {}", e)))?;
        let sign_doc = SignDoc::new(&body, &auth_info, &chain_id, account_number)
            .map_err(|e| Error::Encoding(format!("failed to build SignDoc: {}", e)))?;
        let sign_doc_bytes = sign_doc
            .into_bytes()
            .map_err(|e| Error::Encoding(format!("failed to encode SignDoc: {}", e)))?;

        let payload: [u8; 32] = Sha256::digest(&sign_doc_bytes).into();

        let summary = TxSummary {
            from: request.from.clone(),
            to: request.to.clone(),
            value: Balance::new(amount.to_string(), self.config.decimals, &self.config.symbol)
                .formatted,
            estimated_fee: Balance::new(
                fee_amount.to_string(),
                self.config.decimals,
                &self.config.symbol,
            )
            .formatted,
        };

        Ok(UnsignedTx {
            chain: ChainType::Cosmos,
            raw: sign_doc_bytes,
            payloads: vec![SigningPayload { index: 0, payload }],
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
                    reason: "Cosmos transactions take exactly one signature".to_string(),
                })
            }
        };
        if indexed.index != 0 {
            return Err(Error::IndexMismatch {
                index: indexed.index,
                reason: "Cosmos signing payload lives at index 0".to_string(),
            });
        }

        let payload = unsigned
            .payloads
            .first()
            .filter(|p| p.index == 0)
            .map(|p| p.payload)
            .ok_or_else(|| Error::IndexMismatch {
                index: 0,
                reason: "no payload exists at this index".to_string(),
            })?;
        if !crate::signature::verify_recoverable(&payload, &indexed.signature, &key.public_key)? {
            return Err(Error::IndexMismatch {
                index: 0,
                reason: "signature does not verify against the signing payload".to_string(),
            });
        }

        // The unsigned form is the SignDoc itself; the broadcastable form is
        // TxRaw over the same body and auth info bytes.
        let sign_doc = cosmrs::proto::cosmos::tx::v1beta1::SignDoc::decode(&unsigned.raw[..])
            .map_err(|e| Error::Encoding(format!("failed to decode SignDoc: {}", e)))?;

        let tx_raw = cosmrs::proto::cosmos::tx::v1beta1::TxRaw {
            body_bytes: sign_doc.body_bytes,
            auth_info_bytes: sign_doc.auth_info_bytes,
            signatures: vec![indexed.signature.to_raw_bytes()?.to_vec()],
        };
        let raw = tx_raw.encode_to_vec();

        // Cosmos tx hash is the SHA-256 of the TxRaw bytes, upper-case hex
        let hash: [u8; 32] = Sha256::digest(&raw).into();

        Ok(SignedTx {
            chain: ChainType::Cosmos,
            raw,
            tx_hash: hex::encode_upper(hash),
        })
    }

    async fn broadcast(&self, signed: &SignedTx) -> Result<TxHash> {
        let txhash = self.lcd.broadcast(&signed.raw).await?;
        let explorer_url = self.explorer_tx_url(&txhash);

        Ok(TxHash {
            hash: txhash,
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
