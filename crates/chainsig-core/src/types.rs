//! Core types for multichain signing
//!
//! This module defines the data model shared by every chain adapter:
//! derivation paths, the network root key, derived keys, signing payloads,
//! and the raw/normalized signature representations exchanged with the
//! MPC signing contract.

use crate::{Error, Result};
use k256::{
    elliptic_curve::sec1::FromEncodedPoint,
    AffinePoint, EncodedPoint, ProjectivePoint,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported blockchain families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// Ethereum and EVM-compatible chains
    Evm,
    /// Bitcoin
    Bitcoin,
    /// Cosmos SDK chains
    Cosmos,
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainType::Evm => write!(f, "EVM"),
            ChainType::Bitcoin => write!(f, "Bitcoin"),
            ChainType::Cosmos => write!(f, "Cosmos"),
        }
    }
}

/// Identifies one derived key under the network root key.
///
/// A path combines the requesting account (the contract predecessor) with an
/// arbitrary caller-chosen label. The pair is hashed into a scalar offset, so
/// distinct `(predecessor, path)` pairs yield distinct keys and the same pair
/// always yields the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DerivationPath {
    /// Account that requests signatures for this key
    pub predecessor: String,
    /// Caller-chosen label, e.g. `"bitcoin-1"` or `"acct-1"`
    pub path: String,
}

impl DerivationPath {
    /// Create a new derivation path
    pub fn new(predecessor: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            predecessor: predecessor.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.predecessor, self.path)
    }
}

/// The MPC network's secp256k1 custody key for a given key version.
///
/// Fetched once from the signing contract and passed into derivation; this
/// type never touches the network itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootPublicKey {
    bytes: Vec<u8>,
}

impl RootPublicKey {
    /// Parse a SEC1-encoded public key (33-byte compressed or 65-byte
    /// uncompressed).
    pub fn from_sec1_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 33 && bytes.len() != 65 {
            return Err(Error::Derivation {
                path: "<root>".to_string(),
                reason: format!("invalid root key length: {}", bytes.len()),
            });
        }
        // Reject bytes that do not decode to a curve point up front.
        Self::parse_point(bytes)?;
        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Parse from a hex string, with or without a `0x` prefix
    pub fn from_hex(s: &str) -> Result<Self> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        Self::from_sec1_bytes(&bytes)
    }

    /// SEC1 bytes as supplied at construction
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Decode into a curve point
    pub fn to_point(&self) -> Result<ProjectivePoint> {
        Self::parse_point(&self.bytes)
    }

    fn parse_point(bytes: &[u8]) -> Result<ProjectivePoint> {
        let encoded = EncodedPoint::from_bytes(bytes).map_err(|e| Error::Derivation {
            path: "<root>".to_string(),
            reason: format!("invalid SEC1 encoding: {}", e),
        })?;
        let affine: Option<AffinePoint> = AffinePoint::from_encoded_point(&encoded).into();
        let affine = affine.ok_or_else(|| Error::Derivation {
            path: "<root>".to_string(),
            reason: "bytes do not encode a curve point".to_string(),
        })?;
        Ok(ProjectivePoint::from(affine))
    }
}

/// A key derived from the root key for one derivation path.
///
/// Fully recomputable from `(RootPublicKey, DerivationPath)`; nothing here
/// needs to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedKey {
    /// Uncompressed SEC1 public key (65 bytes, `04` prefix)
    #[serde(with = "hex")]
    pub public_key: Vec<u8>,
    /// Chain-native address encoding of the public key
    pub address: String,
}

impl DerivedKey {
    /// Compressed SEC1 form of the public key (33 bytes, `02`/`03` prefix)
    pub fn compressed_public_key(&self) -> Result<[u8; 33]> {
        crate::kdf::compress_sec1(&self.public_key)
    }
}

/// Raw threshold-signature result returned by the MPC signing contract.
///
/// `big_r` is the compressed SEC1 encoding of the signature's R point and
/// `s` the scalar component, both hex. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MpcSignature {
    /// Compressed affine point R (33 bytes, hex)
    pub big_r: String,
    /// Scalar s (32 bytes, hex)
    pub s: String,
    /// Recovery indicator
    pub recovery_id: u8,
}

/// Chain-agnostic (r, s, v) signature triple.
///
/// `r` and `s` are 32-byte big-endian scalars in hex; `v` carries the
/// recovery indicator verbatim from the MPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedSignature {
    /// R component (32-byte hex)
    pub r: String,
    /// S component (32-byte hex)
    pub s: String,
    /// Recovery indicator (0 or 1)
    pub v: u8,
}

impl NormalizedSignature {
    /// Create a new normalized signature
    pub fn new(r: impl Into<String>, s: impl Into<String>, v: u8) -> Self {
        Self {
            r: r.into(),
            s: s.into(),
            v,
        }
    }

    /// R component as a left-padded 32-byte array
    pub fn r_bytes(&self) -> Result<[u8; 32]> {
        component_bytes(&self.r)
    }

    /// S component as a left-padded 32-byte array
    pub fn s_bytes(&self) -> Result<[u8; 32]> {
        component_bytes(&self.s)
    }

    /// Raw 64-byte `r || s` encoding used by Bitcoin (compact) and Cosmos
    /// (SIGN_MODE_DIRECT). Each component is left-padded to 32 bytes; the
    /// result is exactly 64 bytes or an error.
    pub fn to_raw_bytes(&self) -> Result<[u8; 64]> {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.r_bytes()?);
        out[32..].copy_from_slice(&self.s_bytes()?);
        Ok(out)
    }

    /// EIP-155 `v` value for legacy EVM transactions
    pub fn legacy_v(&self, chain_id: u64) -> u64 {
        self.v as u64 + 35 + chain_id * 2
    }

    /// Y-parity bit for typed (EIP-1559) EVM transactions
    pub fn y_parity(&self) -> u8 {
        self.v & 1
    }
}

fn component_bytes(s: &str) -> Result<[u8; 32]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    if bytes.len() > 32 {
        return Err(Error::InvalidSignatureLength {
            expected: 32,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}

/// A normalized signature tagged with the transaction input it belongs to.
///
/// The tag is what lets multi-input assembly accept signatures in any order
/// while still failing loudly on a wrong pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSignature {
    /// Index of the signing payload this signature answers
    pub index: u32,
    /// The normalized signature
    pub signature: NormalizedSignature,
}

/// One independent byte sequence that must be signed by the MPC network.
///
/// For single-signature chains there is exactly one payload with index 0.
/// For multi-input Bitcoin transactions there is one payload per input, and
/// index order must be preserved end to end so each signature lands on its
/// own input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningPayload {
    /// Position of the transaction input this payload belongs to
    pub index: u32,
    /// 32-byte signing hash
    pub payload: [u8; 32],
}

/// An unspent output supplied to (or fetched for) a Bitcoin transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    /// Funding transaction id (hex)
    pub txid: String,
    /// Output index within the funding transaction
    pub vout: u32,
    /// Value in satoshis
    pub value: u64,
}

/// Parameters for building a transfer on any supported chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Unique request ID
    pub request_id: String,

    /// Target chain
    pub chain: ChainType,

    /// Sender address (must match the derived key in use)
    pub from: String,

    /// Recipient address
    pub to: String,

    /// Amount to send. Either an integer in the chain's smallest unit or a
    /// decimal in whole units (`"1.5"`).
    pub value: String,

    /// Contract call data (EVM)
    #[serde(default)]
    pub data: Option<Vec<u8>>,

    /// Gas limit override (EVM/Cosmos)
    #[serde(default)]
    pub gas_limit: Option<u64>,

    /// Max fee per gas override (EVM, wei)
    #[serde(default)]
    pub max_fee_per_gas: Option<u128>,

    /// Max priority fee per gas override (EVM, wei)
    #[serde(default)]
    pub max_priority_fee_per_gas: Option<u128>,

    /// Nonce override (EVM)
    #[serde(default)]
    pub nonce: Option<u64>,

    /// Spendable outputs (Bitcoin). Fetched from the UTXO provider when
    /// absent.
    #[serde(default)]
    pub utxos: Option<Vec<Utxo>>,

    /// Fee rate override in sat/vB (Bitcoin)
    #[serde(default)]
    pub fee_rate: Option<f64>,

    /// Transaction memo (Cosmos)
    #[serde(default)]
    pub memo: Option<String>,

    /// Account number override (Cosmos)
    #[serde(default)]
    pub account_number: Option<u64>,

    /// Sequence override (Cosmos)
    #[serde(default)]
    pub sequence: Option<u64>,

    /// Request timestamp (Unix seconds)
    pub timestamp: i64,
}

impl TransferRequest {
    /// Create a new transfer request
    pub fn new(
        chain: ChainType,
        from: impl Into<String>,
        to: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            chain,
            from: from.into(),
            to: to.into(),
            value: value.into(),
            data: None,
            gas_limit: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
            nonce: None,
            utxos: None,
            fee_rate: None,
            memo: None,
            account_number: None,
            sequence: None,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Add contract call data
    pub fn with_data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    /// Set the gas limit
    pub fn with_gas_limit(mut self, gas_limit: u64) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }

    /// Set EIP-1559 fee fields
    pub fn with_fees(mut self, max_fee: u128, max_priority_fee: u128) -> Self {
        self.max_fee_per_gas = Some(max_fee);
        self.max_priority_fee_per_gas = Some(max_priority_fee);
        self
    }

    /// Set the nonce
    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Supply spendable outputs explicitly
    pub fn with_utxos(mut self, utxos: Vec<Utxo>) -> Self {
        self.utxos = Some(utxos);
        self
    }

    /// Set the fee rate in sat/vB
    pub fn with_fee_rate(mut self, rate: f64) -> Self {
        self.fee_rate = Some(rate);
        self
    }

    /// Set a Cosmos memo
    pub fn with_memo(mut self, memo: impl Into<String>) -> Self {
        self.memo = Some(memo.into());
        self
    }

    /// Set Cosmos account metadata
    pub fn with_account(mut self, account_number: u64, sequence: u64) -> Self {
        self.account_number = Some(account_number);
        self.sequence = Some(sequence);
        self
    }
}
