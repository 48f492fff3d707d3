//! Error types for chain adapter operations

use thiserror::Error;

/// Result type alias for chain adapter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while deriving keys, building transactions,
/// or reassembling signatures
#[derive(Debug, Error)]
pub enum Error {
    // ============ Key Derivation Errors ============
    /// Malformed or degenerate key material
    #[error("Key derivation failed for '{path}': {reason}")]
    Derivation { path: String, reason: String },

    // ============ Collaborator Errors ============
    /// A balance/fee/UTXO provider returned missing or invalid data
    #[error("Upstream data unavailable: {0}")]
    UpstreamData(String),

    /// The MPC signing contract failed or returned an invalid response
    #[error("MPC signer error: {0}")]
    Upstream(String),

    /// The broadcast endpoint rejected or failed to relay the transaction
    #[error("Broadcast failed: {0}")]
    Broadcast(String),

    // ============ Transaction Building Errors ============
    /// Requested value exceeds available funds after fees
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: String, available: String },

    /// Malformed addresses, scripts, or wire encodings
    #[error("Encoding error: {0}")]
    Encoding(String),

    // ============ Signature Assembly Errors ============
    /// A chain-native signature did not serialize to its required length
    #[error("Invalid signature length: expected {expected} bytes, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    /// A signature was supplied under an index it does not belong to
    #[error("Signature index {index} rejected: {reason}")]
    IndexMismatch { index: u32, reason: String },

    /// Attempted to serialize a transaction with unsigned inputs remaining
    #[error("Incomplete signature set: input {index} has no signature")]
    IncompleteSignature { index: u32 },

    // ============ Configuration / Infrastructure ============
    /// Invalid adapter configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// No transaction stored under the given key
    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for Error {
    fn from(e: hex::FromHexError) -> Self {
        Error::Encoding(e.to_string())
    }
}
