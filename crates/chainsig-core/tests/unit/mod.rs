//! Unit tests module
//!
//! Component tests:
//! - Key derivation through the adapters
//! - Signature normalization and collection
//! - Per-chain transaction building and assembly

pub mod bitcoin_test;
pub mod kdf_test;
pub mod signature_test;
