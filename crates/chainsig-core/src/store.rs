//! Pending Transaction Storage
//!
//! Unsigned transactions wait on an external signing round that can take
//! seconds to minutes, so they need a place to live between `build` and
//! `add_signature`. Backends:
//!
//! - **MemoryTransactionStore**: in-process map (testing, short-lived flows)
//! - **FileTransactionStore**: JSON files on disk (CLI tools, restarts)
//!
//! Nothing stored here is secret: an unsigned transaction and its signing
//! payloads are exactly what gets sent to the signing network.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chainsig_core::store::{MemoryTransactionStore, TransactionStore};
//!
//! let store = MemoryTransactionStore::new();
//! store.put(&request.request_id, &unsigned).await?;
//! // ... signing round ...
//! let unsigned = store.get(&request.request_id).await?;
//! ```

use crate::chain::UnsignedTx;
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Trait for pending transaction storage backends
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Store an unsigned transaction under an id
    async fn put(&self, id: &str, tx: &UnsignedTx) -> Result<()>;

    /// Load an unsigned transaction
    async fn get(&self, id: &str) -> Result<UnsignedTx>;

    /// Remove a transaction (after broadcast or abandonment)
    async fn remove(&self, id: &str) -> Result<()>;

    /// Check if a transaction exists
    async fn exists(&self, id: &str) -> Result<bool>;

    /// List all stored transaction ids
    async fn list(&self) -> Result<Vec<String>>;
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryTransactionStore {
    entries: Arc<RwLock<HashMap<String, UnsignedTx>>>,
}

impl MemoryTransactionStore {
    /// Create a new in-memory store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for MemoryTransactionStore {
    async fn put(&self, id: &str, tx: &UnsignedTx) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(id.to_string(), tx.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<UnsignedTx> {
        let entries = self.entries.read().await;
        entries
            .get(id)
            .cloned()
            .ok_or_else(|| Error::TransactionNotFound(id.to_string()))
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(id);
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.contains_key(id))
    }

    async fn list(&self) -> Result<Vec<String>> {
        let entries = self.entries.read().await;
        Ok(entries.keys().cloned().collect())
    }
}

/// File system store
#[derive(Debug)]
pub struct FileTransactionStore {
    base_path: PathBuf,
}

impl FileTransactionStore {
    /// Create a new file system store
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = base_path.into();

        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }

        Ok(Self { base_path })
    }

    /// Get the file path for a transaction id
    fn tx_path(&self, id: &str) -> PathBuf {
        // Sanitize id to prevent path traversal
        let safe_id = id.replace(['/', '\\', '.', '~'], "_");
        self.base_path.join(format!("{}.tx", safe_id))
    }
}

#[async_trait]
impl TransactionStore for FileTransactionStore {
    async fn put(&self, id: &str, tx: &UnsignedTx) -> Result<()> {
        let path = self.tx_path(id);
        let data = serde_json::to_vec_pretty(tx)?;
        tokio::fs::write(&path, data).await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<UnsignedTx> {
        let path = self.tx_path(id);

        if !path.exists() {
            return Err(Error::TransactionNotFound(id.to_string()));
        }

        let data = tokio::fs::read(&path).await?;
        let tx: UnsignedTx =
            serde_json::from_slice(&data).map_err(|e| Error::Serialization(e.to_string()))?;

        Ok(tx)
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let path = self.tx_path(id);

        if path.exists() {
            tokio::fs::remove_file(&path).await?;
        }

        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool> {
        Ok(self.tx_path(id).exists())
    }

    async fn list(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_path).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("tx") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }

        Ok(ids)
    }
}
