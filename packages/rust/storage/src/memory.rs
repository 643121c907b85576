//! Process-local blob store for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use slidecast_shared::{Result, SlidecastError};

use crate::BlobStore;

/// In-memory [`BlobStore`] backed by an ordered map.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, in lexical order.
    pub fn keys(&self) -> Vec<String> {
        self.blobs
            .read()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| SlidecastError::Storage("memory store lock poisoned".into()))?;
        blobs
            .get(key)
            .cloned()
            .ok_or_else(|| SlidecastError::missing(key))
    }

    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut blobs = self
            .blobs
            .write()
            .map_err(|_| SlidecastError::Storage("memory store lock poisoned".into()))?;
        blobs.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let blobs = self
            .blobs
            .read()
            .map_err(|_| SlidecastError::Storage("memory store lock poisoned".into()))?;
        Ok(blobs.contains_key(key))
    }
}
