//! Storage collaborator boundary.
//!
//! The engine only needs `read(id) -> bytes` and `write(bytes) -> id`; the
//! real storage backend lives outside this crate. Both implementations here
//! are content-addressed: `write` returns the SHA-256 of the bytes, so a
//! stored object can never be silently replaced.

use std::{collections::HashMap, path::PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::{fs, sync::RwLock};
use tracing::debug;

use crate::error::{DocumentError, Error, Result};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read(&self, id: &str) -> Result<Vec<u8>>;
    async fn write(&self, bytes: Vec<u8>) -> Result<String>;
}

/// In-memory store, for tests and embedded use.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, id: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DocumentError::NotFound(id.to_string()).into())
    }

    async fn write(&self, bytes: Vec<u8>) -> Result<String> {
        let id = hex::encode(Sha256::digest(&bytes));
        self.objects.write().await.insert(id.clone(), bytes);
        Ok(id)
    }
}

/// Flat-directory file store addressed by content digest.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    async fn read(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.root.join(id);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(DocumentError::NotFound(id.to_string()).into())
            }
            Err(e) => Err(Error::Storage(format!("read {}: {e}", path.display()))),
        }
    }

    async fn write(&self, bytes: Vec<u8>) -> Result<String> {
        let id = hex::encode(Sha256::digest(&bytes));
        let path = self.root.join(&id);
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| Error::Storage(format!("mkdir {}: {e}", self.root.display())))?;
        fs::write(&path, &bytes)
            .await
            .map_err(|e| Error::Storage(format!("write {}: {e}", path.display())))?;
        debug!(id = %id, "stored document");
        Ok(id)
    }
}
