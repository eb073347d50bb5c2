// src/storage.rs
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid destination name: {0}")]
    InvalidName(String),

    #[error("io error writing {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Destination for accepted payloads. Writing the same name twice overwrites,
/// so retries are safe.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Persist `bytes` as `destination` and return a URL it can be read from.
    async fn store(&self, bytes: &[u8], destination: &str) -> Result<String, StorageError>;
}

pub type DynStorage = Arc<dyn Storage>;

/// `<prefix>_<8 hex>.<ext>`
pub fn generated_name(prefix: &str, ext: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}.{}", prefix, &id[..8], ext)
}

fn validate(destination: &str) -> Result<&Path, StorageError> {
    let path = Path::new(destination);
    let ok = !destination.trim().is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if ok {
        Ok(path)
    } else {
        Err(StorageError::InvalidName(destination.to_string()))
    }
}

/// Writes under a base directory and returns `file://` URLs.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base: PathBuf,
}

impl Default for LocalStorage {
    fn default() -> Self {
        Self::new("resources/trend_data")
    }
}

impl LocalStorage {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn store(&self, bytes: &[u8], destination: &str) -> Result<String, StorageError> {
        let rel = validate(destination)?;
        let path = self.base.join(rel);
        let io_err = |source| StorageError::Io {
            path: path.display().to_string(),
            source,
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }
        tokio::fs::write(&path, bytes).await.map_err(io_err)?;

        let abs = tokio::fs::canonicalize(&path).await.unwrap_or(path.clone());
        Ok(format!("file://{}", abs.display()))
    }
}

/// In-memory store for tests and dry runs; URLs are `mem://<name>`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.objects.lock().ok()?.get(name).cloned()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn store(&self, bytes: &[u8], destination: &str) -> Result<String, StorageError> {
        validate(destination)?;
        if let Ok(mut m) = self.objects.lock() {
            m.insert(destination.to_string(), bytes.to_vec());
        }
        Ok(format!("mem://{}", destination))
    }
}
