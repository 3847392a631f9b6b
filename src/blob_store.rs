//! Document Storage Abstraction
//!
//! The workflow engine hands uploaded bytes to a `DocumentStorage` and keeps
//! only the identifier it returns. Local filesystem for single-node
//! deployments; an in-memory store for tests and ephemeral runs.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// File extensions accepted for project documents and CPD evidence
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "png", "jpg", "jpeg", "gif",
];

/// Error type for document storage operations
#[derive(Debug, thiserror::Error)]
pub enum BlobStoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid stored identifier: {0}")]
    InvalidRef(String),

    #[error("Stored document not found: {0}")]
    NotFound(String),
}

/// Lower-cased extension if it is on the allow list
pub fn allowed_extension(filename: &str) -> Option<String> {
    let ext = Path::new(filename)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Reduce a client-supplied filename to `[A-Za-z0-9._-]`, no path components
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Abstract storage for document binaries
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    /// Store bytes under a fresh identifier derived from the original name
    async fn store(&self, original_filename: &str, content: &[u8])
        -> Result<String, BlobStoreError>;

    async fn fetch(&self, stored_id: &str) -> Result<Vec<u8>, BlobStoreError>;

    /// Idempotent
    async fn delete(&self, stored_id: &str) -> Result<(), BlobStoreError>;

    async fn exists(&self, stored_id: &str) -> Result<bool, BlobStoreError>;
}

/// Upload directory on the local filesystem.
///
/// Files are written flat as `{uuid}_{sanitized_name}`; the stored identifier
/// is that file name.
pub struct LocalDocumentStorage {
    upload_dir: PathBuf,
}

impl LocalDocumentStorage {
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    fn path_for(&self, stored_id: &str) -> Result<PathBuf, BlobStoreError> {
        if stored_id.is_empty()
            || stored_id.contains(['/', '\\'])
            || stored_id.starts_with('.')
        {
            return Err(BlobStoreError::InvalidRef(stored_id.to_string()));
        }
        Ok(self.upload_dir.join(stored_id))
    }
}

#[async_trait]
impl DocumentStorage for LocalDocumentStorage {
    async fn store(
        &self,
        original_filename: &str,
        content: &[u8],
    ) -> Result<String, BlobStoreError> {
        tokio::fs::create_dir_all(&self.upload_dir).await?;

        let stored_id = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_filename));
        let path = self.path_for(&stored_id)?;
        tokio::fs::write(&path, content).await?;

        tracing::debug!(stored_id = %stored_id, bytes = content.len(), "Stored document");
        Ok(stored_id)
    }

    async fn fetch(&self, stored_id: &str) -> Result<Vec<u8>, BlobStoreError> {
        let path = self.path_for(stored_id)?;

        if !tokio::fs::try_exists(&path).await? {
            return Err(BlobStoreError::NotFound(stored_id.to_string()));
        }

        Ok(tokio::fs::read(path).await?)
    }

    async fn delete(&self, stored_id: &str) -> Result<(), BlobStoreError> {
        let path = self.path_for(stored_id)?;

        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(path).await?;
        }

        Ok(())
    }

    async fn exists(&self, stored_id: &str) -> Result<bool, BlobStoreError> {
        let path = self.path_for(stored_id)?;
        Ok(tokio::fs::try_exists(path).await?)
    }
}

/// In-memory document storage (tests, ephemeral deployments)
#[derive(Default, Clone)]
pub struct MemoryDocumentStorage {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryDocumentStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }
}

#[async_trait]
impl DocumentStorage for MemoryDocumentStorage {
    async fn store(
        &self,
        original_filename: &str,
        content: &[u8],
    ) -> Result<String, BlobStoreError> {
        let stored_id = format!("{}_{}", Uuid::new_v4(), sanitize_filename(original_filename));
        let mut blobs = self.blobs.write().await;
        blobs.insert(stored_id.clone(), content.to_vec());
        Ok(stored_id)
    }

    async fn fetch(&self, stored_id: &str) -> Result<Vec<u8>, BlobStoreError> {
        let blobs = self.blobs.read().await;
        blobs
            .get(stored_id)
            .cloned()
            .ok_or_else(|| BlobStoreError::NotFound(stored_id.to_string()))
    }

    async fn delete(&self, stored_id: &str) -> Result<(), BlobStoreError> {
        let mut blobs = self.blobs.write().await;
        blobs.remove(stored_id);
        Ok(())
    }

    async fn exists(&self, stored_id: &str) -> Result<bool, BlobStoreError> {
        let blobs = self.blobs.read().await;
        Ok(blobs.contains_key(stored_id))
    }
}
