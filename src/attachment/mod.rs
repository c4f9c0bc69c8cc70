//! Attachment resolution: file identifiers to bytes.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{ParleyError, Result};

/// Read access to uploaded files.
#[async_trait]
pub trait FileStore: Send + Sync {
    async fn exists(&self, id: &str) -> Result<bool>;

    async fn read(&self, id: &str) -> Result<Vec<u8>>;
}

/// Files stored under a root directory, addressed by relative path.
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, id: &str) -> Result<PathBuf> {
        let relative = Path::new(id.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(ParleyError::invalid_input(format!("invalid file id: {id}")));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn exists(&self, id: &str) -> Result<bool> {
        let path = self.resolve(id)?;
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn read(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.resolve(id)?;
        Ok(tokio::fs::read(path).await?)
    }
}

/// Read a file and encode it for inline embedding.
pub async fn read_base64(store: &dyn FileStore, id: &str) -> Result<String> {
    if !store.exists(id).await? {
        return Err(ParleyError::AttachmentNotFound(id.to_string()));
    }
    let bytes = store.read(id).await?;
    Ok(STANDARD.encode(bytes))
}

/// Remote URLs are handed to the model as-is.
pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
