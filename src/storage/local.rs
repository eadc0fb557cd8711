//! Local filesystem backend.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use super::{StorageBackend, StorageError, StorageKey};
use crate::normalize::EncodedImage;

/// Stores images as files under a root directory.
///
/// Keys are full paths (`<root>/<sha1>.jpg`), so the value returned to
/// callers can be opened directly.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    /// Creates the backend, creating `root` and its parents if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Io`] if the directory cannot be created.
    #[instrument(level = "debug", skip_all, fields(root = %root.as_ref().display()))]
    pub fn new(root: impl AsRef<Path>) -> Result<Self, StorageError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| StorageError::io(root.clone(), e))?;
        debug!("local storage ready");
        Ok(Self { root })
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    fn kind(&self) -> &'static str {
        "local"
    }

    fn resolve(&self, relative: &str) -> StorageKey {
        StorageKey::new(self.root.join(relative).to_string_lossy().into_owned())
    }

    async fn exists(&self, key: &StorageKey) -> Result<bool, StorageError> {
        let path = Path::new(key.as_str());
        tokio::fs::try_exists(path)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn save(&self, image: &EncodedImage, key: &StorageKey) -> Result<(), StorageError> {
        let path = Path::new(key.as_str());
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }

        let partial = partial_path(path);
        if let Err(error) = write_file(&partial, image.bytes()).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(error);
        }

        tokio::fs::rename(&partial, path).await.map_err(|e| {
            let _ = std::fs::remove_file(&partial);
            StorageError::io(path, e)
        })?;

        debug!(path = %path.display(), bytes = image.len(), "image saved");
        Ok(())
    }

    async fn load(&self, key: &StorageKey) -> Result<Vec<u8>, StorageError> {
        let path = Path::new(key.as_str());
        tokio::fs::read(path).await.map_err(|e| StorageError::io(path, e))
    }

    async fn delete(&self, key: &StorageKey) -> Result<(), StorageError> {
        let path = Path::new(key.as_str());
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "image removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }
}

/// Sibling path the image is written to before being renamed into place.
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{:016x}.part", rand::random::<u64>()))
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.write_all(bytes)
        .await
        .map_err(|e| StorageError::io(path, e))?;
    file.flush().await.map_err(|e| StorageError::io(path, e))?;
    Ok(())
}
