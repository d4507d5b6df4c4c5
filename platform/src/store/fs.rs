//! Filesystem artifact store

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::errors::PlatformError;
use crate::filesys::file::File;
use crate::store::ArtifactStore;

/// Stores each object as a file at `{root}/{key}`.
///
/// Content types are not persisted; whatever serves the directory derives
/// them from the extension again.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read back the object stored under `key`
    pub async fn get_object(&self, key: &str) -> Result<Vec<u8>, PlatformError> {
        File::new(self.object_path(key)?).read_bytes().await
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, PlatformError> {
        let mut path = self.root.clone();
        for part in key.split('/') {
            if part.is_empty() || part == "." || part == ".." {
                return Err(PlatformError::StoreError(format!("invalid object key: {}", key)));
            }
            path.push(part);
        }
        Ok(path)
    }
}

#[async_trait]
impl ArtifactStore for FsStore {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PlatformError> {
        let file = File::new(self.object_path(key)?);
        debug!("Writing {} ({}, {} bytes)", file.path().display(), content_type, bytes.len());
        file.write_bytes(&bytes)
            .await
            .map_err(|e| PlatformError::StoreError(format!("{}: {}", key, e)))
    }
}
