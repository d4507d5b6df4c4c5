//! Directory operations

use std::path::{Path, PathBuf};

use tokio::fs;
use walkdir::WalkDir;

use crate::errors::PlatformError;

/// A directory wrapper with path
#[derive(Debug, Clone)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    /// Create a new directory reference
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Get the directory path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if the directory exists
    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// Create the directory (and parents)
    pub async fn create(&self) -> Result<(), PlatformError> {
        fs::create_dir_all(&self.path).await?;
        Ok(())
    }

    /// Delete the directory and all contents
    pub async fn delete(&self) -> Result<(), PlatformError> {
        if self.exists().await {
            fs::remove_dir_all(&self.path).await?;
        }
        Ok(())
    }

    /// Every regular file below the directory, recursively, as paths relative
    /// to it. Directories are skipped; the order is stable (sorted by name).
    pub async fn walk_files(&self) -> Result<Vec<PathBuf>, PlatformError> {
        let root = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let mut files = Vec::new();
            for entry in WalkDir::new(&root).sort_by_file_name() {
                let entry = entry.map_err(|e| PlatformError::IoError(e.into()))?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry
                    .path()
                    .strip_prefix(&root)
                    .map_err(|e| PlatformError::Internal(e.to_string()))?;
                files.push(relative.to_path_buf());
            }
            Ok(files)
        })
        .await
        .map_err(|e| PlatformError::Internal(e.to_string()))?
    }
}
