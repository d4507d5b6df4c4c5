//! Artifact store abstraction

pub mod fs;
pub mod http;
pub mod memory;

use std::path::{Component, Path};

use async_trait::async_trait;

use crate::errors::PlatformError;
use crate::models::deployment::DeploymentId;

/// Object storage capability used by build jobs
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Store `bytes` under `key`, replacing any previous object
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), PlatformError>;
}

/// Key of one artifact: `{deploymentId}/{relativePath}` with forward slashes.
///
/// Only plain path components are accepted, so a key can never escape the
/// deployment's prefix.
pub fn object_key(deployment_id: &DeploymentId, relative_path: &Path) -> Result<String, PlatformError> {
    let mut key = deployment_id.to_string();
    for component in relative_path.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str().ok_or_else(|| {
                    PlatformError::StoreError(format!(
                        "artifact path is not valid UTF-8: {}",
                        relative_path.display()
                    ))
                })?;
                key.push('/');
                key.push_str(part);
            }
            Component::CurDir => {}
            _ => {
                return Err(PlatformError::StoreError(format!(
                    "artifact path must be relative: {}",
                    relative_path.display()
                )))
            }
        }
    }
    if key.len() == deployment_id.as_str().len() {
        return Err(PlatformError::StoreError("artifact path is empty".to_string()));
    }
    Ok(key)
}

/// Content type guessed from the file extension
pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}
