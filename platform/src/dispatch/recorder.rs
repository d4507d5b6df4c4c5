//! Deployment records for the persistence-backed dispatcher

use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::PlatformError;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentRecord;

/// Somewhere to write deployment records
#[async_trait]
pub trait DeploymentRecorder: Send + Sync {
    async fn record(&self, record: &DeploymentRecord) -> Result<(), PlatformError>;
}

/// Appends each record as one JSON line
pub struct JsonlRecorder {
    file: File,
}

impl JsonlRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            file: File::new(path),
        }
    }
}

#[async_trait]
impl DeploymentRecorder for JsonlRecorder {
    async fn record(&self, record: &DeploymentRecord) -> Result<(), PlatformError> {
        self.file.append_json_line(record).await
    }
}
