//! Compute backends that run build jobs in isolation

pub mod docker;
pub mod in_process;
pub mod process;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::PlatformError;
use crate::models::deployment::{BuildRequest, DeploymentId};

/// Environment variable carrying the deployment ID into a build job
pub const ENV_DEPLOYMENT_ID: &str = "DEPLOYMENT_ID";

/// Environment variable carrying the source repository URL into a build job
pub const ENV_REPOSITORY_URL: &str = "REPOSITORY_URL";

/// Everything a build job is told at launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobContext {
    pub deployment_id: DeploymentId,
    pub repository_url: String,
}

impl JobContext {
    pub fn new(deployment_id: DeploymentId, repository_url: impl Into<String>) -> Self {
        Self {
            deployment_id,
            repository_url: repository_url.into(),
        }
    }

    /// Environment entries injected into the job
    pub fn env(&self) -> Vec<(String, String)> {
        vec![
            (ENV_DEPLOYMENT_ID.to_string(), self.deployment_id.to_string()),
            (ENV_REPOSITORY_URL.to_string(), self.repository_url.clone()),
        ]
    }

    /// Read the context back inside the job
    pub fn from_env() -> Result<Self, PlatformError> {
        let read = |key: &str| {
            std::env::var(key)
                .map_err(|_| PlatformError::ConfigError(format!("{} is not set", key)))
        };
        Self::from_vars(&read(ENV_DEPLOYMENT_ID)?, &read(ENV_REPOSITORY_URL)?)
    }

    pub fn from_vars(deployment_id: &str, repository_url: &str) -> Result<Self, PlatformError> {
        let deployment_id = DeploymentId::parse(deployment_id)
            .map_err(|e| PlatformError::ConfigError(e.to_string()))?;
        if repository_url.trim().is_empty() {
            return Err(PlatformError::ConfigError(format!("{} is empty", ENV_REPOSITORY_URL)));
        }
        Ok(Self::new(deployment_id, repository_url))
    }
}

impl From<BuildRequest> for JobContext {
    fn from(request: BuildRequest) -> Self {
        Self::new(request.deployment_id, request.repository_url)
    }
}

/// Handle to a launched job. Launching never waits for the job to finish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    /// Backend name
    pub backend: String,
    /// Backend-specific job identifier (container ID, PID, task name)
    pub job_id: String,
}

/// Capability to launch one isolated build job
#[async_trait]
pub trait ComputeBackend: Send + Sync {
    /// Launch a job for `context`. Returns once the backend has accepted it.
    ///
    /// Fails with `ComputeBackendUnavailable` when the backend cannot be
    /// reached or authorized and `LaunchFailed` when it rejects the job.
    async fn launch_isolated_job(&self, context: &JobContext) -> Result<JobHandle, PlatformError>;
}
