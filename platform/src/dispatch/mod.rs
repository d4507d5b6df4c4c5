//! Deployment dispatcher
//!
//! Validates a build request, allocates its deployment ID, launches the build
//! job and answers with the site URL the build will be served from. It never
//! waits for the build itself.

pub mod ids;
pub mod recorder;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info};
use url::Url;

use crate::compute::{ComputeBackend, JobContext, JobHandle};
use crate::dispatch::ids::{IdSource, RandomIds};
use crate::dispatch::recorder::DeploymentRecorder;
use crate::errors::PlatformError;
use crate::models::deployment::{BuildRequest, DeploymentId, DeploymentRecord, DeploymentStatus};

/// Schemes accepted for repository URLs
const ALLOWED_SCHEMES: &[&str] = &["http", "https", "git", "ssh", "file"];

/// Dispatcher options
#[derive(Debug, Clone)]
pub struct Options {
    /// Scheme of predicted site URLs
    pub site_scheme: String,

    /// Host (and port) that deployment subdomains hang off
    pub site_base_host: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            site_scheme: "http".to_string(),
            site_base_host: "localhost:8080".to_string(),
        }
    }
}

/// Result of a successful dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatched {
    pub deployment_id: DeploymentId,
    pub website_url: String,
    pub job: JobHandle,
}

/// Accepts build requests and hands them to the compute backend
pub struct Dispatcher {
    options: Options,
    compute: Arc<dyn ComputeBackend>,
    ids: Arc<dyn IdSource>,
    recorder: Option<Arc<dyn DeploymentRecorder>>,
}

impl Dispatcher {
    pub fn new(options: Options, compute: Arc<dyn ComputeBackend>) -> Self {
        Self {
            options,
            compute,
            ids: Arc::new(RandomIds::new()),
            recorder: None,
        }
    }

    pub fn with_id_source(mut self, ids: Arc<dyn IdSource>) -> Self {
        self.ids = ids;
        self
    }

    /// Record every dispatched deployment
    pub fn with_recorder(mut self, recorder: Arc<dyn DeploymentRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// URL the deployment's site will be reachable at once its build is done
    pub fn website_url(&self, deployment_id: &DeploymentId) -> String {
        format!(
            "{}://{}.{}",
            self.options.site_scheme, deployment_id, self.options.site_base_host
        )
    }

    /// Launch a build of `repository_url`
    pub async fn dispatch(&self, repository_url: &str) -> Result<Dispatched, PlatformError> {
        let request = BuildRequest {
            repository_url: validate_repository_url(repository_url)?,
            deployment_id: self.ids.next_id()?,
        };
        let context = JobContext::from(request);
        let JobContext {
            deployment_id,
            repository_url,
        } = context.clone();

        let job = self
            .compute
            .launch_isolated_job(&context)
            .await
            .inspect_err(|e| error!("Unable to launch build {}: {}", deployment_id, e))?;

        let website_url = self.website_url(&deployment_id);
        info!(
            "Dispatched deployment {} ({} job {}) for {}",
            deployment_id, job.backend, job.job_id, repository_url
        );

        if let Some(recorder) = &self.recorder {
            let recorder = recorder.clone();
            let record = DeploymentRecord {
                deployment_id: deployment_id.clone(),
                repository_url,
                website_url: website_url.clone(),
                status: DeploymentStatus::Queued,
                created_at: Utc::now(),
            };
            tokio::spawn(async move {
                if let Err(e) = recorder.record(&record).await {
                    error!("Unable to save deployment {}: {}", record.deployment_id, e);
                }
            });
        }

        Ok(Dispatched {
            deployment_id,
            website_url,
            job,
        })
    }
}

/// Check that `raw` names a repository git could clone.
///
/// Accepts URLs with an allowed scheme and a repository path, and scp-style
/// `user@host:path` locations. Returns the trimmed URL.
pub fn validate_repository_url(raw: &str) -> Result<String, PlatformError> {
    let candidate = raw.trim();
    if candidate.is_empty() {
        return Err(PlatformError::InvalidRequest("repository URL is empty".to_string()));
    }
    if candidate.starts_with('-') || candidate.chars().any(char::is_whitespace) {
        return Err(invalid_url(candidate));
    }

    if candidate.contains("://") {
        let url = Url::parse(candidate).map_err(|_| invalid_url(candidate))?;
        if !ALLOWED_SCHEMES.contains(&url.scheme()) {
            return Err(invalid_url(candidate));
        }
        let has_host = url.host_str().is_some_and(|h| !h.is_empty());
        let has_path = !url.path().trim_matches('/').is_empty();
        let ok = match url.scheme() {
            "file" => has_path,
            _ => has_host && has_path,
        };
        return if ok {
            Ok(candidate.to_string())
        } else {
            Err(invalid_url(candidate))
        };
    }

    // scp-like syntax: git@github.com:owner/repo.git
    match candidate.split_once(':') {
        Some((user_host, path)) if !path.trim_matches('/').is_empty() => {
            match user_host.split_once('@') {
                Some((user, host)) if !user.is_empty() && !host.is_empty() => {
                    Ok(candidate.to_string())
                }
                _ => Err(invalid_url(candidate)),
            }
        }
        _ => Err(invalid_url(candidate)),
    }
}

fn invalid_url(candidate: &str) -> PlatformError {
    PlatformError::InvalidRequest(format!("not a valid repository URL: {}", candidate))
}
