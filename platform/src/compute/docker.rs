//! Docker compute backend
//!
//! Each build runs as a detached, self-removing container started with
//! `docker run`. The image's entrypoint is expected to be this binary; the
//! container command puts it in `--build` mode, and a mounted settings file
//! gives the job the same bus and store as the server.

use std::io::ErrorKind;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::compute::{ComputeBackend, JobContext, JobHandle};
use crate::errors::PlatformError;

/// Where a mounted settings file appears inside build containers
pub const CONTAINER_CONFIG_PATH: &str = "/etc/sitemesh/config.json";

/// Docker backend options
#[derive(Debug, Clone)]
pub struct Options {
    /// Docker CLI to invoke
    pub docker_bin: String,

    /// Build image
    pub image: String,

    /// Prefix of container names; the deployment ID is appended
    pub name_prefix: String,

    /// Network to attach build containers to
    pub network: Option<String>,

    /// Volumes mounted into every build container, in `-v` syntax
    pub volumes: Vec<String>,

    /// Extra environment passed to every build
    pub extra_env: Vec<(String, String)>,

    /// Command passed to the image entrypoint
    pub args: Vec<String>,
}

impl Options {
    /// Mount the settings file at `host_path` into build containers and
    /// point the job at it
    pub fn with_config_file(mut self, host_path: &str) -> Self {
        let host_path = std::path::absolute(host_path)
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| host_path.to_string());
        self.volumes.push(format!("{}:{}:ro", host_path, CONTAINER_CONFIG_PATH));
        self.args.push(format!("--config={}", CONTAINER_CONFIG_PATH));
        self
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            docker_bin: "docker".to_string(),
            image: "sitemesh-builder:latest".to_string(),
            name_prefix: "sitemesh-build".to_string(),
            network: None,
            volumes: Vec::new(),
            extra_env: Vec::new(),
            args: vec!["--build".to_string()],
        }
    }
}

/// Launches build containers through the Docker CLI
pub struct DockerBackend {
    options: Options,
}

impl DockerBackend {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    /// Arguments of the `docker run` invocation for `context`
    pub fn run_args(&self, context: &JobContext) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--rm".to_string(),
            "--name".to_string(),
            format!("{}-{}", self.options.name_prefix, context.deployment_id),
        ];
        if let Some(network) = &self.options.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for volume in &self.options.volumes {
            args.push("-v".to_string());
            args.push(volume.clone());
        }
        for (key, value) in self.options.extra_env.iter().cloned().chain(context.env()) {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }
        args.push(self.options.image.clone());
        args.extend(self.options.args.iter().cloned());
        args
    }
}

#[async_trait]
impl ComputeBackend for DockerBackend {
    async fn launch_isolated_job(&self, context: &JobContext) -> Result<JobHandle, PlatformError> {
        debug!("Launching build container for {}", context.deployment_id);

        let output = Command::new(&self.options.docker_bin)
            .args(self.run_args(context))
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    PlatformError::ComputeBackendUnavailable(format!(
                        "cannot run {}: {}",
                        self.options.docker_bin, e
                    ))
                }
                _ => PlatformError::LaunchFailed(format!("docker run failed to start: {}", e)),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_run_failure(stderr.trim()));
        }

        let container_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        info!(
            "Started build container {} for deployment {}",
            container_id, context.deployment_id
        );

        Ok(JobHandle {
            backend: "docker".to_string(),
            job_id: container_id,
        })
    }
}

/// Tell daemon and permission problems apart from rejected jobs
fn classify_run_failure(stderr: &str) -> PlatformError {
    let lower = stderr.to_lowercase();
    let unavailable = [
        "cannot connect to the docker daemon",
        "is the docker daemon running",
        "permission denied while trying to connect",
        "error during connect",
    ];
    if unavailable.iter().any(|needle| lower.contains(needle)) {
        PlatformError::ComputeBackendUnavailable(stderr.to_string())
    } else {
        PlatformError::LaunchFailed(stderr.to_string())
    }
}
