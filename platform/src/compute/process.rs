//! Local process compute backend
//!
//! Re-executes a build program (by default this binary with `--build`) as a
//! child process per deployment. Isolation is only process-level, so this is
//! meant for single-host installs; the bus must be reachable from the child
//! (MQTT, not the in-memory bus).

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{error, info, warn};

use crate::compute::{ComputeBackend, JobContext, JobHandle};
use crate::errors::PlatformError;

/// Process backend options
#[derive(Debug, Clone)]
pub struct Options {
    /// Program to run; the current executable when `None`
    pub program: Option<PathBuf>,

    /// Arguments passed to the program
    pub args: Vec<String>,

    /// Extra environment passed to every build
    pub extra_env: Vec<(String, String)>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            program: None,
            args: vec!["--build".to_string()],
            extra_env: Vec::new(),
        }
    }
}

/// Launches builds as local child processes
pub struct ProcessBackend {
    options: Options,
}

impl ProcessBackend {
    pub fn new(options: Options) -> Self {
        Self { options }
    }

    fn program(&self) -> Result<PathBuf, PlatformError> {
        match &self.options.program {
            Some(program) => Ok(program.clone()),
            None => std::env::current_exe().map_err(|e| {
                PlatformError::ComputeBackendUnavailable(format!(
                    "cannot locate current executable: {}",
                    e
                ))
            }),
        }
    }
}

#[async_trait]
impl ComputeBackend for ProcessBackend {
    async fn launch_isolated_job(&self, context: &JobContext) -> Result<JobHandle, PlatformError> {
        let program = self.program()?;

        let mut child = Command::new(&program)
            .args(&self.options.args)
            .envs(self.options.extra_env.iter().cloned().chain(context.env()))
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    PlatformError::ComputeBackendUnavailable(format!(
                        "cannot run {}: {}",
                        program.display(),
                        e
                    ))
                }
                _ => PlatformError::LaunchFailed(e.to_string()),
            })?;

        let pid = child
            .id()
            .map(|pid| pid.to_string())
            .unwrap_or_else(|| "exited".to_string());
        info!("Started build process {} for deployment {}", pid, context.deployment_id);

        let deployment_id = context.deployment_id.clone();
        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) if status.success() => {
                    info!("Build process for {} finished", deployment_id)
                }
                Ok(status) => warn!("Build process for {} exited with {}", deployment_id, status),
                Err(e) => error!("Failed to wait on build process for {}: {}", deployment_id, e),
            }
        });

        Ok(JobHandle {
            backend: "process".to_string(),
            job_id: pid,
        })
    }
}
