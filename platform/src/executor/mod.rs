//! Build executor
//!
//! Runs once per launched job: fetch the source, build it, upload every file
//! of the build output, and narrate each step on the deployment's log
//! channel. A failed step ends the job; the failure reaches the user only as
//! an ERROR event.

pub mod command;
pub mod publisher;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::bus::MessageBus;
use crate::compute::JobContext;
use crate::errors::PlatformError;
use crate::executor::publisher::EventPublisher;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;
use crate::store::{content_type_for, object_key, ArtifactStore};

pub const MSG_BUILD_STARTED: &str = "Building the application ...";
pub const MSG_BUILD_COMPLETED: &str = "Build completed.";
pub const MSG_ARTIFACTS_UPLOADED: &str = "Build artifacts are uploaded successfully.";

/// Executor options
#[derive(Debug, Clone)]
pub struct Options {
    /// Parent of the per-deployment working directories
    pub workspace_root: PathBuf,

    /// Build an already checked-out tree here instead of cloning
    pub source_dir: Option<PathBuf>,

    /// Build output directory, relative to the source tree
    pub output_dir: PathBuf,

    /// Shell used to run the build command
    pub shell: String,

    /// Build command
    pub build_command: String,

    /// Git CLI used for cloning
    pub git_bin: String,

    /// Remove the working directory when the job ends
    pub cleanup: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("sitemesh-builds"),
            source_dir: None,
            output_dir: PathBuf::from("dist"),
            shell: "sh".to_string(),
            build_command: "npm install && npm run build".to_string(),
            git_bin: "git".to_string(),
            cleanup: true,
        }
    }
}

/// What a successful build produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSummary {
    /// Object keys written, in upload order
    pub uploaded: Vec<String>,
}

/// Executes one build job
pub struct BuildExecutor {
    context: JobContext,
    options: Options,
    publisher: EventPublisher,
    store: Arc<dyn ArtifactStore>,
}

impl BuildExecutor {
    pub fn new(
        context: JobContext,
        options: Options,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let publisher = EventPublisher::new(bus, &context.deployment_id);
        Self {
            context,
            options,
            publisher,
            store,
        }
    }

    pub fn context(&self) -> &JobContext {
        &self.context
    }

    /// Run the job to completion. On failure an ERROR event has already been
    /// published when this returns.
    pub async fn run(&self) -> Result<BuildSummary, PlatformError> {
        self.publisher
            .info(format!(
                "Starting deployment {} of {}",
                self.context.deployment_id, self.context.repository_url
            ))
            .await;

        let workdir = Dir::new(
            self.options
                .workspace_root
                .join(self.context.deployment_id.as_str()),
        );

        let result = self.execute(&workdir).await;
        if let Err(e) = &result {
            self.publisher.error(error_message(e)).await;
        }

        if self.options.cleanup && self.options.source_dir.is_none() {
            if let Err(e) = workdir.delete().await {
                warn!("Failed to remove {}: {}", workdir.path().display(), e);
            }
        }

        result
    }

    async fn execute(&self, workdir: &Dir) -> Result<BuildSummary, PlatformError> {
        let source_dir = match &self.options.source_dir {
            Some(dir) => dir.clone(),
            None => {
                workdir.delete().await?;
                workdir.create().await?;
                let target = workdir.path().join("source");
                self.publisher
                    .info(format!("Cloning {} ...", self.context.repository_url))
                    .await;
                command::clone_repository(
                    &self.options.git_bin,
                    &self.context.repository_url,
                    &target,
                    &self.publisher,
                )
                .await?;
                target
            }
        };

        self.publisher.info(MSG_BUILD_STARTED).await;
        command::run_build(
            &self.options.shell,
            &self.options.build_command,
            &source_dir,
            &self.publisher,
        )
        .await?;
        self.publisher.info(MSG_BUILD_COMPLETED).await;

        let uploaded = self.upload_artifacts(&source_dir).await?;
        self.publisher.info(MSG_ARTIFACTS_UPLOADED).await;

        Ok(BuildSummary { uploaded })
    }

    async fn upload_artifacts(&self, source_dir: &std::path::Path) -> Result<Vec<String>, PlatformError> {
        let output = Dir::new(source_dir.join(&self.options.output_dir));
        if !output.exists().await {
            return Err(PlatformError::BuildError(format!(
                "build output directory not found: {}",
                self.options.output_dir.display()
            )));
        }

        let files = output.walk_files().await.map_err(|e| {
            PlatformError::BuildError(format!("unable to read the build output, {}", e))
        })?;
        self.publisher
            .info(format!("Uploading {} build artifacts ...", files.len()))
            .await;

        let mut uploaded = Vec::with_capacity(files.len());
        for relative in files {
            let key = object_key(&self.context.deployment_id, &relative)
                .map_err(|e| PlatformError::BuildError(e.to_string()))?;
            let content_type = content_type_for(&relative);
            let bytes = File::new(output.path().join(&relative))
                .read_bytes()
                .await
                .map_err(|e| {
                    PlatformError::BuildError(format!("unable to read {}, {}", relative.display(), e))
                })?;

            debug!("Uploading {} with content-type: {}", key, content_type);
            self.store
                .put_object(&key, bytes, &content_type)
                .await
                .map_err(|e| {
                    PlatformError::BuildError(format!("unable to upload the build artifacts, {}", e))
                })?;
            uploaded.push(key);
        }

        Ok(uploaded)
    }
}

/// Message of the terminal ERROR event
fn error_message(error: &PlatformError) -> String {
    match error {
        PlatformError::BuildError(message) => message.clone(),
        other => other.to_string(),
    }
}
