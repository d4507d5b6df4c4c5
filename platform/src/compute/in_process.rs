//! In-process compute backend
//!
//! Runs each build as a tokio task inside the serving process, sharing its
//! bus and store handles. No isolation at all; this is the development mode
//! that pairs with the in-memory bus.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::bus::MessageBus;
use crate::compute::{ComputeBackend, JobContext, JobHandle};
use crate::errors::PlatformError;
use crate::executor::{self, BuildExecutor};
use crate::store::ArtifactStore;

/// Runs builds as background tasks of the current process
pub struct InProcessBackend {
    options: executor::Options,
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn ArtifactStore>,
}

impl InProcessBackend {
    pub fn new(
        options: executor::Options,
        bus: Arc<dyn MessageBus>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            options,
            bus,
            store,
        }
    }
}

#[async_trait]
impl ComputeBackend for InProcessBackend {
    async fn launch_isolated_job(&self, context: &JobContext) -> Result<JobHandle, PlatformError> {
        let executor = BuildExecutor::new(
            context.clone(),
            self.options.clone(),
            self.bus.clone(),
            self.store.clone(),
        );

        let deployment_id = context.deployment_id.clone();
        tokio::spawn(async move {
            match executor.run().await {
                Ok(summary) => info!(
                    "Deployment {} published {} artifacts",
                    deployment_id,
                    summary.uploaded.len()
                ),
                Err(e) => warn!("Deployment {} failed: {}", deployment_id, e),
            }
        });

        Ok(JobHandle {
            backend: "in_process".to_string(),
            job_id: format!("task-{}", context.deployment_id),
        })
    }
}
