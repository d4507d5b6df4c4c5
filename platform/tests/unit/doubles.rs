//! Test doubles for the pipeline's capability traits

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sitemesh::bus::{MessageBus, Subscription};
use sitemesh::compute::{ComputeBackend, JobContext, JobHandle};
use sitemesh::dispatch::ids::IdSource;
use sitemesh::dispatch::recorder::DeploymentRecorder;
use sitemesh::errors::PlatformError;
use sitemesh::models::deployment::{DeploymentId, DeploymentRecord};
use sitemesh::store::ArtifactStore;

/// What a `RecordingCompute` answers with
pub enum LaunchBehavior {
    Accept,
    Unavailable,
    Reject,
}

/// Compute backend that only remembers what it was asked to launch
pub struct RecordingCompute {
    behavior: LaunchBehavior,
    launched: Mutex<Vec<JobContext>>,
}

impl RecordingCompute {
    pub fn new(behavior: LaunchBehavior) -> Self {
        Self {
            behavior,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn launched(&self) -> Vec<JobContext> {
        self.launched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ComputeBackend for RecordingCompute {
    async fn launch_isolated_job(&self, context: &JobContext) -> Result<JobHandle, PlatformError> {
        match self.behavior {
            LaunchBehavior::Accept => {
                self.launched.lock().unwrap().push(context.clone());
                Ok(JobHandle {
                    backend: "recording".to_string(),
                    job_id: format!("job-{}", context.deployment_id),
                })
            }
            LaunchBehavior::Unavailable => Err(PlatformError::ComputeBackendUnavailable(
                "backend unreachable".to_string(),
            )),
            LaunchBehavior::Reject => Err(PlatformError::LaunchFailed("quota exceeded".to_string())),
        }
    }
}

/// Hands out a fixed sequence of IDs
pub struct FixedIds {
    ids: Mutex<VecDeque<DeploymentId>>,
}

impl FixedIds {
    pub fn new(ids: &[&str]) -> Self {
        Self {
            ids: Mutex::new(ids.iter().map(|id| DeploymentId::parse(id).unwrap()).collect()),
        }
    }
}

impl IdSource for FixedIds {
    fn next_id(&self) -> Result<DeploymentId, PlatformError> {
        Ok(self.ids.lock().unwrap().pop_front().expect("no IDs left"))
    }
}

/// Recorder keeping records in memory, optionally failing every write
#[derive(Default)]
pub struct MemoryRecorder {
    pub fail: bool,
    records: Mutex<Vec<DeploymentRecord>>,
}

impl MemoryRecorder {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<DeploymentRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeploymentRecorder for MemoryRecorder {
    async fn record(&self, record: &DeploymentRecord) -> Result<(), PlatformError> {
        if self.fail {
            return Err(PlatformError::Internal("database is down".to_string()));
        }
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Store rejecting every upload
pub struct FailingStore;

#[async_trait]
impl ArtifactStore for FailingStore {
    async fn put_object(&self, key: &str, _: Vec<u8>, _: &str) -> Result<(), PlatformError> {
        Err(PlatformError::StoreError(format!("access denied for {}", key)))
    }
}

/// Bus that fails every operation
pub struct FailingBus;

#[async_trait]
impl MessageBus for FailingBus {
    async fn publish(&self, channel: &str, _: &str) -> Result<(), PlatformError> {
        Err(PlatformError::BusError(format!("cannot publish to {}", channel)))
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, PlatformError> {
        Err(PlatformError::BusError(format!("cannot subscribe to {}", channel)))
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
