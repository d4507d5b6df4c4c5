//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::{AppOptions, BusOptions, ComputeOptions, StoreOptions};
use crate::bus::memory::MemoryBus;
use crate::bus::mqtt::MqttBus;
use crate::bus::MessageBus;
use crate::compute::docker::DockerBackend;
use crate::compute::in_process::InProcessBackend;
use crate::compute::process::ProcessBackend;
use crate::compute::ComputeBackend;
use crate::dispatch::recorder::JsonlRecorder;
use crate::dispatch::Dispatcher;
use crate::errors::PlatformError;
use crate::executor;
use crate::router::SiteRouter;
use crate::store::fs::FsStore;
use crate::store::http::HttpStore;
use crate::store::memory::MemoryStore;
use crate::store::ArtifactStore;

/// Handles constructed once at startup and shared by every request
pub struct AppState {
    pub bus: Arc<dyn MessageBus>,
    pub store: Arc<dyn ArtifactStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub site_router: Arc<SiteRouter>,
}

impl AppState {
    /// Initialize application state
    pub fn init(options: &AppOptions) -> Result<Self, PlatformError> {
        info!("Initializing application state...");

        let bus = build_bus(&options.bus)?;
        let store = build_store(&options.store)?;
        let compute = build_compute(
            &options.compute,
            &options.executor,
            bus.clone(),
            store.clone(),
        );

        if matches!(options.bus, BusOptions::Memory)
            && !matches!(options.compute, ComputeOptions::InProcess)
        {
            warn!("The in-memory bus cannot reach out-of-process builds, their logs will not stream");
        }

        let mut dispatcher = Dispatcher::new(options.dispatcher.clone(), compute);
        if let Some(path) = &options.records_file {
            info!("Recording deployments to {}", path.display());
            dispatcher = dispatcher.with_recorder(Arc::new(JsonlRecorder::new(path)));
        }

        Ok(Self {
            bus,
            store,
            dispatcher: Arc::new(dispatcher),
            site_router: Arc::new(SiteRouter::new(options.site.artifact_base_url.clone())),
        })
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), PlatformError> {
        info!("Shutting down application state...");
        self.bus.close().await
    }
}

pub fn build_bus(options: &BusOptions) -> Result<Arc<dyn MessageBus>, PlatformError> {
    Ok(match options {
        BusOptions::Memory => Arc::new(MemoryBus::new()),
        BusOptions::Mqtt(mqtt_options) => Arc::new(MqttBus::connect(mqtt_options.clone())?),
    })
}

pub fn build_store(options: &StoreOptions) -> Result<Arc<dyn ArtifactStore>, PlatformError> {
    Ok(match options {
        StoreOptions::Memory => Arc::new(MemoryStore::new()),
        StoreOptions::Filesystem { root } => Arc::new(FsStore::new(root.clone())),
        StoreOptions::Http(http_options) => Arc::new(HttpStore::new(http_options)?),
    })
}

pub fn build_compute(
    options: &ComputeOptions,
    executor_options: &executor::Options,
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn ArtifactStore>,
) -> Arc<dyn ComputeBackend> {
    match options {
        ComputeOptions::InProcess => Arc::new(InProcessBackend::new(
            executor_options.clone(),
            bus,
            store,
        )),
        ComputeOptions::Process(process_options) => {
            Arc::new(ProcessBackend::new(process_options.clone()))
        }
        ComputeOptions::Docker(docker_options) => {
            Arc::new(DockerBackend::new(docker_options.clone()))
        }
    }
}
