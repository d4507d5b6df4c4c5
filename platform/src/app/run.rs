//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::{build_bus, build_store, AppState};
use crate::compute::JobContext;
use crate::errors::PlatformError;
use crate::executor::{BuildExecutor, BuildSummary};
use crate::server::serve::{api_router, serve, site_router};
use crate::server::state::{ServerState, SiteState};
use crate::store::fs::FsStore;

/// Run the deployment API and the site router until `shutdown_signal`
pub async fn run(
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), PlatformError> {
    info!("Initializing sitemesh...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start sitemesh: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

/// Run one build job with the bus and store described by `options`.
///
/// This is the body of a launched job: the executor reports failures on the
/// log channel, and the bus is closed before returning either way.
pub async fn run_build(
    options: &AppOptions,
    context: JobContext,
) -> Result<BuildSummary, PlatformError> {
    let bus = build_bus(&options.bus)?;
    let store = build_store(&options.store)?;

    info!("Running build {} of {}", context.deployment_id, context.repository_url);
    let executor = BuildExecutor::new(context, options.executor.clone(), bus.clone(), store);
    let result = executor.run().await;

    if let Err(e) = bus.close().await {
        warn!("Unable to close the message bus: {}", e);
    }
    result
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), PlatformError> {
    let app_state = Arc::new(AppState::init(options)?);
    shutdown_manager.with_app_state(app_state.clone())?;

    init_api_server(options, app_state.clone(), shutdown_tx.clone(), shutdown_manager).await?;
    init_site_server(options, app_state, shutdown_manager, shutdown_tx.subscribe()).await?;
    Ok(())
}

async fn init_api_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), PlatformError> {
    info!("Initializing deployment API...");

    let mut shutdown_rx = shutdown_tx.subscribe();
    let server_state = ServerState::new(
        app_state.dispatcher.clone(),
        app_state.bus.clone(),
        options.relay.clone(),
        shutdown_tx,
    );

    let handle = serve(
        "deployment API",
        &options.api_server,
        api_router(Arc::new(server_state)),
        async move {
            let _ = shutdown_rx.recv().await;
        },
    )
    .await?;

    shutdown_manager.with_api_server_handle(handle)?;
    Ok(())
}

async fn init_site_server(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), PlatformError> {
    info!("Initializing site router...");

    let mut site_state = SiteState::new(app_state.site_router.clone());
    if options.site.serve_artifacts {
        match options.store.filesystem_root() {
            Some(root) => {
                info!("Serving artifacts from {}", root.display());
                site_state = site_state.with_artifacts(FsStore::new(root.clone()));
            }
            None => warn!("Artifact serving needs the filesystem store, not serving artifacts"),
        }
    }

    let handle = serve(
        "site router",
        &options.site_server,
        site_router(Arc::new(site_state)),
        async move {
            let _ = shutdown_rx.recv().await;
        },
    )
    .await?;

    shutdown_manager.with_site_server_handle(handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    app_state: Option<Arc<AppState>>,
    api_server_handle: Option<JoinHandle<Result<(), PlatformError>>>,
    site_server_handle: Option<JoinHandle<Result<(), PlatformError>>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            app_state: None,
            api_server_handle: None,
            site_server_handle: None,
        }
    }

    pub fn with_app_state(&mut self, state: Arc<AppState>) -> Result<(), PlatformError> {
        if self.app_state.is_some() {
            return Err(PlatformError::ShutdownError("app_state already set".to_string()));
        }
        self.app_state = Some(state);
        Ok(())
    }

    pub fn with_api_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PlatformError>>,
    ) -> Result<(), PlatformError> {
        if self.api_server_handle.is_some() {
            return Err(PlatformError::ShutdownError("api_server_handle already set".to_string()));
        }
        self.api_server_handle = Some(handle);
        Ok(())
    }

    pub fn with_site_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), PlatformError>>,
    ) -> Result<(), PlatformError> {
        if self.site_server_handle.is_some() {
            return Err(PlatformError::ShutdownError("site_server_handle already set".to_string()));
        }
        self.site_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), PlatformError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), PlatformError> {
        info!("Shutting down sitemesh...");

        // 1. Deployment API, which also ends open relay sessions
        if let Some(handle) = self.api_server_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))??;
        }

        // 2. Site router
        if let Some(handle) = self.site_server_handle.take() {
            handle.await.map_err(|e| PlatformError::ShutdownError(e.to_string()))??;
        }

        // 3. App state
        if let Some(app_state) = self.app_state.take() {
            app_state.shutdown().await?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
