//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::PlatformError;
use crate::server::handlers::{
    artifact_handler, deploy_handler, health_handler, logs_handler, site_handler,
    version_handler,
};
use crate::server::state::{ServerState, SiteState};

/// Path the site listener serves a filesystem artifact store under
pub const ARTIFACTS_PATH: &str = "/artifacts";

/// Routes of the deployment API
pub fn api_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Deployments
        .route("/deploy", post(deploy_handler))
        .route("/project", post(deploy_handler))
        // Log streams
        .route("/logs/{deployment_id}", get(logs_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Routes of the site listener. A filesystem store attached to the state is
/// also served under [`ARTIFACTS_PATH`].
pub fn site_router(state: Arc<SiteState>) -> Router {
    let mut router = Router::new();
    if state.artifacts.is_some() {
        router = router.route(&format!("{}/{{*key}}", ARTIFACTS_PATH), get(artifact_handler));
    }
    router
        .fallback(site_handler)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Bind `options` and serve `app` until `shutdown_signal` resolves
pub async fn serve(
    name: &str,
    options: &ServerOptions,
    app: Router,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PlatformError>>, PlatformError> {
    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting {} server on {}", name, addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PlatformError::ServerError(format!("unable to bind {}: {}", addr, e)))?;

    Ok(serve_listener(listener, app, shutdown_signal))
}

/// Serve `app` on an already bound listener
pub fn serve_listener(
    listener: TcpListener,
    app: Router,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> JoinHandle<Result<(), PlatformError>> {
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| PlatformError::ServerError(e.to_string()))
    })
}
