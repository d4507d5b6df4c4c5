//! HTTP request handlers

use std::sync::Arc;

use api_models::{DeployRequest, DeployResponse, ErrorResponse, HealthResponse, VersionResponse};
use axum::{
    extract::{rejection::JsonRejection, ws::WebSocketUpgrade, Path, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use tracing::{debug, warn};

use crate::errors::{ErrorClass, PlatformError};
use crate::models::deployment::DeploymentId;
use crate::relay;
use crate::server::state::{ServerState, SiteState};
use crate::store::content_type_for;
use crate::utils::version_info;

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "sitemesh".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Deploy handler, also mounted as `/project`
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<DeployRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            return error_response(&PlatformError::InvalidRequest(rejection.body_text()));
        }
    };

    match state.dispatcher.dispatch(&request.repository_url).await {
        Ok(dispatched) => Json(DeployResponse {
            deployment_id: dispatched.deployment_id.to_string(),
            website_url: dispatched.website_url,
        })
        .into_response(),
        Err(e) => {
            debug!("Deploy of {:?} failed", request.repository_url);
            error_response(&e)
        }
    }
}

/// Log stream handler: upgrades to a WebSocket relaying `logs:{deployment_id}`
pub async fn logs_handler(
    ws: WebSocketUpgrade,
    Path(raw_id): Path<String>,
    State(state): State<Arc<ServerState>>,
) -> Response {
    let deployment_id = match DeploymentId::parse(&raw_id) {
        Ok(id) => id,
        Err(e) => {
            debug!("Refusing log stream for {:?}: {}", raw_id, e);
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    response: e.to_string(),
                }),
            )
                .into_response();
        }
    };

    let bus = state.bus.clone();
    let options = state.relay_options.clone();
    let shutdown_rx = state.shutdown_tx.subscribe();
    ws.on_upgrade(move |socket| async move {
        relay::attach(socket, deployment_id, bus, options, shutdown_rx).await;
    })
}

/// Site handler: redirects every request to the entry page of the deployment
/// named by the host's leading label
pub async fn site_handler(
    State(state): State<Arc<SiteState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))
        .unwrap_or_default();

    match state.router.resolve(host) {
        Ok(target) => {
            debug!("Routing {} to {}", host, target);
            Redirect::to(&target).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Serves objects of a filesystem artifact store
pub async fn artifact_handler(
    State(state): State<Arc<SiteState>>,
    Path(key): Path<String>,
) -> Response {
    let Some(store) = &state.artifacts else {
        return StatusCode::NOT_FOUND.into_response();
    };

    match store.get_object(&key).await {
        Ok(bytes) => {
            let content_type = content_type_for(std::path::Path::new(&key));
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Err(e) => {
            debug!("Artifact {} not served: {}", key, e);
            StatusCode::NOT_FOUND.into_response()
        }
    }
}

/// JSON error body with the status mapped from the error
pub fn error_response(error: &PlatformError) -> Response {
    match error.class() {
        ErrorClass::ClientInput => debug!("Rejected request: {}", error),
        class => warn!("Request failed ({:?}): {}", class, error),
    }
    (
        error.status_code(),
        Json(ErrorResponse {
            response: error.to_string(),
        }),
    )
        .into_response()
}
