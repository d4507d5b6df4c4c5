//! HTTP router tests

use std::sync::Arc;

use api_models::{DeployResponse, ErrorResponse, HealthResponse};
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sitemesh::bus::memory::MemoryBus;
use sitemesh::dispatch::{Dispatcher, Options};
use sitemesh::router::SiteRouter;
use sitemesh::server::serve::{api_router, site_router};
use sitemesh::server::state::{ServerState, SiteState};
use sitemesh::store::fs::FsStore;
use tokio::sync::broadcast;
use tower::ServiceExt;

use crate::doubles::{FixedIds, LaunchBehavior, RecordingCompute};

fn api(behavior: LaunchBehavior) -> (Router, Arc<RecordingCompute>) {
    let compute = Arc::new(RecordingCompute::new(behavior));
    let dispatcher = Dispatcher::new(Options::default(), compute.clone())
        .with_id_source(Arc::new(FixedIds::new(&["ab3de", "xyz12"])));
    let (shutdown_tx, _) = broadcast::channel(1);
    let state = ServerState::new(
        Arc::new(dispatcher),
        Arc::new(MemoryBus::new()),
        Default::default(),
        shutdown_tx,
    );
    (api_router(Arc::new(state)), compute)
}

fn deploy_request(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_deploy_returns_id_and_url() {
    let (app, compute) = api(LaunchBehavior::Accept);

    let response = app
        .oneshot(deploy_request("/deploy", r#"{"repositoryUrl":"https://example.com/repo.git"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: DeployResponse = body_json(response).await;
    assert_eq!(
        body,
        DeployResponse {
            deployment_id: "ab3de".to_string(),
            website_url: "http://ab3de.localhost:8080".to_string(),
        }
    );
    assert_eq!(compute.launched().len(), 1);
}

#[tokio::test]
async fn test_project_is_an_alias_of_deploy() {
    let (app, compute) = api(LaunchBehavior::Accept);

    let response = app
        .oneshot(deploy_request("/project", r#"{"repositoryUrl":"git@github.com:owner/site.git"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(compute.launched()[0].repository_url, "git@github.com:owner/site.git");
}

#[tokio::test]
async fn test_invalid_payloads_answer_not_found() {
    for body in [
        "not json",
        r#"{"repository":"https://example.com/repo.git"}"#,
        r#"{"repositoryUrl":""}"#,
        r#"{"repositoryUrl":"no way"}"#,
    ] {
        let (app, compute) = api(LaunchBehavior::Accept);
        let response = app.oneshot(deploy_request("/deploy", body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "body: {}", body);

        let error: ErrorResponse = body_json(response).await;
        assert!(!error.response.is_empty());
        assert!(compute.launched().is_empty());
    }
}

#[tokio::test]
async fn test_backend_failures_map_to_gateway_statuses() {
    let (app, _) = api(LaunchBehavior::Unavailable);
    let response = app
        .oneshot(deploy_request("/deploy", r#"{"repositoryUrl":"https://example.com/repo.git"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let (app, _) = api(LaunchBehavior::Reject);
    let response = app
        .oneshot(deploy_request("/deploy", r#"{"repositoryUrl":"https://example.com/repo.git"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn test_health() {
    let (app, _) = api(LaunchBehavior::Accept);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = body_json(response).await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.service, "sitemesh");
}

fn site(artifact_dir: Option<&std::path::Path>) -> Router {
    let router = SiteRouter::new("http://localhost:8080/artifacts");
    let mut state = SiteState::new(Arc::new(router));
    if let Some(dir) = artifact_dir {
        state = state.with_artifacts(FsStore::new(dir));
    }
    site_router(Arc::new(state))
}

fn site_request(host: &str, path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::HOST, host)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_site_redirects_to_entry_page() {
    for path in ["/", "/about/team.html"] {
        let response = site(None)
            .oneshot(site_request("xyz12.localhost:8080", path))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://localhost:8080/artifacts/xyz12/index.html"
        );
    }
}

#[tokio::test]
async fn test_site_rejects_bare_hosts() {
    let response = site(None).oneshot(site_request("localhost", "/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let error: ErrorResponse = body_json(response).await;
    assert!(error.response.contains("localhost"));
}

#[tokio::test]
async fn test_site_serves_filesystem_artifacts() {
    let root = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(root.path().join("xyz12")).unwrap();
    std::fs::write(root.path().join("xyz12/index.html"), "<h1>xyz12</h1>").unwrap();

    let response = site(Some(root.path()))
        .oneshot(site_request("localhost:8080", "/artifacts/xyz12/index.html"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[..], b"<h1>xyz12</h1>");
}

#[tokio::test]
async fn test_site_missing_artifact_is_not_found() {
    let root = tempfile::tempdir().unwrap();
    for path in ["/artifacts/xyz12/missing.html", "/artifacts/../etc/passwd"] {
        let response = site(Some(root.path()))
            .oneshot(site_request("localhost:8080", path))
            .await
            .unwrap();
        assert_ne!(response.status(), StatusCode::OK, "{}", path);
    }
}
