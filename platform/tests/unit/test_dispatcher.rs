//! Dispatcher tests

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use sitemesh::compute::{ENV_DEPLOYMENT_ID, ENV_REPOSITORY_URL};
use sitemesh::dispatch::{Dispatcher, Options};
use sitemesh::errors::PlatformError;
use sitemesh::models::deployment::DeploymentStatus;
use tokio_test::{assert_err, assert_ok};

use crate::doubles::{wait_until, FixedIds, LaunchBehavior, MemoryRecorder, RecordingCompute};

fn dispatcher(compute: Arc<RecordingCompute>) -> Dispatcher {
    Dispatcher::new(Options::default(), compute)
}

fn is_deployment_id(id: &str) -> bool {
    id.len() == 5 && id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit())
}

#[tokio::test]
async fn test_dispatch_returns_id_and_site_url() {
    let compute = Arc::new(RecordingCompute::new(LaunchBehavior::Accept));
    let dispatched = assert_ok!(
        dispatcher(compute.clone())
            .dispatch("https://example.com/repo.git")
            .await
    );

    let id = dispatched.deployment_id.to_string();
    assert!(is_deployment_id(&id), "unexpected id {}", id);
    assert!(dispatched.website_url.contains(&id));
    assert_eq!(dispatched.job.backend, "recording");
}

#[tokio::test]
async fn test_dispatch_with_fixed_id() {
    let compute = Arc::new(RecordingCompute::new(LaunchBehavior::Accept));
    let dispatcher = dispatcher(compute.clone()).with_id_source(Arc::new(FixedIds::new(&["ab3de"])));

    let dispatched = dispatcher.dispatch("https://example.com/repo.git").await.unwrap();
    assert_eq!(dispatched.deployment_id.as_str(), "ab3de");
    assert_eq!(dispatched.website_url, "http://ab3de.localhost:8080");
}

#[tokio::test]
async fn test_job_receives_id_and_url() {
    let compute = Arc::new(RecordingCompute::new(LaunchBehavior::Accept));
    let dispatcher = dispatcher(compute.clone()).with_id_source(Arc::new(FixedIds::new(&["ab3de"])));
    dispatcher.dispatch("https://example.com/repo.git").await.unwrap();

    let launched = compute.launched();
    assert_eq!(launched.len(), 1);
    let env: std::collections::HashMap<_, _> = launched[0].env().into_iter().collect();
    assert_eq!(env[ENV_DEPLOYMENT_ID], "ab3de");
    assert_eq!(env[ENV_REPOSITORY_URL], "https://example.com/repo.git");
}

#[tokio::test]
async fn test_invalid_url_never_launches() {
    let compute = Arc::new(RecordingCompute::new(LaunchBehavior::Accept));
    let dispatcher = dispatcher(compute.clone());

    for url in ["", "   ", "definitely not a repository"] {
        let result = dispatcher.dispatch(url).await;
        assert!(matches!(result, Err(PlatformError::InvalidRequest(_))), "{:?}", url);
    }
    assert!(compute.launched().is_empty());
}

#[tokio::test]
async fn test_backend_failures_are_reported() {
    let unavailable = dispatcher(Arc::new(RecordingCompute::new(LaunchBehavior::Unavailable)));
    let result = unavailable.dispatch("https://example.com/repo.git").await;
    assert!(matches!(result, Err(PlatformError::ComputeBackendUnavailable(_))));

    let rejecting = dispatcher(Arc::new(RecordingCompute::new(LaunchBehavior::Reject)));
    let result = assert_err!(rejecting.dispatch("https://example.com/repo.git").await);
    assert!(matches!(result, PlatformError::LaunchFailed(_)));
}

#[tokio::test]
async fn test_ids_are_unique_across_dispatches() {
    let compute = Arc::new(RecordingCompute::new(LaunchBehavior::Accept));
    let dispatcher = dispatcher(compute.clone());

    let mut ids = HashSet::new();
    for _ in 0..200 {
        let dispatched = dispatcher.dispatch("https://example.com/repo.git").await.unwrap();
        assert!(ids.insert(dispatched.deployment_id));
    }
    assert_eq!(compute.launched().len(), 200);
}

#[tokio::test]
async fn test_dispatch_records_queued_deployment() {
    let compute = Arc::new(RecordingCompute::new(LaunchBehavior::Accept));
    let recorder = Arc::new(MemoryRecorder::default());
    let dispatcher = dispatcher(compute)
        .with_id_source(Arc::new(FixedIds::new(&["ab3de"])))
        .with_recorder(recorder.clone());

    dispatcher.dispatch("https://example.com/repo.git").await.unwrap();

    assert!(wait_until(Duration::from_secs(2), || !recorder.records().is_empty()).await);
    let records = recorder.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].deployment_id.as_str(), "ab3de");
    assert_eq!(records[0].website_url, "http://ab3de.localhost:8080");
    assert_eq!(records[0].status, DeploymentStatus::Queued);
}

#[tokio::test]
async fn test_record_failure_does_not_fail_dispatch() {
    let compute = Arc::new(RecordingCompute::new(LaunchBehavior::Accept));
    let dispatcher = dispatcher(compute.clone()).with_recorder(Arc::new(MemoryRecorder::failing()));

    assert_ok!(dispatcher.dispatch("https://example.com/repo.git").await);
    assert_eq!(compute.launched().len(), 1);
}

#[tokio::test]
async fn test_failed_launch_is_not_recorded() {
    let recorder = Arc::new(MemoryRecorder::default());
    let dispatcher = dispatcher(Arc::new(RecordingCompute::new(LaunchBehavior::Reject)))
        .with_recorder(recorder.clone());

    assert!(dispatcher.dispatch("https://example.com/repo.git").await.is_err());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(recorder.records().is_empty());
}

#[tokio::test]
async fn test_jsonl_recorder_appends_lines() {
    use sitemesh::dispatch::recorder::{DeploymentRecorder, JsonlRecorder};
    use sitemesh::models::deployment::{DeploymentId, DeploymentRecord};

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records/deployments.jsonl");
    let recorder = JsonlRecorder::new(&path);

    for id in ["ab3de", "xyz12"] {
        let record = DeploymentRecord {
            deployment_id: DeploymentId::parse(id).unwrap(),
            repository_url: "https://example.com/repo.git".to_string(),
            website_url: format!("http://{}.localhost:8080", id),
            status: DeploymentStatus::Queued,
            created_at: chrono::Utc::now(),
        };
        recorder.record(&record).await.unwrap();
    }

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    let second: DeploymentRecord = serde_json::from_str(lines[1]).unwrap();
    assert_eq!(second.deployment_id.as_str(), "xyz12");
}
