use hopper_lib::game::installer::core::artifact::{ArtifactRef, HashAlgorithm};
use hopper_lib::game::installer::core::hashing::{hash_bytes, HashEngine};
use hopper_lib::game::installer::core::pool::{ArtifactAction, DownloadPool, PoolContext, PoolExecution};
use hopper_lib::game::installer::types::{
    CancelHandle, CancelToken, InstallStage, ProgressReporter, SilentProgressReporter,
};
use hopper_lib::ErrorKind;
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn context(cancel: CancelToken) -> PoolContext {
    PoolContext::new(
        reqwest::Client::new(),
        Arc::new(HashEngine::new(16)),
        Arc::new(SilentProgressReporter),
        cancel,
    )
    .with_workers(4)
    .with_label("test pool")
}

fn artifact(server: &MockServer, name: &str, dest: &Path, body: &[u8]) -> ArtifactRef {
    ArtifactRef::new(name, format!("{}/{}", server.uri(), name), dest.join(name))
        .with_size(body.len() as u64)
        .with_hash(hash_bytes(body, HashAlgorithm::Sha1))
}

async fn serve(server: &MockServer, name: &str, body: &[u8], times: u64) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", name)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.to_vec()))
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn only_the_missing_mod_is_downloaded() {
    init_logger();
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();

    let core = vec![b'c'; 100];
    let present = b"present mod".to_vec();
    let missing = b"missing mod".to_vec();
    std::fs::write(dir.path().join("core.jar"), &core).unwrap();
    std::fs::write(dir.path().join("present.jar"), &present).unwrap();

    serve(&server, "core.jar", &core, 0).await;
    serve(&server, "present.jar", &present, 0).await;
    serve(&server, "missing.jar", &missing, 1).await;

    let pool = DownloadPool::from_artifacts(vec![
        artifact(&server, "core.jar", dir.path(), &core),
        artifact(&server, "present.jar", dir.path(), &present),
        artifact(&server, "missing.jar", dir.path(), &missing),
    ]);
    let report = pool.execute_all(&context(CancelToken::never())).await;

    assert!(report.is_complete());
    assert_eq!(report.count(ArtifactAction::Downloaded), 1);
    assert_eq!(report.count(ArtifactAction::AlreadyPresent), 2);
    assert_eq!(std::fs::read(dir.path().join("missing.jar")).unwrap(), missing);
}

#[tokio::test]
async fn filter_needed_drops_verified_files() {
    init_logger();
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let hashes = Arc::new(HashEngine::new(16));

    let bodies: Vec<Vec<u8>> = (0..5).map(|i| format!("artifact {}", i).into_bytes()).collect();
    let artifacts: Vec<ArtifactRef> = bodies
        .iter()
        .enumerate()
        .map(|(i, body)| artifact(&server, &format!("a{}.jar", i), dir.path(), body))
        .collect();
    for (artifact, body) in artifacts.iter().zip(&bodies).take(3) {
        std::fs::write(&artifact.destination, body).unwrap();
    }
    std::fs::write(&artifacts[4].destination, b"stale").unwrap();

    let pool = DownloadPool::from_artifacts(artifacts);
    let needed = pool.filter_needed(&hashes, 2).await;
    assert_eq!(needed.len(), 2);
    assert_eq!(needed.artifacts()[0].name, "a3.jar");
    assert_eq!(needed.artifacts()[1].name, "a4.jar");

    let again = pool.filter_needed(&hashes, 2).await;
    assert_eq!(again.len(), needed.len());
}

#[tokio::test]
async fn shared_destination_is_written_once() {
    init_logger();
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let body = b"shared library".to_vec();

    serve(&server, "mirror-a/lib.jar", &body, 1).await;
    serve(&server, "mirror-b/lib.jar", &body, 0).await;

    let dest = dir.path().join("lib.jar");
    let sha1 = hash_bytes(&body, HashAlgorithm::Sha1);
    let pool = DownloadPool::from_artifacts(vec![
        ArtifactRef::new("lib (a)", format!("{}/mirror-a/lib.jar", server.uri()), &dest)
            .with_hash(sha1.clone()),
        ArtifactRef::new("lib (b)", format!("{}/mirror-b/lib.jar", server.uri()), &dest)
            .with_hash(sha1),
    ]);
    let report = pool.execute_all(&context(CancelToken::never())).await;

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.count(ArtifactAction::Downloaded), 1);
    assert_eq!(report.count(ArtifactAction::Deduplicated), 1);
    assert_eq!(std::fs::read(&dest).unwrap(), body);
}

#[tokio::test]
async fn hash_mismatch_fails_unless_allowed() {
    init_logger();
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    serve(&server, "strict.jar", b"upstream bytes", 1).await;
    serve(&server, "lenient.jar", b"upstream bytes", 1).await;

    let wrong = hash_bytes(b"something else", HashAlgorithm::Sha1);
    let pool = DownloadPool::from_artifacts(vec![
        ArtifactRef::new("strict.jar", format!("{}/strict.jar", server.uri()), dir.path().join("strict.jar"))
            .with_hash(wrong.clone()),
        ArtifactRef::new("lenient.jar", format!("{}/lenient.jar", server.uri()), dir.path().join("lenient.jar"))
            .with_hash(wrong)
            .allow_hash_failure(true),
    ]);
    let report = pool.execute_all(&context(CancelToken::never())).await;

    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].artifact.name, "strict.jar");
    assert_eq!(report.failed[0].error.kind(), ErrorKind::VerificationMismatch);
    assert!(!dir.path().join("strict.jar").exists());
    assert!(dir.path().join("lenient.jar").exists());

    let err = report.into_required().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VerificationMismatch);
}

/// Cancels as soon as the first artifact reports completion.
struct CancelAfterFirst {
    handle: CancelHandle,
}

impl ProgressReporter for CancelAfterFirst {
    fn stage_changed(&self, _stage: InstallStage, _label: &str) {}
    fn set_progress(&self, _fraction: f32) {}
    fn set_sub_progress(&self, _fraction: f32, _label: &str) {}
    fn artifact_done(&self, _artifact: &ArtifactRef) {
        self.handle.cancel();
    }
}

#[tokio::test]
async fn cancellation_stops_new_artifacts_only() {
    init_logger();
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let body = b"0123456789".to_vec();
    serve(&server, "first.jar", &body, 1).await;
    serve(&server, "second.jar", &body, 0).await;
    serve(&server, "third.jar", &body, 0).await;

    let (handle, token) = CancelToken::pair();
    let ctx = PoolContext::new(
        reqwest::Client::new(),
        Arc::new(HashEngine::new(16)),
        Arc::new(CancelAfterFirst { handle }),
        token,
    )
    .with_workers(1);

    let pool = DownloadPool::from_artifacts(vec![
        artifact(&server, "first.jar", dir.path(), &body),
        artifact(&server, "second.jar", dir.path(), &body),
        artifact(&server, "third.jar", dir.path(), &body),
    ]);
    let report = pool.execute_all(&ctx).await;

    assert!(report.cancelled);
    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.not_started.len(), 2);
    assert_eq!(std::fs::read(dir.path().join("first.jar")).unwrap(), body);
    assert!(!dir.path().join("second.jar").exists());
    assert!(report.into_required().unwrap_err().is_cancelled());
}

#[tokio::test]
async fn background_pool_returns_a_handle() {
    init_logger();
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let body = b"prefetched".to_vec();
    serve(&server, "prefetch.jar", &body, 1).await;

    let pool = DownloadPool::from_artifacts(vec![artifact(&server, "prefetch.jar", dir.path(), &body)])
        .background();
    let PoolExecution::Background(handle) = pool.execute(context(CancelToken::never())).await else {
        panic!("background pool should not block");
    };
    let report = handle.await.unwrap();
    assert_eq!(report.count(ArtifactAction::Downloaded), 1);
}
