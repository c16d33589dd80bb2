//! GitHub contents API uploader tests against a local mock server.

use base64::engine::general_purpose;
use base64::Engine;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vpnsieve::config::{SecureString, UploadConfig};
use vpnsieve::logger::RunLog;
use vpnsieve::uploader::{upload_all, GitHubUploader, UploadJob, UploadOutcome, Uploader};

const CONTENTS_PATH: &str = "/repos/owner/mirror/contents/githubmirror/default/1.txt";
const REMOTE: &str = "githubmirror/default/1.txt";

fn uploader(server: &MockServer, max_retries: u32) -> GitHubUploader {
    let config = UploadConfig {
        enabled: true,
        repo: "owner/mirror".to_string(),
        api_base: server.uri(),
        token: SecureString::new("test-token".to_string()),
        max_retries,
        ..Default::default()
    };
    GitHubUploader::new(&config)
        .unwrap()
        .with_conflict_backoff(Duration::ZERO)
}

fn local_file(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("1.txt");
    std::fs::write(&path, content).unwrap();
    path
}

fn remote_body(content: &str, sha: &str) -> serde_json::Value {
    serde_json::json!({
        "sha": sha,
        "content": general_purpose::STANDARD.encode(content),
        "encoding": "base64",
    })
}

#[tokio::test]
async fn test_missing_remote_is_created() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = local_file(&dir, "vless://a@h:1");

    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .and(query_param("ref", "main"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS_PATH))
        .and(header("authorization", "Bearer test-token"))
        .and(body_partial_json(serde_json::json!({
            "branch": "main",
            "content": general_purpose::STANDARD.encode("vless://a@h:1"),
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = uploader(&server, 3).upload(&local, REMOTE).await.unwrap();
    assert_eq!(outcome, UploadOutcome::Created);
}

#[tokio::test]
async fn test_identical_remote_is_unchanged() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = local_file(&dir, "trojan://p@h:443");

    // GitHub returns base64 content split across lines
    let wrapped = general_purpose::STANDARD
        .encode("trojan://p@h:443")
        .chars()
        .collect::<Vec<_>>()
        .chunks(8)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n");
    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"sha": "abc", "content": wrapped})),
        )
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let outcome = uploader(&server, 3).upload(&local, REMOTE).await.unwrap();
    assert_eq!(outcome, UploadOutcome::Unchanged);
}

#[tokio::test]
async fn test_different_remote_is_updated_with_sha() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = local_file(&dir, "new content");

    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote_body("old content", "sha-1")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS_PATH))
        .and(body_partial_json(serde_json::json!({"sha": "sha-1"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = uploader(&server, 3).upload(&local, REMOTE).await.unwrap();
    assert_eq!(outcome, UploadOutcome::Updated);
}

#[tokio::test]
async fn test_conflict_is_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = local_file(&dir, "new content");

    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote_body("old content", "sha-1")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(409))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let outcome = uploader(&server, 3).upload(&local, REMOTE).await.unwrap();
    assert_eq!(outcome, UploadOutcome::Updated);

    // Each retry re-reads the remote sha
    let requests = server.received_requests().await.unwrap();
    let gets = requests.iter().filter(|r| r.method.as_str() == "GET").count();
    assert_eq!(gets, 2);
}

#[tokio::test]
async fn test_persistent_conflict_gives_up() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = local_file(&dir, "new content");

    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(remote_body("old content", "sha-1")))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(409))
        .expect(3)
        .mount(&server)
        .await;

    let err = uploader(&server, 3)
        .upload(&local, REMOTE)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("after 3 conflicting attempts"));
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let local = local_file(&dir, "x");

    Mock::given(method("GET"))
        .and(path(CONTENTS_PATH))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let err = uploader(&server, 3)
        .upload(&local, REMOTE)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_rate_limit_parsing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rate_limit"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resources": {},
            "rate": {"limit": 5000, "remaining": 42, "reset": 1700000000, "used": 4958}
        })))
        .mount(&server)
        .await;

    let rate = uploader(&server, 3).check_rate_limit().await.unwrap();
    assert_eq!(rate.limit, 5000);
    assert_eq!(rate.remaining, 42);
}

#[tokio::test]
async fn test_upload_all_counts_outcomes() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let created = dir.path().join("a.txt");
    let missing = dir.path().join("does-not-exist.txt");
    std::fs::write(&created, "vless://a@h:1").unwrap();

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let jobs = vec![
        UploadJob {
            local: created,
            remote: "githubmirror/a.txt".to_string(),
        },
        UploadJob {
            local: missing,
            remote: "githubmirror/b.txt".to_string(),
        },
    ];
    let log = RunLog::new();
    let summary = upload_all(&uploader(&server, 3), &jobs, &log).await;

    assert_eq!(summary.created, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(log.updated_files(), vec!["githubmirror/a.txt".to_string()]);
}
