//! HTTP fetcher tests against a local mock server.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use vpnsieve::config::FetchConfig;
use vpnsieve::error::FetchError;
use vpnsieve::fetcher::{fetch_batch, HttpFetcher, SourceFetcher};

fn fetcher() -> HttpFetcher {
    HttpFetcher::new(&FetchConfig {
        timeout_secs: 5,
        max_body_bytes: 1024,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_fetch_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/list.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("vless://a@h:1\ntrojan://b@h:2"))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let body = fetcher
        .fetch(&format!("{}/list.txt", server.uri()))
        .await
        .unwrap();

    assert_eq!(body, "vless://a@h:1\ntrojan://b@h:2");
    assert_eq!(fetcher.total_downloaded(), body.len());
}

#[tokio::test]
async fn test_transient_status_retried_within_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ss://x@h:1"))
        .mount(&server)
        .await;

    let body = fetcher()
        .fetch(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();

    assert_eq!(body, "ss://x@h:1");
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_not_found_exhausts_attempts() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = fetcher()
        .fetch(&format!("{}/gone", server.uri()))
        .await
        .unwrap_err();

    match &err {
        FetchError::Exhausted { attempts, .. } => assert_eq!(*attempts, 3),
        other => panic!("expected Exhausted, got {:?}", other),
    }
    assert!(matches!(err.last_cause(), FetchError::Status { status: 404, .. }));
    // 404 is not transient: one request per attempt
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_oversized_body_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/huge"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(4096)))
        .mount(&server)
        .await;

    let fetcher = fetcher();
    let err = fetcher
        .fetch(&format!("{}/huge", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::TooLarge { max: 1024, .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert_eq!(fetcher.total_downloaded(), 0);
}

#[tokio::test]
async fn test_batch_keeps_source_order() {
    let server = MockServer::start().await;
    for (name, body, delay_ms) in [("a", "A", 150u64), ("b", "B", 0), ("c", "C", 50)] {
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(body)
                    .set_delay(std::time::Duration::from_millis(delay_ms)),
            )
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let urls: Vec<String> = ["a", "missing", "b", "c"]
        .iter()
        .map(|name| format!("{}/{}", server.uri(), name))
        .collect();
    let results = fetch_batch(&fetcher(), &urls, 4).await;

    assert_eq!(results.len(), 4);
    assert_eq!(results[0].as_deref().unwrap(), "A");
    assert!(results[1].is_err());
    assert_eq!(results[2].as_deref().unwrap(), "B");
    assert_eq!(results[3].as_deref().unwrap(), "C");
}

#[tokio::test]
async fn test_unreachable_host_fails_cleanly() {
    let fetcher = HttpFetcher::new(&FetchConfig {
        timeout_secs: 1,
        max_attempts: 1,
        ..Default::default()
    })
    .unwrap();

    let result = fetcher.fetch("http://127.0.0.1:1/list.txt").await;
    assert!(matches!(result, Err(FetchError::Exhausted { attempts: 1, .. })));
}
