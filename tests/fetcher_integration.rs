//! Integration tests for the marketplace client and rate-limited fetcher.
//!
//! Runs the real HTTP client against a wiremock marketplace.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dataset_search_core::fetch::{Backoff, FetchError, RateLimitedFetcher, RetryPolicy};
use dataset_search_core::marketplace::{
    Credentials, HttpTimeouts, KaggleClient, Marketplace, MarketplaceError, PageRequest,
};
use dataset_search_core::query::SortBy;
use serde_json::json;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::start_mock_server_or_skip;

const LIST_PATH: &str = "/api/v1/datasets/list";

fn client_for(server: &MockServer, credentials: Option<Credentials>) -> KaggleClient {
    KaggleClient::with_base_url(
        &format!("{}/api/v1", server.uri()),
        credentials,
        HttpTimeouts::default(),
    )
    .unwrap()
}

fn fast_fetcher(client: KaggleClient, max_retries: u32) -> RateLimitedFetcher {
    let backoff = Backoff::new(Duration::from_millis(10), Duration::from_millis(40));
    RateLimitedFetcher::new(
        Arc::new(client),
        Duration::ZERO,
        RetryPolicy::new(max_retries, backoff),
    )
}

fn request(term: &str) -> PageRequest {
    PageRequest::new(term, 1, SortBy::Hottest)
}

// ==================== Client Tests ====================

#[tokio::test]
async fn test_client_decodes_listing() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(query_param("search", "titanic"))
        .and(query_param("sortBy", "votes"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "ref": "heptapod/titanic",
                "title": "Titanic",
                "subtitle": "Passenger survival",
                "licenseName": "CC0-1.0",
                "lastUpdated": "2024-03-01T10:00:00Z",
                "tags": [{"name": "ships"}, "history"],
                "files": [{"name": "train.csv", "totalBytes": 61194}],
                "voteCount": 340,
                "usabilityRating": 0.88
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, None);
    let datasets = client
        .list_datasets(&PageRequest::new("titanic", 2, SortBy::Votes))
        .await
        .unwrap();

    assert_eq!(datasets.len(), 1);
    let dataset = &datasets[0];
    assert_eq!(dataset.reference, "heptapod/titanic");
    assert_eq!(dataset.tags.len(), 2);
    assert_eq!(dataset.files[0].total_bytes, Some(61_194));
    assert!(dataset.last_updated.is_some());
}

#[tokio::test]
async fn test_client_tolerates_null_fields() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"ref": "a/b", "title": null, "tags": null, "files": null, "voteCount": null},
            {"ref": "c/d", "title": "Kept"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let datasets = client_for(&server, None)
        .list_datasets(&request("anything"))
        .await
        .unwrap();

    assert_eq!(datasets.len(), 2);
    assert!(datasets[0].title.is_empty());
    assert!(datasets[0].tags.is_empty());
    assert!(datasets[0].files.is_empty());
    assert_eq!(datasets[1].title, "Kept");
}

#[tokio::test]
async fn test_client_sends_basic_auth() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .and(header("authorization", "Basic dXNlcjprZXk="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, Some(Credentials::new("user", "key")));
    let datasets = client.list_datasets(&request("anything")).await.unwrap();
    assert!(datasets.is_empty());
}

#[tokio::test]
async fn test_client_reports_undecodable_body() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client_for(&server, None)
        .list_datasets(&request("x"))
        .await
        .unwrap_err();
    assert!(matches!(err, MarketplaceError::Decode { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_client_keeps_retry_after_header() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
        .mount(&server)
        .await;

    let err = client_for(&server, None)
        .list_datasets(&request("x"))
        .await
        .unwrap_err();
    match err {
        MarketplaceError::HttpStatus {
            status,
            retry_after,
            ..
        } => {
            assert_eq!(status, 429);
            assert_eq!(retry_after.as_deref(), Some("7"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

// ==================== Fetcher Tests ====================

#[tokio::test]
async fn test_fetcher_gives_up_after_max_retries_of_429() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(429))
        .expect(4)
        .mount(&server)
        .await;

    let fetcher = fast_fetcher(client_for(&server, None), 3);
    let err = fetcher.fetch(&request("titanic")).await.unwrap_err();

    assert!(err.is_rate_limited(), "expected rate limit error, got {err}");
    assert_eq!(err.attempts(), Some(4));
    assert_eq!(fetcher.state().await.consecutive_failures, 4);
}

#[tokio::test]
async fn test_fetcher_recovers_after_throttling() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{"ref": "a/b", "title": "AB"}])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fast_fetcher(client_for(&server, None), 3);
    let datasets = fetcher.fetch(&request("titanic")).await.unwrap();

    assert_eq!(datasets.len(), 1);
    let state = fetcher.state().await;
    assert_eq!(state.consecutive_failures, 0);
    assert_eq!(state.current_backoff, Duration::from_millis(10));
}

#[tokio::test]
async fn test_fetcher_does_not_retry_not_found() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fast_fetcher(client_for(&server, None), 3);
    let err = fetcher.fetch(&request("x")).await.unwrap_err();
    assert!(matches!(err, FetchError::Rejected { .. }), "got {err}");
}

#[tokio::test]
async fn test_fetcher_does_not_retry_bad_credentials() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fast_fetcher(client_for(&server, None), 3);
    let err = fetcher.fetch(&request("x")).await.unwrap_err();
    assert!(err.to_string().contains("401"), "got {err}");
}

#[tokio::test]
async fn test_fetcher_server_errors_become_unavailable() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = fast_fetcher(client_for(&server, None), 1);
    let err = fetcher.fetch(&request("x")).await.unwrap_err();
    assert!(matches!(err, FetchError::Unavailable { attempts: 2, .. }), "got {err}");
}

#[tokio::test]
async fn test_fetcher_spaces_real_calls() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };

    Mock::given(method("GET"))
        .and(path(LIST_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = RateLimitedFetcher::new(
        Arc::new(client_for(&server, None)),
        Duration::from_millis(100),
        RetryPolicy::default(),
    );

    let start = Instant::now();
    for _ in 0..3 {
        fetcher.fetch(&request("x")).await.unwrap();
    }
    assert!(
        start.elapsed() >= Duration::from_millis(200),
        "three calls with 100ms spacing finished in {:?}",
        start.elapsed()
    );
}
