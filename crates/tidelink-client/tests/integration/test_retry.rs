//! Integration tests for throttling, transient failures, and terminal errors

use std::time::{Duration, Instant};

use reqwest::Method;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tidelink_client::{ProviderClient, RequestOptions, TidalError, TransientCause};

use crate::common::{self, BASE_BACKOFF};

#[tokio::test]
async fn test_retry_after_is_honored() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "2"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::user_body("user-1")))
        .expect(1)
        .mount(&server)
        .await;

    let started = Instant::now();
    let me = client.get_current_user(None).await.expect("request failed");
    let elapsed = started.elapsed();

    assert_eq!(me["data"]["id"], "user-1");
    assert!(elapsed >= Duration::from_secs(2), "elapsed {elapsed:?}");
}

#[tokio::test]
async fn test_rate_limit_exhausted() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .expect(3)
        .mount(&server)
        .await;

    let err = client
        .request(
            Method::GET,
            "/v2/users/me",
            RequestOptions::new().max_retries(2),
        )
        .await
        .unwrap_err();

    match err {
        TidalError::RateLimitExceeded { url, attempts } => {
            assert_eq!(attempts, 3);
            assert!(url.ends_with("/v2/users/me"));
        }
        other => panic!("expected RateLimitExceeded, got {other:?}"),
    }
}

#[tokio::test]
async fn test_rate_limit_without_header_uses_backoff() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    common::mount_current_user(&server).await;

    let started = Instant::now();
    client.get_current_user(None).await.expect("request failed");
    assert!(started.elapsed() >= BASE_BACKOFF);
}

#[tokio::test]
async fn test_timeout_then_success() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(common::user_body("slow"))
                .set_delay(Duration::from_millis(800)),
        )
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::user_body("fast")))
        .expect(1)
        .mount(&server)
        .await;

    let started = Instant::now();
    let response = client
        .request(
            Method::GET,
            "/v2/users/me",
            RequestOptions::new().timeout(Duration::from_millis(200)),
        )
        .await
        .expect("request should succeed on retry");

    assert_eq!(response.body["data"]["id"], "fast");
    // One timed-out attempt plus one backoff
    assert!(started.elapsed() >= Duration::from_millis(200) + BASE_BACKOFF);
}

#[tokio::test]
async fn test_server_error_then_success() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/tracks/7"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/tracks/7"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": {"id": "7"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let track = client.get_track("7", None).await.expect("request failed");
    assert_eq!(track["data"]["id"], "7");
}

#[tokio::test]
async fn test_server_errors_exhaust_retries() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let started = Instant::now();
    let err = client
        .request(
            Method::GET,
            "/v2/users/me",
            RequestOptions::new().max_retries(2),
        )
        .await
        .unwrap_err();

    // Delays of base and 2 * base with no jitter
    assert!(started.elapsed() >= BASE_BACKOFF * 3);
    match err {
        TidalError::TransientExhausted {
            attempts, cause, ..
        } => {
            assert_eq!(attempts, 3);
            assert_eq!(cause, TransientCause::ServerError { status: 502 });
        }
        other => panic!("expected TransientExhausted, got {other:?}"),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/tracks/0"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "status": 400,
            "subStatus": 1002,
            "userMessage": "Invalid country code"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.get_track("0", Some("XX")).await.unwrap_err();
    match err {
        TidalError::ApiClient {
            status,
            url,
            user_message,
            sub_status,
            ..
        } => {
            assert_eq!(status, 400);
            assert!(url.contains("/v2/tracks/0?countryCode=XX"));
            assert_eq!(user_message.as_deref(), Some("Invalid country code"));
            assert_eq!(sub_status, Some(1002));
        }
        other => panic!("expected ApiClient, got {other:?}"),
    }
}

#[tokio::test]
async fn test_not_found_is_terminal() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/playlists/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
            "errors": [{"code": "NOT_FOUND", "detail": "Playlist not found"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.get_playlist("missing", None, false).await.unwrap_err();
    assert_eq!(err.status(), Some(404));
    match err {
        TidalError::ApiClient {
            error,
            user_message,
            ..
        } => {
            assert_eq!(error.as_deref(), Some("NOT_FOUND"));
            assert_eq!(user_message.as_deref(), Some("Playlist not found"));
        }
        other => panic!("expected ApiClient, got {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_refused_exhausts_retries() {
    // Reserve a port, then close it
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let server = MockServer::start().await;
    let config = common::test_config(&server)
        .with_api_base_url(format!("http://{addr}"))
        .with_max_retries(1);
    let client = ProviderClient::new(config).unwrap();
    client.set_tokens("A", Some("R".into()), 3600);

    let err = client.get_current_user(None).await.unwrap_err();
    match err {
        TidalError::TransientExhausted {
            attempts, cause, ..
        } => {
            assert_eq!(attempts, 2);
            assert!(matches!(
                cause,
                TransientCause::ConnectionRefused | TransientCause::Connect
            ));
        }
        other => panic!("expected TransientExhausted, got {other:?}"),
    }
}
