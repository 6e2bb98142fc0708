//! Integration tests for the authorization-code exchange and refresh grants

use std::time::Duration;

use wiremock::matchers::{basic_auth, body_string_contains, header, method, path};
use wiremock::{Mock, ResponseTemplate};

use tidelink_client::{ProviderClient, TidalError};

use crate::common::{self, CLIENT_ID, TOKEN_PATH};

#[tokio::test]
async fn test_exchange_code_with_pkce_stores_tokens() {
    let (server, client) = common::setup_provider_mock().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code-1"))
        .and(body_string_contains(
            "redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fauth%2Fcallback",
        ))
        .and(body_string_contains(&format!("client_id={CLIENT_ID}")))
        .and(body_string_contains("code_verifier=verifier-xyz"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::token_body("A1", Some("R1"), 3600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let tokens = client
        .exchange_code_for_tokens("auth-code-1", Some("verifier-xyz"))
        .await
        .expect("exchange failed");

    assert_eq!(tokens.access_token.as_deref(), Some("A1"));
    assert_eq!(tokens.refresh_token.as_deref(), Some("R1"));
    assert!(tokens.expires_at.is_some());
    assert_eq!(client.tokens(), tokens);
    assert!(!client.needs_refresh());
}

#[tokio::test]
async fn test_exchange_code_with_client_secret_uses_basic_auth() {
    let server = wiremock::MockServer::start().await;
    let config = common::test_config(&server).with_client_secret("s3cret");
    let client = ProviderClient::new(config).unwrap();

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(basic_auth(CLIENT_ID, "s3cret"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::token_body("A1", Some("R1"), 3600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    client
        .exchange_code_for_tokens("auth-code-1", None)
        .await
        .expect("exchange failed");

    let requests = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&requests[0].body);
    assert!(!body.contains("client_id="));
    assert!(!body.contains("code_verifier="));
}

#[tokio::test]
async fn test_exchange_code_rejected() {
    let (server, client) = common::setup_provider_mock().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .exchange_code_for_tokens("bad-code", Some("v"))
        .await
        .unwrap_err();

    match err {
        TidalError::AuthExchange { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("expected AuthExchange, got {other:?}"),
    }
    assert!(client.access_token().is_none());
}

#[tokio::test]
async fn test_exchange_unauthorized_is_not_retried() {
    let (server, client) = common::setup_provider_mock().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .expect(1)
        .mount(&server)
        .await;

    let err = client
        .exchange_code_for_tokens("code", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TidalError::AuthExchange { status: 401, .. }));
}

#[tokio::test]
async fn test_token_endpoint_throttling_is_retried() {
    let (server, client) = common::setup_provider_mock().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::token_body("A1", Some("R1"), 3600)),
        )
        .mount(&server)
        .await;

    let tokens = client
        .exchange_code_for_tokens("code", None)
        .await
        .expect("exchange should succeed after throttling");
    assert_eq!(tokens.access_token.as_deref(), Some("A1"));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_exchange_malformed_response() {
    let (server, client) = common::setup_provider_mock().await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let err = client
        .exchange_code_for_tokens("code", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TidalError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_refresh_now_sends_refresh_grant() {
    let (server, client) = common::setup_authenticated("A1", Some("R1"), 3600).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R1"))
        .and(body_string_contains(&format!("client_id={CLIENT_ID}")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(common::token_body("A2", Some("R2"), 3600)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = client.refresh_now().await.expect("refresh failed");
    assert_eq!(token, "A2");
    let tokens = client.tokens();
    assert_eq!(tokens.access_token.as_deref(), Some("A2"));
    assert_eq!(tokens.refresh_token.as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let (server, client) = common::setup_authenticated("A1", Some("R1"), 3600).await;

    common::refresh_mock("A2", None, Duration::ZERO)
        .expect(1)
        .mount(&server)
        .await;

    client.refresh_now().await.expect("refresh failed");
    let tokens = client.tokens();
    assert_eq!(tokens.access_token.as_deref(), Some("A2"));
    assert_eq!(tokens.refresh_token.as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_refresh_rejected_leaves_tokens() {
    let (server, client) = common::setup_authenticated("A1", Some("R1"), 3600).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_grant"}"#))
        .expect(1)
        .mount(&server)
        .await;

    let err = client.refresh_now().await.unwrap_err();
    assert!(matches!(
        err,
        TidalError::AuthRefresh {
            status: Some(400),
            ..
        }
    ));
    assert!(err.requires_reauthentication());
    assert_eq!(client.access_token().as_deref(), Some("A1"));
}
