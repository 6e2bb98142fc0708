//! Integration tests for the catalog endpoint wrappers

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reqwest::Method;
use tidelink_client::{ProviderClient, RequestOptions};

use crate::common;

async fn setup_with_country(country: &str) -> (MockServer, ProviderClient) {
    let server = MockServer::start().await;
    let config = common::test_config(&server).with_default_country_code(country);
    let client = ProviderClient::new(config).unwrap();
    client.set_tokens("A", Some("R".into()), 3600);
    (server, client)
}

fn items_page(ids: &[&str], next: Option<&str>) -> serde_json::Value {
    let data: Vec<_> = ids
        .iter()
        .map(|id| json!({"id": id, "type": "tracks"}))
        .collect();
    json!({
        "data": data,
        "links": { "next": next }
    })
}

#[tokio::test]
async fn test_requests_carry_auth_and_content_type() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .and(header("authorization", "Bearer A"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::user_body("user-1")))
        .expect(1)
        .mount(&server)
        .await;

    client.get_current_user(None).await.expect("request failed");
}

#[tokio::test]
async fn test_default_country_code_is_applied() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/tracks/1"))
        .and(query_param("countryCode", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "1"}})))
        .expect(1)
        .mount(&server)
        .await;

    client.get_track("1", None).await.expect("request failed");
}

#[tokio::test]
async fn test_configured_and_explicit_country_codes() {
    let (server, client) = setup_with_country("SE").await;

    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .and(query_param("countryCode", "SE"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::user_body("user-1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/users/me"))
        .and(query_param("countryCode", "NO"))
        .respond_with(ResponseTemplate::new(200).set_body_json(common::user_body("user-2")))
        .expect(1)
        .mount(&server)
        .await;

    let me = client.get_current_user(None).await.unwrap();
    assert_eq!(me["data"]["id"], "user-1");
    let me = client.get_current_user(Some("NO")).await.unwrap();
    assert_eq!(me["data"]["id"], "user-2");
}

#[tokio::test]
async fn test_search_tracks_params() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/searchresults/tracks"))
        .and(query_param("query", "daft punk"))
        .and(query_param("limit", "5"))
        .and(query_param("countryCode", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items_page(&["1", "2"], None)))
        .expect(1)
        .mount(&server)
        .await;

    let results = client.search_tracks("daft punk", 5, None).await.unwrap();
    assert_eq!(results["data"].as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn test_get_playlist_with_items() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/playlists/p-1"))
        .and(query_param("include", "items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"id": "p-1", "type": "playlists"},
            "included": [{"id": "1", "type": "tracks"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let playlist = client.get_playlist("p-1", None, true).await.unwrap();
    assert_eq!(playlist["data"]["id"], "p-1");
    assert_eq!(playlist["included"][0]["id"], "1");
}

#[tokio::test]
async fn test_get_user_playlists_paging_params() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/users/user-1/playlists"))
        .and(query_param("limit", "20"))
        .and(query_param("offset", "40"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items_page(&[], None)))
        .expect(1)
        .mount(&server)
        .await;

    client
        .get_user_playlists("user-1", 20, 40, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_playlist_items_follow_pages() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    let pages = [
        ("0", items_page(&["1", "2"], Some("/v2/playlists/p-1/items?offset=2"))),
        ("2", items_page(&["3", "4"], Some("/v2/playlists/p-1/items?offset=4"))),
        ("4", items_page(&["5"], None)),
    ];
    for (offset, body) in pages {
        Mock::given(method("GET"))
            .and(path("/v2/playlists/p-1/items"))
            .and(query_param("limit", "2"))
            .and(query_param("offset", offset))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
    }

    let items = client
        .get_playlist_items("p-1", 2, 0, None)
        .await
        .expect("pagination failed");
    let ids: Vec<_> = items.iter().map(|item| item["id"].as_str().unwrap()).collect();
    assert_eq!(ids, ["1", "2", "3", "4", "5"]);
}

#[tokio::test]
async fn test_playlist_items_stop_without_next_link() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    // A full page that advertises no successor ends the walk
    Mock::given(method("GET"))
        .and(path("/v2/playlists/p-2/items"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items_page(&["1", "2"], None)))
        .expect(1)
        .mount(&server)
        .await;

    let items = client.get_playlist_items("p-2", 2, 0, None).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn test_playlist_items_zero_limit_uses_default_page_size() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/playlists/p-3/items"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": [{"id": "1"}]})))
        .expect(1)
        .mount(&server)
        .await;

    let items = client.get_playlist_items("p-3", 0, 0, None).await.unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn test_playlist_items_stop_at_offset_ceiling() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    let start = u32::MAX - 1;
    Mock::given(method("GET"))
        .and(path("/v2/playlists/p-4/items"))
        .and(query_param("offset", start.to_string()))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(items_page(&["1", "2"], Some("/v2/playlists/p-4/items?offset=0"))),
        )
        .expect(1)
        .mount(&server)
        .await;

    let items = client.get_playlist_items("p-4", 2, start, None).await.unwrap();
    assert_eq!(items.len(), 2);
}

#[tokio::test]
async fn test_ids_are_percent_encoded_in_paths() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/tracks/a%2Fb%3Fc"))
        .and(query_param("countryCode", "US"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": "x"}})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v2/users/me/favorites/tracks/..%2Fplaylists"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    client.get_track("a/b?c", None).await.expect("request failed");
    client
        .remove_track_from_favorites("../playlists")
        .await
        .expect("request failed");
}

#[tokio::test]
async fn test_params_are_not_sent_with_post() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("POST"))
        .and(path("/v2/playlists"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "p"}})))
        .expect(1)
        .mount(&server)
        .await;

    let options = RequestOptions::new()
        .param("countryCode", "US")
        .json(json!({"data": {"type": "playlists"}}));
    client
        .request(Method::POST, "/v2/playlists", options)
        .await
        .expect("request failed");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].url.query(), None);
}

#[tokio::test]
async fn test_favorites_add_and_remove() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("POST"))
        .and(path("/v2/users/me/favorites/tracks"))
        .and(body_json(json!({"trackId": "42"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v2/users/me/favorites/tracks/42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let added = client.add_track_to_favorites("42").await.unwrap();
    assert_eq!(added["status"], "ok");

    let removed = client.remove_track_from_favorites("42").await.unwrap();
    assert!(removed.is_null());
}

#[tokio::test]
async fn test_get_favorite_tracks() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("GET"))
        .and(path("/v2/users/user-1/favorites/tracks"))
        .and(query_param("limit", "10"))
        .and(query_param("offset", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(items_page(&["9"], None)))
        .expect(1)
        .mount(&server)
        .await;

    let favorites = client
        .get_favorite_tracks("user-1", 10, 0, None)
        .await
        .unwrap();
    assert_eq!(favorites["data"][0]["id"], "9");
}

#[tokio::test]
async fn test_create_playlist_and_add_tracks() {
    let (server, client) = common::setup_authenticated("A", Some("R"), 3600).await;

    Mock::given(method("POST"))
        .and(path("/v2/playlists"))
        .and(body_json(json!({"title": "Mix", "description": "Weekend"})))
        .respond_with(
            ResponseTemplate::new(201).set_body_json(json!({"data": {"id": "p-new"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/playlists/p-new/items"))
        .and(body_json(json!({"trackIds": ["1", "2"]})))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .expect(1)
        .mount(&server)
        .await;

    let created = client.create_playlist("Mix", "Weekend").await.unwrap();
    let playlist_id = created["data"]["id"].as_str().unwrap();
    assert_eq!(playlist_id, "p-new");

    let added = client
        .add_tracks_to_playlist(playlist_id, &["1".to_string(), "2".to_string()])
        .await
        .unwrap();
    assert!(added.is_null());
}
