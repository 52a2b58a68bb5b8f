#![allow(clippy::unwrap_used)]
// Integration tests for `HttpHubChannel` and `HttpDeviceClient` using wiremock.

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use serde_json::{Map, json};
use url::Url;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use bulbsync_api::{
    DeviceClient, Error, ExecuteRequest, HttpDeviceClient, HttpHubChannel, HubChannel, Nva,
};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup_hub() -> (MockServer, HttpHubChannel) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let channel = HttpHubChannel::with_client(reqwest::Client::new(), base_url);
    (server, channel)
}

async fn setup_device() -> (MockServer, HttpDeviceClient) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let client = HttpDeviceClient::with_client(reqwest::Client::new(), base_url);
    (server, client)
}

fn get_request() -> ExecuteRequest {
    let mut adverb = Map::new();
    adverb.insert("source.translator".into(), json!("tr-1"));
    ExecuteRequest {
        nva: vec![Nva::get(adverb)],
        source_translator: "tr-1".into(),
        manipulator_id: "tr-1".into(),
        access_token: SecretString::from("token-123".to_string()),
    }
}

// ── Hub channel ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_execute_posts_batch_with_bearer_token() {
    let (server, channel) = setup_hub().await;

    Mock::given(method("POST"))
        .and(path("/nva"))
        .and(header("authorization", "Bearer token-123"))
        .and(body_json(json!({
            "nva": [{ "verb": "get", "adverb": { "source.translator": "tr-1" } }],
            "sourceTranslator": "tr-1",
            "manipulatorId": "tr-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "data": [
                { "id": "t1", "source": { "translator": "tr-1", "id": "d1" }, "state": "on" },
                { "id": "t2", "source": { "translator": "tr-1", "id": "d2" } }
            ] }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let responses = channel.execute(get_request()).await.unwrap();
    assert_eq!(responses.len(), 1);

    let things = responses[0].things().unwrap();
    assert_eq!(things.len(), 2);
    assert_eq!(things[0].id, "t1");
    assert_eq!(things[0].attributes.get("state"), Some(&json!("on")));
}

#[tokio::test]
async fn test_execute_maps_rejection_envelope() {
    let (server, channel) = setup_hub().await;

    Mock::given(method("POST"))
        .and(path("/nva"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "status": 0,
            "error": { "code": "FORBIDDEN", "reason": "token expired" }
        })))
        .mount(&server)
        .await;

    let result = channel.execute(get_request()).await;
    match result {
        Err(Error::Hub { status, message }) => {
            assert_eq!(status, 403);
            assert_eq!(message, "FORBIDDEN: token expired");
        }
        other => panic!("expected Hub error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_execute_server_error_is_transient() {
    let (server, channel) = setup_hub().await;

    Mock::given(method("POST"))
        .and(path("/nva"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = channel.execute(get_request()).await.unwrap_err();
    assert!(err.is_transient(), "expected transient error, got: {err:?}");
}

#[tokio::test]
async fn test_execute_reports_malformed_body() {
    let (server, channel) = setup_hub().await;

    Mock::given(method("POST"))
        .and(path("/nva"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    let result = channel.execute(get_request()).await;
    assert!(
        matches!(result, Err(Error::Deserialization { ref body, .. }) if body == "{not json"),
        "expected Deserialization error, got: {result:?}"
    );
}

// ── Device client ───────────────────────────────────────────────────

#[tokio::test]
async fn test_device_current_state() {
    let (server, client) = setup_device().await;

    Mock::given(method("GET"))
        .and(path("/devices/d1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "d1", "on": true })))
        .mount(&server)
        .await;

    let state = client.current_state("d1").await.unwrap();
    assert_eq!(state, Some(json!({ "id": "d1", "on": true })));
}

#[tokio::test]
async fn test_device_unknown_returns_none() {
    let (server, client) = setup_device().await;

    Mock::given(method("GET"))
        .and(path("/devices/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    assert_eq!(client.current_state("ghost").await.unwrap(), None);
}

#[tokio::test]
async fn test_device_invoke_posts_args() {
    let (server, client) = setup_device().await;

    Mock::given(method("POST"))
        .and(path("/devices/d1/setPower"))
        .and(body_json(json!({ "on": false, "duration": 0 })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let answer = client
        .invoke("d1", "setPower", &json!({ "on": false, "duration": 0 }))
        .await
        .unwrap();
    assert_eq!(answer, Some(serde_json::Value::Null));
}

#[tokio::test]
async fn test_device_invoke_failure_carries_status() {
    let (server, client) = setup_device().await;

    Mock::given(method("POST"))
        .and(path("/devices/d1/setColor"))
        .respond_with(ResponseTemplate::new(500).set_body_string("bulb offline"))
        .mount(&server)
        .await;

    let result = client.invoke("d1", "setColor", &json!({ "hue": 10 })).await;
    assert!(
        matches!(result, Err(Error::Device { status: 500, ref message, .. }) if message == "bulb offline"),
        "expected Device error, got: {result:?}"
    );
}
