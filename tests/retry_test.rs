//! Integration tests for transport retry behavior

use serde_json::json;
use std::time::Duration;
use vault_lease_sdk::{Client, ClientBuilder, Credentials, Error};
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

async fn setup(max_attempts: u32, timeout_ms: u64) -> (MockServer, Client) {
    let server = MockServer::start().await;
    let client = ClientBuilder::new(server.uri())
        .credentials(Credentials::token("test-token"))
        .timeout_ms(timeout_ms)
        .max_attempts(max_attempts)
        .base_delay_ms(10)
        .max_delay_ms(50)
        .build()
        .expect("Failed to build client");
    (server, client)
}

async fn mount_lookup_self(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"accessor": "acc-1", "ttl": 3600, "renewable": false}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_retry_succeeds_on_third_attempt() {
    let (server, client) = setup(3, 5000).await;
    mount_lookup_self(&server).await;

    // Two transient failures, then success; earlier mounts match first.
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lease_id": "",
            "lease_duration": 0,
            "data": {"value": "ok"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = client.read("secret/data/app").await.expect("read");
    assert_eq!(record.data["value"], json!("ok"));
}

#[tokio::test]
async fn test_exhausted_retries_surface_transport_exhausted() {
    let (server, client) = setup(3, 5000).await;
    mount_lookup_self(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/secret/data/app"))
        .respond_with(ResponseTemplate::new(500))
        .expect(3)
        .mount(&server)
        .await;

    match client.read("secret/data/app").await {
        Err(Error::TransportExhausted { attempts, last }) => {
            assert_eq!(attempts, 3);
            assert!(matches!(*last, Error::Http { status: 500, .. }));
        }
        other => panic!("Expected TransportExhausted, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_non_idempotent_write_is_not_retried() {
    let (server, client) = setup(3, 5000).await;
    mount_lookup_self(&server).await;

    // The expect(1) verifies the failing write was sent exactly once.
    Mock::given(method("POST"))
        .and(path("/v1/secret/data/app"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    match client.write("secret/data/app", &json!({"k": "v"})).await {
        Err(Error::Http { status: 503, .. }) => {}
        other => panic!("Expected a 503 without retries, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let (server, client) = setup(3, 5000).await;
    mount_lookup_self(&server).await;

    Mock::given(method("GET"))
        .and(path("/v1/secret/data/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"errors": ["not found"]})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(matches!(
        client.read("secret/data/missing").await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_timeout_consumes_an_attempt() {
    let (server, client) = setup(2, 200).await;
    mount_lookup_self(&server).await;

    // First response outlives the per-attempt timeout; the retry succeeds.
    Mock::given(method("GET"))
        .and(path("/v1/secret/data/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(600))
                .set_body_json(json!({"lease_id": "", "lease_duration": 0, "data": {}})),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/secret/data/slow"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lease_id": "",
            "lease_duration": 0,
            "data": {"value": "fast"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let record = client.read("secret/data/slow").await.expect("read");
    assert_eq!(record.data["value"], json!("fast"));
}
