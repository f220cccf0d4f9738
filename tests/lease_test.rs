//! Integration tests for background lease renewal and eviction
//!
//! These use short real TTLs (1-3s) with the renewal floor disabled so the
//! half-life scheduling is observable within the test.

use serde_json::json;
use std::time::Duration;
use time::OffsetDateTime;
use vault_lease_sdk::{Client, ClientBuilder, Credentials, Error, Lease, LeaseState};
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

async fn setup(max_attempts: u32) -> (MockServer, Client) {
    let server = MockServer::start().await;
    let client = ClientBuilder::new(server.uri())
        .credentials(Credentials::token("test-token"))
        .timeout_ms(2000)
        .max_attempts(max_attempts)
        .base_delay_ms(10)
        .max_delay_ms(50)
        .renew_floor_secs(0)
        .build()
        .expect("Failed to build client");

    Mock::given(method("GET"))
        .and(path("/v1/auth/token/lookup-self"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"accessor": "acc-1", "ttl": 3600, "renewable": false}
        })))
        .mount(&server)
        .await;

    (server, client)
}

async fn mount_secret(server: &MockServer, secret_path: &str, lease_id: &str, ttl: u64, renewable: bool) {
    Mock::given(method("GET"))
        .and(path(format!("/v1/{secret_path}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lease_id": lease_id,
            "renewable": renewable,
            "lease_duration": ttl,
            "data": {"username": "v-user", "password": "v-pass"}
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_non_renewable_lease_evicted_at_expiry() {
    let (server, client) = setup(3).await;
    mount_secret(&server, "database/creds/short", "database/creds/short/l1", 1, false).await;

    let record = client.read("database/creds/short").await.expect("read");
    let lease_id = record.lease_id.expect("lease id");

    assert!(client.leases().get(&lease_id).is_some());
    assert_eq!(client.leases().state(&lease_id), Some(LeaseState::Active));

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert!(client.leases().get(&lease_id).is_none());
    assert!(matches!(
        client.leases().lookup(&lease_id),
        Err(Error::LeaseExpired { .. })
    ));
}

#[tokio::test]
async fn test_renewable_lease_renewed_at_half_life() {
    let (server, client) = setup(3).await;
    mount_secret(&server, "database/creds/ro", "database/creds/ro/l1", 2, true).await;

    Mock::given(method("PUT"))
        .and(path("/v1/sys/leases/renew"))
        .and(body_partial_json(json!({"lease_id": "database/creds/ro/l1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "lease_id": "database/creds/ro/l1",
            "renewable": true,
            "lease_duration": 2
        })))
        .expect(1..)
        .mount(&server)
        .await;

    let record = client.read("database/creds/ro").await.expect("read");
    let lease_id = record.lease_id.expect("lease id");
    let issued_at = client.leases().get(&lease_id).expect("lease").issued_at;

    // Past the original 2s ttl; only renewal keeps the lease alive.
    tokio::time::sleep(Duration::from_millis(2600)).await;

    let lease = client.leases().get(&lease_id).expect("lease renewed");
    assert!(lease.issued_at > issued_at);
    assert_eq!(lease.ttl, Duration::from_secs(2));
    assert_eq!(client.leases().state(&lease_id), Some(LeaseState::Active));
}

#[tokio::test]
async fn test_renewal_failure_retries_once_then_evicts() {
    let (server, client) = setup(1).await;
    mount_secret(&server, "database/creds/flaky", "database/creds/flaky/l1", 2, true).await;

    // Renewal at ~1s fails, the single retry at ~1.5s fails, and the lease is
    // evicted without waiting out the remaining ttl.
    Mock::given(method("PUT"))
        .and(path("/v1/sys/leases/renew"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let record = client.read("database/creds/flaky").await.expect("read");
    let lease_id = record.lease_id.expect("lease id");

    tokio::time::sleep(Duration::from_millis(1800)).await;

    assert!(client.leases().get(&lease_id).is_none());
}

#[tokio::test]
async fn test_leases_renew_independently() {
    let (server, client) = setup(3).await;
    mount_secret(&server, "database/creds/a", "database/creds/a/l1", 2, true).await;
    mount_secret(&server, "database/creds/b", "database/creds/b/l1", 2, true).await;

    // A slow renewal response must not stall the other lease's timer.
    Mock::given(method("PUT"))
        .and(path("/v1/sys/leases/renew"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(200))
                .set_body_json(json!({"renewable": true, "lease_duration": 2})),
        )
        .expect(2..)
        .mount(&server)
        .await;

    let a = client.read("database/creds/a").await.expect("read a");
    let b = client.read("database/creds/b").await.expect("read b");
    let a_id = a.lease_id.expect("lease a");
    let b_id = b.lease_id.expect("lease b");

    tokio::time::sleep(Duration::from_millis(2600)).await;

    assert!(client.leases().get(&a_id).is_some());
    assert!(client.leases().get(&b_id).is_some());
}

#[tokio::test]
async fn test_revoke_lease_removes_and_notifies_server() {
    let (server, client) = setup(3).await;
    mount_secret(&server, "database/creds/rw", "database/creds/rw/l1", 60, false).await;

    Mock::given(method("PUT"))
        .and(path("/v1/sys/leases/revoke"))
        .and(body_partial_json(json!({"lease_id": "database/creds/rw/l1"})))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let record = client.read("database/creds/rw").await.expect("read");
    let lease_id = record.lease_id.expect("lease id");

    client.revoke_lease(&lease_id).await.expect("revoke");
    assert!(client.leases().get(&lease_id).is_none());

    // A second revoke finds nothing to revoke.
    assert!(matches!(
        client.revoke_lease(&lease_id).await,
        Err(Error::LeaseExpired { .. })
    ));
}

#[tokio::test]
async fn test_dropping_client_stops_renewal_tasks() {
    let (server, client) = setup(3).await;
    mount_secret(&server, "database/creds/gone", "database/creds/gone/l1", 2, true).await;

    Mock::given(method("PUT"))
        .and(path("/v1/sys/leases/renew"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "renewable": true,
            "lease_duration": 2
        })))
        .mount(&server)
        .await;

    let record = client.read("database/creds/gone").await.expect("read");
    assert!(record.lease_id.is_some());

    // The last client handle goes away before the half-life renewal fires;
    // no renewal traffic may reach the server afterwards.
    drop(client);
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let renew_calls = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/v1/sys/leases/renew")
        .count();
    assert_eq!(renew_calls, 0, "renewal task outlived the client");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_register_keeps_single_renewal_task() {
    let (server, client) = setup(3).await;

    Mock::given(method("PUT"))
        .and(path("/v1/sys/leases/renew"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "renewable": true,
            "lease_duration": 2
        })))
        .mount(&server)
        .await;

    // Racing registrations of the same id must leave exactly one timer task;
    // extra survivors show up as duplicated renewal traffic.
    let mut handles = Vec::new();
    for _ in 0..8 {
        let leases = client.leases().clone();
        handles.push(tokio::spawn(async move {
            leases.register(Lease {
                id: "database/creds/dup/l1".to_string(),
                ttl: Duration::from_secs(2),
                issued_at: OffsetDateTime::now_utc(),
                renewable: true,
                secret_path: Some("database/creds/dup".to_string()),
            });
        }));
    }
    for handle in handles {
        handle.await.expect("join");
    }
    assert_eq!(client.leases().active_count(), 1);

    // A single task renews at ~1s and ~2s within this window.
    tokio::time::sleep(Duration::from_millis(2500)).await;

    let renew_calls = server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/v1/sys/leases/renew")
        .count();
    assert!(
        (1..=2).contains(&renew_calls),
        "expected one renewal task, saw {renew_calls} renewals"
    );
}

#[tokio::test]
async fn test_shutdown_drops_all_tracked_leases() {
    let (server, client) = setup(3).await;
    mount_secret(&server, "database/creds/x", "database/creds/x/l1", 60, true).await;
    mount_secret(&server, "database/creds/y", "database/creds/y/l1", 60, false).await;

    client.read("database/creds/x").await.expect("read x");
    client.read("database/creds/y").await.expect("read y");
    assert!(client.leases().active_count() >= 2);

    client.leases().shutdown();
    assert_eq!(client.leases().active_count(), 0);
}
