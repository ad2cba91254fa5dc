use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use reqwest::StatusCode;
use serde_json::json;

use chrono::{DateTime, Utc};
use fleetmed_core::device::{hmac_sha256, DeviceRegistry};
use fleetmed_core::error::StorageError;
use fleetmed_core::policy::Role;
use fleetmed_core::record::{RecordId, TelemetryRecord, ValidatedPayload, VehicleId};
use fleetmed_core::store::{MemoryStore, RecordFilter, RecordStore};
use fleetmed_daemon::config::{DaemonConfig, TokenDirectory};
use fleetmed_daemon::http;

const AMB_KEY: &[u8] = b"ambulance-01-secret";
const VAN_KEY: &[u8] = b"transport-02-secret";

struct TestServer {
    addr: SocketAddr,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(DaemonConfig::default(), Arc::new(MemoryStore::new())).await
    }

    async fn start_with(cfg: DaemonConfig, store: Arc<dyn RecordStore>) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");

        let mut registry = DeviceRegistry::new();
        registry.register(VehicleId::new("ambulance_01"), AMB_KEY.to_vec());
        registry.register(VehicleId::new("transport_02"), VAN_KEY.to_vec());
        registry.register(VehicleId::new("stolen_03"), b"stolen-key".to_vec());
        registry.revoke(&VehicleId::new("stolen_03"));

        let mut tokens = TokenDirectory::new();
        tokens.insert("tok-police", "officer-7", Role::Police);
        tokens.insert("tok-doctor", "dr-9", Role::Doctor);
        tokens.insert("tok-admin", "root", Role::Admin);

        let state = http::build_state(cfg, Arc::new(RwLock::new(registry)), store, Arc::new(tokens));

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let _ = http::serve(listener, state, async move {
                let _ = rx.await;
            })
            .await;
        });

        Self {
            addr,
            shutdown: Some(tx),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.abort();
    }
}

/// Store whose commits take a configurable time, so tests can place the
/// processing deadline on either side of the commit point.
struct SlowStore {
    inner: MemoryStore,
    commit_delay: std::time::Duration,
}

impl RecordStore for SlowStore {
    fn persist(
        &self,
        payload: ValidatedPayload,
        timestamp_received: DateTime<Utc>,
    ) -> Result<RecordId, StorageError> {
        std::thread::sleep(self.commit_delay);
        self.inner.persist(payload, timestamp_received)
    }

    fn query(&self, filter: &RecordFilter) -> Result<Vec<TelemetryRecord>, StorageError> {
        self.inner.query(filter)
    }

    fn expire_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StorageError> {
        self.inner.expire_before(cutoff)
    }
}

fn ambulance_body() -> Vec<u8> {
    serde_json::to_vec(&json!({
        "vehicle_id": "ambulance_01",
        "timestamp_device": "2023-10-27T10:30:00Z",
        "latitude": 34.0522,
        "longitude": -118.2437,
        "speed_kmh": 60.5,
        "temperature_c": 37.2,
        "heart_rate_bpm": 88,
        "blood_oxygen_spo2": 98.5,
        "patient_name": "John Doe",
        "medical_id": "MED00123"
    }))
    .expect("body")
}

fn sign(key: &[u8], body: &[u8]) -> String {
    format!("sha256={}", hex::encode(hmac_sha256(key, body)))
}

async fn post_telemetry(
    client: &reqwest::Client,
    server: &TestServer,
    vehicle: &str,
    signature: String,
    body: Vec<u8>,
) -> reqwest::Response {
    client
        .post(server.url("/v1/telemetry"))
        .header("x-fleetmed-vehicle", vehicle)
        .header("x-fleetmed-signature", signature)
        .body(body)
        .send()
        .await
        .expect("request")
}

#[tokio::test]
async fn ingest_then_query_discloses_per_role() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let body = ambulance_body();

    let resp = post_telemetry(
        &client,
        &server,
        "ambulance_01",
        sign(AMB_KEY, &body),
        body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let accepted: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(accepted["record_id"], 1);

    let police: serde_json::Value = client
        .get(server.url("/v1/records"))
        .header("authorization", "Bearer tok-police")
        .send()
        .await
        .expect("query")
        .json()
        .await
        .expect("json");
    let record = &police[0];
    assert_eq!(record["record_id"], 1);
    assert_eq!(record["vehicle_id"], "ambulance_01");
    assert_eq!(record["latitude"], 34.0522);
    assert_eq!(record["longitude"], -118.2437);
    assert_eq!(record["speed_kmh"], 60.5);
    assert!(record.get("patient_name").is_none());
    assert!(record.get("medical_id").is_none());
    assert!(record.get("heart_rate_bpm").is_none());

    let doctor: serde_json::Value = client
        .get(server.url("/v1/records"))
        .header("authorization", "Bearer tok-doctor")
        .send()
        .await
        .expect("query")
        .json()
        .await
        .expect("json");
    let record = &doctor[0];
    assert_eq!(record["record_id"], 1);
    assert_eq!(record["temperature_c"], 37.2);
    assert_eq!(record["heart_rate_bpm"], 88.0);
    assert_eq!(record["blood_oxygen_spo2"], 98.5);
    assert_eq!(record["patient_name"], "John Doe");
    assert_eq!(record["medical_id"], "MED00123");
    assert!(record.get("latitude").is_none());
    assert!(record.get("longitude").is_none());
    assert!(record.get("speed_kmh").is_none());

    let admin: serde_json::Value = client
        .get(server.url("/v1/records"))
        .header("authorization", "Bearer tok-admin")
        .send()
        .await
        .expect("query")
        .json()
        .await
        .expect("json");
    let record = &admin[0];
    assert_eq!(record["latitude"], 34.0522);
    assert_eq!(record["patient_name"], "John Doe");

    server.stop();
}

#[tokio::test]
async fn wrong_proof_rejected_and_nothing_persisted() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let body = ambulance_body();

    for _ in 0..3 {
        let resp = post_telemetry(
            &client,
            &server,
            "ambulance_01",
            sign(b"attacker-guess", &body),
            body.clone(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let err: serde_json::Value = resp.json().await.expect("json");
        assert_eq!(err["error"], "UNAUTHORIZED");
        assert_eq!(err["reason"], "invalid device proof");
    }

    // The store stayed clean: the next honest submission is record 1.
    let resp = post_telemetry(
        &client,
        &server,
        "ambulance_01",
        sign(AMB_KEY, &body),
        body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let accepted: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(accepted["record_id"], 1);

    server.stop();
}

#[tokio::test]
async fn cross_vehicle_submission_forbidden() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    // transport_02 signs correctly but the payload claims ambulance_01.
    let body = ambulance_body();

    let resp = post_telemetry(
        &client,
        &server,
        "transport_02",
        sign(VAN_KEY, &body),
        body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(err["error"], "FORBIDDEN");

    server.stop();
}

#[tokio::test]
async fn revoked_device_forbidden() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let body = serde_json::to_vec(&json!({
        "vehicle_id": "stolen_03",
        "timestamp_device": "2023-10-27T10:30:00Z",
        "latitude": 0.0,
        "longitude": 0.0,
        "speed_kmh": 0.0
    }))
    .expect("body");

    let resp = post_telemetry(
        &client,
        &server,
        "stolen_03",
        sign(b"stolen-key", &body),
        body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let err: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(err["reason"], "device is revoked");

    server.stop();
}

#[tokio::test]
async fn out_of_range_latitude_names_the_field() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let body = serde_json::to_vec(&json!({
        "vehicle_id": "ambulance_01",
        "timestamp_device": "2023-10-27T10:30:00Z",
        "latitude": 90.0001,
        "longitude": 0.0,
        "speed_kmh": 0.0
    }))
    .expect("body");

    let resp = post_telemetry(
        &client,
        &server,
        "ambulance_01",
        sign(AMB_KEY, &body),
        body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(err["error"], "INVALID_INPUT");
    assert_eq!(err["field"], "latitude");

    server.stop();
}

#[tokio::test]
async fn query_requires_known_bearer_token() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let missing = client
        .get(server.url("/v1/records"))
        .send()
        .await
        .expect("request");
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let unknown = client
        .get(server.url("/v1/records"))
        .header("authorization", "Bearer tok-nobody")
        .send()
        .await
        .expect("request");
    assert_eq!(unknown.status(), StatusCode::UNAUTHORIZED);
    let err: serde_json::Value = unknown.json().await.expect("json");
    assert_eq!(err["reason"], "authentication failed");

    server.stop();
}

#[tokio::test]
async fn bad_time_filter_rejected() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(server.url("/v1/records?from=yesterday"))
        .header("authorization", "Bearer tok-admin")
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(err["field"], "from");

    server.stop();
}

#[tokio::test]
async fn latest_returns_one_record_per_vehicle() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();

    for (vehicle, key, minute) in [
        ("ambulance_01", AMB_KEY, 0),
        ("transport_02", VAN_KEY, 1),
        ("ambulance_01", AMB_KEY, 2),
    ] {
        let body = serde_json::to_vec(&json!({
            "vehicle_id": vehicle,
            "timestamp_device": format!("2023-10-27T10:{minute:02}:00Z"),
            "latitude": 10.0,
            "longitude": 20.0,
            "speed_kmh": 42.0
        }))
        .expect("body");
        let resp = post_telemetry(&client, &server, vehicle, sign(key, &body), body).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let latest: serde_json::Value = client
        .get(server.url("/v1/latest"))
        .header("authorization", "Bearer tok-police")
        .send()
        .await
        .expect("request")
        .json()
        .await
        .expect("json");
    let rows = latest.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["vehicle_id"], "ambulance_01");
    assert_eq!(rows[0]["record_id"], 3);
    assert_eq!(rows[1]["vehicle_id"], "transport_02");
    assert_eq!(rows[1]["record_id"], 2);

    server.stop();
}

#[tokio::test]
async fn exceeded_deadline_rejects_and_persists_nothing() {
    let store = Arc::new(MemoryStore::new());
    let cfg = DaemonConfig {
        ingest_timeout_ms: 0,
        ..DaemonConfig::default()
    };
    let server = TestServer::start_with(cfg, store.clone()).await;
    let client = reqwest::Client::new();
    let body = ambulance_body();

    let resp = post_telemetry(
        &client,
        &server,
        "ambulance_01",
        sign(AMB_KEY, &body),
        body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let err: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(err["error"], "INVALID_INPUT");
    assert_eq!(err["field"], "payload");
    assert_eq!(err["reason"], "processing deadline exceeded");

    // No detached worker commits behind the rejection.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert!(store.is_empty());

    server.stop();
}

#[tokio::test]
async fn slow_commit_reported_truthfully() {
    // A commit that outlives the budget cannot be cancelled, so the
    // reply must say what the store did rather than claim a timeout.
    let store = Arc::new(SlowStore {
        inner: MemoryStore::new(),
        commit_delay: std::time::Duration::from_millis(300),
    });
    let cfg = DaemonConfig {
        ingest_timeout_ms: 100,
        ..DaemonConfig::default()
    };
    let server = TestServer::start_with(cfg, store.clone()).await;
    let client = reqwest::Client::new();
    let body = ambulance_body();

    let resp = post_telemetry(
        &client,
        &server,
        "ambulance_01",
        sign(AMB_KEY, &body),
        body,
    )
    .await;
    assert_eq!(resp.status(), StatusCode::CREATED);
    let accepted: serde_json::Value = resp.json().await.expect("json");
    assert_eq!(accepted["record_id"], 1);
    assert_eq!(store.inner.len(), 1);

    server.stop();
}

#[tokio::test]
async fn metrics_expose_ingest_and_query_counters() {
    let server = TestServer::start().await;
    let client = reqwest::Client::new();
    let body = ambulance_body();

    post_telemetry(&client, &server, "ambulance_01", sign(AMB_KEY, &body), body).await;
    client
        .get(server.url("/v1/records"))
        .header("authorization", "Bearer tok-doctor")
        .send()
        .await
        .expect("query");

    let metrics = client
        .get(server.url("/metrics"))
        .send()
        .await
        .expect("metrics")
        .text()
        .await
        .expect("text");
    assert!(metrics.contains("fleetmed_ingest_accepted_total 1"));
    assert!(metrics.contains("fleetmed_query_requests_total{role=\"doctor\"} 1"));

    server.stop();
}
