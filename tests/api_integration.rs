//! API Integration Tests for Pingwatch
//!
//! Tests covering the HTTP API endpoints against a real server and a
//! file-backed database seeded with known measurements.

use chrono::{Duration, Utc};
use pingwatch::server::{create_router, AppState};
use pingwatch::storage::{Concern, ConcernKind, LogLevel, Measurement, Storage};
use serde_json::Value;
use tempfile::TempDir;
use tokio::net::TcpListener;

// =============================================================================
// Test Helpers
// =============================================================================

/// Open storage on a temp file and build the app state.
async fn create_test_state() -> (AppState, Storage, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create tempdir");
    let url = format!("sqlite:{}", dir.path().join("test.db").display());
    let storage = Storage::open(&url).await.expect("Failed to open storage");

    let state = AppState {
        measurements: storage.measurements.clone(),
        logs: storage.logs.clone(),
    };
    (state, storage, dir)
}

/// Start test server and return base URL.
async fn start_test_server() -> (String, Storage, TempDir) {
    let (state, storage, dir) = create_test_state().await;
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    (format!("http://{}", addr), storage, dir)
}

fn measurement(ip: &str, country: &str, ts: chrono::DateTime<Utc>, avg: f64) -> Measurement {
    Measurement {
        id: None,
        server_ip: ip.to_string(),
        country: country.to_string(),
        partner: "acme".to_string(),
        dn_ext: format!("{}-01", country.to_lowercase()),
        ts,
        packets_transmitted: 4,
        packets_received: 4,
        packets_lost: 0,
        loss_percentage: 0.0,
        min_time: Some(avg - 1.0),
        avg_time: Some(avg),
        max_time: Some(avg + 1.0),
        mdev_time: Some(0.5),
        is_high_latency: avg > 100.0,
        success: true,
        concerns: vec![],
    }
}

// =============================================================================
// Health Probe Tests
// =============================================================================

#[tokio::test]
async fn test_health_probes() {
    let (base_url, _storage, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    // Test /healthz (liveness)
    let resp = client
        .get(format!("{}/healthz", base_url))
        .send()
        .await
        .expect("Failed to send healthz request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse healthz response");
    assert_eq!(body["status"], "ok");

    // Test /readyz (readiness)
    let resp = client
        .get(format!("{}/readyz", base_url))
        .send()
        .await
        .expect("Failed to send readyz request");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse readyz response");
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], "ready");
}

// =============================================================================
// Chart Data API Tests
// =============================================================================

#[tokio::test]
async fn test_ping_data_api() {
    let (base_url, storage, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let now = Utc::now();
    for (ip, country, avg) in [
        ("192.0.2.1", "DE", 12.0),
        ("192.0.2.2", "FR", 25.0),
        ("192.0.2.3", "DE", 14.0),
    ] {
        storage
            .measurements
            .insert(&measurement(ip, country, now, avg))
            .await
            .unwrap();
    }

    // Default range, hourly buckets
    let resp = client
        .get(format!("{}/api/ping-data?granularity=hour", base_url))
        .send()
        .await
        .expect("Failed to fetch ping data");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.expect("Failed to parse ping data");
    assert!(body.get("DE").is_some());
    assert!(body.get("FR").is_some());

    // Country filter narrows the series
    let resp = client
        .get(format!("{}/api/ping-data?country=FR", base_url))
        .send()
        .await
        .expect("Failed to fetch filtered ping data");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert!(body.get("DE").is_none());
    assert!(body.get("FR").is_some());

    // Custom range requires start and end
    let resp = client
        .get(format!("{}/api/ping-data?range=custom", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Custom range with a reversed window is rejected
    let start = (now + Duration::hours(1)).to_rfc3339();
    let end = now.to_rfc3339();
    let resp = client
        .get(format!(
            "{}/api/ping-data?range=custom&start={}&end={}",
            base_url,
            urlencode(&start),
            urlencode(&end)
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// =============================================================================
// Server Status and History Tests
// =============================================================================

#[tokio::test]
async fn test_servers_status_api() {
    let (base_url, storage, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let now = Utc::now();
    storage
        .measurements
        .insert(&measurement("192.0.2.1", "DE", now, 12.0))
        .await
        .unwrap();
    // Old data beyond the staleness window
    storage
        .measurements
        .insert(&measurement(
            "192.0.2.2",
            "FR",
            now - Duration::minutes(15),
            30.0,
        ))
        .await
        .unwrap();

    let resp = client
        .get(format!("{}/api/servers/status", base_url))
        .send()
        .await
        .expect("Failed to fetch server status");
    assert_eq!(resp.status(), 200);
    let statuses: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(statuses.len(), 2);

    for status in &statuses {
        match status["country"].as_str().unwrap() {
            "DE" => assert_eq!(status["stale"], false),
            "FR" => assert_eq!(status["stale"], true),
            other => panic!("unexpected country {other}"),
        }
    }
}

#[tokio::test]
async fn test_server_history_api() {
    let (base_url, storage, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let now = Utc::now();
    for i in 0..3 {
        storage
            .measurements
            .insert(&measurement(
                "192.0.2.1",
                "DE",
                now - Duration::minutes(i),
                10.0 + i as f64,
            ))
            .await
            .unwrap();
    }

    let resp = client
        .get(format!("{}/api/servers/192.0.2.1/history?limit=2", base_url))
        .send()
        .await
        .expect("Failed to fetch history");
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["server_ip"], "192.0.2.1");
    assert_eq!(body["stale"], false);
    let rows = body["history"].as_array().unwrap();
    assert_eq!(rows.len(), 2);
    // Newest first
    assert_eq!(rows[0]["avg_time"], 10.0);

    // Unknown host
    let resp = client
        .get(format!("{}/api/servers/203.0.113.99/history", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

// =============================================================================
// Export API Tests
// =============================================================================

#[tokio::test]
async fn test_export_api() {
    let (base_url, storage, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let mut m = measurement("192.0.2.1", "DE", Utc::now(), 250.0);
    m.concerns = vec![Concern::new(ConcernKind::VeryHighLatency, "250.0ms")];
    storage.measurements.insert(&m).await.unwrap();

    // CSV export
    let resp = client
        .get(format!("{}/api/export", base_url))
        .send()
        .await
        .expect("Failed to fetch csv export");
    assert_eq!(resp.status(), 200);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let body = resp.text().await.unwrap();
    let mut lines = body.lines();
    assert!(lines.next().unwrap().starts_with("ts,server_ip,country"));
    assert!(lines.next().unwrap().contains("192.0.2.1"));

    // JSON export keeps structured concerns
    let resp = client
        .get(format!("{}/api/export?format=json", base_url))
        .send()
        .await
        .expect("Failed to fetch json export");
    assert_eq!(resp.status(), 200);
    let rows: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["concerns"][0]["kind"], "very_high_latency");

    // Unknown format
    let resp = client
        .get(format!("{}/api/export?format=xml", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

// =============================================================================
// Logs API Tests
// =============================================================================

#[tokio::test]
async fn test_logs_api() {
    let (base_url, storage, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    storage
        .logs
        .record(LogLevel::Info, "PING", "probe ok".to_string(), None)
        .await;
    storage
        .logs
        .record(
            LogLevel::Error,
            "PING",
            "probe failed".to_string(),
            Some("ping: unknown host".to_string()),
        )
        .await;
    storage
        .logs
        .record(LogLevel::Warning, "SERVER", "stale target".to_string(), None)
        .await;

    let resp = client
        .get(format!("{}/api/logs?limit=10", base_url))
        .send()
        .await
        .expect("Failed to fetch logs");
    assert_eq!(resp.status(), 200);
    let entries: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(entries.len(), 3);

    // Level filter
    let resp = client
        .get(format!("{}/api/logs?level=error", base_url))
        .send()
        .await
        .unwrap();
    let entries: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["module"], "PING");
    assert_eq!(entries[0]["trace"], "ping: unknown host");

    // Module filter
    let resp = client
        .get(format!("{}/api/logs?module=SERVER", base_url))
        .send()
        .await
        .unwrap();
    let entries: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["level"], "WARNING");
}

// =============================================================================
// Dashboard Tests
// =============================================================================

#[tokio::test]
async fn test_dashboard_page() {
    let (base_url, _storage, _dir) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(&base_url)
        .send()
        .await
        .expect("Failed to fetch dashboard");
    assert_eq!(resp.status(), 200);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Pingwatch"));
    assert!(body.contains("latency-chart"));
}

/// Minimal percent-encoding for RFC 3339 timestamps in query strings.
fn urlencode(s: &str) -> String {
    s.replace('+', "%2B").replace(':', "%3A")
}
