//! End-to-end scenarios driving the real `Store`, `Prober`, `IncidentEngine`
//! and `AlertEngine` together through an in-memory database and a scripted
//! HTTP client, rather than exercising any one component in isolation.
//! Scheduler-specific behavior (tick timing, concurrency) has its own tests
//! in `src/scheduler.rs`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use uptime_core::alert::{AlertEngine, DeliveryError, NotifierSink};
use uptime_core::crypto::SecretStore;
use uptime_core::incident::IncidentEngine;
use uptime_core::logging::{CoreLogger, LoggerConfig};
use uptime_core::model::{Alert, Endpoint, HttpMethod};
use uptime_core::prober::{HttpClient, HttpResponse, Prober};
use uptime_core::store::{NewEndpoint, Store};

/// Fetches the current row for `endpoint_id` via `due_endpoints`, using a
/// far-future cutoff so the scheduling interval never excludes it — these
/// scenarios drive the Prober/IncidentEngine/AlertEngine pipeline directly,
/// independent of the Scheduler's own tick-timing (covered separately).
async fn current_endpoint(store: &Store, endpoint_id: i64) -> Endpoint {
    let far_future = Utc::now() + ChronoDuration::days(3650);
    store
        .due_endpoints(far_future)
        .await
        .unwrap()
        .into_iter()
        .find(|e| e.id == endpoint_id)
        .expect("endpoint should exist")
}

struct ScriptedHttpClient {
    statuses: Mutex<std::collections::VecDeque<u16>>,
    calls: AtomicUsize,
}

#[async_trait]
impl HttpClient for ScriptedHttpClient {
    async fn execute(
        &self,
        _method: &str,
        _url: &str,
        _headers: HashMap<String, String>,
        _body: Vec<u8>,
        _timeout_ms: u64,
    ) -> Result<HttpResponse, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let status = self.statuses.lock().unwrap().pop_front().unwrap_or(200);
        Ok(HttpResponse { status })
    }
}

struct RecordingSink {
    delivered: Arc<Mutex<Vec<Alert>>>,
}

#[async_trait]
impl NotifierSink for RecordingSink {
    async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError> {
        self.delivered.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

fn test_logger() -> Arc<CoreLogger> {
    let dir = tempfile::tempdir().unwrap();
    Arc::new(CoreLogger::new(LoggerConfig {
        jsonl_path: dir.path().join("op.jsonl"),
        debug_log_path: dir.path().join("debug.log"),
        debug_enabled: false,
    }))
}

/// Delivery is detached onto the Alert Engine's own bounded pool, so tests
/// poll briefly for it to land instead of asserting immediately.
async fn wait_for_delivered(delivered: &Arc<Mutex<Vec<Alert>>>, expected: usize) {
    for _ in 0..100 {
        if delivered.lock().unwrap().len() >= expected {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}

/// Scenario 1: FAILURE_THRESHOLD=3, probes return 500,500,500,200.
/// Expect one SERVER_ERROR alert after probe 3, one ENDPOINT_RECOVERED
/// alert after probe 4, and the incident opened on probe 1 resolved by
/// probe 4 — driven through the real Prober and Store, not a canned
/// ProbeOutput.
#[tokio::test]
async fn threshold_gate_end_to_end() {
    let store = Store::open("sqlite::memory:").unwrap();
    let endpoint_id = store
        .register_endpoint(NewEndpoint {
            project_id: 1,
            name: "checkout-api".to_string(),
            url: "https://checkout.example.invalid/health".to_string(),
            method: HttpMethod::GET,
            headers: serde_json::Value::Null,
            body: None,
            expected_status: 200,
            interval_s: 60,
            timeout_ms: 5000,
            max_latency_ms: None,
            credential_id: None,
            enabled: true,
        })
        .await
        .unwrap();

    let http = Box::new(ScriptedHttpClient {
        statuses: Mutex::new([500, 500, 500, 200].into_iter().collect()),
        calls: AtomicUsize::new(0),
    });
    let secret_store = SecretStore::new(b"0123456789abcdef0123456789abcdef").unwrap();
    let prober = Arc::new(Prober::new(http, secret_store, test_logger()));

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Box::new(RecordingSink { delivered: delivered.clone() });
    let alert_engine = AlertEngine::new(store.clone(), sink, test_logger(), 3, 15, 4);
    let incident_engine = IncidentEngine::new(store.clone(), alert_engine, test_logger());

    for _ in 0..4 {
        let endpoint = current_endpoint(&store, endpoint_id).await;
        let output = prober.probe(&endpoint, None).await;
        incident_engine.apply(&endpoint, output).await.unwrap();
    }

    wait_for_delivered(&delivered, 2).await;
    let delivered = delivered.lock().unwrap();
    assert_eq!(delivered.len(), 2, "expected one SERVER_ERROR alert and one recovery alert");
    assert_eq!(delivered[0].kind, uptime_core::model::AlertKind::ServerError);
    assert_eq!(delivered[1].kind, uptime_core::model::AlertKind::EndpointRecovered);
    assert!(!delivered[0].message.is_empty());

    assert!(store.open_incident(endpoint_id).await.unwrap().is_none());
}

/// Scenario 2: FAILURE_THRESHOLD=1, ten consecutive timeouts. Expect exactly
/// one TIMEOUT alert (dedup window suppresses the rest) and the incident's
/// failed_check_count to reach 10.
#[tokio::test]
async fn dedup_window_end_to_end() {
    let store = Store::open("sqlite::memory:").unwrap();
    let endpoint_id = store
        .register_endpoint(NewEndpoint {
            project_id: 1,
            name: "payments-api".to_string(),
            url: "https://payments.example.invalid/health".to_string(),
            method: HttpMethod::GET,
            headers: serde_json::Value::Null,
            body: None,
            expected_status: 200,
            interval_s: 30,
            timeout_ms: 1000,
            max_latency_ms: None,
            credential_id: None,
            enabled: true,
        })
        .await
        .unwrap();

    struct AlwaysTimeout;
    #[async_trait]
    impl HttpClient for AlwaysTimeout {
        async fn execute(
            &self,
            _method: &str,
            _url: &str,
            _headers: HashMap<String, String>,
            _body: Vec<u8>,
            _timeout_ms: u64,
        ) -> Result<HttpResponse, String> {
            Err("request timeout while connecting".to_string())
        }
    }

    let secret_store = SecretStore::new(b"0123456789abcdef0123456789abcdef").unwrap();
    let prober = Arc::new(Prober::new(Box::new(AlwaysTimeout), secret_store, test_logger()));

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = Box::new(RecordingSink { delivered: delivered.clone() });
    let alert_engine = AlertEngine::new(store.clone(), sink, test_logger(), 1, 15, 4);
    let incident_engine = IncidentEngine::new(store.clone(), alert_engine, test_logger());

    for _ in 0..10 {
        let endpoint = current_endpoint(&store, endpoint_id).await;
        let output = prober.probe(&endpoint, None).await;
        incident_engine.apply(&endpoint, output).await.unwrap();
    }

    wait_for_delivered(&delivered, 1).await;
    assert_eq!(delivered.lock().unwrap().len(), 1);
    let incident = store.open_incident(endpoint_id).await.unwrap().unwrap();
    assert_eq!(incident.failed_check_count, 10);
}
