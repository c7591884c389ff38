//! Incident Engine (C5): per-endpoint state machine sitting atop the State
//! Store. Pure business logic — no I/O beyond the store calls it drives.

use chrono::{Duration as ChronoDuration, Utc};

use crate::alert::{AlertEngine, IncidentEvent};
use crate::logging::CoreLogger;
use crate::model::*;
use crate::prober::ProbeOutput;
use crate::store::{NewCheckResult, Store, StoreError};

pub struct IncidentEngine {
    store: Store,
    alert_engine: AlertEngine,
    logger: std::sync::Arc<CoreLogger>,
}

impl IncidentEngine {
    pub fn new(store: Store, alert_engine: AlertEngine, logger: std::sync::Arc<CoreLogger>) -> Self {
        Self {
            store,
            alert_engine,
            logger,
        }
    }

    /// Apply one probe's outcome to an endpoint: persist the `CheckResult`,
    /// run the state-machine transition in the decision table of §4.5, and
    /// hand any resulting event to the Alert Engine.
    pub async fn apply(&self, endpoint: &Endpoint, output: ProbeOutput) -> Result<(), StoreError> {
        let now = Utc::now();

        self.store
            .append_check_result(NewCheckResult {
                endpoint_id: endpoint.id,
                status_code: output.status_code,
                latency_ms: output.latency_ms,
                success: output.success,
                kind: output.kind,
                error_message: output.error_message.clone(),
                created_at: now,
            })
            .await?;

        let next_check_at = now + ChronoDuration::seconds(endpoint.interval_s);

        if output.success {
            self.store
                .update_endpoint_check_status(endpoint.id, EndpointStatus::UP, now, next_check_at, 0)
                .await?;

            if let Some(resolved_incident_id) = self.store.resolve_open_incident(endpoint.id, now).await? {
                self.logger.debug(
                    "IncidentEngine",
                    "incident_resolved",
                    &format!("endpoint {} incident {} resolved", endpoint.id, resolved_incident_id),
                );
                self.alert_engine
                    .handle(IncidentEvent::Recovered {
                        endpoint: endpoint.clone(),
                        incident_id: resolved_incident_id,
                        created_at: now,
                    })
                    .await?;
            }
        } else {
            let consecutive_failures = endpoint.consecutive_failures + 1;
            self.store
                .update_endpoint_check_status(
                    endpoint.id,
                    EndpointStatus::DOWN,
                    now,
                    next_check_at,
                    consecutive_failures,
                )
                .await?;

            let incident = self
                .store
                .open_or_grow_incident(endpoint.id, output.kind, output.error_message.clone(), now)
                .await?;

            self.logger.debug(
                "IncidentEngine",
                "failure_recorded",
                &format!(
                    "endpoint {} kind={:?} consecutive_failures={} incident={}",
                    endpoint.id, output.kind, consecutive_failures, incident.id
                ),
            );

            let mut endpoint_after = endpoint.clone();
            endpoint_after.consecutive_failures = consecutive_failures;

            self.alert_engine
                .handle(IncidentEvent::Failure {
                    endpoint: endpoint_after,
                    kind: output.kind,
                    incident_id: incident.id,
                    created_at: now,
                })
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertEngine, NotifierSink};
    use crate::logging::{CoreLogger, LoggerConfig};
    use crate::model::HttpMethod;
    use crate::store::{NewEndpoint, Store};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    struct RecordingSink {
        delivered: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NotifierSink for RecordingSink {
        async fn deliver(&self, alert: &Alert) -> Result<(), crate::alert::DeliveryError> {
            self.delivered.lock().unwrap().push(alert.title.clone());
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

    async fn setup() -> (IncidentEngine, Store, EndpointId, Arc<Mutex<Vec<String>>>) {
        let store = Store::open("sqlite::memory:").unwrap();
        let id = store
            .register_endpoint(NewEndpoint {
                project_id: 1,
                name: "svc".to_string(),
                url: "https://example.invalid".to_string(),
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

        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = Box::new(RecordingSink {
            delivered: delivered.clone(),
        });
        let alert_engine = AlertEngine::new(store.clone(), sink, test_logger(), 3, 15, 4);
        let engine = IncidentEngine::new(store.clone(), alert_engine, test_logger());
        (engine, store, id, delivered)
    }

    fn endpoint_with(id: EndpointId, consecutive_failures: i64) -> Endpoint {
        Endpoint {
            id,
            project_id: 1,
            name: "svc".to_string(),
            url: "https://example.invalid".to_string(),
            method: HttpMethod::GET,
            headers: serde_json::Value::Null,
            body: None,
            expected_status: 200,
            interval_s: 60,
            timeout_ms: 5000,
            max_latency_ms: None,
            credential_id: None,
            enabled: true,
            status: EndpointStatus::UNKNOWN,
            last_check_at: None,
            next_check_at: None,
            consecutive_failures,
        }
    }

    fn failure_output(kind: ResultKind) -> ProbeOutput {
        ProbeOutput {
            status_code: 500,
            latency_ms: 10,
            kind,
            success: false,
            error_message: Some("boom".to_string()),
        }
    }

    fn success_output() -> ProbeOutput {
        ProbeOutput {
            status_code: 200,
            latency_ms: 10,
            kind: ResultKind::Success,
            success: true,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn failure_then_success_opens_then_resolves_incident() {
        let (engine, store, id, _delivered) = setup().await;
        let endpoint = endpoint_with(id, 0);

        engine
            .apply(&endpoint, failure_output(ResultKind::ServerError))
            .await
            .unwrap();
        let incident = store.open_incident(id).await.unwrap();
        assert!(incident.is_some());

        let endpoint_after_failure = endpoint_with(id, 1);
        engine.apply(&endpoint_after_failure, success_output()).await.unwrap();
        let incident_after = store.open_incident(id).await.unwrap();
        assert!(incident_after.is_none());
    }

    #[tokio::test]
    async fn threshold_gate_scenario() {
        // Scenario 1: FAILURE_THRESHOLD=3, probes 500,500,500,200.
        let (engine, store, id, delivered) = setup().await;

        let mut endpoint = endpoint_with(id, 0);
        for _ in 0..3 {
            engine
                .apply(&endpoint, failure_output(ResultKind::ServerError))
                .await
                .unwrap();
            endpoint.consecutive_failures += 1;
        }
        engine.apply(&endpoint, success_output()).await.unwrap();

        // Delivery is detached onto the Alert Engine's own pool; poll
        // briefly for it to land before asserting.
        for _ in 0..100 {
            if delivered.lock().unwrap().len() >= 2 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let titles = delivered.lock().unwrap();
        assert_eq!(titles.len(), 2); // one SERVER_ERROR alert, one recovery
        let incident = store.open_incident(id).await.unwrap();
        assert!(incident.is_none());
    }
}
