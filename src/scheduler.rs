//! Scheduler (C7): tick loop over due endpoints, bounded worker pool,
//! in-process in-flight set as the sole per-endpoint mutual-exclusion
//! primitive. Sized with `tokio::sync::Semaphore`, mirroring the
//! bounded-concurrency idiom used elsewhere in the ecosystem for exactly
//! this shape of fan-out-and-wait probing loop.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::incident::IncidentEngine;
use crate::logging::CoreLogger;
use crate::prober::Prober;
use crate::store::{Store, StoreError};

pub struct Scheduler {
    store: Store,
    prober: Arc<Prober>,
    incident_engine: Arc<IncidentEngine>,
    logger: Arc<CoreLogger>,
    tick_interval: Duration,
    max_concurrent_checks: usize,
    worker_permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<i64>>>,
    cancellation: CancellationToken,
}

impl Scheduler {
    pub fn new(
        store: Store,
        prober: Arc<Prober>,
        incident_engine: Arc<IncidentEngine>,
        logger: Arc<CoreLogger>,
        tick_interval: Duration,
        max_concurrent_checks: usize,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            store,
            prober,
            incident_engine,
            logger,
            tick_interval,
            max_concurrent_checks,
            worker_permits: Arc::new(Semaphore::new(max_concurrent_checks)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            cancellation,
        }
    }

    /// Runs the tick loop until the cancellation token fires, then drains
    /// in-flight workers up to `grace_period` before returning.
    pub async fn run(&self, grace_period: Duration) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancellation.cancelled() => {
                    self.logger.warn("Scheduler", "cancelled", "scheduler draining");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        self.logger.error("Scheduler", "tick_failed", &e.to_string());
                    }
                }
            }
        }

        self.drain(grace_period).await;
    }

    /// Runs exactly one tick and drains it, for `--once` invocations.
    pub async fn run_once(&self, grace_period: Duration) {
        if let Err(e) = self.tick().await {
            self.logger.error("Scheduler", "tick_failed", &e.to_string());
        }
        self.drain(grace_period).await;
    }

    async fn drain(&self, grace_period: Duration) {
        let deadline = tokio::time::Instant::now() + grace_period;
        while self.worker_permits.available_permits() < self.max_concurrent_checks {
            if tokio::time::Instant::now() >= deadline {
                self.logger
                    .error("Scheduler", "grace_period_exceeded", "abandoning in-flight workers");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// One tick: pop due endpoints, admit work up to the concurrency budget,
    /// defer the remainder. Backpressure is by admission, not queue growth.
    async fn tick(&self) -> Result<(), StoreError> {
        let now = chrono::Utc::now();
        let due = self.store.due_endpoints(now).await?;

        for endpoint in due {
            if self.cancellation.is_cancelled() {
                break;
            }

            let admitted = {
                let mut in_flight = self.in_flight.lock().unwrap();
                if in_flight.contains(&endpoint.id) {
                    false // already probing this endpoint; skip until it clears
                } else {
                    in_flight.insert(endpoint.id);
                    true
                }
            };
            if !admitted {
                continue;
            }

            let permit = match self.worker_permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => {
                    self.in_flight.lock().unwrap().remove(&endpoint.id);
                    self.logger.warn(
                        "Scheduler",
                        "backpressure",
                        "due set exhausted the concurrency budget; remainder deferred to next tick",
                    );
                    break;
                }
            };

            let store = self.store.clone();
            let prober = self.prober.clone();
            let incident_engine = self.incident_engine.clone();
            let logger = self.logger.clone();
            let in_flight = self.in_flight.clone();
            let cancellation = self.cancellation.clone();

            tokio::spawn(async move {
                let _permit = permit; // released on drop at end of task
                let _release_guard = InFlightGuard {
                    set: in_flight,
                    endpoint_id: endpoint.id,
                };

                let credential = match endpoint.credential_id {
                    Some(credential_id) => match store.get_credential(credential_id).await {
                        Ok(c) => Some(c),
                        Err(e) => {
                            logger.error(
                                "Scheduler",
                                "credential_lookup_failed",
                                &format!("endpoint {}: {}", endpoint.id, e),
                            );
                            None
                        }
                    },
                    None => None,
                };

                let output = tokio::select! {
                    out = prober.probe(&endpoint, credential.as_ref()) => out,
                    _ = cancellation.cancelled() => return,
                };

                if let Err(e) = incident_engine.apply(&endpoint, output).await {
                    logger.error("Scheduler", "apply_failed", &format!("endpoint {}: {}", endpoint.id, e));
                }
            });
        }

        Ok(())
    }
}

/// Releases the in-flight mark on drop, whether the worker finished,
/// errored, or panicked — the scope-bound "finally" the spec requires.
/// Backed by a plain `std::sync::Mutex` so release never needs to await.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<i64>>>,
    endpoint_id: i64,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().unwrap().remove(&self.endpoint_id);
    }
}
