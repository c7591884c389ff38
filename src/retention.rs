//! Retention sweeper: orthogonal to the Scheduler, runs on cron-like
//! schedules. The "every 6h per-plan" sweep is normalized to "stricter of
//! absolute cap and per-plan cap wins", per the design notes.

use std::time::Duration;

use chrono::{Duration as ChronoDuration, Timelike, Utc};
use tokio_util::sync::CancellationToken;

use crate::logging::CoreLogger;
use crate::store::Store;

pub const CHECK_RESULTS_ABSOLUTE_DAYS: i64 = 30;
pub const ALERTS_ABSOLUTE_DAYS: i64 = 90;

#[derive(Debug, Clone, Copy)]
pub enum Plan {
    Free,
    Starter,
    Pro,
}

impl Plan {
    /// Per-plan check-result retention; the sweeper applies the stricter of
    /// this and the absolute cap.
    pub fn check_result_retention(&self) -> ChronoDuration {
        match self {
            Plan::Free => ChronoDuration::hours(24),
            Plan::Starter => ChronoDuration::days(7),
            Plan::Pro => ChronoDuration::days(30),
        }
    }
}

pub struct RetentionSweeper {
    store: Store,
    logger: std::sync::Arc<CoreLogger>,
    plans: Vec<Plan>,
}

impl RetentionSweeper {
    pub fn new(store: Store, logger: std::sync::Arc<CoreLogger>, plans: Vec<Plan>) -> Self {
        Self { store, logger, plans }
    }

    /// Runs forever (until cancelled), checking every minute whether one of
    /// the three schedules (daily 03:00, daily 03:30, every 6h) is due.
    pub async fn run(&self, cancellation: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        let mut last_daily_sweep_date = None;
        let mut last_short_sweep_hour_bucket = None;

        loop {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = interval.tick() => {}
            }

            let now = Utc::now();

            if now.hour() == 3 && now.minute() == 0 && last_daily_sweep_date != Some(now.date_naive()) {
                self.sweep_absolute().await;
                last_daily_sweep_date = Some(now.date_naive());
            }

            let hour_bucket = now.hour() / 6;
            if now.minute() == 0 && last_short_sweep_hour_bucket != Some((now.date_naive(), hour_bucket)) {
                self.sweep_per_plan().await;
                last_short_sweep_hour_bucket = Some((now.date_naive(), hour_bucket));
            }
        }
    }

    async fn sweep_absolute(&self) {
        let now = Utc::now();
        let results_horizon = now - ChronoDuration::days(CHECK_RESULTS_ABSOLUTE_DAYS);
        let alerts_horizon = now - ChronoDuration::days(ALERTS_ABSOLUTE_DAYS);
        match self.store.retention_sweep(results_horizon, alerts_horizon).await {
            Ok((results, alerts)) => self.logger.debug(
                "RetentionSweeper",
                "absolute_sweep",
                &format!("deleted {} check results, {} alerts", results, alerts),
            ),
            Err(e) => self.logger.error("RetentionSweeper", "absolute_sweep_failed", &e.to_string()),
        }
    }

    /// Stricter-of-two-caps sweep: for each plan, the per-plan horizon wins
    /// only if it's shorter than the absolute cap, since either one alone
    /// deletes everything older than its horizon regardless of plan.
    async fn sweep_per_plan(&self) {
        let now = Utc::now();
        let absolute = ChronoDuration::days(CHECK_RESULTS_ABSOLUTE_DAYS);

        for plan in &self.plans {
            let per_plan = plan.check_result_retention();
            let horizon = now - per_plan.min(absolute);
            // Alerts are not subject to per-plan retention in this design; the
            // per-plan sweep only tightens check-result retention.
            match self.store.sweep_check_results_only(horizon).await {
                Ok(results) => self.logger.debug(
                    "RetentionSweeper",
                    "per_plan_sweep",
                    &format!("plan={:?} deleted {} check results older than {}", plan, results, horizon),
                ),
                Err(e) => self.logger.error("RetentionSweeper", "per_plan_sweep_failed", &e.to_string()),
            }
        }
    }
}
