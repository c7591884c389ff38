use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use uptime_core::alert::{AlertEngine, EmailSink, NotifierSink};
use uptime_core::cli::Cli;
use uptime_core::config::Config;
use uptime_core::crypto::SecretStore;
use uptime_core::error::CoreError;
use uptime_core::incident::IncidentEngine;
use uptime_core::logging::{self, CoreLogger, LoggerConfig};
use uptime_core::prober::{HttpClient, IsahcHttpClient, Prober};
use uptime_core::retention::{Plan, RetentionSweeper};
use uptime_core::scheduler::Scheduler;
use uptime_core::store::Store;

/// A sink that only logs, used when no mail relay is configured. Alerts are
/// still persisted by the Alert Engine; this just never delivers them.
struct LogOnlySink {
    logger: Arc<CoreLogger>,
}

#[async_trait::async_trait]
impl NotifierSink for LogOnlySink {
    async fn deliver(&self, alert: &uptime_core::model::Alert) -> Result<(), uptime_core::alert::DeliveryError> {
        self.logger.warn(
            "LogOnlySink",
            "no_delivery_channel_configured",
            &format!("alert {} not delivered: {}", alert.id, alert.title),
        );
        Ok(())
    }
}

/// Constructs the two components whose failure modes are captured by
/// `CoreError` (bad key material, an unreachable database) rather than
/// letting `main` juggle each subsystem's own error type at the top level.
fn bootstrap(config: &Config) -> Result<(SecretStore, Store), CoreError> {
    let secret_store = SecretStore::new(config.encryption_secret.as_bytes())?;
    let store = Store::open(&config.database_url)?;
    Ok((secret_store, store))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse_args();
    // Per the Configuration contract, a missing secret or database URL is
    // always-fatal at startup — the core must not begin scheduling against
    // fallback defaults.
    let config = Config::from_env()?;

    let logger = Arc::new(CoreLogger::new(LoggerConfig {
        jsonl_path: logging::default_jsonl_path(),
        debug_log_path: logging::default_debug_path(),
        debug_enabled: config.debug_enabled,
    }));

    logger.event("INFO", "main", "startup", "uptime-core starting", Some(logger.session_id()));

    let (secret_store, store) = bootstrap(&config)?;

    let http_client: Box<dyn HttpClient> = Box::new(IsahcHttpClient::new()?);
    let prober = Arc::new(Prober::new(http_client, secret_store, logger.clone()));

    let sink: Box<dyn NotifierSink> = match &config.mail {
        Some(mail) => Box::new(EmailSink::new(mail.clone())),
        None => Box::new(LogOnlySink { logger: logger.clone() }),
    };

    let alert_engine = AlertEngine::new(
        store.clone(),
        sink,
        logger.clone(),
        config.failure_threshold,
        config.dedup_window_minutes,
        config.notifier_pool_size,
    );
    let incident_engine = Arc::new(IncidentEngine::new(store.clone(), alert_engine, logger.clone()));

    let cancellation = CancellationToken::new();

    let scheduler = Scheduler::new(
        store.clone(),
        prober,
        incident_engine,
        logger.clone(),
        Duration::from_secs(config.tick_interval_s),
        config.max_concurrent_checks,
        cancellation.clone(),
    );

    if cli.once {
        scheduler.run_once(Duration::from_secs(config.probe_grace_period_s)).await;
        logger.event("INFO", "main", "shutdown", "single tick complete", Some(logger.session_id()));
        return Ok(());
    }

    let sweeper = RetentionSweeper::new(store, logger.clone(), vec![Plan::Free, Plan::Starter, Plan::Pro]);

    let shutdown_signal = {
        let cancellation = cancellation.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            cancellation.cancel();
        }
    };

    let scheduler_run = scheduler.run(Duration::from_secs(config.probe_grace_period_s));
    let sweeper_run = sweeper.run(cancellation.clone());

    tokio::join!(shutdown_signal, scheduler_run, sweeper_run);

    logger.event("INFO", "main", "shutdown", "uptime-core stopped", Some(logger.session_id()));
    Ok(())
}
