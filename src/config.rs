//! Startup configuration: environment-driven, fallibly constructed, with a
//! permissive `Default` for tests.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("ENCRYPTION_SECRET is required in production")]
    MissingEncryptionSecret,
    #[error("DATABASE_URL is required")]
    MissingDatabaseUrl,
    #[error("invalid interval_s: {0} (must be in [30, 3600])")]
    InvalidInterval(i64),
    #[error("invalid timeout_ms: {0} (must be in [1000, 60000])")]
    InvalidTimeout(i64),
    #[error("invalid schedule spec: {0}")]
    InvalidScheduleSpec(String),
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub encryption_secret: String,
    pub database_url: String,
    pub mail: Option<MailConfig>,

    pub tick_interval_s: u64,
    pub max_concurrent_checks: usize,
    pub failure_threshold: i64,
    pub dedup_window_minutes: i64,

    pub probe_grace_period_s: u64,
    pub notifier_grace_period_s: u64,
    pub notifier_pool_size: usize,

    pub debug_enabled: bool,
}

impl Config {
    /// Construct from the environment, applying the defensive bounds the
    /// core enforces regardless of what the configuration provider admits.
    pub fn from_env() -> Result<Self, ConfigError> {
        let encryption_secret = std::env::var("ENCRYPTION_SECRET")
            .map_err(|_| ConfigError::MissingEncryptionSecret)?;
        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let mail = match (
            std::env::var("MAIL_HOST"),
            std::env::var("MAIL_PORT"),
            std::env::var("MAIL_USERNAME"),
            std::env::var("MAIL_PASSWORD"),
        ) {
            (Ok(host), Ok(port), Ok(username), Ok(password)) => Some(MailConfig {
                host,
                port: port.parse().unwrap_or(587),
                username,
                password,
            }),
            _ => None,
        };

        let tick_interval_s = env_u64("CORE_TICK_INTERVAL_S", 10);
        let max_concurrent_checks = env_u64("CORE_MAX_CONCURRENT_CHECKS", 200) as usize;
        let failure_threshold = env_u64("CORE_FAILURE_THRESHOLD", 3) as i64;
        let dedup_window_minutes = env_u64("CORE_DEDUP_WINDOW_MINUTES", 15) as i64;

        Ok(Self {
            encryption_secret,
            database_url,
            mail,
            tick_interval_s,
            max_concurrent_checks,
            failure_threshold,
            dedup_window_minutes,
            probe_grace_period_s: 60,
            notifier_grace_period_s: 30,
            notifier_pool_size: 16,
            debug_enabled: crate::logging::debug_enabled_from_env(),
        })
    }

    /// Validate endpoint-level bounds the core refuses defensively,
    /// independent of what the configuration provider admitted upstream.
    pub fn validate_endpoint_bounds(interval_s: i64, timeout_ms: i64) -> Result<(), ConfigError> {
        if !(30..=3600).contains(&interval_s) {
            return Err(ConfigError::InvalidInterval(interval_s));
        }
        if !(1000..=60000).contains(&timeout_ms) {
            return Err(ConfigError::InvalidTimeout(timeout_ms));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encryption_secret: "0123456789abcdef0123456789abcdef".to_string(),
            database_url: "sqlite::memory:".to_string(),
            mail: None,
            tick_interval_s: 10,
            max_concurrent_checks: 200,
            failure_threshold: 3,
            dedup_window_minutes: 15,
            probe_grace_period_s: 60,
            notifier_grace_period_s: 30,
            notifier_pool_size: 16,
            debug_enabled: false,
        }
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_bounds_accept_minimum_interval() {
        assert!(Config::validate_endpoint_bounds(30, 1000).is_ok());
    }

    #[test]
    fn endpoint_bounds_reject_below_minimum_interval() {
        assert!(matches!(
            Config::validate_endpoint_bounds(29, 1000),
            Err(ConfigError::InvalidInterval(29))
        ));
    }

    #[test]
    fn endpoint_bounds_reject_timeout_out_of_range() {
        assert!(Config::validate_endpoint_bounds(60, 999).is_err());
        assert!(Config::validate_endpoint_bounds(60, 60001).is_err());
    }
}
