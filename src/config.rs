use secrecy::Secret;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_OPERATIONS_LIMIT: i64 = 50;
pub const DEFAULT_BACKUP_STATUS: &str = "TO BACKUP";
pub const DEFAULT_BACKUP_SCAN_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,

    // Unset selects the in-memory store
    pub database_url: Option<Secret<String>>,

    // JSON file with statuses and cards to provision at startup
    pub seed_file: Option<String>,

    // Tracking engine
    pub lock_timeout_ms: u64,
    pub operations_limit: i64,

    // Backup monitor
    pub backup_status: String,
    pub backup_webhook_url: Option<Secret<String>>,
    pub backup_scan_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Ok(Self {
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port").unwrap_or(DEFAULT_PORT),

            database_url: config.get::<String>("database_url").ok().map(Secret::new),
            seed_file: config.get("seed_file").ok(),

            lock_timeout_ms: config
                .get("lock_timeout_ms")
                .unwrap_or(DEFAULT_LOCK_TIMEOUT_MS),
            operations_limit: config
                .get("operations_limit")
                .unwrap_or(DEFAULT_OPERATIONS_LIMIT),

            backup_status: config
                .get("backup_status")
                .unwrap_or_else(|_| DEFAULT_BACKUP_STATUS.to_string()),
            backup_webhook_url: config
                .get::<String>("backup_webhook_url")
                .ok()
                .map(Secret::new),
            backup_scan_interval_secs: config
                .get("backup_scan_interval_secs")
                .unwrap_or(DEFAULT_BACKUP_SCAN_INTERVAL_SECS),
        })
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }

    pub fn backup_scan_interval(&self) -> Duration {
        Duration::from_secs(self.backup_scan_interval_secs.max(1))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            database_url: None,
            seed_file: None,
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
            operations_limit: DEFAULT_OPERATIONS_LIMIT,
            backup_status: DEFAULT_BACKUP_STATUS.to_string(),
            backup_webhook_url: None,
            backup_scan_interval_secs: DEFAULT_BACKUP_SCAN_INTERVAL_SECS,
        }
    }
}
