use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// ZeroMQ endpoint the REP socket binds to.
    pub endpoint: String,
    /// Seconds without a request before the daemon exits (0 disables).
    pub idle_timeout_secs: u64,
    /// Directory holding the engine configuration and, by default, the models.
    pub config_dir: PathBuf,
    /// Engine configuration file name inside `config_dir`.
    pub config_file: String,
}

impl Config {
    /// Load configuration from `FIQD_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            endpoint: std::env::var("FIQD_ENDPOINT")
                .unwrap_or_else(|_| fiq_wire::DEFAULT_ENDPOINT.to_string()),
            idle_timeout_secs: env_u64("FIQD_IDLE_TIMEOUT_SECS", 60),
            config_dir: std::env::var("FIQD_CONFIG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            config_file: std::env::var("FIQD_CONFIG_FILE")
                .unwrap_or_else(|_| "fiq_config.toml".to_string()),
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
