//! Process configuration loaded from environment variables via figment.

use serde::Deserialize;

/// Main application configuration.
#[derive(Deserialize)]
pub struct Config {
    /// Log level for this application's target specifically.
    ///
    /// Valid values are: "trace", "debug", "info", "warn", "error".
    /// Defaults to "info" if not specified.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Port for the web server (default: 8080)
    #[serde(default = "default_port")]
    pub port: u16,
    /// Database connection URL
    pub database_url: String,
    /// Graceful shutdown timeout in seconds (default: 8)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    /// Interval between engine configuration refreshes, in seconds
    /// (default: 30 minutes)
    #[serde(default = "default_config_refresh_seconds")]
    pub config_refresh_seconds: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_shutdown_timeout() -> u64 {
    8
}

fn default_config_refresh_seconds() -> u64 {
    30 * 60
}
