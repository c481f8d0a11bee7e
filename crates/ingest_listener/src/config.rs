use common::telemetry::LogFormat;
use config::{Config, ConfigError, Environment};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServiceConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// pretty or json
    #[serde(default)]
    pub log_format: LogFormat,

    // TCP configuration
    #[serde(default = "default_listen_host")]
    pub listen_host: String,

    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Send `greeting` to every device on connect
    #[serde(default = "default_send_greeting")]
    pub send_greeting: bool,

    #[serde(default = "default_greeting")]
    pub greeting: String,

    /// Longest accepted frame, terminator excluded
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    /// Concurrent device connections; further devices wait in the accept backlog
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Idle timeout per connection in seconds, 0 disables it
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    // Storage configuration
    /// Directory holding one `<MAC>.txt` record file per device
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// fsync every appended line
    #[serde(default)]
    pub sync_writes: bool,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_listen_port() -> u16 {
    8070
}

fn default_send_greeting() -> bool {
    true
}

fn default_greeting() -> String {
    "Welcome to ESP32-OpenWrt Server!".to_string()
}

fn default_max_frame_bytes() -> usize {
    1024
}

fn default_max_connections() -> usize {
    64
}

fn default_read_timeout_secs() -> u64 {
    300
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Environment::with_prefix("RELAY"))
            .build()?
            .try_deserialize()
    }

    pub fn listen_addr(&self) -> String {
        if self.listen_host.contains(':') && !self.listen_host.starts_with('[') {
            format!("[{}]:{}", self.listen_host, self.listen_port)
        } else {
            format!("{}:{}", self.listen_host, self.listen_port)
        }
    }
}
