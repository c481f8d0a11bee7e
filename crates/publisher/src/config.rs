use common::ipfs::DEFAULT_IPFS_API;
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

    /// Directory the listener writes record files to
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Empty for the whole data directory, a MAC for one device, otherwise a path
    #[serde(default)]
    pub publish_target: String,

    // IPFS configuration
    /// RPC API as multiaddr or http(s) URL
    #[serde(default = "default_ipfs_api")]
    pub ipfs_api: String,

    #[serde(default = "default_ipfs_timeout_secs")]
    pub ipfs_timeout_secs: u64,

    /// 0 or 1
    #[serde(default)]
    pub cid_version: u8,

    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// JSON-lines history of every successful publish
    #[serde(default = "default_ledger_path")]
    pub ledger_path: String,

    /// Seconds between publishes, 0 publishes once and exits
    #[serde(default)]
    pub publish_interval_secs: u64,

    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_data_dir() -> String {
    "data".to_string()
}

fn default_ipfs_api() -> String {
    DEFAULT_IPFS_API.to_string()
}

fn default_ipfs_timeout_secs() -> u64 {
    60
}

fn default_gateway_url() -> String {
    "https://ipfs.io".to_string()
}

fn default_ledger_path() -> String {
    "publish-log.jsonl".to_string()
}

fn default_shutdown_timeout_secs() -> u64 {
    10
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Self = Config::builder()
            .add_source(Environment::with_prefix("RELAY"))
            .build()?
            .try_deserialize()?;

        if config.cid_version > 1 {
            return Err(ConfigError::Message(format!(
                "cid_version must be 0 or 1, got {}",
                config.cid_version
            )));
        }
        Ok(config)
    }
}
