use serde::{Deserialize, Serialize};

/// Output format of the log lines written to stdout
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable, for an operator watching a console
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers (logread, syslog-ng)
    Json,
}

/// Configuration for telemetry initialization
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "esp32-ipfs-relay".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}
