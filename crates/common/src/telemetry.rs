mod config;
mod init;

pub use config::{LogFormat, TelemetryConfig};
pub use init::init_telemetry;
