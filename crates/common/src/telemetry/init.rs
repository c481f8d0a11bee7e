use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use super::{LogFormat, TelemetryConfig};

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over `config.log_level`. Fails if a global
/// subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format {
        LogFormat::Json => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_span_list(true)
                .with_current_span(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
        LogFormat::Pretty => {
            let fmt_layer = tracing_subscriber::fmt::layer().with_target(false);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .try_init()?;
        }
    }

    tracing::debug!(service = %config.service_name, "telemetry initialized");
    Ok(())
}
