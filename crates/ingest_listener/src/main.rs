mod config;

use crate::config::ServiceConfig;
use common::telemetry::{init_telemetry, TelemetryConfig};
use ingest_listener::ingest_listener::{IngestListener, IngestListenerConfig};
use ingest_listener::tcp::TcpIngestServerConfig;
use relay_runner::Runner;
use std::time::Duration;
use tracing::{debug, error, info};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_telemetry(&TelemetryConfig {
        service_name: "relay-listener".to_string(),
        log_level: config.log_level.clone(),
        log_format: config.log_format,
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    info!(
        listen_addr = %config.listen_addr(),
        data_dir = %config.data_dir,
        "Starting relay-listener"
    );
    debug!("Configuration: {:?}", config);

    let listener = match IngestListener::new(IngestListenerConfig {
        listen_addr: config.listen_addr(),
        data_dir: config.data_dir.clone().into(),
        sync_writes: config.sync_writes,
        server: TcpIngestServerConfig {
            greeting: config.send_greeting.then(|| config.greeting.clone()),
            max_frame_bytes: config.max_frame_bytes,
            max_connections: config.max_connections,
            read_timeout: (config.read_timeout_secs > 0)
                .then(|| Duration::from_secs(config.read_timeout_secs)),
        },
    })
    .await
    {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to initialize ingest listener: {:#}", e);
            std::process::exit(1);
        }
    };

    Runner::new()
        .with_boxed_process(listener.into_runner_process())
        .with_closer(|| async move {
            info!("relay-listener stopped, record files are flushed on every append");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs))
        .run()
        .await;
}
