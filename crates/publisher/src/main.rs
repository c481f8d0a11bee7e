mod config;

use crate::config::ServiceConfig;
use common::domain::PublishTarget;
use common::ipfs::{IpfsClient, IpfsClientConfig};
use common::storage::{FileRecordStore, JsonLinesPublishLedger};
use common::telemetry::{init_telemetry, TelemetryConfig};
use publisher::domain::PublishService;
use publisher::publisher::{Publisher, PublisherConfig};
use relay_runner::Runner;
use std::sync::Arc;
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
        service_name: "relay-publisher".to_string(),
        log_level: config.log_level.clone(),
        log_format: config.log_format,
    }) {
        eprintln!("Failed to initialize telemetry: {}", e);
        std::process::exit(1);
    }

    let target = PublishTarget::from_setting(&config.publish_target);
    info!(
        target = %target,
        ipfs_api = %config.ipfs_api,
        interval_secs = config.publish_interval_secs,
        "Starting relay-publisher"
    );
    debug!("Configuration: {:?}", config);

    let content_store = match IpfsClient::new(IpfsClientConfig {
        api_address: config.ipfs_api.clone(),
        timeout: Duration::from_secs(config.ipfs_timeout_secs),
        cid_version: config.cid_version,
    }) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create IPFS client: {}", e);
            std::process::exit(1);
        }
    };

    let record_store = match FileRecordStore::open(&config.data_dir).await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open record store: {}", e);
            std::process::exit(1);
        }
    };

    let publish_service = Arc::new(PublishService::new(
        Arc::new(record_store),
        Arc::new(content_store),
        Arc::new(JsonLinesPublishLedger::new(&config.ledger_path)),
    ));

    let publisher = Publisher::new(
        publish_service,
        PublisherConfig {
            target,
            interval: (config.publish_interval_secs > 0)
                .then(|| Duration::from_secs(config.publish_interval_secs)),
            gateway_url: config.gateway_url.clone(),
        },
    );

    Runner::new()
        .with_boxed_process(publisher.into_runner_process())
        .with_closer_timeout(Duration::from_secs(config.shutdown_timeout_secs))
        .run()
        .await;
}
