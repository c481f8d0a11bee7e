use crate::domain::IngestService;
use crate::tcp::{TcpIngestServer, TcpIngestServerConfig};
use common::storage::FileRecordStore;
use relay_runner::AppProcess;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

pub struct IngestListenerConfig {
    pub listen_addr: String,
    pub data_dir: PathBuf,
    pub sync_writes: bool,
    pub server: TcpIngestServerConfig,
}

pub struct IngestListener {
    server: TcpIngestServer,
}

impl IngestListener {
    /// Open the record store and bind the TCP socket; fails if the port is taken
    pub async fn new(config: IngestListenerConfig) -> anyhow::Result<Self> {
        info!("Initializing ingest listener module");

        let record_store = FileRecordStore::open(&config.data_dir)
            .await?
            .with_sync_writes(config.sync_writes);
        let ingest_service = Arc::new(IngestService::new(Arc::new(record_store)));

        let server =
            TcpIngestServer::bind(&config.listen_addr, ingest_service, config.server).await?;

        info!("Ingest listener initialized");
        Ok(Self { server })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.server.local_addr()
    }

    pub fn into_runner_process(self) -> AppProcess {
        let server = self.server;
        Box::new(move |ctx| Box::pin(async move { server.run(ctx).await }))
    }
}
