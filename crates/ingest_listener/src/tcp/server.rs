use crate::domain::IngestService;
use crate::tcp::frame::parse_frame;
use anyhow::Context;
use bytes::Bytes;
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct TcpIngestServerConfig {
    /// Line written to each device right after accept; `None` sends nothing
    pub greeting: Option<String>,
    pub max_frame_bytes: usize,
    pub max_connections: usize,
    /// Close a connection that sent nothing for this long; `None` waits forever
    pub read_timeout: Option<Duration>,
}

impl Default for TcpIngestServerConfig {
    fn default() -> Self {
        Self {
            greeting: Some("Welcome to ESP32-OpenWrt Server!".to_string()),
            max_frame_bytes: 1024,
            max_connections: 64,
            read_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Why a device connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    PeerClosed,
    MalformedFrame,
    FrameTooLong,
    ReadError,
    IdleTimeout,
    GreetingFailed,
    StoreError,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionSummary {
    pub messages_stored: u64,
    pub reason: CloseReason,
}

/// TCP front door for mesh devices: newline-delimited frames in, record lines out
pub struct TcpIngestServer {
    listener: TcpListener,
    service: Arc<IngestService>,
    config: Arc<TcpIngestServerConfig>,
}

impl TcpIngestServer {
    pub async fn bind(
        addr: &str,
        service: Arc<IngestService>,
        config: TcpIngestServerConfig,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind ingest listener on {addr}"))?;
        info!(addr = %listener.local_addr()?, "ingest listener bound");

        Ok(Self {
            listener,
            service,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept devices until `ctx` is cancelled, then drain open connections
    pub async fn run(self, ctx: CancellationToken) -> anyhow::Result<()> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_connections.max(1)));
        let mut connections = JoinSet::new();

        loop {
            let permit = tokio::select! {
                _ = ctx.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => {
                    permit.context("connection semaphore closed")?
                }
            };

            let (stream, peer) = tokio::select! {
                _ = ctx.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!(error = %e, "failed to accept device connection");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                        continue;
                    }
                }
            };

            let span = info_span!("device_connection", peer = %peer);
            let service = Arc::clone(&self.service);
            let config = Arc::clone(&self.config);
            let conn_ctx = ctx.child_token();
            connections.spawn(
                async move {
                    let summary = handle_connection(stream, peer, service, config, conn_ctx).await;
                    drop(permit);
                    summary
                }
                .instrument(span),
            );

            while let Some(finished) = connections.try_join_next() {
                if let Err(e) = finished {
                    error!(error = %e, "device connection task panicked");
                }
            }
        }

        info!(open_connections = connections.len(), "ingest listener stopping");
        while let Some(finished) = connections.join_next().await {
            if let Err(e) = finished {
                error!(error = %e, "device connection task panicked");
            }
        }
        info!("ingest listener stopped");
        Ok(())
    }
}

/// Serve one device until it disconnects, misbehaves or the relay shuts down
pub(crate) async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    service: Arc<IngestService>,
    config: Arc<TcpIngestServerConfig>,
    ctx: CancellationToken,
) -> ConnectionSummary {
    info!("device connected");
    let (reader, mut writer) = stream.into_split();
    let mut messages_stored = 0u64;

    if let Some(greeting) = config.greeting.as_deref().filter(|g| !g.is_empty()) {
        if let Err(e) = writer.write_all(format!("{greeting}\n").as_bytes()).await {
            warn!(error = %e, "failed to send greeting");
            return close(peer, messages_stored, CloseReason::GreetingFailed);
        }
    }

    let codec = AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), b"\n".to_vec(), config.max_frame_bytes);
    let mut frames = FramedRead::new(reader, codec);

    let reason = loop {
        let next = tokio::select! {
            _ = ctx.cancelled() => break CloseReason::Shutdown,
            next = next_frame(&mut frames, config.read_timeout) => next,
        };

        let frame = match next {
            Err(_elapsed) => break CloseReason::IdleTimeout,
            Ok(None) => break CloseReason::PeerClosed,
            Ok(Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded))) => {
                warn!(max_frame_bytes = config.max_frame_bytes, "frame too long, dropping connection");
                break CloseReason::FrameTooLong;
            }
            Ok(Some(Err(e))) => {
                warn!(error = %e, "read error");
                break CloseReason::ReadError;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        let line = String::from_utf8_lossy(&frame);
        if line.trim().is_empty() {
            continue;
        }

        let stored = match parse_frame(&line) {
            Ok(incoming) => service.ingest(incoming).await,
            Err(e) => Err(e),
        };

        match stored {
            Ok(message) => {
                messages_stored += 1;
                debug!(mac = %message.mac, payload_size = message.payload.len(), "message stored");
            }
            Err(e) if e.is_malformed_input() => {
                warn!(error = %e, frame_size = frame.len(), "dropping malformed frame, closing connection");
                break CloseReason::MalformedFrame;
            }
            Err(e) => {
                error!(error = %e, "failed to store device message, closing connection");
                break CloseReason::StoreError;
            }
        }
    };

    close(peer, messages_stored, reason)
}

async fn next_frame(
    frames: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, AnyDelimiterCodec>,
    read_timeout: Option<Duration>,
) -> Result<Option<Result<Bytes, AnyDelimiterCodecError>>, tokio::time::error::Elapsed> {
    match read_timeout {
        Some(timeout) => tokio::time::timeout(timeout, frames.next()).await,
        None => Ok(frames.next().await),
    }
}

fn close(peer: SocketAddr, messages_stored: u64, reason: CloseReason) -> ConnectionSummary {
    info!(peer = %peer, messages_stored, reason = ?reason, "device disconnected");
    ConnectionSummary {
        messages_stored,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::domain::{DeviceMessage, DomainError, MockRecordStore};
    use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

    async fn connected_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, server, peer)
    }

    fn config(read_timeout: Option<Duration>) -> Arc<TcpIngestServerConfig> {
        Arc::new(TcpIngestServerConfig {
            greeting: Some("hi".to_string()),
            max_frame_bytes: 64,
            max_connections: 4,
            read_timeout,
        })
    }

    #[tokio::test]
    async fn test_connection_stores_frames_then_peer_close() {
        let mut store = MockRecordStore::new();
        store.expect_append().times(2).returning(|_: &DeviceMessage| Ok(()));
        let service = Arc::new(IngestService::new(Arc::new(store)));

        let (client, server, peer) = connected_pair().await;
        let handle = tokio::spawn(handle_connection(
            server,
            peer,
            service,
            config(None),
            CancellationToken::new(),
        ));

        let (read_half, mut write_half) = client.into_split();
        let mut lines = BufReader::new(read_half).lines();
        assert_eq!(lines.next_line().await.unwrap().as_deref(), Some("hi"));

        write_half
            .write_all(b"AA:BB:CC:DD:EE:FF one\r\n\nAA:BB:CC:DD:EE:FF two\n")
            .await
            .unwrap();
        write_half.shutdown().await.unwrap();

        let summary = handle.await.unwrap();
        assert_eq!(summary.messages_stored, 2);
        assert_eq!(summary.reason, CloseReason::PeerClosed);
    }

    #[tokio::test]
    async fn test_last_frame_without_newline_is_stored() {
        let mut store = MockRecordStore::new();
        store
            .expect_append()
            .withf(|m: &DeviceMessage| m.payload == "tail")
            .times(1)
            .returning(|_| Ok(()));
        let service = Arc::new(IngestService::new(Arc::new(store)));

        let (mut client, server, peer) = connected_pair().await;
        let handle = tokio::spawn(handle_connection(
            server,
            peer,
            service,
            config(None),
            CancellationToken::new(),
        ));

        client.write_all(b"AA:BB:CC:DD:EE:FF tail").await.unwrap();
        client.shutdown().await.unwrap();

        assert_eq!(handle.await.unwrap().messages_stored, 1);
    }

    #[tokio::test]
    async fn test_malformed_frame_closes_connection() {
        let mut store = MockRecordStore::new();
        store.expect_append().times(0);
        let service = Arc::new(IngestService::new(Arc::new(store)));

        let (mut client, server, peer) = connected_pair().await;
        let handle = tokio::spawn(handle_connection(
            server,
            peer,
            service,
            config(None),
            CancellationToken::new(),
        ));

        client.write_all(b"not-a-mac hello\n").await.unwrap();

        let summary = handle.await.unwrap();
        assert_eq!(summary.reason, CloseReason::MalformedFrame);
        assert_eq!(summary.messages_stored, 0);

        // Greeting, then EOF (or reset) once the relay hung up.
        let mut buf = Vec::new();
        let _ = client.read_to_end(&mut buf).await;
        assert_eq!(buf, b"hi\n");
    }

    #[tokio::test]
    async fn test_over_long_frame_closes_connection() {
        let store = MockRecordStore::new();
        let service = Arc::new(IngestService::new(Arc::new(store)));

        let (mut client, server, peer) = connected_pair().await;
        let handle = tokio::spawn(handle_connection(
            server,
            peer,
            service,
            config(None),
            CancellationToken::new(),
        ));

        let long_frame = format!("AA:BB:CC:DD:EE:FF {}\n", "x".repeat(200));
        client.write_all(long_frame.as_bytes()).await.unwrap();

        assert_eq!(handle.await.unwrap().reason, CloseReason::FrameTooLong);
    }

    #[tokio::test]
    async fn test_store_failure_closes_connection() {
        let mut store = MockRecordStore::new();
        store.expect_append().times(1).returning(|_| {
            Err(DomainError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "read-only file system",
            )))
        });
        let service = Arc::new(IngestService::new(Arc::new(store)));

        let (mut client, server, peer) = connected_pair().await;
        let handle = tokio::spawn(handle_connection(
            server,
            peer,
            service,
            config(None),
            CancellationToken::new(),
        ));

        client.write_all(b"AA:BB:CC:DD:EE:FF hello\n").await.unwrap();

        assert_eq!(handle.await.unwrap().reason, CloseReason::StoreError);
    }

    #[tokio::test]
    async fn test_idle_connection_times_out() {
        let store = MockRecordStore::new();
        let service = Arc::new(IngestService::new(Arc::new(store)));

        let (_client, server, peer) = connected_pair().await;
        let summary = handle_connection(
            server,
            peer,
            service,
            config(Some(Duration::from_millis(50))),
            CancellationToken::new(),
        )
        .await;

        assert_eq!(summary.reason, CloseReason::IdleTimeout);
    }

    #[tokio::test]
    async fn test_cancellation_closes_connection() {
        let store = MockRecordStore::new();
        let service = Arc::new(IngestService::new(Arc::new(store)));
        let ctx = CancellationToken::new();

        let (_client, server, peer) = connected_pair().await;
        let handle = tokio::spawn(handle_connection(server, peer, service, config(None), ctx.clone()));

        ctx.cancel();
        assert_eq!(handle.await.unwrap().reason, CloseReason::Shutdown);
    }
}
