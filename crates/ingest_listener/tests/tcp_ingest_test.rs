use common::domain::{DeviceMessage, MacAddress, RecordStore};
use common::storage::FileRecordStore;
use ingest_listener::ingest_listener::{IngestListener, IngestListenerConfig};
use ingest_listener::tcp::TcpIngestServerConfig;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const GREETING: &str = "Welcome to ESP32-OpenWrt Server!";

struct RunningListener {
    addr: SocketAddr,
    ctx: CancellationToken,
    handle: JoinHandle<anyhow::Result<()>>,
}

async fn start_listener(data_dir: &Path) -> RunningListener {
    let listener = IngestListener::new(IngestListenerConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        data_dir: data_dir.to_path_buf(),
        sync_writes: false,
        server: TcpIngestServerConfig {
            greeting: Some(GREETING.to_string()),
            max_frame_bytes: 1024,
            max_connections: 16,
            read_timeout: Some(Duration::from_secs(5)),
        },
    })
    .await
    .unwrap();

    let addr = listener.local_addr().unwrap();
    let ctx = CancellationToken::new();
    let process = listener.into_runner_process();
    let handle = tokio::spawn(process(ctx.clone()));

    RunningListener { addr, ctx, handle }
}

/// Connect, consume the greeting and hand back the socket
async fn connect_device(addr: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut greeting = vec![0u8; GREETING.len() + 1];
    stream.read_exact(&mut greeting).await.unwrap();
    assert_eq!(greeting, format!("{GREETING}\n").as_bytes());
    stream
}

/// Send frames, close the write side and wait for the relay to hang up
async fn send_and_close(addr: SocketAddr, frames: &[u8]) {
    let mut stream = connect_device(addr).await;
    stream.write_all(frames).await.unwrap();
    // The relay may already have hung up on a malformed frame.
    let _ = stream.shutdown().await;
    let mut rest = Vec::new();
    let _ = stream.read_to_end(&mut rest).await;
}

async fn stored_messages(data_dir: &Path, mac: &str) -> Vec<DeviceMessage> {
    let store = FileRecordStore::open(data_dir).await.unwrap();
    store.read(&MacAddress::parse(mac).unwrap()).await.unwrap()
}

#[tokio::test]
async fn test_greeting_is_sent_on_connect() {
    let dir = TempDir::new().unwrap();
    let listener = start_listener(dir.path()).await;

    let stream = TcpStream::connect(listener.addr).await.unwrap();
    let mut lines = BufReader::new(stream).lines();
    let greeting = tokio::time::timeout(Duration::from_secs(2), lines.next_line())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(greeting.as_deref(), Some(GREETING));

    listener.ctx.cancel();
    listener.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_message_is_appended_to_device_file() {
    let dir = TempDir::new().unwrap();
    let listener = start_listener(dir.path()).await;

    send_and_close(listener.addr, b"aa:bb:cc:dd:ee:ff hello\n").await;

    let contents = tokio::fs::read_to_string(dir.path().join("AA:BB:CC:DD:EE:FF.txt"))
        .await
        .unwrap();
    let fields: Vec<&str> = contents.trim_end_matches('\n').split('\t').collect();
    assert_eq!(fields.len(), 3);
    assert!(chrono::DateTime::parse_from_rfc3339(fields[0]).is_ok());
    assert_eq!(fields[1], "AA:BB:CC:DD:EE:FF");
    assert_eq!(fields[2], "hello");

    listener.ctx.cancel();
    listener.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_messages_keep_arrival_order() {
    let dir = TempDir::new().unwrap();
    let listener = start_listener(dir.path()).await;

    let frames: String = (0..50)
        .map(|i| format!("24:0A:C4:00:00:01 reading {i}\n"))
        .collect();
    send_and_close(listener.addr, frames.as_bytes()).await;

    let messages = stored_messages(dir.path(), "24:0A:C4:00:00:01").await;
    let payloads: Vec<String> = messages.into_iter().map(|m| m.payload).collect();
    let expected: Vec<String> = (0..50).map(|i| format!("reading {i}")).collect();
    assert_eq!(payloads, expected);

    listener.ctx.cancel();
    listener.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_malformed_frame_drops_connection_but_listener_keeps_serving() {
    let dir = TempDir::new().unwrap();
    let listener = start_listener(dir.path()).await;

    send_and_close(
        listener.addr,
        b"AA:BB:CC:DD:EE:FF before\ngarbage without mac\nAA:BB:CC:DD:EE:FF after\n",
    )
    .await;

    send_and_close(listener.addr, b"AA:BB:CC:DD:EE:FF next connection\n").await;

    let payloads: Vec<String> = stored_messages(dir.path(), "AA:BB:CC:DD:EE:FF")
        .await
        .into_iter()
        .map(|m| m.payload)
        .collect();
    assert_eq!(payloads, vec!["before", "next connection"]);

    listener.ctx.cancel();
    listener.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_concurrent_devices_write_separate_files() {
    let dir = TempDir::new().unwrap();
    let listener = start_listener(dir.path()).await;

    let macs = ["24:0A:C4:00:00:01", "24:0A:C4:00:00:02", "24:0A:C4:00:00:03"];
    let mut devices = Vec::new();
    for mac in macs {
        let addr = listener.addr;
        devices.push(tokio::spawn(async move {
            let frames: String = (0..20).map(|i| format!("{mac} seq={i}\n")).collect();
            send_and_close(addr, frames.as_bytes()).await;
        }));
    }
    for device in devices {
        device.await.unwrap();
    }

    let store = FileRecordStore::open(dir.path()).await.unwrap();
    let files = store.list().await.unwrap();
    assert_eq!(files.len(), 3);

    for mac in macs {
        let messages = stored_messages(dir.path(), mac).await;
        assert_eq!(messages.len(), 20);
        assert!(messages.iter().all(|m| m.mac.to_string() == mac));
        assert_eq!(messages[19].payload, "seq=19");
    }

    listener.ctx.cancel();
    listener.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_closes_open_connections() {
    let dir = TempDir::new().unwrap();
    let listener = start_listener(dir.path()).await;

    let mut idle_device = connect_device(listener.addr).await;
    idle_device
        .write_all(b"AA:BB:CC:DD:EE:FF stored before shutdown\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    listener.ctx.cancel();
    tokio::time::timeout(Duration::from_secs(2), listener.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let mut rest = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(2), idle_device.read_to_end(&mut rest))
        .await
        .unwrap();
    assert!(read.map(|n| n == 0).unwrap_or(true));

    let messages = stored_messages(dir.path(), "AA:BB:CC:DD:EE:FF").await;
    assert_eq!(messages.len(), 1);
    assert!(TcpStream::connect(listener.addr).await.is_err());
}
