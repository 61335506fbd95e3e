//! End-to-end tests over real TCP connections
//!
//! Every server binds `127.0.0.1:0` and, unless a test needs it, runs with
//! the timestamp timer disabled so responses are deterministic.

use std::net::SocketAddr;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use aesd_core::{SeekDirective, SharedStore};
use aesd_socket::{AesdServer, ServerConfig, ServerResult, ShutdownHandle};

struct Running {
    addr: SocketAddr,
    store: SharedStore,
    shutdown: ShutdownHandle,
    task: JoinHandle<ServerResult<()>>,
}

impl Running {
    async fn stop(self) {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }
}

fn test_config() -> ServerConfig {
    ServerConfig::default()
        .with_bind_addr("127.0.0.1:0")
        .with_timestamp_interval_secs(0)
        .with_shutdown_grace(Duration::from_millis(500))
}

async fn start(config: ServerConfig) -> Running {
    let server = AesdServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let store = server.store();
    let shutdown = server.shutdown_handle();
    let task = tokio::spawn(server.run());
    Running {
        addr,
        store,
        shutdown,
        task,
    }
}

/// One exchange: send `payload`, half-close, read until the server closes
async fn send(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();

    let mut response = Vec::new();
    // A reset after the server closes counts as end of response
    let _ = stream.read_to_end(&mut response).await;
    response
}

// ============================================================================
// Protocol Scenarios
// ============================================================================

#[tokio::test]
async fn test_append_then_seek() {
    let server = start(test_config()).await;

    assert_eq!(send(server.addr, b"one\n").await, b"one\n");
    assert_eq!(send(server.addr, b"two\n").await, b"one\ntwo\n");

    let seek = SeekDirective::new(1, 0).to_line();
    assert_eq!(send(server.addr, &seek).await, b"two\n");

    let seek = SeekDirective::new(0, 2).to_line();
    assert_eq!(send(server.addr, &seek).await, b"e\ntwo\n");

    // Seeks never mutate the store
    assert_eq!(server.store.len().await.unwrap(), 2);
    server.stop().await;
}

#[tokio::test]
async fn test_eleventh_record_evicts_oldest() {
    let server = start(test_config()).await;

    for i in 1..=10 {
        send(server.addr, format!("{i}\n").as_bytes()).await;
    }
    let response = send(server.addr, b"11\n").await;

    let expected: String = (2..=11).map(|i| format!("{i}\n")).collect();
    assert_eq!(String::from_utf8(response).unwrap(), expected);
    assert_eq!(server.store.len().await.unwrap(), 10);
    server.stop().await;
}

#[tokio::test]
async fn test_out_of_range_seek_closes_without_body() {
    let server = start(test_config()).await;
    send(server.addr, b"only\n").await;

    assert!(send(server.addr, b"AESDCHAR_IOCSEEKTO:1,0\n").await.is_empty());
    assert!(send(server.addr, b"AESDCHAR_IOCSEEKTO:0,5\n").await.is_empty());

    assert_eq!(&server.store.snapshot().await.unwrap()[..], b"only\n");
    server.stop().await;
}

#[tokio::test]
async fn test_malformed_directive_is_stored_as_payload() {
    let server = start(test_config()).await;

    let response = send(server.addr, b"AESDCHAR_IOCSEEKTO:1\n").await;
    assert_eq!(response, b"AESDCHAR_IOCSEEKTO:1\n");
    server.stop().await;
}

#[tokio::test]
async fn test_unterminated_record_is_dropped() {
    let server = start(test_config()).await;
    send(server.addr, b"kept\n").await;

    assert_eq!(send(server.addr, b"no terminator").await, b"kept\n");
    assert_eq!(send(server.addr, b"").await, b"kept\n");
    assert_eq!(server.store.len().await.unwrap(), 1);
    server.stop().await;
}

#[tokio::test]
async fn test_large_record_spans_many_reads() {
    let server = start(test_config()).await;

    let mut record = "z".repeat(100_000).into_bytes();
    record.push(b'\n');
    let response = send(server.addr, &record).await;
    assert_eq!(response, record);
    server.stop().await;
}

#[tokio::test]
async fn test_oversized_record_is_rejected() {
    let server = start(test_config().with_max_record_len(8)).await;

    assert!(send(server.addr, b"0123456789abcdef\n").await.is_empty());
    assert_eq!(send(server.addr, b"short\n").await, b"short\n");
    assert_eq!(server.store.len().await.unwrap(), 1);
    server.stop().await;
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_clients_all_recorded() {
    let server = start(test_config()).await;

    let mut clients = Vec::new();
    for i in 0..10 {
        let addr = server.addr;
        clients.push(tokio::spawn(async move {
            let record = format!("client-{i}-{}\n", "y".repeat(i * 50));
            let response = send(addr, record.as_bytes()).await;
            // Each client sees a snapshot that includes its own record
            assert!(String::from_utf8(response).unwrap().contains(&record));
        }));
    }
    for client in clients {
        client.await.unwrap();
    }

    let content = String::from_utf8(server.store.snapshot().await.unwrap().to_vec()).unwrap();
    for i in 0..10 {
        let record = format!("client-{i}-{}\n", "y".repeat(i * 50));
        assert!(content.contains(&record), "missing record from client {i}");
    }
    assert_eq!(content.lines().count(), 10);
    server.stop().await;
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_backing_file_mirrors_and_is_removed() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("aesdsocketdata");
    std::fs::write(&path, b"stale\n").unwrap();

    let server = start(test_config().with_backing_file(&path)).await;
    assert!(std::fs::read(&path).unwrap().is_empty());

    send(server.addr, b"one\n").await;
    send(server.addr, b"two\n").await;
    assert_eq!(std::fs::read(&path).unwrap(), b"one\ntwo\n");

    server.stop().await;
    assert!(!path.exists());
}

#[tokio::test]
async fn test_shutdown_clears_store_and_closes_listener() {
    let server = start(test_config()).await;
    let addr = server.addr;
    let store = server.store.clone();
    send(addr, b"one\n").await;

    server.stop().await;
    assert!(store.snapshot().await.unwrap().is_empty());
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn test_timestamps_interleave_with_clients() {
    let server = start(test_config().with_timestamp_interval_secs(1)).await;

    tokio::time::sleep(Duration::from_millis(1300)).await;
    let response = String::from_utf8(send(server.addr, b"after\n").await).unwrap();

    let mut lines = response.lines();
    assert!(lines.next().unwrap().starts_with("timestamp: "));
    assert_eq!(response.lines().last(), Some("after"));
    server.stop().await;
}
