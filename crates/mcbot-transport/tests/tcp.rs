//! Integration tests for the TCP connector.
//!
//! These tests bind a real listener on localhost and dial it, so they
//! verify that bytes actually cross the network.

use std::time::Duration;

use mcbot_transport::{Connector, Target, TcpConnector, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn test_tcp_connect_and_exchange_bytes() {
    // "127.0.0.1:0" tells the OS to pick an available port.
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("should accept");
        let mut buf = [0u8; 5];
        socket.read_exact(&mut buf).await.unwrap();
        socket.write_all(b"world").await.unwrap();
        buf
    });

    let connector = TcpConnector::new(Duration::from_secs(2));
    let target = Target::new("127.0.0.1", port).unwrap();
    let mut conn = connector.connect(&target).await.expect("should connect");
    assert!(conn.id.into_inner() > 0);

    conn.stream.write_all(b"hello").await.unwrap();
    let mut reply = [0u8; 5];
    conn.stream.read_exact(&mut reply).await.unwrap();

    assert_eq!(&reply, b"world");
    assert_eq!(&server.await.unwrap(), b"hello");
}

#[tokio::test]
async fn test_tcp_connect_refused_returns_connect_failed() {
    // Bind then drop to get a port that is (almost certainly) closed.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let connector = TcpConnector::new(Duration::from_secs(2));
    let target = Target::new("127.0.0.1", port).unwrap();
    let result = connector.connect(&target).await;

    assert!(
        matches!(result, Err(TransportError::ConnectFailed { .. })),
        "expected ConnectFailed, got {result:?}"
    );
}

#[tokio::test]
async fn test_tcp_connections_get_distinct_ids() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            if listener.accept().await.is_err() {
                break;
            }
        }
    });

    let connector = TcpConnector::default();
    let target = Target::new("localhost", port).unwrap();
    let a = connector.connect(&target).await.unwrap();
    let b = connector.connect(&target).await.unwrap();
    assert_ne!(a.id, b.id);
}
