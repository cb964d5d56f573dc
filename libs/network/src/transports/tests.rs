//! TCP Transport Tests
//!
//! Real loopback sockets, no mocks.

use super::*;
use crate::connection::{open, ConnectionHandle, ConnectionHandler};
use crate::framing::{Frame, FrameCodec};
use crate::TransportError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Forward(mpsc::UnboundedSender<Frame>);

impl ConnectionHandler for Forward {
    fn on_message(&self, _connection: &ConnectionHandle, frame: Frame) -> crate::Result<()> {
        let _ = self.0.send(frame);
        Ok(())
    }

    fn on_disconnect(&self, _connection: &ConnectionHandle) {}
}

#[tokio::test]
async fn test_tcp_frames_over_loopback() {
    let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
    let port = acceptor.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (stream, peer) = acceptor.accept().await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (handle, driver) = open(stream, Some(peer), FrameCodec::default());
        driver.spawn(Arc::new(Forward(tx)));

        // Echo each frame back with its type bumped
        for _ in 0..3 {
            let frame = rx.recv().await.unwrap();
            handle
                .send(frame.message_type + 1, &frame.payload)
                .unwrap();
        }
    });

    let connector = TcpConnector::default();
    let (stream, peer) = connector.connect("127.0.0.1", port).await.unwrap();
    assert_eq!(peer.map(|p| p.port()), Some(port));

    let (tx, mut rx) = mpsc::unbounded_channel();
    let (handle, driver) = open(stream, peer, FrameCodec::default());
    driver.spawn(Arc::new(Forward(tx)));

    let sizes = [0usize, 100, 70 * 1024];
    for (i, size) in sizes.iter().enumerate() {
        handle.send(i as u8 * 10, &vec![0xAA; *size]).unwrap();
    }
    for (i, size) in sizes.iter().enumerate() {
        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.message_type, i as u8 * 10 + 1);
        assert_eq!(frame.payload.len(), *size);
    }

    server.await.unwrap();
}

#[tokio::test]
async fn test_connect_refused() {
    // Bind then drop to get a port nobody listens on
    let port = {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        acceptor.local_addr().unwrap().port()
    };

    let err = TcpConnector::default()
        .connect("127.0.0.1", port)
        .await
        .err()
        .unwrap();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_connect_timeout() {
    // A dial that never completes
    let never = std::future::pending::<std::io::Result<tokio::net::TcpStream>>();

    match tcp::connect_within(Duration::from_millis(20), "10.0.0.1", 9, never).await {
        Err(TransportError::Timeout { timeout_ms, .. }) => assert_eq!(timeout_ms, 20),
        Err(e) => panic!("expected a timeout, got {}", e),
        Ok(_) => panic!("expected a timeout"),
    }
}

#[tokio::test]
async fn test_connect_failure_is_retryable() {
    let refused = std::future::ready(Err::<(), _>(std::io::Error::from(std::io::ErrorKind::ConnectionRefused)));
    let err = tcp::connect_within(Duration::from_secs(1), "127.0.0.1", 9, refused)
        .await
        .unwrap_err();
    assert!(matches!(err, TransportError::Network { .. }));
    assert!(err.is_retryable());
}
