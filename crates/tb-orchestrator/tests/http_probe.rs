//! HTTP exchange probes over loopback

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tb_core::traits::ExchangeProbe;
use tb_core::ExchangeOutcome;
use tb_orchestrator::{HttpInitiatorProbe, HttpResponderProbe};

fn initiator(addr: SocketAddr, timeout_ms: u64) -> HttpInitiatorProbe {
    HttpInitiatorProbe::new(addr.ip().to_string(), None, addr.port(), Duration::from_millis(timeout_ms))
}

/// Accept one connection, read the request and answer with `response`
async fn canned_server(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 1024];
        let _ = stream.read(&mut buf).await;
        stream.write_all(response).await.unwrap();
        let _ = stream.shutdown().await;
    });
    addr
}

#[tokio::test]
async fn test_initiator_and_responder_agree() {
    let mut responder = HttpResponderProbe::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(5))
        .await
        .unwrap();
    let addr = responder.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let first = responder.attempt().await;
        let second = responder.attempt().await;
        (first, second)
    });

    let mut probe = initiator(addr, 2000);
    assert_eq!(probe.attempt().await, ExchangeOutcome::Success);
    // The responder keeps listening between attempts
    assert_eq!(probe.attempt().await, ExchangeOutcome::Success);

    let (first, second) = server.await.unwrap();
    assert_eq!(first, ExchangeOutcome::Success);
    assert_eq!(second, ExchangeOutcome::Success);
}

#[tokio::test]
async fn test_refused_connection_is_retryable() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let outcome = initiator(addr, 2000).attempt().await;
    assert!(matches!(outcome, ExchangeOutcome::RetryableFailure(_)));
}

#[tokio::test]
async fn test_non_200_status_is_retryable() {
    let addr = canned_server(b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\n\r\n").await;
    let outcome = initiator(addr, 2000).attempt().await;
    assert_eq!(
        outcome,
        ExchangeOutcome::RetryableFailure("unexpected status 503".to_string())
    );
}

#[tokio::test]
async fn test_non_http_response_is_fatal() {
    let addr = canned_server(b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let outcome = initiator(addr, 2000).attempt().await;
    assert!(matches!(outcome, ExchangeOutcome::FatalFailure(_)));
}

#[tokio::test]
async fn test_binary_response_is_fatal() {
    let addr = canned_server(&[0xff, 0xfe, 0x00, 0x81, b'\r', b'\n']).await;
    let outcome = initiator(addr, 2000).attempt().await;
    assert!(matches!(outcome, ExchangeOutcome::FatalFailure(reason) if reason.contains("UTF-8")));
}

#[tokio::test]
async fn test_server_closing_without_response_is_retryable() {
    let addr = canned_server(b"").await;
    let outcome = initiator(addr, 2000).attempt().await;
    assert!(matches!(outcome, ExchangeOutcome::RetryableFailure(_)));
}

#[tokio::test]
async fn test_silent_server_times_out() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        drop(stream);
    });

    let outcome = initiator(addr, 100).attempt().await;
    assert!(matches!(outcome, ExchangeOutcome::RetryableFailure(reason) if reason.contains("no response")));
}

#[tokio::test]
async fn test_responder_rejects_garbage_request() {
    let mut responder = HttpResponderProbe::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(5))
        .await
        .unwrap();
    let addr = responder.local_addr().unwrap();
    let server = tokio::spawn(async move { responder.attempt().await });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(b"hello there\r\n\r\n").await.unwrap();

    let outcome = server.await.unwrap();
    assert!(matches!(outcome, ExchangeOutcome::FatalFailure(_)));
}

#[tokio::test]
async fn test_responder_without_request_is_retryable() {
    let mut responder = HttpResponderProbe::bind("127.0.0.1:0".parse().unwrap(), Duration::from_millis(50))
        .await
        .unwrap();
    let outcome = responder.attempt().await;
    assert!(matches!(outcome, ExchangeOutcome::RetryableFailure(_)));
}

#[tokio::test]
async fn test_responder_survives_client_that_hangs_up() {
    let mut responder = HttpResponderProbe::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(5))
        .await
        .unwrap();
    let addr = responder.local_addr().unwrap();
    let server = tokio::spawn(async move {
        let dropped = responder.attempt().await;
        let served = responder.attempt().await;
        (dropped, served)
    });

    // Connect and close without sending a byte
    drop(TcpStream::connect(addr).await.unwrap());

    let mut probe = initiator(addr, 2000);
    assert_eq!(probe.attempt().await, ExchangeOutcome::Success);

    let (dropped, served) = server.await.unwrap();
    assert!(matches!(dropped, ExchangeOutcome::RetryableFailure(_)));
    assert_eq!(served, ExchangeOutcome::Success);
}

#[tokio::test]
async fn test_responder_rejects_binary_request() {
    let mut responder = HttpResponderProbe::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(5))
        .await
        .unwrap();
    let addr = responder.local_addr().unwrap();
    let server = tokio::spawn(async move { responder.attempt().await });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&[0x16, 0x03, 0x01, 0xff, 0xfe, b'\n']).await.unwrap();

    let outcome = server.await.unwrap();
    assert!(matches!(outcome, ExchangeOutcome::FatalFailure(reason) if reason.contains("UTF-8")));
}

#[tokio::test]
async fn test_responder_caps_request_line_length() {
    let mut responder = HttpResponderProbe::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(5))
        .await
        .unwrap();
    let addr = responder.local_addr().unwrap();
    let server = tokio::spawn(async move { responder.attempt().await });

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let endless = vec![b'A'; 64 * 1024];
    let _ = stream.write_all(&endless).await;

    let outcome = server.await.unwrap();
    assert!(matches!(outcome, ExchangeOutcome::FatalFailure(reason) if reason.contains("longer than")));
}
