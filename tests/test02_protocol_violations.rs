//! Protocol-shape violations: queries before LOGIN, oversize frames and
//! whitelist misses.

mod common;

use common::*;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

#[tokio::test]
async fn business_query_before_login_closes_without_response() {
    let fixture = TestServer::start().await;

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    let mut payload = vec![21u8]; // LOGOUT_GAME before LOGIN
    payload.extend_from_slice(&1u32.to_le_bytes());
    stream.write_all(&frame(&payload)).await.unwrap();

    // No response frame: the connection just closes.
    assert!(read_response(&mut stream).await.is_none());

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn oversize_frame_closes_without_response() {
    let fixture = TestServer::start().await;

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    // Extended header declaring one byte more than the buffer allows.
    let mut header = Vec::new();
    header.extend_from_slice(&0xFFFFu16.to_le_bytes());
    header.extend_from_slice(&(1024u32 * 1024 + 1).to_le_bytes());
    stream.write_all(&header).await.unwrap();

    assert!(read_response(&mut stream).await.is_none());

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn zero_length_frame_closes_without_response() {
    let fixture = TestServer::start().await;

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    stream.write_all(&0u16.to_le_bytes()).await.unwrap();
    assert!(read_response(&mut stream).await.is_none());

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn whitelist_violation_fails_but_keeps_the_connection() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    let response = login_web(&mut stream, PASSWORD).await.expect("login");
    assert_eq!(response, vec![STATUS_OK]);

    // LOGOUT_GAME is not on the web whitelist.
    let mut payload = vec![21u8];
    payload.extend_from_slice(&1u32.to_le_bytes());
    let response = send_request(&mut stream, &payload).await.expect("response");
    assert_eq!(response, vec![STATUS_FAILED]);

    // The connection survives the refusal; an allowed query still works.
    let response = send_request(&mut stream, &[150u8]).await.expect("worlds");
    assert_eq!(response[0], STATUS_OK);
    assert_eq!(response[1], 1); // one seeded world

    fixture.server.shutdown().await;
}
