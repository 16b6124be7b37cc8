//! The authorization gate: password check, world resolution through the
//! worker path, and the close-after-first-response rule for connections
//! that never authorize.

mod common;

use common::*;
use tokio::net::TcpStream;

#[tokio::test]
async fn game_world_handshake_authorizes_and_keeps_the_connection() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    let response = login_game_world(&mut stream, PASSWORD, "WorldOne")
        .await
        .expect("login response");
    assert_eq!(response, vec![STATUS_OK]);

    // The connection is back in the reading state: a whitelisted query
    // gets a response on the same connection, in order.
    let mut logout = vec![21u8]; // LOGOUT_GAME
    logout.extend_from_slice(&99u32.to_le_bytes()); // character id
    logout.extend_from_slice(&10u16.to_le_bytes()); // level
    push_string(&mut logout, "Knight");
    push_string(&mut logout, "Home");
    logout.extend_from_slice(&0u32.to_le_bytes()); // last login
    logout.extend_from_slice(&0u16.to_le_bytes()); // tutor activities
    let response = send_request(&mut stream, &logout).await.expect("logout response");
    assert_eq!(response[0], STATUS_OK);

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn wrong_password_fails_and_closes() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    let response = login_game_world(&mut stream, "wrong", "WorldOne")
        .await
        .expect("failed response");
    assert_eq!(response, vec![STATUS_FAILED]);

    // The server closes after writing the response.
    assert!(read_response(&mut stream).await.is_none());

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn unknown_world_fails_and_closes() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    let response = login_game_world(&mut stream, PASSWORD, "Nowhere")
        .await
        .expect("failed response");
    assert_eq!(response, vec![STATUS_FAILED]);
    assert!(read_response(&mut stream).await.is_none());

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn unknown_application_type_fails_and_closes() {
    let fixture = TestServer::start().await;

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    let mut payload = vec![0u8, 9u8]; // LOGIN, bogus application type
    push_string(&mut payload, PASSWORD);
    let response = send_request(&mut stream, &payload).await.expect("response");
    assert_eq!(response, vec![STATUS_FAILED]);
    assert!(read_response(&mut stream).await.is_none());

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn login_server_authorizes_without_database_round_trip() {
    let fixture = TestServer::start().await;

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    let mut payload = vec![0u8, 2u8]; // LOGIN, application type LOGIN
    push_string(&mut payload, PASSWORD);
    let response = send_request(&mut stream, &payload).await.expect("response");
    assert_eq!(response, vec![STATUS_OK]);

    // LOGIN_ACCOUNT is whitelisted; an unknown account is a domain
    // error, not a failure.
    let mut login_account = vec![11u8];
    login_account.extend_from_slice(&555u32.to_le_bytes());
    push_string(&mut login_account, "some-password");
    push_string(&mut login_account, "127.0.0.1");
    let response = send_request(&mut stream, &login_account)
        .await
        .expect("response");
    assert_eq!(response[0], STATUS_ERROR);
    assert_eq!(response[1], 1); // unknown account

    fixture.server.shutdown().await;
}
