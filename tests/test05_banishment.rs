//! The compounding banishment policy, end to end through a game world
//! connection.

mod common;

use common::*;
use tokio::net::TcpStream;

fn banish_payload(gamemaster_id: u32, name: &str, final_warning: bool) -> Vec<u8> {
    let mut payload = vec![25u8]; // BANISH_ACCOUNT
    payload.extend_from_slice(&gamemaster_id.to_le_bytes());
    push_string(&mut payload, name);
    push_string(&mut payload, ""); // no address on record
    push_string(&mut payload, "Cheating");
    push_string(&mut payload, "Caught red-handed");
    payload.push(u8::from(final_warning));
    payload
}

async fn create_account_with_character(fixture: &TestServer, name: &str) {
    let mut web = TcpStream::connect(fixture.addr()).await.unwrap();
    login_web(&mut web, PASSWORD).await.expect("web login");

    let mut payload = vec![100u8]; // CREATE_ACCOUNT
    payload.extend_from_slice(&4000u32.to_le_bytes());
    push_string(&mut payload, "banish@test");
    push_string(&mut payload, "pw");
    let response = send_request(&mut web, &payload).await.expect("account");
    assert_eq!(response, vec![STATUS_OK]);

    let mut payload = vec![101u8]; // CREATE_CHARACTER
    push_string(&mut payload, "WorldOne");
    payload.extend_from_slice(&4000u32.to_le_bytes());
    push_string(&mut payload, name);
    payload.push(1);
    let response = send_request(&mut web, &payload).await.expect("character");
    assert_eq!(response, vec![STATUS_OK]);
}

#[tokio::test]
async fn first_banishment_is_seven_days_and_repeat_is_refused() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");
    create_account_with_character(&fixture, "Villain").await;

    let mut game = TcpStream::connect(fixture.addr()).await.unwrap();
    login_game_world(&mut game, PASSWORD, "WorldOne")
        .await
        .expect("login");

    let response = send_request(&mut game, &banish_payload(1, "Villain", false))
        .await
        .expect("banish");
    assert_eq!(response[0], STATUS_OK);
    let banishment_id = u32::from_le_bytes([response[1], response[2], response[3], response[4]]);
    assert!(banishment_id > 0);
    assert_eq!(response[5], 7, "first offense gets the requested week");
    assert_eq!(response[6], 0, "no final warning yet");

    // While the banishment is active, another one is a domain error.
    let response = send_request(&mut game, &banish_payload(1, "Villain", false))
        .await
        .expect("second banish");
    assert_eq!(response[0], STATUS_ERROR);
    assert_eq!(response[1], 3);

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn requested_final_warning_stretches_the_duration() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");
    create_account_with_character(&fixture, "Villain").await;

    let mut game = TcpStream::connect(fixture.addr()).await.unwrap();
    login_game_world(&mut game, PASSWORD, "WorldOne")
        .await
        .expect("login");

    let response = send_request(&mut game, &banish_payload(1, "Villain", true))
        .await
        .expect("banish");
    assert_eq!(response[0], STATUS_OK);
    assert_eq!(response[5], 30, "a requested final warning is at least 30 days");
    assert_eq!(response[6], 1, "final warning recorded");

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn unknown_character_is_a_domain_error() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");

    let mut game = TcpStream::connect(fixture.addr()).await.unwrap();
    login_game_world(&mut game, PASSWORD, "WorldOne")
        .await
        .expect("login");

    let response = send_request(&mut game, &banish_payload(1, "Nobody", false))
        .await
        .expect("banish");
    assert_eq!(response[0], STATUS_ERROR);
    assert_eq!(response[1], 1);

    fixture.server.shutdown().await;
}
