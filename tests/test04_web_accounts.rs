//! The web front-end flow: account and character creation, password
//! verification and the public summaries.

mod common;

use common::*;
use tokio::net::TcpStream;

fn create_account_payload(account_id: u32, email: &str, password: &str) -> Vec<u8> {
    let mut payload = vec![100u8]; // CREATE_ACCOUNT
    payload.extend_from_slice(&account_id.to_le_bytes());
    push_string(&mut payload, email);
    push_string(&mut payload, password);
    payload
}

fn check_password_payload(account_id: u32, password: &str) -> Vec<u8> {
    let mut payload = vec![10u8]; // CHECK_ACCOUNT_PASSWORD
    payload.extend_from_slice(&account_id.to_le_bytes());
    push_string(&mut payload, password);
    push_string(&mut payload, "127.0.0.1");
    payload
}

#[tokio::test]
async fn account_lifecycle() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");

    let mut web = TcpStream::connect(fixture.addr()).await.unwrap();
    login_web(&mut web, PASSWORD).await.expect("web login");

    // Create an account.
    let response = send_request(&mut web, &create_account_payload(1234, "a@b.test", "hunter2"))
        .await
        .expect("create account");
    assert_eq!(response, vec![STATUS_OK]);

    // The account number is now taken.
    let response = send_request(&mut web, &create_account_payload(1234, "c@d.test", "xyz"))
        .await
        .expect("duplicate number");
    assert_eq!(response[0], STATUS_ERROR);
    assert_eq!(response[1], 1);

    // So is the email.
    let response = send_request(&mut web, &create_account_payload(5678, "a@b.test", "xyz"))
        .await
        .expect("duplicate email");
    assert_eq!(response[0], STATUS_ERROR);
    assert_eq!(response[1], 2);

    // The stored salted digest verifies the right password only.
    let response = send_request(&mut web, &check_password_payload(1234, "hunter2"))
        .await
        .expect("check password");
    assert_eq!(response, vec![STATUS_OK]);
    let response = send_request(&mut web, &check_password_payload(1234, "wrong"))
        .await
        .expect("check wrong password");
    assert_eq!(response[0], STATUS_ERROR);
    assert_eq!(response[1], 2);

    // Create a character on the seeded world.
    let mut payload = vec![101u8]; // CREATE_CHARACTER
    push_string(&mut payload, "WorldOne");
    payload.extend_from_slice(&1234u32.to_le_bytes());
    push_string(&mut payload, "Aldo");
    payload.push(1); // sex
    let response = send_request(&mut web, &payload).await.expect("create character");
    assert_eq!(response, vec![STATUS_OK]);

    // Duplicate character names are refused.
    let mut payload = vec![101u8];
    push_string(&mut payload, "WorldOne");
    payload.extend_from_slice(&1234u32.to_le_bytes());
    push_string(&mut payload, "Aldo");
    payload.push(2);
    let response = send_request(&mut web, &payload).await.expect("duplicate name");
    assert_eq!(response[0], STATUS_ERROR);
    assert_eq!(response[1], 3);

    // The summary lists the new character.
    let mut payload = vec![102u8]; // GET_ACCOUNT_SUMMARY
    payload.extend_from_slice(&1234u32.to_le_bytes());
    let response = send_request(&mut web, &payload).await.expect("summary");
    assert_eq!(response[0], STATUS_OK);
    let email_length = u16::from_le_bytes([response[1], response[2]]) as usize;
    assert_eq!(&response[3..3 + email_length], b"a@b.test");

    // The public profile resolves by name.
    let mut payload = vec![103u8]; // GET_CHARACTER_PROFILE
    push_string(&mut payload, "Aldo");
    let response = send_request(&mut web, &payload).await.expect("profile");
    assert_eq!(response[0], STATUS_OK);
    let name_length = u16::from_le_bytes([response[1], response[2]]) as usize;
    assert_eq!(&response[3..3 + name_length], b"Aldo");

    // An unknown profile is a domain error.
    let mut payload = vec![103u8];
    push_string(&mut payload, "Nobody");
    let response = send_request(&mut web, &payload).await.expect("missing profile");
    assert_eq!(response[0], STATUS_ERROR);
    assert_eq!(response[1], 1);

    fixture.server.shutdown().await;
}
