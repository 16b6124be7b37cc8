//! The world heartbeat: CREATE_PLAYERLIST replaces the online set
//! atomically and tracks the online record high-water mark.

mod common;

use common::*;
use tokio::net::TcpStream;

fn playerlist_payload(characters: &[(&str, u16, &str)]) -> Vec<u8> {
    let mut payload = vec![47u8]; // CREATE_PLAYERLIST
    payload.extend_from_slice(&(characters.len() as u16).to_le_bytes());
    for (name, level, profession) in characters {
        push_string(&mut payload, name);
        payload.extend_from_slice(&level.to_le_bytes());
        push_string(&mut payload, profession);
    }
    payload
}

#[tokio::test]
async fn playerlist_replaces_and_tracks_the_record() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");

    let mut stream = TcpStream::connect(fixture.addr()).await.unwrap();
    let response = login_game_world(&mut stream, PASSWORD, "WorldOne")
        .await
        .expect("login");
    assert_eq!(response, vec![STATUS_OK]);

    // Three characters online: new record.
    let payload = playerlist_payload(&[
        ("Aldo", 10, "Knight"),
        ("Berta", 22, "Druid"),
        ("Carl", 31, "Paladin"),
    ]);
    let response = send_request(&mut stream, &payload).await.expect("response");
    assert_eq!(response[0], STATUS_OK);
    assert_eq!(response[1], 1, "first heartbeat sets a new record");
    assert_eq!(fixture.count_rows("OnlineCharacters", 7), 3);

    // An empty heartbeat clears the list and is no record.
    let payload = playerlist_payload(&[]);
    let response = send_request(&mut stream, &payload).await.expect("response");
    assert_eq!(response[0], STATUS_OK);
    assert_eq!(response[1], 0, "empty list is never a record");
    assert_eq!(fixture.count_rows("OnlineCharacters", 7), 0);

    // Two characters: fewer than the standing record of three.
    let payload = playerlist_payload(&[("Aldo", 10, "Knight"), ("Berta", 22, "Druid")]);
    let response = send_request(&mut stream, &payload).await.expect("response");
    assert_eq!(response[0], STATUS_OK);
    assert_eq!(response[1], 0, "two online does not beat a record of three");
    assert_eq!(fixture.count_rows("OnlineCharacters", 7), 2);

    fixture.server.shutdown().await;
}

#[tokio::test]
async fn online_list_is_visible_to_the_web_role() {
    let fixture = TestServer::start().await;
    fixture.seed_world(7, "WorldOne");

    let mut game = TcpStream::connect(fixture.addr()).await.unwrap();
    login_game_world(&mut game, PASSWORD, "WorldOne")
        .await
        .expect("login");
    let payload = playerlist_payload(&[("Aldo", 10, "Knight")]);
    let response = send_request(&mut game, &payload).await.expect("heartbeat");
    assert_eq!(response[0], STATUS_OK);

    let mut web = TcpStream::connect(fixture.addr()).await.unwrap();
    login_web(&mut web, PASSWORD).await.expect("web login");

    let mut payload = vec![151u8]; // GET_ONLINE_CHARACTERS
    push_string(&mut payload, "WorldOne");
    let response = send_request(&mut web, &payload).await.expect("online list");
    assert_eq!(response[0], STATUS_OK);
    let count = u16::from_le_bytes([response[1], response[2]]);
    assert_eq!(count, 1);
    // First entry: string name follows the count.
    let name_length = u16::from_le_bytes([response[3], response[4]]) as usize;
    assert_eq!(&response[5..5 + name_length], b"Aldo");

    fixture.server.shutdown().await;
}
