//! Shared scaffolding for the end-to-end tests: a running server over a
//! throwaway SQLite database and a minimal wire-protocol client.
#![allow(dead_code)]

use std::net::SocketAddr;

use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use query_manager::config::Config;
use query_manager::server::QueryManagerServer;

pub const PASSWORD: &str = "correct-password";

pub struct TestServer {
    pub server: QueryManagerServer,
    pub db_path: std::path::PathBuf,
    _dir: TempDir,
}

impl TestServer {
    pub async fn start() -> TestServer {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("game.db");

        let mut config = Config::default();
        config.query_manager_port = 0; // ephemeral
        config.query_manager_password = PASSWORD.to_string();
        config.max_connections = 8;
        config.database.sqlite.file = db_path.display().to_string();
        config.database.sqlite.schema_dir = dir.path().join("sqlite").display().to_string();

        let server = QueryManagerServer::start(config).await.expect("server start");
        TestServer {
            server,
            db_path,
            _dir: dir,
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn seed_world(&self, world_id: i32, name: &str) {
        let conn = rusqlite::Connection::open(&self.db_path).expect("open db");
        conn.execute(
            "INSERT INTO Worlds (WorldID, Name, Host, Port) VALUES (?1, ?2, '127.0.0.1', 7171)",
            rusqlite::params![world_id, name],
        )
        .expect("seed world");
    }

    pub fn count_rows(&self, table: &str, world_id: i32) -> i64 {
        let conn = rusqlite::Connection::open(&self.db_path).expect("open db");
        conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE WorldID = ?1"),
            [world_id],
            |row| row.get(0),
        )
        .expect("count rows")
    }
}

pub fn push_string(buffer: &mut Vec<u8>, value: &str) {
    assert!(value.len() < 0xFFFF);
    buffer.extend_from_slice(&(value.len() as u16).to_le_bytes());
    buffer.extend_from_slice(value.as_bytes());
}

/// Frame a payload with the short length header.
pub fn frame(payload: &[u8]) -> Vec<u8> {
    assert!(payload.len() < 0xFFFF);
    let mut framed = Vec::with_capacity(payload.len() + 2);
    framed.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Write one request frame and read back one response payload (status
/// byte included). `None` when the server closed the connection
/// instead.
pub async fn send_request(stream: &mut TcpStream, payload: &[u8]) -> Option<Vec<u8>> {
    stream.write_all(&frame(payload)).await.ok()?;
    read_response(stream).await
}

pub async fn read_response(stream: &mut TcpStream) -> Option<Vec<u8>> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await.ok()?;
    let short_length = u16::from_le_bytes(header);

    let length = if short_length == 0xFFFF {
        let mut extended = [0u8; 4];
        stream.read_exact(&mut extended).await.ok()?;
        u32::from_le_bytes(extended) as usize
    } else {
        short_length as usize
    };

    let mut payload = vec![0u8; length];
    stream.read_exact(&mut payload).await.ok()?;
    Some(payload)
}

/// LOGIN as a game world; returns the raw response payload.
pub async fn login_game_world(
    stream: &mut TcpStream,
    password: &str,
    world: &str,
) -> Option<Vec<u8>> {
    let mut payload = vec![0u8, 1u8]; // LOGIN, application type GAME
    push_string(&mut payload, password);
    push_string(&mut payload, world);
    send_request(stream, &payload).await
}

/// LOGIN as the web front-end.
pub async fn login_web(stream: &mut TcpStream, password: &str) -> Option<Vec<u8>> {
    let mut payload = vec![0u8, 3u8]; // LOGIN, application type WEB
    push_string(&mut payload, password);
    send_request(stream, &payload).await
}

pub const STATUS_OK: u8 = 0;
pub const STATUS_ERROR: u8 = 1;
pub const STATUS_FAILED: u8 = 3;
