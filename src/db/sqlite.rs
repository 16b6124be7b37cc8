//! SQLite session.
//!
//! `rusqlite` is synchronous, so each session owns a dedicated OS thread
//! that holds the connection and drains a command channel; the async
//! side awaits a oneshot per command. Statement reuse goes through
//! `prepare_cached` with the configured capacity. A fresh database file
//! is initialised from `schema.sql` (or the embedded copy) and upgraded
//! through `upgrade-<n>.sql` files, all inside transactions, with the
//! engine's `application_id`/`user_version` pragmas guarding against
//! foreign files.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use rusqlite::types::Value;
use rusqlite::{Connection, DatabaseName, OpenFlags};
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::config::SqliteConfig;
use crate::error::QueryManagerError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// "GQDB" in ASCII, stamped into the file's `application_id` pragma.
const APPLICATION_ID: i32 = 0x4751_4442;

const EMBEDDED_SCHEMA: &str = include_str!("../../sql/schema.sql");

enum Command {
    Batch {
        sql: String,
        respond: oneshot::Sender<Result<(), QueryManagerError>>,
    },
    Select {
        sql: String,
        params: Vec<Value>,
        respond: oneshot::Sender<Result<ResultSet, QueryManagerError>>,
    },
    Dml {
        sql: String,
        params: Vec<Value>,
        respond: oneshot::Sender<Result<u64, QueryManagerError>>,
    },
    Insert {
        sql: String,
        params: Vec<Value>,
        respond: oneshot::Sender<Result<i64, QueryManagerError>>,
    },
    Shutdown,
}

pub struct SqliteSession {
    sender: Sender<Command>,
}

impl SqliteSession {
    /// Open the database file, initialising or upgrading the schema as
    /// needed, and spawn the session thread.
    ///
    /// # Errors
    /// Fails when the file cannot be opened read-write or the schema
    /// check fails.
    pub async fn open(config: &SqliteConfig) -> Result<Self, QueryManagerError> {
        let (sender, receiver) = mpsc::channel::<Command>();
        let (ready_tx, ready_rx) = oneshot::channel();
        let config = config.clone();

        thread::Builder::new()
            .name("sqlite-session".to_string())
            .spawn(move || match open_connection(&config) {
                Ok(conn) => {
                    if ready_tx.send(Ok(())).is_ok() {
                        run_session(&conn, &receiver);
                    }
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| {
                QueryManagerError::ConnectionError(format!(
                    "failed to spawn SQLite session thread: {e}"
                ))
            })?;

        ready_rx
            .await
            .map_err(|_| QueryManagerError::ConnectionError("SQLite session thread died".into()))?
            .map(|()| Self { sender })
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, QueryManagerError>>) -> Command,
    ) -> Result<T, QueryManagerError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .map_err(|_| QueryManagerError::ConnectionError("SQLite session closed".into()))?;
        rx.await
            .map_err(|_| QueryManagerError::ConnectionError("SQLite session dropped reply".into()))?
    }

    pub async fn execute_batch(&self, sql: &str) -> Result<(), QueryManagerError> {
        let sql = sql.to_string();
        self.request(|respond| Command::Batch { sql, respond }).await
    }

    pub async fn execute_select(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, QueryManagerError> {
        let sql = sql.to_string();
        let params = convert_params(params);
        self.request(|respond| Command::Select {
            sql,
            params,
            respond,
        })
        .await
    }

    pub async fn execute_dml(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<u64, QueryManagerError> {
        let sql = sql.to_string();
        let params = convert_params(params);
        self.request(|respond| Command::Dml {
            sql,
            params,
            respond,
        })
        .await
    }

    /// Execute an INSERT and return the new row id.
    pub async fn execute_insert(
        &self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<i64, QueryManagerError> {
        let sql = sql.to_string();
        let params = convert_params(params);
        self.request(|respond| Command::Insert {
            sql,
            params,
            respond,
        })
        .await
    }

    pub fn close(&self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

impl Drop for SqliteSession {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
    }
}

fn convert_params(params: &[RowValues]) -> Vec<Value> {
    params
        .iter()
        .map(|value| match value {
            RowValues::Int(i) => Value::Integer(*i),
            RowValues::Float(f) => Value::Real(*f),
            RowValues::Text(s) => Value::Text(s.clone()),
            RowValues::Bool(b) => Value::Integer(i64::from(*b)),
            RowValues::Timestamp(dt) => Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
            RowValues::Null => Value::Null,
            RowValues::Blob(bytes) => Value::Blob(bytes.clone()),
        })
        .collect()
}

fn open_connection(config: &SqliteConfig) -> Result<Connection, QueryManagerError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_NO_MUTEX;
    let conn = Connection::open_with_flags(&config.file, flags)?;

    if conn.is_readonly(DatabaseName::Main)? {
        return Err(QueryManagerError::ConnectionError(format!(
            "database file \"{}\" opened without write permissions",
            config.file
        )));
    }

    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    conn.set_prepared_statement_cache_capacity(config.max_cached_statements);
    check_schema(&conn, Path::new(&config.schema_dir))?;
    Ok(conn)
}

fn pragma_int(conn: &Connection, name: &str) -> Result<i32, QueryManagerError> {
    let value = conn.query_row(&format!("PRAGMA {name}"), [], |row| row.get(0))?;
    Ok(value)
}

fn schema_file(schema_dir: &Path) -> PathBuf {
    schema_dir.join("schema.sql")
}

fn upgrade_file(schema_dir: &Path, version: i32) -> PathBuf {
    schema_dir.join(format!("upgrade-{version}.sql"))
}

fn init_schema(conn: &Connection, schema_dir: &Path) -> Result<(), QueryManagerError> {
    let ddl = match std::fs::read_to_string(schema_file(schema_dir)) {
        Ok(text) => text,
        Err(_) => EMBEDDED_SCHEMA.to_string(),
    };

    // NOTE: pragma assignments cannot use bound parameters, and the whole
    // initialisation must land atomically.
    conn.execute_batch("BEGIN")?;
    let result = conn
        .execute_batch(&ddl)
        .and_then(|()| conn.execute_batch(&format!("PRAGMA application_id = {APPLICATION_ID}")))
        .and_then(|()| conn.execute_batch("PRAGMA user_version = 1"));
    match result {
        Ok(()) => conn.execute_batch("COMMIT")?,
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }
    }
    Ok(())
}

fn upgrade_schema(
    conn: &Connection,
    schema_dir: &Path,
    mut version: i32,
) -> Result<i32, QueryManagerError> {
    let mut target = version;
    while upgrade_file(schema_dir, target).exists() {
        target += 1;
    }

    if version != target {
        info!("upgrading database schema from version {version} to {target}");
        conn.execute_batch("BEGIN")?;
        let result = (|| -> Result<(), QueryManagerError> {
            while version < target {
                let path = upgrade_file(schema_dir, version);
                let ddl = std::fs::read_to_string(&path).map_err(|e| {
                    QueryManagerError::SchemaError(format!(
                        "failed to read \"{}\": {e}",
                        path.display()
                    ))
                })?;
                conn.execute_batch(&ddl)?;
                version += 1;
            }
            conn.execute_batch(&format!("PRAGMA user_version = {version}"))?;
            Ok(())
        })();
        match result {
            Ok(()) => conn.execute_batch("COMMIT")?,
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                return Err(e);
            }
        }
    }

    Ok(version)
}

fn check_schema(conn: &Connection, schema_dir: &Path) -> Result<(), QueryManagerError> {
    let application_id = pragma_int(conn, "application_id")?;
    let mut user_version = pragma_int(conn, "user_version")?;

    if application_id != APPLICATION_ID {
        if application_id != 0 {
            return Err(QueryManagerError::SchemaError(format!(
                "database has unknown application id {application_id:08X} \
                 (expected {APPLICATION_ID:08X})"
            )));
        }
        if user_version != 0 {
            return Err(QueryManagerError::SchemaError(format!(
                "uninitialised database has non-zero user version {user_version}"
            )));
        }
        init_schema(conn, schema_dir)?;
        user_version = 1;
    }

    user_version = upgrade_schema(conn, schema_dir, user_version)?;
    info!("database schema version: {user_version}");

    let version: Option<String> = conn
        .query_row(
            "SELECT Value FROM SchemaInfo WHERE Key = 'VERSION'",
            [],
            |row| row.get(0),
        )
        .ok();
    match version {
        Some(v) if v == user_version.to_string() => Ok(()),
        Some(v) => Err(QueryManagerError::SchemaError(format!(
            "SchemaInfo version {v} does not match user_version {user_version}"
        ))),
        None => Err(QueryManagerError::SchemaError(
            "SchemaInfo has no VERSION row".into(),
        )),
    }
}

fn run_session(conn: &Connection, receiver: &Receiver<Command>) {
    while let Ok(command) = receiver.recv() {
        match command {
            Command::Shutdown => break,
            Command::Batch { sql, respond } => {
                let _ = respond.send(conn.execute_batch(&sql).map_err(Into::into));
            }
            Command::Select {
                sql,
                params,
                respond,
            } => {
                let _ = respond.send(run_select(conn, &sql, &params));
            }
            Command::Dml {
                sql,
                params,
                respond,
            } => {
                let _ = respond.send(run_dml(conn, &sql, &params));
            }
            Command::Insert {
                sql,
                params,
                respond,
            } => {
                let result =
                    run_dml(conn, &sql, &params).map(|_changes| conn.last_insert_rowid());
                let _ = respond.send(result);
            }
        }
    }
}

fn run_select(conn: &Connection, sql: &str, params: &[Value]) -> Result<ResultSet, QueryManagerError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> =
        params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();

    let column_names: Vec<String> = stmt
        .column_names()
        .iter()
        .map(std::string::ToString::to_string)
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(8);
    result_set.set_column_names(std::sync::Arc::new(column_names));

    let mut rows = stmt.query(&param_refs[..])?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(extract_value(row, idx)?);
        }
        result_set.add_row_values(values);
    }

    Ok(result_set)
}

fn run_dml(conn: &Connection, sql: &str, params: &[Value]) -> Result<u64, QueryManagerError> {
    let mut stmt = conn.prepare_cached(sql)?;
    let param_refs: Vec<&dyn rusqlite::ToSql> =
        params.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
    let changes = stmt.execute(&param_refs[..])?;
    Ok(changes as u64)
}

fn extract_value(row: &rusqlite::Row, idx: usize) -> Result<RowValues, QueryManagerError> {
    use rusqlite::types::ValueRef;
    match row.get_ref(idx) {
        Err(e) => {
            error!("failed to read column {idx}: {e}");
            Ok(RowValues::Null)
        }
        Ok(ValueRef::Null) => Ok(RowValues::Null),
        Ok(ValueRef::Integer(i)) => Ok(RowValues::Int(i)),
        Ok(ValueRef::Real(f)) => Ok(RowValues::Float(f)),
        Ok(ValueRef::Text(bytes)) => Ok(RowValues::Text(
            String::from_utf8_lossy(bytes).into_owned(),
        )),
        Ok(ValueRef::Blob(bytes)) => Ok(RowValues::Blob(bytes.to_vec())),
    }
}
