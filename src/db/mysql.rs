//! MySQL session.
//!
//! Mirrors the PostgreSQL session: one `mysql_async` connection per
//! worker with the session-scoped prepared statements held in the LRU
//! [`StatementCache`]. MySQL lacks `RETURNING`, so generated keys come
//! from `last_insert_id` instead.

use chrono::NaiveDateTime;
use mysql_async::consts::{ColumnFlags, ColumnType};
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder, Row, Statement, Value};
use tracing::{error, warn};

use crate::config::MysqlConfig;
use crate::error::QueryManagerError;
use crate::results::ResultSet;
use crate::statement_cache::{CacheSlot, StatementCache};
use crate::types::RowValues;

pub struct MysqlSession {
    conn: Conn,
    cache: StatementCache<Statement>,
    opts: Opts,
}

impl MysqlSession {
    /// Connect and validate the schema version.
    ///
    /// # Errors
    /// Fails when the server is unreachable or `SchemaInfo` does not
    /// carry the supported VERSION row.
    pub async fn open(config: &MysqlConfig) -> Result<Self, QueryManagerError> {
        let opts = build_opts(config);
        let conn = Conn::new(opts.clone()).await?;
        let mut session = Self {
            conn,
            cache: StatementCache::new(config.max_cached_statements),
            opts,
        };
        session.check_schema().await?;
        Ok(session)
    }

    async fn check_schema(&mut self) -> Result<(), QueryManagerError> {
        let version: Option<String> = self
            .conn
            .query_first("SELECT Value FROM SchemaInfo WHERE Key = 'VERSION'")
            .await
            .map_err(|e| {
                QueryManagerError::SchemaError(format!("failed to read SchemaInfo: {e}"))
            })?;
        match version.as_deref() {
            Some(super::SCHEMA_VERSION) => Ok(()),
            Some(v) => Err(QueryManagerError::SchemaError(format!(
                "unsupported schema version {v} (expected {})",
                super::SCHEMA_VERSION
            ))),
            None => Err(QueryManagerError::SchemaError(
                "SchemaInfo has no VERSION row".into(),
            )),
        }
    }

    /// Pre-flight health check; reconnects a broken session, dropping
    /// the statement cache with it.
    pub async fn checkpoint(&mut self) -> bool {
        if self.conn.ping().await.is_ok() {
            return true;
        }

        warn!("database connection lost, reconnecting");
        self.cache.clear();
        match Conn::new(self.opts.clone()).await {
            Ok(conn) => {
                self.conn = conn;
                true
            }
            Err(e) => {
                error!("failed to reconnect: {e}");
                false
            }
        }
    }

    /// Close cached statements server-side, then disconnect.
    pub async fn close(mut self) {
        for statement in self.cache.clear() {
            if let Err(e) = self.conn.close(statement).await {
                warn!("failed to close prepared statement: {e}");
                break;
            }
        }
        if let Err(e) = self.conn.disconnect().await {
            warn!("failed to disconnect: {e}");
        }
    }

    async fn prepare(&mut self, sql: &str) -> Result<Statement, QueryManagerError> {
        match self.cache.lookup(sql) {
            CacheSlot::Hit(index) => Ok(self
                .cache
                .handle(index)
                .cloned()
                .expect("hit slot holds a statement")),
            CacheSlot::Miss { evict } => {
                let statement = self.conn.prep(sql).await?;
                if let Some(evicted) = self.cache.store(evict, sql, statement.clone()) {
                    if let Err(e) = self.conn.close(evicted).await {
                        warn!("failed to close evicted statement: {e}");
                    }
                }
                Ok(statement)
            }
        }
    }

    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), QueryManagerError> {
        self.conn.query_drop(sql).await?;
        Ok(())
    }

    pub async fn execute_select(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, QueryManagerError> {
        let statement = self.prepare(sql).await?;
        let rows: Vec<Row> = self.conn.exec(&statement, convert_params(params)).await?;
        Ok(build_result_set(&rows))
    }

    pub async fn execute_dml(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<u64, QueryManagerError> {
        let statement = self.prepare(sql).await?;
        self.conn
            .exec_drop(&statement, convert_params(params))
            .await?;
        Ok(self.conn.affected_rows())
    }

    /// Execute an INSERT and return the generated key.
    pub async fn execute_insert(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<i64, QueryManagerError> {
        self.execute_dml(sql, params).await?;
        self.conn
            .last_insert_id()
            .map(|id| id as i64)
            .ok_or_else(|| {
                QueryManagerError::ExecutionError("INSERT produced no generated key".into())
            })
    }
}

fn build_opts(config: &MysqlConfig) -> Opts {
    let mut builder = OptsBuilder::default()
        .user(Some(config.user.clone()))
        .pass(Some(config.password.clone()))
        .db_name(Some(config.dbname.clone()));
    if config.unix_socket.is_empty() {
        builder = builder
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port);
    } else {
        builder = builder.socket(Some(config.unix_socket.clone()));
    }
    builder.into()
}

fn convert_params(params: &[RowValues]) -> Vec<Value> {
    params
        .iter()
        .map(|value| match value {
            RowValues::Int(i) => Value::Int(*i),
            RowValues::Float(f) => Value::Double(*f),
            RowValues::Text(s) => Value::Bytes(s.clone().into_bytes()),
            RowValues::Bool(b) => Value::Int(i64::from(*b)),
            RowValues::Timestamp(dt) => Value::Bytes(
                dt.format("%Y-%m-%d %H:%M:%S").to_string().into_bytes(),
            ),
            RowValues::Null => Value::NULL,
            RowValues::Blob(bytes) => Value::Bytes(bytes.clone()),
        })
        .collect()
}

fn build_result_set(rows: &[Row]) -> ResultSet {
    let mut result_set = ResultSet::with_capacity(rows.len());
    let Some(first) = rows.first() else {
        return result_set;
    };

    let columns = first.columns();
    let column_names: Vec<String> = columns.iter().map(|c| c.name_str().into_owned()).collect();
    let column_count = column_names.len();
    result_set.set_column_names(std::sync::Arc::new(column_names));

    for row in rows {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(extract_value(row, idx));
        }
        result_set.add_row_values(values);
    }

    result_set
}

/// Extract one column as a backend-neutral value. The text protocol
/// delivers most things as bytes; the column type decides whether those
/// bytes are text or a blob.
fn extract_value(row: &Row, idx: usize) -> RowValues {
    let Some(value) = row.as_ref(idx) else {
        error!("column index {idx} out of range");
        return RowValues::Null;
    };

    match value {
        Value::NULL => RowValues::Null,
        Value::Int(i) => RowValues::Int(*i),
        Value::UInt(u) => {
            let narrowed = i64::try_from(*u).unwrap_or_else(|_| {
                warn!("clamping out-of-range unsigned column value {u}");
                i64::MAX
            });
            RowValues::Int(narrowed)
        }
        Value::Float(f) => RowValues::Float(f64::from(*f)),
        Value::Double(f) => RowValues::Float(*f),
        Value::Date(year, month, day, hour, minute, second, _micros) => {
            let text = format!(
                "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
            );
            match NaiveDateTime::parse_from_str(&text, "%Y-%m-%d %H:%M:%S") {
                Ok(dt) => RowValues::Timestamp(dt),
                Err(_) => RowValues::Text(text),
            }
        }
        Value::Time(negative, days, hours, minutes, seconds, _micros) => {
            let mut total = i64::from(*days) * 86_400
                + i64::from(*hours) * 3_600
                + i64::from(*minutes) * 60
                + i64::from(*seconds);
            if *negative {
                total = -total;
            }
            RowValues::Int(total)
        }
        Value::Bytes(bytes) => {
            let is_binary = row
                .columns()
                .get(idx)
                .map(|col| {
                    col.flags().contains(ColumnFlags::BINARY_FLAG)
                        && matches!(
                            col.column_type(),
                            ColumnType::MYSQL_TYPE_BLOB
                                | ColumnType::MYSQL_TYPE_TINY_BLOB
                                | ColumnType::MYSQL_TYPE_MEDIUM_BLOB
                                | ColumnType::MYSQL_TYPE_LONG_BLOB
                        )
                })
                .unwrap_or(false);
            if is_binary {
                RowValues::Blob(bytes.clone())
            } else {
                RowValues::Text(String::from_utf8_lossy(bytes).into_owned())
            }
        }
    }
}
