//! PostgreSQL session.
//!
//! One `tokio_postgres` client per worker, with a driver task pumping
//! the connection. Server-side prepared statements live in the session's
//! LRU [`StatementCache`]; parameter and result types are pinned by the
//! explicit casts the store writes into its SQL. The checkpoint probes
//! the connection and, when it broke, drops the cache and reconnects
//! with the original parameters.

use std::time::Duration;

use chrono::NaiveDateTime;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};
use tokio_postgres::{Client, NoTls, Statement};
use tracing::{error, warn};

use crate::config::PostgresConfig;
use crate::error::QueryManagerError;
use crate::results::ResultSet;
use crate::statement_cache::{CacheSlot, StatementCache};
use crate::types::RowValues;

pub struct PostgresSession {
    client: Client,
    cache: StatementCache<Statement>,
    config: PostgresConfig,
}

impl PostgresSession {
    /// Connect and validate the schema version.
    ///
    /// # Errors
    /// Fails when the server is unreachable or `SchemaInfo` does not
    /// carry the supported VERSION row.
    pub async fn open(config: &PostgresConfig) -> Result<Self, QueryManagerError> {
        let client = connect(config).await?;
        let mut session = Self {
            client,
            cache: StatementCache::new(config.max_cached_statements),
            config: config.clone(),
        };
        session.check_schema().await?;
        Ok(session)
    }

    async fn check_schema(&mut self) -> Result<(), QueryManagerError> {
        let rows = self
            .client
            .query("SELECT Value FROM SchemaInfo WHERE Key = 'VERSION'", &[])
            .await
            .map_err(|e| {
                QueryManagerError::SchemaError(format!("failed to read SchemaInfo: {e}"))
            })?;
        let version: Option<&str> = rows.first().map(|row| row.get(0));
        match version {
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

    /// Pre-flight health check. Reconnects a broken session, dropping
    /// the statement cache with it. Returns whether the session is
    /// usable.
    pub async fn checkpoint(&mut self) -> bool {
        if !self.client.is_closed() {
            return true;
        }

        warn!("database connection lost, reconnecting");
        self.cache.clear();
        match connect(&self.config).await {
            Ok(client) => {
                self.client = client;
                true
            }
            Err(e) => {
                error!("failed to reconnect: {e}");
                false
            }
        }
    }

    /// Deallocate cached statements while the session is still healthy,
    /// then drop the connection.
    pub async fn close(mut self) {
        let live = self.cache.clear();
        if !live.is_empty() && !self.client.is_closed() {
            drop(live);
            if let Err(e) = self.client.batch_execute("DEALLOCATE ALL").await {
                warn!("failed to deallocate prepared statements: {e}");
            }
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
                let statement = self.client.prepare(sql).await?;
                // The evicted handle deallocates server-side on drop.
                let _ = self.cache.store(evict, sql, statement.clone());
                Ok(statement)
            }
        }
    }

    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), QueryManagerError> {
        self.client.batch_execute(sql).await?;
        Ok(())
    }

    pub async fn execute_select(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, QueryManagerError> {
        let statement = self.prepare(sql).await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let rows = self.client.query(&statement, &param_refs[..]).await?;
        build_result_set(&statement, &rows)
    }

    pub async fn execute_dml(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<u64, QueryManagerError> {
        let statement = self.prepare(sql).await?;
        let param_refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        let changes = self.client.execute(&statement, &param_refs[..]).await?;
        Ok(changes)
    }

    /// Execute an INSERT and return the generated key named by
    /// `returning_column`.
    pub async fn execute_insert(
        &mut self,
        sql: &str,
        params: &[RowValues],
        returning_column: &str,
    ) -> Result<i64, QueryManagerError> {
        let sql = format!("{sql} RETURNING {returning_column}");
        let result = self.execute_select(&sql, params).await?;
        result
            .first()
            .and_then(|row| row.get_by_index(0))
            .and_then(RowValues::as_int)
            .ok_or_else(|| {
                QueryManagerError::ExecutionError(format!(
                    "INSERT did not return {returning_column}"
                ))
            })
    }
}

async fn connect(config: &PostgresConfig) -> Result<Client, QueryManagerError> {
    let mut pg_config = tokio_postgres::Config::new();
    pg_config
        .host(&config.host)
        .port(config.port)
        .dbname(&config.dbname)
        .user(&config.user)
        .password(&config.password)
        .application_name(&config.application_name)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .ssl_mode(parse_ssl_mode(&config.ssl_mode));

    let (client, connection) = pg_config.connect(NoTls).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("database connection task ended: {e}");
        }
    });
    Ok(client)
}

fn parse_ssl_mode(mode: &str) -> SslMode {
    match mode {
        "disable" => SslMode::Disable,
        "require" => SslMode::Require,
        _ => SslMode::Prefer,
    }
}

fn build_result_set(
    statement: &Statement,
    rows: &[tokio_postgres::Row],
) -> Result<ResultSet, QueryManagerError> {
    let column_names: Vec<String> = statement
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(std::sync::Arc::new(column_names));

    for row in rows {
        let mut values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            values.push(extract_value(row, idx));
        }
        result_set.add_row_values(values);
    }

    Ok(result_set)
}

/// Extract one column as a backend-neutral value. A column whose type
/// cannot be decoded yields the zero value with an error log; extraction
/// never aborts a whole result set.
fn extract_value(row: &tokio_postgres::Row, idx: usize) -> RowValues {
    let ty = row.columns()[idx].type_();
    let extracted: Result<RowValues, tokio_postgres::Error> = match *ty {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map_or(RowValues::Null, |v| RowValues::Int(i64::from(v)))),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Int)),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map_or(RowValues::Null, |v| RowValues::Float(f64::from(v)))),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Float)),
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Bool)),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Timestamp)),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(idx)
            .map(|v| v.map_or(RowValues::Null, |v| RowValues::Timestamp(v.naive_utc()))),
        Type::INTERVAL => row
            .try_get::<_, Option<PgInterval>>(idx)
            .map(|v| v.map_or(RowValues::Null, |v| RowValues::Int(v.total_seconds()))),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Blob)),
        Type::INET => row
            .try_get::<_, Option<std::net::IpAddr>>(idx)
            .map(|v| v.map_or(RowValues::Null, |v| RowValues::Text(v.to_string()))),
        _ => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map_or(RowValues::Null, RowValues::Text)),
    };

    match extracted {
        Ok(value) => value,
        Err(e) => {
            error!(
                "failed to extract column {} ({}): {e}",
                row.columns()[idx].name(),
                ty.name()
            );
            RowValues::Null
        }
    }
}

/// PostgreSQL interval, decoded from the binary wire form (microseconds,
/// days, months).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PgInterval {
    pub microseconds: i64,
    pub days: i32,
    pub months: i32,
}

impl PgInterval {
    /// Collapse to seconds, approximating a month as 30 days.
    #[must_use]
    pub fn total_seconds(&self) -> i64 {
        self.microseconds / 1_000_000
            + i64::from(self.days) * 86_400
            + i64::from(self.months) * 30 * 86_400
    }
}

impl<'a> FromSql<'a> for PgInterval {
    fn from_sql(
        _ty: &Type,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        if raw.len() != 16 {
            return Err("interval value is not 16 bytes".into());
        }
        let microseconds = i64::from_be_bytes(raw[0..8].try_into()?);
        let days = i32::from_be_bytes(raw[8..12].try_into()?);
        let months = i32::from_be_bytes(raw[12..16].try_into()?);
        Ok(PgInterval {
            microseconds,
            days,
            months,
        })
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::INTERVAL
    }
}

impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            RowValues::Int(i) => match *ty {
                Type::INT2 => (*i as i16).to_sql(ty, out),
                Type::INT4 => {
                    let narrow = i32::try_from(*i).unwrap_or_else(|_| {
                        warn!("clamping out-of-range parameter {i} to INT4");
                        if *i < 0 { i32::MIN } else { i32::MAX }
                    });
                    narrow.to_sql(ty, out)
                }
                _ => (*i).to_sql(ty, out),
            },
            RowValues::Float(f) => (*f).to_sql(ty, out),
            RowValues::Text(s) => s.to_sql(ty, out),
            RowValues::Bool(b) => (*b).to_sql(ty, out),
            RowValues::Timestamp(dt) => dt.to_sql(ty, out),
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::Blob(bytes) => bytes.to_sql(ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::TEXT
                | Type::VARCHAR
                | Type::CHAR
                | Type::NAME
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_binary_form_decodes() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&(90_000_000i64).to_be_bytes()); // 90 seconds
        raw.extend_from_slice(&(2i32).to_be_bytes()); // 2 days
        raw.extend_from_slice(&(1i32).to_be_bytes()); // 1 month
        let interval = PgInterval::from_sql(&Type::INTERVAL, &raw).unwrap();
        assert_eq!(interval.microseconds, 90_000_000);
        assert_eq!(interval.days, 2);
        assert_eq!(interval.months, 1);
        assert_eq!(interval.total_seconds(), 90 + 2 * 86_400 + 30 * 86_400);
    }

    #[test]
    fn interval_rejects_wrong_length() {
        assert!(PgInterval::from_sql(&Type::INTERVAL, &[0u8; 8]).is_err());
    }
}
