//! Uniform database adapter.
//!
//! Handlers and the store see one session type with the same operations
//! regardless of backend. The store writes its SQL once, in PostgreSQL
//! style; [`rewrite_for_dialect`] adapts it mechanically for the other
//! backends before execution. Each worker owns exactly one session, so
//! nothing here is shared or locked.

pub mod dialect;

#[cfg(feature = "mysql")]
pub mod mysql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

use chrono::Utc;
use tracing::warn;

pub use dialect::{SqlDialect, rewrite_for_dialect};

use crate::config::Config;
use crate::error::QueryManagerError;
use crate::results::ResultSet;
use crate::types::{DatabaseType, RowValues};

/// Schema version every backend must carry in `SchemaInfo`.
pub const SCHEMA_VERSION: &str = "1";

enum Backend {
    #[cfg(feature = "sqlite")]
    Sqlite(sqlite::SqliteSession),
    #[cfg(feature = "postgres")]
    Postgres(postgres::PostgresSession),
    #[cfg(feature = "mysql")]
    Mysql(mysql::MysqlSession),
}

pub struct DatabaseSession {
    backend: Backend,
    dialect: SqlDialect,
    in_transaction: bool,
    last_changes: u64,
}

impl DatabaseSession {
    /// Connect to the configured backend and validate its schema.
    ///
    /// # Errors
    /// Fails when the backend is unreachable or the schema check fails.
    pub async fn open(config: &Config) -> Result<Self, QueryManagerError> {
        #[allow(unreachable_patterns)]
        let (backend, dialect) = match config.database.backend {
            #[cfg(feature = "sqlite")]
            DatabaseType::Sqlite => (
                Backend::Sqlite(sqlite::SqliteSession::open(&config.database.sqlite).await?),
                SqlDialect::Sqlite,
            ),
            #[cfg(feature = "postgres")]
            DatabaseType::Postgres => (
                Backend::Postgres(postgres::PostgresSession::open(&config.database.postgres).await?),
                SqlDialect::Postgres,
            ),
            #[cfg(feature = "mysql")]
            DatabaseType::Mysql => (
                Backend::Mysql(mysql::MysqlSession::open(&config.database.mysql).await?),
                SqlDialect::Mysql,
            ),
            other => {
                return Err(QueryManagerError::ConfigError(format!(
                    "backend {other} was not compiled in"
                )));
            }
        };

        Ok(Self {
            backend,
            dialect,
            in_transaction: false,
            last_changes: 0,
        })
    }

    #[must_use]
    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Worker count the backend can sustain. SQLite serialises writers
    /// through the file, so one worker is all it gets.
    #[must_use]
    pub fn max_concurrency(&self) -> usize {
        match self.backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(_) => 1,
            #[cfg(feature = "postgres")]
            Backend::Postgres(_) => usize::MAX,
            #[cfg(feature = "mysql")]
            Backend::Mysql(_) => usize::MAX,
        }
    }

    /// Affected row count of the last write.
    #[must_use]
    pub fn changes(&self) -> u64 {
        self.last_changes
    }

    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Pre-flight health check run before every query attempt. A broken
    /// server session is reconnected (dropping its statement cache);
    /// returns whether the session is usable.
    pub async fn checkpoint(&mut self) -> bool {
        let usable = match &mut self.backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(_) => true,
            #[cfg(feature = "postgres")]
            Backend::Postgres(session) => session.checkpoint().await,
            #[cfg(feature = "mysql")]
            Backend::Mysql(session) => session.checkpoint().await,
        };
        if !usable {
            self.in_transaction = false;
        }
        usable
    }

    pub async fn close(self) {
        match self.backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(session) => session.close(),
            #[cfg(feature = "postgres")]
            Backend::Postgres(session) => session.close().await,
            #[cfg(feature = "mysql")]
            Backend::Mysql(session) => session.close().await,
        }
    }

    /// Run a statement batch verbatim (no dialect rewrite, no parameters).
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), QueryManagerError> {
        match &mut self.backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(session) => session.execute_batch(sql).await,
            #[cfg(feature = "postgres")]
            Backend::Postgres(session) => session.execute_batch(sql).await,
            #[cfg(feature = "mysql")]
            Backend::Mysql(session) => session.execute_batch(sql).await,
        }
    }

    pub async fn execute_select(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, QueryManagerError> {
        let sql = rewrite_for_dialect(sql, self.dialect);
        match &mut self.backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(session) => session.execute_select(&sql, params).await,
            #[cfg(feature = "postgres")]
            Backend::Postgres(session) => session.execute_select(&sql, params).await,
            #[cfg(feature = "mysql")]
            Backend::Mysql(session) => session.execute_select(&sql, params).await,
        }
    }

    pub async fn execute_dml(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<u64, QueryManagerError> {
        let sql = rewrite_for_dialect(sql, self.dialect);
        let changes = match &mut self.backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(session) => session.execute_dml(&sql, params).await?,
            #[cfg(feature = "postgres")]
            Backend::Postgres(session) => session.execute_dml(&sql, params).await?,
            #[cfg(feature = "mysql")]
            Backend::Mysql(session) => session.execute_dml(&sql, params).await?,
        };
        self.last_changes = changes;
        Ok(changes)
    }

    /// Execute an INSERT and return the generated key named by
    /// `returning_column` (used verbatim by PostgreSQL, ignored by the
    /// backends that report the last insert id out-of-band).
    pub async fn execute_insert(
        &mut self,
        sql: &str,
        params: &[RowValues],
        returning_column: &str,
    ) -> Result<i64, QueryManagerError> {
        let sql = rewrite_for_dialect(sql, self.dialect);
        match &mut self.backend {
            #[cfg(feature = "sqlite")]
            Backend::Sqlite(session) => session.execute_insert(&sql, params).await,
            #[cfg(feature = "postgres")]
            Backend::Postgres(session) => {
                session.execute_insert(&sql, params, returning_column).await
            }
            #[cfg(feature = "mysql")]
            Backend::Mysql(session) => {
                let _ = returning_column;
                session.execute_insert(&sql, params).await
            }
        }
    }

    pub async fn begin(&mut self) -> Result<(), QueryManagerError> {
        if self.in_transaction {
            return Err(QueryManagerError::ExecutionError(
                "transaction already in progress".into(),
            ));
        }
        self.execute_batch("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<(), QueryManagerError> {
        if !self.in_transaction {
            return Err(QueryManagerError::ExecutionError(
                "no transaction to commit".into(),
            ));
        }
        self.in_transaction = false;
        self.execute_batch("COMMIT").await
    }

    pub async fn rollback(&mut self) -> Result<(), QueryManagerError> {
        if self.in_transaction {
            self.in_transaction = false;
            self.execute_batch("ROLLBACK").await?;
        }
        Ok(())
    }
}

/// Current time as Unix seconds, the unit every persisted timestamp uses.
#[must_use]
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Narrow a Unix timestamp to the 32-bit wire form, clamping with a
/// warning instead of wrapping.
#[must_use]
pub fn clamp_unix_to_u32(seconds: i64) -> u32 {
    u32::try_from(seconds).unwrap_or_else(|_| {
        warn!("clamping out-of-range timestamp {seconds}");
        if seconds < 0 { 0 } else { u32::MAX }
    })
}

/// Parse the ISO-ish interval text form ("2 days 03:04:05", "1 mon",
/// "00:30:00") into seconds. The binary form is handled by the backend.
#[must_use]
pub fn parse_interval_text(text: &str) -> Option<i64> {
    let mut seconds: i64 = 0;
    let mut matched = false;
    let mut tokens = text.split_whitespace().peekable();

    while let Some(token) = tokens.next() {
        if let Ok(amount) = token.parse::<i64>() {
            let unit = tokens.next()?;
            let factor = match unit.trim_end_matches('s') {
                "year" => 365 * 86_400,
                "mon" | "month" => 30 * 86_400,
                "day" => 86_400,
                "hour" => 3_600,
                "min" | "minute" => 60,
                "sec" | "second" => 1,
                _ => return None,
            };
            seconds += amount * factor;
            matched = true;
        } else if token.contains(':') {
            let mut parts = token.split(':');
            let hours: i64 = parts.next()?.parse().ok()?;
            let minutes: i64 = parts.next()?.parse().ok()?;
            let secs: f64 = parts.next().map_or(Ok(0.0), str::parse).ok()?;
            let signum = if hours < 0 { -1 } else { 1 };
            seconds += hours * 3_600 + signum * (minutes * 60 + secs as i64);
            matched = true;
        } else {
            return None;
        }
    }

    matched.then_some(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_text_forms_parse() {
        assert_eq!(parse_interval_text("2 days 03:04:05"), Some(2 * 86_400 + 11_045));
        assert_eq!(parse_interval_text("1 mon"), Some(30 * 86_400));
        assert_eq!(parse_interval_text("00:30:00"), Some(1_800));
        assert_eq!(parse_interval_text("3 days"), Some(3 * 86_400));
        assert_eq!(parse_interval_text("garbage"), None);
        assert_eq!(parse_interval_text(""), None);
    }

    #[test]
    fn timestamp_clamping_is_monotone() {
        assert_eq!(clamp_unix_to_u32(-5), 0);
        assert_eq!(clamp_unix_to_u32(1_700_000_000), 1_700_000_000);
        assert_eq!(clamp_unix_to_u32(i64::MAX), u32::MAX);
    }
}
