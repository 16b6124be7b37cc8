use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::QueryManagerError;
use crate::types::DatabaseType;

/// Runtime configuration, loaded from a TOML file.
///
/// Every field has a default so a missing file section only overrides what
/// it names. Defaults match the values the service shipped with.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Host cache capacity.
    pub max_cached_host_names: usize,
    /// Seconds before a cached host resolution must be refreshed.
    pub host_name_expire_time_secs: u64,

    /// TCP port the loopback listener binds to.
    pub query_manager_port: u16,
    /// Shared password all clients authenticate with.
    pub query_manager_password: String,
    /// Worker count, clamped by the backend's concurrency limit.
    pub query_worker_threads: usize,
    /// Upper bound for a request or response payload, in bytes.
    pub query_buffer_size: usize,
    /// How many times a worker retries a query left pending.
    pub query_max_attempts: u32,
    /// Connection slot count; excess connections are refused.
    pub max_connections: usize,
    /// Seconds of inactivity before a connection is dropped. 0 disables.
    pub max_connection_idle_time_secs: u64,

    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_cached_host_names: 100,
            host_name_expire_time_secs: 30 * 60,
            query_manager_port: 7174,
            query_manager_password: String::new(),
            query_worker_threads: 1,
            query_buffer_size: 1024 * 1024,
            query_max_attempts: 3,
            max_connections: 25,
            max_connection_idle_time_secs: 60,
            database: DatabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Which backend the workers connect to.
    pub backend: DatabaseType,
    pub sqlite: SqliteConfig,
    pub postgres: PostgresConfig,
    pub mysql: MysqlConfig,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend: DatabaseType::Sqlite,
            sqlite: SqliteConfig::default(),
            postgres: PostgresConfig::default(),
            mysql: MysqlConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SqliteConfig {
    pub file: String,
    pub max_cached_statements: usize,
    /// Directory holding `schema.sql` and `upgrade-<n>.sql` files. The
    /// embedded schema is used when the directory has no `schema.sql`.
    pub schema_dir: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        SqliteConfig {
            file: "game.db".to_string(),
            max_cached_statements: 100,
            schema_dir: "sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    pub connect_timeout_secs: u64,
    pub application_name: String,
    /// Passed through to the connector (`disable`, `prefer`, `require`).
    pub ssl_mode: String,
    pub max_cached_statements: usize,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        PostgresConfig {
            host: "localhost".to_string(),
            port: 5432,
            dbname: "game".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            connect_timeout_secs: 10,
            application_name: "query-manager".to_string(),
            ssl_mode: "prefer".to_string(),
            max_cached_statements: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
    /// When set, connect over the unix socket instead of TCP.
    pub unix_socket: String,
    pub max_cached_statements: usize,
}

impl Default for MysqlConfig {
    fn default() -> Self {
        MysqlConfig {
            host: "localhost".to_string(),
            port: 3306,
            dbname: "game".to_string(),
            user: "root".to_string(),
            password: String::new(),
            unix_socket: String::new(),
            max_cached_statements: 100,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults for
    /// anything the file does not mention.
    ///
    /// # Errors
    /// Returns `QueryManagerError::ConfigError` if the file cannot be read
    /// or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, QueryManagerError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            QueryManagerError::ConfigError(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        let config: Config = toml::from_str(&text).map_err(|e| {
            QueryManagerError::ConfigError(format!(
                "failed to parse config file {}: {e}",
                path.display()
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Sanity-check values that would otherwise fail in confusing places.
    ///
    /// # Errors
    /// Returns `QueryManagerError::ConfigError` for out-of-range values.
    pub fn validate(&self) -> Result<(), QueryManagerError> {
        if self.max_connections == 0 {
            return Err(QueryManagerError::ConfigError(
                "max_connections must be at least 1".into(),
            ));
        }
        if self.query_worker_threads == 0 {
            return Err(QueryManagerError::ConfigError(
                "query_worker_threads must be at least 1".into(),
            ));
        }
        if self.query_buffer_size < 8 {
            return Err(QueryManagerError::ConfigError(
                "query_buffer_size is too small to hold a frame".into(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn host_name_expire_time(&self) -> Duration {
        Duration::from_secs(self.host_name_expire_time_secs)
    }

    /// `None` when idle reaping is disabled.
    #[must_use]
    pub fn max_connection_idle_time(&self) -> Option<Duration> {
        if self.max_connection_idle_time_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.max_connection_idle_time_secs))
        }
    }

    /// Queue capacity. Connections could be reset while their queries are
    /// still queued, so the bound is twice the connection slot count.
    #[must_use]
    pub fn queue_capacity(&self) -> usize {
        2 * self.max_connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.query_manager_port, 7174);
        assert_eq!(config.queue_capacity(), 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config: Config = toml::from_str(
            r#"
            query_manager_password = "secret"
            max_connections = 4

            [database]
            backend = "sqlite"

            [database.sqlite]
            file = ":memory:"
            "#,
        )
        .unwrap();
        assert_eq!(config.query_manager_password, "secret");
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.database.sqlite.file, ":memory:");
        // untouched defaults
        assert_eq!(config.query_max_attempts, 3);
        assert_eq!(config.database.sqlite.max_cached_statements, 100);
    }

    #[test]
    fn zero_idle_time_disables_reaping() {
        let mut config = Config::default();
        config.max_connection_idle_time_secs = 0;
        assert!(config.max_connection_idle_time().is_none());
    }
}
