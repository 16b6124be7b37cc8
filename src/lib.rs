/*!
 * Query Manager - the game's authoritative data store front-end
 *
 * This crate implements a loopback-only TCP service that accepts
 * length-framed binary requests from trusted local clients (game worlds,
 * the login server, the web front-end), dispatches them to a pool of
 * workers that execute them against a relational database, and returns
 * length-framed binary responses. SQLite, PostgreSQL and MySQL backends
 * are supported behind a single session interface.
 *
 * # Architecture
 *
 * - `server` owns the listener and one task per connection; a connection
 *   holds at most one in-flight query, which keeps responses ordered.
 * - `query` carries the request/response object through a bounded queue
 *   to the worker pool; each worker owns its own database session.
 * - `db` is the uniform adapter over the concrete backends, including
 *   per-session prepared-statement caching and the reconnect checkpoint.
 * - `store` holds the typed accessors for the business tables.
 *
 * # Example
 *
 * ```rust,no_run
 * use query_manager::config::Config;
 * use query_manager::server::QueryManagerServer;
 *
 * async fn run() -> Result<(), query_manager::QueryManagerError> {
 *     let config = Config::load("config.toml")?;
 *     let server = QueryManagerServer::start(config).await?;
 *     server.run_until_shutdown().await
 * }
 * ```
 */

#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod hostcache;
pub mod query;
pub mod results;
pub mod server;
pub mod statement_cache;
pub mod store;
pub mod transaction;
pub mod types;

// Re-export everything that should be part of the public API
pub mod prelude {
    //! Convenient imports for common functionality.

    pub use crate::codec::{ReadBuffer, WriteBuffer};
    pub use crate::config::Config;
    pub use crate::db::DatabaseSession;
    pub use crate::error::QueryManagerError;
    pub use crate::query::{Query, QueryKind, QueryStatus};
    pub use crate::results::{DbRow, ResultSet};
    pub use crate::server::QueryManagerServer;
    pub use crate::types::{DatabaseType, RowValues};
}

pub use error::QueryManagerError;
pub use types::{DatabaseType, RowValues};
