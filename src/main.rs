use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use query_manager::config::Config;
use query_manager::server::QueryManagerServer;

#[derive(Debug, Parser)]
#[command(name = "query-manager", version, about = "Query manager for the game data store")]
struct Args {
    /// Path to the configuration file.
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!("query manager starting");
    info!("backend:                  {}", config.database.backend);
    info!("port:                     {}", config.query_manager_port);
    info!("worker threads:           {}", config.query_worker_threads);
    info!("query buffer size:        {}", config.query_buffer_size);
    info!("query max attempts:       {}", config.query_max_attempts);
    info!("max connections:          {}", config.max_connections);
    info!(
        "max connection idle time: {}s",
        config.max_connection_idle_time_secs
    );

    let server = match QueryManagerServer::start(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("failed to start: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("running");
    match server.run_until_shutdown().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
