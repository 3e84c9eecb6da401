mod cli;
mod commands;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use rv_config::Config;
use rv_storage::Storage;
use rv_web::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    let config = Config::load()?;

    if let cli::Commands::Config(config_cmd) = &cli.command {
        return commands::config::handle(config_cmd, &config);
    }

    // Initialize storage once (creates connection pool and runs migrations)
    let db_path = cli.db.clone().or_else(|| config.database.path.clone());
    let storage = Arc::new(Storage::new(db_path).await?);

    match cli.command {
        cli::Commands::Serve {
            host,
            port,
            read_only,
        } => commands::serve::handle(storage, config, host, port, read_only).await,
        cli::Commands::Runs(runs_cmd) => {
            let state = AppState::new(storage, config, true)?;
            commands::runs::handle(runs_cmd, &state).await
        }
        cli::Commands::Search(args) => {
            let state = AppState::new(storage, config, true)?;
            commands::search::handle(args, &state).await
        }
        cli::Commands::Failed(failed_cmd) => {
            let state = AppState::new(storage, config, false)?;
            commands::failed::handle(failed_cmd, &state).await
        }
        cli::Commands::Instruments(instrument_cmd) => {
            let state = AppState::new(storage, config, false)?;
            commands::instruments::handle(instrument_cmd, &state).await
        }
        cli::Commands::Config(_) => Ok(()),
    }
}
