//! Parley CLI entry point.

use clap::Parser;

use parley::cli::{self, Cli, Commands};
use parley::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match cli::load_config(&cli) {
        Ok(config) => config,
        Err(err) => cli::handle_error(err),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => cli::handle_error(err),
    };

    let result = match cli.command {
        Commands::Serve { host, port } => cli::commands::serve::execute(config, host, port).await,
        Commands::Migrate => cli::commands::migrate::execute(config).await,
    };

    if let Err(err) = result {
        cli::handle_error(err);
    }
}
