//! Autoheal CLI entry point.

use clap::Parser;

use autoheal::cli::{self, context, Cli};
use autoheal::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    // Logging follows the loaded config when it is available, otherwise defaults.
    let log_config = context::load_config(cli.config.as_deref())
        .map(|config| LogConfig::from(&config.logging))
        .unwrap_or_default();
    let _logger = match LoggerImpl::init(&log_config) {
        Ok(logger) => Some(logger),
        Err(err) => {
            eprintln!("Warning: logging disabled: {:#}", err);
            None
        }
    };

    if let Err(err) = cli::run(cli).await {
        cli::handle_error(err, json);
    }
}
