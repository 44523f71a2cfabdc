//! Micropad CLI entry point

use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use micropad_cli::{
    app::MicropadApp, cli::Cli, commands::CommandDispatcher, config::AppConfig, error::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let (mut config, config_path) = load_configuration(&cli)?;

    // Flags override file values
    if cli.no_reconnect {
        config.session.auto_reconnect = false;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.session.request_timeout = Duration::from_millis(timeout_ms);
    }

    config.validate()?;

    let app = MicropadApp::new(config, config_path);

    if let Err(e) = CommandDispatcher::execute(cli, app).await {
        error!("{}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Setup logging based on verbosity level; `RUST_LOG` wins when set
fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from the given file or the default location
fn load_configuration(cli: &Cli) -> Result<(AppConfig, std::path::PathBuf)> {
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => AppConfig::default_path()?,
    };

    info!("Loading configuration from: {}", path.display());
    let config = AppConfig::load_from_file(&path)?;
    Ok((config, path))
}
