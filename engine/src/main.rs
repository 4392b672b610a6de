// Arena evaluation harness
// Main entry point for the arena binary

use clap::Parser;
use arena_engine::cli::{Cli, Command};
use arena_engine::config::Config;
use arena_engine::handlers::{handle_healthcheck, handle_run, handle_validate, OutputFormat};
use arena_engine::shutdown::Shutdown;
use arena_engine::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Install logging at info until the config is loaded
    let telemetry = init_telemetry();

    let version = env!("CARGO_PKG_VERSION");
    let commit = env!("GIT_COMMIT_HASH");
    let timestamp = env!("BUILD_TIMESTAMP");

    tracing::info!("Arena harness v{} ({} - {})", version, commit, timestamp);

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // CLI level beats the config file; RUST_LOG beats both
    telemetry.set_level(cli.log.as_deref().unwrap_or(&config.core.log_level))?;

    let shutdown = Shutdown::new();
    let _signals = shutdown.listen_for_signals();

    match cli.command {
        Command::Run { missions, prefix } => {
            tracing::info!("Running missions from {}", missions.display());
            handle_run(&missions, prefix, &config, format, shutdown).await
        }

        Command::Validate { missions } => {
            tracing::info!("Validating missions in {}", missions.display());
            handle_validate(&missions, format).await
        }

        Command::Healthcheck => handle_healthcheck(&config, format, shutdown).await,
    }
}
