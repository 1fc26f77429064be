// ============================================================================
// MAIN ENTRY POINT
// ============================================================================

use anyhow::{Context, Result as AnyhowResult};
use clap::Parser;
use tracing::{info, warn};

use pulse_engine::cli::{self, Cli, Commands};
use pulse_engine::logging::init_logging;

#[tokio::main]
async fn main() -> AnyhowResult<()> {
    let cli = Cli::parse();

    // Subcommands that don't need the engine or logging
    match &cli.command {
        Some(Commands::Version) => {
            cli::handle_version();
            return Ok(());
        }
        Some(Commands::GenerateConfig { output }) => {
            cli::handle_generate_config(output.as_deref())?;
            return Ok(());
        }
        Some(Commands::Validate { verbose }) => {
            cli::handle_validate(&cli.config, *verbose)?;
            return Ok(());
        }
        _ => {}
    }

    let mut config = cli
        .load_config()
        .with_context(|| format!("Failed to load config from {}", cli.config.display()))?;
    cli.apply_overrides(&mut config);

    if let Some(Commands::Stats) = cli.command {
        cli::handle_stats(&config)?;
        return Ok(());
    }

    // Held until exit so the file sink flushes
    let _log_guard = init_logging(&config.logging)?;

    if !cli.config.exists() {
        warn!(
            target: "pulse::init",
            path = %cli.config.display(),
            "Config file not found, using defaults and environment"
        );
    }

    cli::handle_run(config).await?;
    info!(target: "pulse::init", "Exiting");
    Ok(())
}
