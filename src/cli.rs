// ============================================================================
// COMMAND LINE INTERFACE
// ============================================================================

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::PulseConfig;
use crate::engine::{cancel_on_signal, Engine};
use crate::error::{PulseError, PulseResult};
use crate::persistence::SnapshotFile;
use crate::stats::StatsReport;
use crate::types::Timestamp;
use crate::{ENGINE_FULL_NAME, ENGINE_VERSION};

/// Pulse Engine CLI
#[derive(Parser, Debug)]
#[command(
    name = "pulse",
    author = "AIOps Team",
    version,
    about = "Host CPU, memory and disk vitals over HTTP",
    long_about = "Pulse samples CPU, memory and disk utilization once a minute, keeps \
                  the last hour in a rolling window that survives restarts, and serves \
                  summary statistics as JSON from a single HTTP endpoint."
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "pulse.toml", env = "PULSE_CONFIG")]
    pub config: PathBuf,

    /// Log level override
    #[arg(short, long, env = "PULSE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, env = "PULSE_DEBUG")]
    pub debug: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start sampling and serve statistics (default)
    Run,

    /// Validate configuration file
    Validate {
        /// Show full parsed configuration
        #[arg(short, long)]
        verbose: bool,
    },

    /// Generate default configuration file
    GenerateConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print statistics from the snapshot file without starting the engine
    Stats,

    /// Show engine version and build info
    Version,
}

impl Cli {
    /// Configuration from `--config` when the file exists, otherwise
    /// defaults with environment overrides.
    pub fn load_config(&self) -> PulseResult<PulseConfig> {
        let config = if self.config.exists() {
            PulseConfig::load(&self.config)?
        } else {
            PulseConfig::from_env()?
        };
        Ok(config)
    }

    /// Log level after `--log-level` and `--debug`
    pub fn apply_overrides(&self, config: &mut PulseConfig) {
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.debug {
            config.logging.level = "debug".into();
        }
    }
}

// ----------------------------------------------------------------------------
// Handlers
// ----------------------------------------------------------------------------

/// Handle the validate subcommand
pub fn handle_validate(config_path: &Path, verbose: bool) -> PulseResult<()> {
    println!("Validating configuration file: {}", config_path.display());

    match PulseConfig::load(config_path) {
        Ok(config) => {
            println!("Configuration is valid");

            if verbose {
                println!("\nParsed configuration:");
                println!("{}", "=".repeat(60));
                match toml::to_string_pretty(&config) {
                    Ok(s) => println!("{}", s),
                    Err(e) => println!("Failed to serialize: {}", e),
                }
            }

            println!("\nConfiguration Summary:");
            println!("  • Instance name: {}", config.engine.instance_name);
            println!("  • Sample interval: {}ms", config.sampler.interval_ms);
            println!("  • Retention window: {}ms", config.store.retention_ms);
            println!("  • Snapshot file: {}", config.store.snapshot_path.display());
            println!("  • Endpoint: http://{}{}", config.http.listen_addr(), config.http.path);
            if config.update.enabled {
                println!(
                    "  • Updates: {} every {}s at most",
                    config.update.upstream_ref(),
                    config.update.min_interval_secs
                );
            } else {
                println!("  • Updates: disabled");
            }
            Ok(())
        }
        Err(e) => {
            println!("Configuration validation failed");
            println!("Error: {}", e);
            Err(PulseError::Config(e))
        }
    }
}

/// Handle the generate-config subcommand
pub fn handle_generate_config(output: Option<&Path>) -> PulseResult<()> {
    let config_str = PulseConfig::generate_default_config();

    match output {
        Some(path) => {
            fs::write(path, &config_str)?;
            println!("Default configuration written to: {}", path.display());
        }
        None => println!("{}", config_str),
    }
    Ok(())
}

/// Statistics of the persisted window as of now, if a snapshot exists
pub fn snapshot_report(config: &PulseConfig) -> PulseResult<Option<StatsReport>> {
    let snapshot = SnapshotFile::new(&config.store.snapshot_path).read()?;
    Ok(snapshot.map(|s| s.into_store(config.store.retention(), Timestamp::now()).statistics()))
}

/// Handle the stats subcommand
pub fn handle_stats(config: &PulseConfig) -> PulseResult<()> {
    match snapshot_report(config)? {
        Some(report) => {
            let rendered =
                serde_json::to_string_pretty(&report).map_err(|e| PulseError::Internal(e.to_string()))?;
            println!("{}", rendered);
        }
        None => println!("No snapshot at {}", config.store.snapshot_path.display()),
    }
    Ok(())
}

/// Handle the version subcommand
pub fn handle_version() {
    println!("{} v{}", ENGINE_FULL_NAME, ENGINE_VERSION);
    println!();
    println!("Build Information:");
    println!("  • Target: {}", std::env::consts::ARCH);
    println!("  • OS: {}", std::env::consts::OS);
    println!("  • Family: {}", std::env::consts::FAMILY);
}

/// Run the engine until a termination signal arrives
pub async fn handle_run(config: PulseConfig) -> PulseResult<()> {
    info!(
        target: "pulse::init",
        "{} v{} starting",
        ENGINE_FULL_NAME,
        ENGINE_VERSION
    );

    let engine = Arc::new(Engine::new(config));
    let token = CancellationToken::new();
    cancel_on_signal(token.clone());
    engine.serve(token).await
}
