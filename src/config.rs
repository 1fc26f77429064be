// ============================================================================
// CONFIGURATION SYSTEM
// ============================================================================
// Layered configuration:
// - Built-in defaults
// - TOML file
// - `PULSE_` environment overrides (`__` separates nesting levels)
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::{
    DEFAULT_GIT_TIMEOUT_SECS, DEFAULT_HTTP_BIND, DEFAULT_HTTP_PORT, DEFAULT_RETENTION_MS,
    DEFAULT_SAMPLE_INTERVAL_MS, DEFAULT_SNAPSHOT_PATH, DEFAULT_STATS_PATH, DEFAULT_UPDATE_INTERVAL_SECS,
    DEFAULT_UPDATE_LOG_PATH, MIN_SAMPLE_INTERVAL_MS, SHUTDOWN_GRACE_PERIOD_SECS,
};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "PULSE_";

// ----------------------------------------------------------------------------
// Main Configuration Structure
// ----------------------------------------------------------------------------

/// Root configuration for the engine
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PulseConfig {
    /// General engine settings
    #[serde(default)]
    pub engine: GeneralConfig,

    /// Host sampling
    #[serde(default)]
    pub sampler: SamplerConfig,

    /// Rolling window and snapshot file
    #[serde(default)]
    pub store: StoreConfig,

    /// HTTP endpoint
    #[serde(default)]
    pub http: HttpConfig,

    /// Remote update checks
    #[serde(default)]
    pub update: UpdateConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl PulseConfig {
    /// Load configuration from file with environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }

        Self::from_figment(Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(path)))
    }

    /// Defaults plus environment overrides, for running without a file
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_figment(Figment::from(Serialized::defaults(Self::default())))
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(|e| ConfigError::parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from string (for testing)
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| ConfigError::parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sampler.interval_ms < MIN_SAMPLE_INTERVAL_MS {
            return Err(ConfigError::invalid_value(
                "sampler.interval_ms",
                format!("Sampling interval must be at least {}ms", MIN_SAMPLE_INTERVAL_MS),
            ));
        }

        if self.store.retention_ms < self.sampler.interval_ms {
            return Err(ConfigError::invalid_value(
                "store.retention_ms",
                "Retention window must be at least one sampling interval",
            ));
        }

        if self.store.snapshot_path.as_os_str().is_empty() {
            return Err(ConfigError::invalid_value("store.snapshot_path", "must not be empty"));
        }

        if !self.http.path.starts_with('/') {
            return Err(ConfigError::invalid_value(
                "http.path",
                format!("'{}' must start with '/'", self.http.path),
            ));
        }

        if self.update.enabled {
            if self.update.remote.trim().is_empty() {
                return Err(ConfigError::invalid_value("update.remote", "must not be empty"));
            }
            if self.update.branch.trim().is_empty() {
                return Err(ConfigError::invalid_value("update.branch", "must not be empty"));
            }
            if self.update.command_timeout_secs == 0 {
                return Err(ConfigError::invalid_value("update.command_timeout_secs", "must be non-zero"));
            }
        }

        Ok(())
    }

    /// Render the default configuration as TOML
    pub fn generate_default_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

// ----------------------------------------------------------------------------
// General Engine Configuration
// ----------------------------------------------------------------------------

/// General engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Engine instance name (for identification in logs)
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Upper bound on the final flush after a termination signal (seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl GeneralConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn default_instance_name() -> String {
    "pulse-engine".into()
}

fn default_shutdown_timeout() -> u64 {
    SHUTDOWN_GRACE_PERIOD_SECS
}

fn default_true() -> bool {
    true
}

// ----------------------------------------------------------------------------
// Sampler Configuration
// ----------------------------------------------------------------------------

/// Host sampler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerConfig {
    /// Interval between timer-driven sample cycles (milliseconds)
    #[serde(default = "default_sample_interval")]
    pub interval_ms: u64,

    /// Mount point whose filesystem is reported as "disk"
    #[serde(default = "default_disk_mount")]
    pub disk_mount: PathBuf,

    /// Root of the proc filesystem
    #[serde(default = "default_proc_root")]
    pub proc_root: PathBuf,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_sample_interval(),
            disk_mount: default_disk_mount(),
            proc_root: default_proc_root(),
        }
    }
}

impl SamplerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn default_sample_interval() -> u64 {
    DEFAULT_SAMPLE_INTERVAL_MS
}

fn default_disk_mount() -> PathBuf {
    PathBuf::from("/")
}

fn default_proc_root() -> PathBuf {
    PathBuf::from("/proc")
}

// ----------------------------------------------------------------------------
// Store Configuration
// ----------------------------------------------------------------------------

/// Rolling window and snapshot settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Samples older than this are purged (milliseconds)
    #[serde(default = "default_retention")]
    pub retention_ms: u64,

    /// Snapshot file written every cycle and read at startup
    #[serde(default = "default_snapshot_path")]
    pub snapshot_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            retention_ms: default_retention(),
            snapshot_path: default_snapshot_path(),
        }
    }
}

impl StoreConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_millis(self.retention_ms)
    }
}

fn default_retention() -> u64 {
    DEFAULT_RETENTION_MS
}

fn default_snapshot_path() -> PathBuf {
    PathBuf::from(DEFAULT_SNAPSHOT_PATH)
}

// ----------------------------------------------------------------------------
// HTTP Configuration
// ----------------------------------------------------------------------------

/// HTTP endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Bind address
    #[serde(default = "default_http_bind")]
    pub bind: String,

    /// Listen port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Path of the statistics endpoint; every other path is a 404
    #[serde(default = "default_stats_path")]
    pub path: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: default_http_bind(),
            port: default_http_port(),
            path: default_stats_path(),
        }
    }
}

impl HttpConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn default_http_bind() -> String {
    DEFAULT_HTTP_BIND.into()
}

fn default_http_port() -> u16 {
    DEFAULT_HTTP_PORT
}

fn default_stats_path() -> String {
    DEFAULT_STATS_PATH.into()
}

// ----------------------------------------------------------------------------
// Update Configuration
// ----------------------------------------------------------------------------

/// Remote update checker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Enable remote update checks
    #[serde(default)]
    pub enabled: bool,

    /// Working copy to keep in sync
    #[serde(default = "default_repo_dir")]
    pub repo_dir: PathBuf,

    /// Remote name
    #[serde(default = "default_remote")]
    pub remote: String,

    /// Branch tracked on the remote
    #[serde(default = "default_branch")]
    pub branch: String,

    /// git executable
    #[serde(default = "default_git_binary")]
    pub git_binary: PathBuf,

    /// Minimum spacing between checks, regardless of request rate (seconds)
    #[serde(default = "default_update_interval")]
    pub min_interval_secs: u64,

    /// Upper bound for one git invocation (seconds)
    #[serde(default = "default_git_timeout")]
    pub command_timeout_secs: u64,

    /// Append-only log of every update decision
    #[serde(default = "default_update_log")]
    pub log_file: PathBuf,

    /// Also log rate-limited skips to the decision log
    #[serde(default = "default_true")]
    pub log_skips: bool,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            repo_dir: default_repo_dir(),
            remote: default_remote(),
            branch: default_branch(),
            git_binary: default_git_binary(),
            min_interval_secs: default_update_interval(),
            command_timeout_secs: default_git_timeout(),
            log_file: default_update_log(),
            log_skips: true,
        }
    }
}

impl UpdateConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_secs(self.min_interval_secs)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// `<remote>/<branch>` as understood by rev-parse and merge
    pub fn upstream_ref(&self) -> String {
        format!("{}/{}", self.remote, self.branch)
    }
}

fn default_repo_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_remote() -> String {
    "origin".into()
}

fn default_branch() -> String {
    "main".into()
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}

fn default_update_interval() -> u64 {
    DEFAULT_UPDATE_INTERVAL_SECS
}

fn default_git_timeout() -> u64 {
    DEFAULT_GIT_TIMEOUT_SECS
}

fn default_update_log() -> PathBuf {
    PathBuf::from(DEFAULT_UPDATE_LOG_PATH)
}

// ----------------------------------------------------------------------------
// Logging Configuration
// ----------------------------------------------------------------------------

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty, compact)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Also write logs to this file
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Enable ANSI colors
    #[serde(default = "default_true")]
    pub colors: bool,

    /// Include source location
    #[serde(default)]
    pub source_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            colors: true,
            source_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "pretty".into()
}
