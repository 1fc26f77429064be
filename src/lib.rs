//! # Pulse Engine - Host Vitals Over HTTP
//!
//! A small host-metrics sampler. Once a minute it reads CPU, memory and disk
//! utilization, keeps the last hour of samples in a rolling window, and serves
//! summary statistics as JSON from a single HTTP endpoint.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐   sample_cycle()   ┌──────────────┐  save()   ┌──────────────┐
//! │  HostSampler │ ─────────────────► │  MetricStore │ ────────► │ SnapshotFile │
//! │ /proc statvfs│                    │  cpu ram disk│ ◄──────── │  JSON on disk│
//! └──────────────┘                    └──────┬───────┘  load()   └──────────────┘
//!        ▲                                   │ statistics()
//!        │ tick / forced                     ▼
//! ┌──────┴───────┐   updated? ┌──────────────────────────┐
//! │    Engine    │ ◄───────── │ HTTP endpoint (axum)     │
//! │  scheduler   │            │  └─ UpdateChecker (git)  │
//! └──────────────┘            └──────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Rolling window**: samples older than the retention window are purged
//!   on every write and on restore
//! - **Disk growth rate**: GB/hour derived from consecutive disk samples
//! - **Restart durability**: the whole store round-trips through one JSON file
//! - **Self-updating**: a rate-limited git fast-forward check on each request
//!
//! ## Author
//!
//! AIOps Team

#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod logging;
pub mod persistence;
pub mod sampler;
pub mod stats;
pub mod store;
pub mod types;
pub mod update;

#[cfg(test)]
pub(crate) mod testing;

pub use config::PulseConfig;
pub use engine::Engine;
pub use error::{PulseError, PulseResult};
pub use persistence::{SnapshotFile, StoreSnapshot};
pub use sampler::{HostSampler, ProcSampler};
pub use stats::{Statistics, StatsReport};
pub use store::MetricStore;
pub use types::{MetricKind, Sample, Timestamp};
pub use update::{GitCli, UpdateChecker, UpdateOutcome, Vcs};

// ============================================================================
// CONSTANTS & VERSION INFORMATION
// ============================================================================

/// Engine version - follows semantic versioning
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ENGINE_FULL_NAME: &str = "Pulse Host Vitals Engine";

// ----------------------------------------------------------------------------
// Timing & Windows
// ----------------------------------------------------------------------------

/// Milliseconds in one hour, the unit of the disk growth rate
pub const MS_PER_HOUR: i64 = 3_600_000;

/// Default sampling interval (milliseconds)
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 60_000;

/// Minimum allowed sampling interval (milliseconds)
pub const MIN_SAMPLE_INTERVAL_MS: u64 = 1_000;

/// Default retention window for every series (milliseconds)
pub const DEFAULT_RETENTION_MS: u64 = 3_600_000;

/// Grace period for the final snapshot flush on shutdown (seconds)
pub const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 10;

// ----------------------------------------------------------------------------
// Storage
// ----------------------------------------------------------------------------

/// Default location of the persisted store snapshot
pub const DEFAULT_SNAPSHOT_PATH: &str = "data/metrics.json";

/// Bytes per reported disk "GB"
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Growth rates with a smaller magnitude than this render as "±0 GB"
pub const GROWTH_DEAD_ZONE_GB: f64 = 0.05;

// ----------------------------------------------------------------------------
// Network
// ----------------------------------------------------------------------------

/// Default HTTP bind address
pub const DEFAULT_HTTP_BIND: &str = "0.0.0.0";

/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default path of the statistics endpoint
pub const DEFAULT_STATS_PATH: &str = "/stats";

// ----------------------------------------------------------------------------
// Updates
// ----------------------------------------------------------------------------

/// Minimum spacing between two remote update checks (seconds)
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 300;

/// Upper bound for a single git invocation (seconds)
pub const DEFAULT_GIT_TIMEOUT_SECS: u64 = 60;

/// Default append-only log of update decisions
pub const DEFAULT_UPDATE_LOG_PATH: &str = "data/update.log";
