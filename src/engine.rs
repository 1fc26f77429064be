// ============================================================================
// ENGINE: SAMPLE CYCLE & SCHEDULER
// ============================================================================
// Owns the store, the sampler, the snapshot file and the update checker.
//
// - `sample_cycle` reads every metric off the async executor, records the
//   readings under the store lock and persists a snapshot.
// - `run` drives cycles on a fixed interval until cancelled, then flushes.
// - `serve` runs the scheduler next to the HTTP endpoint and bounds the
//   shutdown by the configured grace period.
// ============================================================================

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinError;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::PulseConfig;
use crate::error::{PulseError, PulseResult, SamplerResult};
use crate::http;
use crate::persistence::{SnapshotFile, StoreSnapshot};
use crate::sampler::{HostSampler, ProcSampler};
use crate::stats::StatsReport;
use crate::store::MetricStore;
use crate::types::{MetricKind, Timestamp};
use crate::update::UpdateChecker;
use crate::ENGINE_VERSION;

// ----------------------------------------------------------------------------
// Engine State
// ----------------------------------------------------------------------------

/// The running sampler: one per process, shared through `Arc`.
#[derive(Debug)]
pub struct Engine {
    config: PulseConfig,
    sampler: Arc<dyn HostSampler>,
    store: Arc<Mutex<MetricStore>>,
    snapshot: SnapshotFile,
    /// Serializes snapshot writes from overlapping cycles
    write_lock: TokioMutex<()>,
    updater: UpdateChecker,
}

impl Engine {
    /// Engine reading from procfs and syncing through git
    pub fn new(config: PulseConfig) -> Self {
        let sampler = Arc::new(ProcSampler::new(&config.sampler));
        let updater = UpdateChecker::new(config.update.clone());
        Self::with_parts(config, sampler, updater)
    }

    /// Assemble an engine from explicit parts, restoring the last snapshot.
    pub fn with_parts(config: PulseConfig, sampler: Arc<dyn HostSampler>, updater: UpdateChecker) -> Self {
        let retention = config.store.retention();
        let snapshot = SnapshotFile::new(config.store.snapshot_path.clone());
        let store = snapshot
            .load(retention, Timestamp::now())
            .unwrap_or_else(|| MetricStore::new(retention));

        Self {
            config,
            sampler,
            store: Arc::new(Mutex::new(store)),
            snapshot,
            write_lock: TokioMutex::new(()),
            updater,
        }
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Display-ready statistics of the current window
    pub fn report(&self) -> StatsReport {
        self.store.lock().statistics()
    }

    /// Take one reading of every metric and persist the result.
    ///
    /// Failed readings are recorded as 0. Never fails.
    pub async fn sample_cycle(&self) -> Timestamp {
        let sampler = self.sampler.clone();
        let store = self.store.clone();

        let at = match tokio::task::spawn_blocking(move || record_readings(sampler.as_ref(), &store)).await {
            Ok(at) => at,
            Err(e) => {
                warn!(target: "pulse::engine", error = %e, "sample cycle aborted");
                return Timestamp::now();
            }
        };

        if let Err(e) = self.persist().await {
            warn!(target: "pulse::engine", error = %e, category = e.category(), "snapshot not saved");
        }
        at
    }

    /// Write the current store to the snapshot file.
    pub async fn persist(&self) -> PulseResult<()> {
        let _write = self.write_lock.lock().await;
        let snapshot = StoreSnapshot::capture(&self.store.lock());
        let file = self.snapshot.clone();

        tokio::task::spawn_blocking(move || file.save(&snapshot))
            .await
            .map_err(|e| join_failure("snapshot writer", e))??;
        Ok(())
    }

    /// Final snapshot write on shutdown
    pub async fn flush(&self) -> PulseResult<()> {
        let start = Instant::now();
        self.persist().await?;
        info!(
            target: "pulse::engine",
            path = %self.snapshot.path().display(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Snapshot flushed"
        );
        Ok(())
    }

    /// Handle one statistics request: run a due update check, take a fresh
    /// sample when new code was merged, then report.
    pub async fn serve_stats(&self) -> StatsReport {
        if self.updater.check_and_update().await {
            info!(target: "pulse::engine", "update applied, sampling immediately");
            self.sample_cycle().await;
        }
        self.report()
    }

    /// Sample on a fixed interval until `token` is cancelled, then flush.
    ///
    /// The first tick completes immediately, so the startup cycle runs
    /// before the first full interval.
    pub async fn run(&self, token: CancellationToken) -> PulseResult<()> {
        let period = self.config.sampler.interval();
        info!(
            target: "pulse::engine",
            interval_ms = period.as_millis() as u64,
            retention_ms = self.config.store.retention_ms,
            "Scheduler started"
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    debug!(target: "pulse::engine", "Scheduler cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let at = self.sample_cycle().await;
                    trace!(target: "pulse::engine", %at, "Sample cycle complete");
                }
            }
        }

        self.flush().await
    }

    /// Run the scheduler and the HTTP endpoint until `token` is cancelled.
    ///
    /// After cancellation the server drains and the scheduler flushes; both
    /// are bounded by `engine.shutdown_timeout_secs`.
    pub async fn serve(self: Arc<Self>, token: CancellationToken) -> PulseResult<()> {
        let addr = self.config.http.listen_addr();
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(
            target: "pulse::engine",
            version = ENGINE_VERSION,
            instance = %self.config.engine.instance_name,
            %addr,
            path = %self.config.http.path,
            updates = self.updater.is_enabled(),
            "Engine listening"
        );

        let scheduler = tokio::spawn({
            let engine = self.clone();
            let token = token.clone();
            async move { engine.run(token).await }
        });

        let mut server = tokio::spawn({
            let app = http::router(self.clone());
            let token = token.clone();
            async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { token.cancelled().await })
                    .await
            }
        });

        let early_exit = tokio::select! {
            _ = token.cancelled() => None,
            result = &mut server => Some(result),
        };
        token.cancel();

        info!(target: "pulse::engine", "Starting graceful shutdown");
        let grace = self.config.engine.shutdown_timeout();
        let drained = tokio::time::timeout(grace, async move {
            let server = match early_exit {
                Some(result) => result,
                None => server.await,
            };
            (server, scheduler.await)
        })
        .await;

        let (server, scheduler) = match drained {
            Ok(results) => results,
            Err(_) => {
                warn!(
                    target: "pulse::engine",
                    grace_secs = grace.as_secs(),
                    "Shutdown grace period elapsed before the final flush"
                );
                return Ok(());
            }
        };

        server.map_err(|e| join_failure("http server", e))??;
        scheduler.map_err(|e| join_failure("scheduler", e))??;
        info!(target: "pulse::engine", "Engine shutdown complete");
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Cycle Helpers
// ----------------------------------------------------------------------------

/// Read every metric and record it under one lock acquisition.
fn record_readings(sampler: &dyn HostSampler, store: &Mutex<MetricStore>) -> Timestamp {
    let cpu = reading_or_zero(MetricKind::Cpu, sampler.cpu_percent());
    let ram = reading_or_zero(MetricKind::Ram, sampler.ram_percent());
    let disk = reading_or_zero(MetricKind::Disk, sampler.disk_percent());
    let now = Timestamp::now();

    let mut store = store.lock();
    store.record(MetricKind::Cpu, now, cpu, || 0.0);
    store.record(MetricKind::Ram, now, ram, || 0.0);
    store.record(MetricKind::Disk, now, disk, || match sampler.disk_capacity_gb() {
        Ok(gb) => gb,
        Err(e) => {
            warn!(target: "pulse::engine", error = %e, "disk capacity unavailable, growth rate reset");
            0.0
        }
    });

    debug!(target: "pulse::engine", cpu, ram, disk, "Recorded sample");
    now
}

fn reading_or_zero(kind: MetricKind, reading: SamplerResult<f64>) -> f64 {
    match reading {
        Ok(value) => value,
        Err(e) => {
            warn!(target: "pulse::engine", metric = %kind, error = %e, "reading failed, recording 0");
            0.0
        }
    }
}

fn join_failure(task: &str, error: JoinError) -> PulseError {
    PulseError::Internal(format!("{} task failed: {}", task, error))
}

// ----------------------------------------------------------------------------
// Signals
// ----------------------------------------------------------------------------

/// Wait for SIGTERM or SIGINT and return its name.
#[cfg(unix)]
pub async fn wait_for_signal() -> PulseResult<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    let name = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(name)
}

/// Wait for Ctrl-C.
#[cfg(not(unix))]
pub async fn wait_for_signal() -> PulseResult<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}

/// Cancel `token` on the first termination signal.
pub fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        match wait_for_signal().await {
            Ok(name) => info!(target: "pulse::engine", signal = name, "Received termination signal"),
            Err(e) => warn!(target: "pulse::engine", error = %e, "Signal handlers unavailable, stopping"),
        }
        token.cancel();
    });
}
