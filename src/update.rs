// ============================================================================
// REMOTE UPDATE CHECKER
// ============================================================================
// Keeps the deployed working copy in sync with its remote branch:
//
//   fetch -> HEAD == upstream?        -> up to date
//         -> tracked files modified?  -> local changes (no action)
//         -> HEAD not an ancestor?    -> diverged (no action)
//         -> merge --ff-only          -> updated
//
// Checks are rate limited, and every decision is appended to a plain-text
// log as `<RFC 3339 time> <decision>`.
// ============================================================================

use std::fmt::{self, Debug, Display, Formatter};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::UpdateConfig;
use crate::error::{UpdateError, UpdateResult};
use crate::types::{AtomicTimestamp, Timestamp};

// ----------------------------------------------------------------------------
// Version Control Seam
// ----------------------------------------------------------------------------

/// Captured result of one version-control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VcsOutput {
    pub success: bool,
    /// Human-readable exit status
    pub status: String,
    /// Trimmed standard output
    pub stdout: String,
    /// Trimmed standard error
    pub stderr: String,
}

/// Runs version-control commands against the deployed working copy.
#[async_trait]
pub trait Vcs: Send + Sync + Debug {
    /// Run one command. A non-zero exit is reported through
    /// `VcsOutput::success`, not as an error.
    async fn run(&self, args: &[&str]) -> UpdateResult<VcsOutput>;
}

/// `Vcs` backed by the git executable.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
    repo_dir: PathBuf,
    timeout: Duration,
}

impl GitCli {
    pub fn new(config: &UpdateConfig) -> Self {
        Self {
            binary: config.git_binary.clone(),
            repo_dir: config.repo_dir.clone(),
            timeout: config.command_timeout(),
        }
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn run(&self, args: &[&str]) -> UpdateResult<VcsOutput> {
        let command = args.join(" ");
        debug!(target: "pulse::update", %command, "running git");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(&self.repo_dir)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|source| UpdateError::Spawn {
                command: command.clone(),
                source,
            })?,
            Err(_) => {
                return Err(UpdateError::Timeout {
                    command,
                    timeout_secs: self.timeout.as_secs(),
                })
            }
        };

        Ok(VcsOutput {
            success: output.status.success(),
            status: output.status.to_string(),
            stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

// ----------------------------------------------------------------------------
// Decisions
// ----------------------------------------------------------------------------

/// What one call to the checker decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Checks are switched off in configuration
    Disabled,
    /// A check already ran inside the minimum interval
    RateLimited,
    UpToDate { head: String },
    /// Uncommitted changes to tracked files. Untracked files are ignored.
    LocalChanges,
    /// Local history is not an ancestor of the upstream branch
    Diverged { upstream: String },
    /// Fast-forwarded from `from` to `to`
    Updated { from: String, to: String },
    /// A git command failed or timed out
    Failed(String),
}

impl UpdateOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, UpdateOutcome::Updated { .. })
    }
}

fn short(rev: &str) -> &str {
    rev.get(..12).unwrap_or(rev)
}

impl Display for UpdateOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            UpdateOutcome::Disabled => f.write_str("disabled"),
            UpdateOutcome::RateLimited => f.write_str("skipped: rate limited"),
            UpdateOutcome::UpToDate { head } => write!(f, "up to date at {}", short(head)),
            UpdateOutcome::LocalChanges => f.write_str("local changes present, update skipped"),
            UpdateOutcome::Diverged { upstream } => write!(f, "diverged from {}, update skipped", upstream),
            UpdateOutcome::Updated { from, to } => write!(f, "updated {} -> {}", short(from), short(to)),
            UpdateOutcome::Failed(message) => write!(f, "error: {}", message),
        }
    }
}

// ----------------------------------------------------------------------------
// Decision Log
// ----------------------------------------------------------------------------

/// Append-only record of update decisions.
#[derive(Debug)]
pub struct UpdateLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl UpdateLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `<RFC 3339 time> <decision>` as one line.
    pub fn append(&self, at: Timestamp, decision: &str) -> std::io::Result<()> {
        let _guard = self.lock.lock();
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{} {}", at, decision)
    }
}

// ----------------------------------------------------------------------------
// Update Checker
// ----------------------------------------------------------------------------

/// Rate-limited fast-forward of the deployed working copy.
#[derive(Debug)]
pub struct UpdateChecker {
    config: UpdateConfig,
    vcs: Arc<dyn Vcs>,
    /// Start of the last check that was allowed to run
    last_check: AtomicTimestamp,
    log: UpdateLog,
}

impl UpdateChecker {
    /// Checker driving the configured git executable
    pub fn new(config: UpdateConfig) -> Self {
        let vcs = Arc::new(GitCli::new(&config));
        Self::with_vcs(config, vcs)
    }

    pub fn with_vcs(config: UpdateConfig, vcs: Arc<dyn Vcs>) -> Self {
        let log = UpdateLog::new(config.log_file.clone());
        Self {
            config,
            vcs,
            last_check: AtomicTimestamp::default(),
            log,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Run a check if one is due. `true` only when new code was merged.
    pub async fn check_and_update(&self) -> bool {
        self.check_at(Timestamp::now()).await.is_updated()
    }

    /// Run a check as of `now` and report the decision.
    ///
    /// At most one of any set of concurrent callers inside the minimum
    /// interval gets past the rate limit.
    pub async fn check_at(&self, now: Timestamp) -> UpdateOutcome {
        if !self.config.enabled {
            return UpdateOutcome::Disabled;
        }

        if !self.last_check.claim_if_elapsed(now, self.config.min_interval()) {
            debug!(target: "pulse::update", "update check skipped, rate limited");
            if self.config.log_skips {
                self.record(now, &UpdateOutcome::RateLimited);
            }
            return UpdateOutcome::RateLimited;
        }

        let outcome = match self.sync().await {
            Ok(outcome) => outcome,
            Err(e) => UpdateOutcome::Failed(e.to_string()),
        };

        match &outcome {
            UpdateOutcome::Updated { .. } => info!(target: "pulse::update", decision = %outcome, "working copy updated"),
            UpdateOutcome::Failed(_) => warn!(target: "pulse::update", decision = %outcome, "update check failed"),
            _ => debug!(target: "pulse::update", decision = %outcome, "update check finished"),
        }

        self.record(now, &outcome);
        outcome
    }

    async fn sync(&self) -> UpdateResult<UpdateOutcome> {
        let upstream = self.config.upstream_ref();

        self.git(&["fetch", self.config.remote.as_str(), self.config.branch.as_str()]).await?;
        let head = self.git(&["rev-parse", "HEAD"]).await?;
        let target = self.git(&["rev-parse", upstream.as_str()]).await?;
        if head == target {
            return Ok(UpdateOutcome::UpToDate { head });
        }

        let status = self.git(&["status", "--porcelain", "--untracked-files=no"]).await?;
        if !status.is_empty() {
            return Ok(UpdateOutcome::LocalChanges);
        }

        let ancestry = self.vcs.run(&["merge-base", "--is-ancestor", "HEAD", upstream.as_str()]).await?;
        if !ancestry.success {
            return Ok(UpdateOutcome::Diverged { upstream });
        }

        self.git(&["merge", "--ff-only", upstream.as_str()]).await?;
        Ok(UpdateOutcome::Updated { from: head, to: target })
    }

    /// Run a command that must succeed, returning its stdout.
    async fn git(&self, args: &[&str]) -> UpdateResult<String> {
        let output = self.vcs.run(args).await?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(UpdateError::CommandFailed {
                command: args.join(" "),
                status: output.status,
                stderr: output.stderr,
            })
        }
    }

    fn record(&self, at: Timestamp, outcome: &UpdateOutcome) {
        if let Err(e) = self.log.append(at, &outcome.to_string()) {
            warn!(
                target: "pulse::update",
                path = %self.log.path().display(),
                error = %e,
                "failed to append to update log"
            );
        }
    }
}
