// ============================================================================
// HOST SAMPLER
// ============================================================================
// CPU, memory and disk utilization read straight from the kernel:
// - CPU% from /proc/stat tick deltas between consecutive calls
// - RAM% from /proc/meminfo
// - Disk% and capacity from statvfs() on one mount point
// ============================================================================

use std::fmt::Debug;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::trace;

use crate::config::SamplerConfig;
use crate::error::{SamplerError, SamplerResult};
use crate::BYTES_PER_GB;

// ----------------------------------------------------------------------------
// Sampler Contract
// ----------------------------------------------------------------------------

/// Produces one scalar reading per metric on demand.
///
/// Any call may fail; the engine substitutes 0 for a failed reading.
pub trait HostSampler: Send + Sync + Debug {
    /// CPU utilization (0-100) since the previous call
    fn cpu_percent(&self) -> SamplerResult<f64>;

    /// Memory utilization (0-100)
    fn ram_percent(&self) -> SamplerResult<f64>;

    /// Utilization of the primary volume (0-100)
    fn disk_percent(&self) -> SamplerResult<f64>;

    /// Total size of the primary volume in GB
    fn disk_capacity_gb(&self) -> SamplerResult<f64>;
}

// ----------------------------------------------------------------------------
// CPU Ticks - For Delta Computation
// ----------------------------------------------------------------------------

/// Aggregate CPU counters from the first line of /proc/stat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTicks {
    user: u64,
    nice: u64,
    system: u64,
    idle: u64,
    iowait: u64,
    irq: u64,
    softirq: u64,
    steal: u64,
}

impl CpuTicks {
    /// Total ticks across all modes.
    pub fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle + self.iowait + self.irq + self.softirq + self.steal
    }

    /// Active (non-idle) ticks.
    pub fn active(&self) -> u64 {
        self.total() - self.idle - self.iowait
    }

    /// Parse the aggregate line. Format: "cpu  12345 678 9012 34567 890 12 34 56"
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        if parts.next()? != "cpu" {
            return None;
        }

        let user: u64 = parts.next()?.parse().ok()?;
        let nice: u64 = parts.next()?.parse().ok()?;
        let system: u64 = parts.next()?.parse().ok()?;
        let idle: u64 = parts.next()?.parse().ok()?;
        let iowait: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let irq: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let softirq: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let steal: u64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);

        Some(Self { user, nice, system, idle, iowait, irq, softirq, steal })
    }

    /// Busy percentage over the interval from `prev` to `self`.
    pub fn usage_since(&self, prev: &CpuTicks) -> f64 {
        let total_delta = self.total().saturating_sub(prev.total());
        if total_delta == 0 {
            return 0.0;
        }
        let active_delta = self.active().saturating_sub(prev.active());
        // iowait is not monotonic, so active can outrun total
        (active_delta as f64 / total_delta as f64 * 100.0).clamp(0.0, 100.0)
    }
}

// ----------------------------------------------------------------------------
// Memory & Filesystem Math
// ----------------------------------------------------------------------------

/// Parse MemTotal/MemFree (kB) out of /proc/meminfo content.
pub fn parse_meminfo(content: &str) -> Option<(u64, u64)> {
    let mut total = None;
    let mut free = None;

    for line in content.lines() {
        let mut parts = line.splitn(2, ':');
        let key = parts.next().map(str::trim);
        let value_kb = parts
            .next()
            .and_then(|v| v.split_whitespace().next())
            .and_then(|s| s.parse::<u64>().ok());

        match (key, value_kb) {
            (Some("MemTotal"), Some(v)) => total = Some(v),
            (Some("MemFree"), Some(v)) => free = Some(v),
            _ => {}
        }
        if total.is_some() && free.is_some() {
            break;
        }
    }

    Some((total?, free?))
}

/// Memory utilization: (total - free) / total * 100
pub fn ram_usage_percent(total_kb: u64, free_kb: u64) -> Option<f64> {
    if total_kb == 0 {
        return None;
    }
    Some(total_kb.saturating_sub(free_kb) as f64 / total_kb as f64 * 100.0)
}

/// Filesystem figures derived from one statvfs() result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskUsage {
    /// df-style utilization: used / (used + available)
    pub percent: f64,
    /// Total size in GB
    pub capacity_gb: f64,
}

impl DiskUsage {
    /// Compute usage from raw block counts.
    pub fn from_blocks(block_size: u64, blocks: u64, blocks_free: u64, blocks_avail: u64) -> Self {
        let used = blocks.saturating_sub(blocks_free);
        let usable = used + blocks_avail;
        let percent = if usable > 0 { used as f64 / usable as f64 * 100.0 } else { 0.0 };

        Self {
            percent,
            capacity_gb: (blocks as f64 * block_size as f64) / BYTES_PER_GB,
        }
    }
}

// ----------------------------------------------------------------------------
// Proc Sampler
// ----------------------------------------------------------------------------

/// `HostSampler` backed by procfs and statvfs().
#[derive(Debug)]
pub struct ProcSampler {
    proc_root: PathBuf,
    disk_mount: PathBuf,
    /// Counters observed by the previous `cpu_percent` call
    prev_cpu: Mutex<CpuTicks>,
}

impl ProcSampler {
    pub fn new(config: &SamplerConfig) -> Self {
        Self {
            proc_root: config.proc_root.clone(),
            disk_mount: config.disk_mount.clone(),
            prev_cpu: Mutex::new(CpuTicks::default()),
        }
    }

    fn read_proc(&self, name: &str) -> SamplerResult<(PathBuf, String)> {
        let path = self.proc_root.join(name);
        let content = fs::read_to_string(&path).map_err(|source| SamplerError::ReadFailed {
            path: path.clone(),
            source,
        })?;
        Ok((path, content))
    }

    fn read_cpu_ticks(&self) -> SamplerResult<CpuTicks> {
        let (path, content) = self.read_proc("stat")?;
        content
            .lines()
            .find(|line| line.starts_with("cpu "))
            .and_then(CpuTicks::parse)
            .ok_or_else(|| SamplerError::malformed(path, "no aggregate cpu line"))
    }

    fn disk_usage(&self) -> SamplerResult<DiskUsage> {
        statvfs_usage(&self.disk_mount)
    }
}

impl HostSampler for ProcSampler {
    fn cpu_percent(&self) -> SamplerResult<f64> {
        let current = self.read_cpu_ticks()?;
        let mut prev = self.prev_cpu.lock();
        let usage = current.usage_since(&prev);
        *prev = current;
        trace!(target: "pulse::sampler", usage, "cpu sampled");
        Ok(usage)
    }

    fn ram_percent(&self) -> SamplerResult<f64> {
        let (path, content) = self.read_proc("meminfo")?;
        let (total, free) =
            parse_meminfo(&content).ok_or_else(|| SamplerError::malformed(&path, "missing MemTotal/MemFree"))?;
        ram_usage_percent(total, free).ok_or_else(|| SamplerError::malformed(path, "MemTotal is zero"))
    }

    fn disk_percent(&self) -> SamplerResult<f64> {
        Ok(self.disk_usage()?.percent)
    }

    fn disk_capacity_gb(&self) -> SamplerResult<f64> {
        Ok(self.disk_usage()?.capacity_gb)
    }
}

#[cfg(unix)]
#[allow(clippy::unnecessary_cast)]
fn statvfs_usage(mount: &Path) -> SamplerResult<DiskUsage> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(mount.as_os_str().as_bytes()).map_err(|_| SamplerError::StatFailed {
        path: mount.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "path contains a NUL byte"),
    })?;

    // SAFETY: c_path is a valid NUL-terminated string and stat is a plain C
    // struct that statvfs fully initializes on success.
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if ret != 0 {
        return Err(SamplerError::StatFailed {
            path: mount.to_path_buf(),
            source: std::io::Error::last_os_error(),
        });
    }

    Ok(DiskUsage::from_blocks(
        stat.f_frsize as u64,
        stat.f_blocks as u64,
        stat.f_bfree as u64,
        stat.f_bavail as u64,
    ))
}

#[cfg(not(unix))]
fn statvfs_usage(_mount: &Path) -> SamplerResult<DiskUsage> {
    Err(SamplerError::Unsupported { what: "statvfs" })
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  1000 0 500 8000 100 10 5 0\ncpu0 500 0 250 4000 50 5 2 0\nintr 12345 678\n";
    const MEMINFO: &str = "MemTotal:       16000000 kB\nMemFree:         4000000 kB\nMemAvailable:    8000000 kB\n";

    fn fixture(stat: &str, meminfo: &str) -> (tempfile::TempDir, ProcSampler) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stat"), stat).unwrap();
        fs::write(dir.path().join("meminfo"), meminfo).unwrap();
        let config = SamplerConfig {
            proc_root: dir.path().to_path_buf(),
            disk_mount: dir.path().to_path_buf(),
            ..SamplerConfig::default()
        };
        let sampler = ProcSampler::new(&config);
        (dir, sampler)
    }

    #[test]
    fn test_cpu_ticks_parsing() {
        let ticks = CpuTicks::parse("cpu  12345 678 9012 34567 890 12 34 56").unwrap();
        assert_eq!(ticks.user, 12345);
        assert_eq!(ticks.idle, 34567);
        assert_eq!(ticks.steal, 56);
        assert_eq!(ticks.total(), 12345 + 678 + 9012 + 34567 + 890 + 12 + 34 + 56);
    }

    #[test]
    fn test_cpu_ticks_rejects_per_core_and_garbage() {
        assert!(CpuTicks::parse("cpu3 1000 200 300 4000").is_none());
        assert!(CpuTicks::parse("intr 12345 678").is_none());
        assert!(CpuTicks::parse("").is_none());
    }

    #[test]
    fn test_cpu_usage_delta() {
        let prev = CpuTicks { user: 1000, system: 500, idle: 8000, iowait: 100, ..Default::default() };
        let curr = CpuTicks { user: 1600, system: 700, idle: 8100, iowait: 100, ..Default::default() };
        // 800 active out of 900 total
        assert!((curr.usage_since(&prev) - 800.0 / 900.0 * 100.0).abs() < 1e-9);
        assert_eq!(curr.usage_since(&curr), 0.0);
    }

    #[test]
    fn test_cpu_usage_clamped_when_iowait_drops() {
        let prev = CpuTicks { user: 1000, idle: 8000, iowait: 500, ..Default::default() };
        let curr = CpuTicks { user: 1300, idle: 8100, iowait: 300, ..Default::default() };
        // 300 active ticks over 200 total
        assert_eq!(curr.usage_since(&prev), 100.0);
    }

    #[test]
    fn test_cpu_percent_tracks_previous_call() {
        let (dir, sampler) = fixture(STAT, MEMINFO);

        // First call measures against zero counters: 1515 active of 9615 total
        let first = sampler.cpu_percent().unwrap();
        assert!((first - 1515.0 / 9615.0 * 100.0).abs() < 1e-9);

        fs::write(dir.path().join("stat"), "cpu  1100 0 500 8100 100 10 5 0\n").unwrap();
        let second = sampler.cpu_percent().unwrap();
        assert!((second - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_ram_percent_uses_free_memory() {
        let (_dir, sampler) = fixture(STAT, MEMINFO);
        assert!((sampler.ram_percent().unwrap() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_meminfo_missing_fields() {
        assert_eq!(parse_meminfo("MemAvailable: 10 kB\n"), None);
        assert_eq!(ram_usage_percent(0, 0), None);
    }

    #[test]
    fn test_missing_proc_files_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let config = SamplerConfig { proc_root: dir.path().join("absent"), ..SamplerConfig::default() };
        let sampler = ProcSampler::new(&config);

        assert!(matches!(sampler.cpu_percent(), Err(SamplerError::ReadFailed { .. })));
        assert!(matches!(sampler.ram_percent(), Err(SamplerError::ReadFailed { .. })));
    }

    #[test]
    fn test_disk_usage_from_blocks() {
        // 4 KiB blocks, 1 GiB total, 1/4 used, 5% reserved for root
        let blocks = 262_144;
        let free = 196_608;
        let avail = free - 13_107;
        let usage = DiskUsage::from_blocks(4096, blocks, free, avail);

        assert!((usage.capacity_gb - 1.0).abs() < 1e-12);
        let used = (blocks - free) as f64;
        assert!((usage.percent - used / (used + avail as f64) * 100.0).abs() < 1e-9);
        assert_eq!(DiskUsage::from_blocks(4096, 0, 0, 0).percent, 0.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_statvfs_on_real_mount() {
        let (_dir, sampler) = fixture(STAT, MEMINFO);
        let percent = sampler.disk_percent().unwrap();
        assert!((0.0..=100.0).contains(&percent));
        assert!(sampler.disk_capacity_gb().unwrap() > 0.0);
    }

    #[cfg(unix)]
    #[test]
    fn test_statvfs_missing_mount() {
        let config = SamplerConfig { disk_mount: PathBuf::from("/definitely/not/mounted"), ..SamplerConfig::default() };
        let sampler = ProcSampler::new(&config);
        assert!(matches!(sampler.disk_percent(), Err(SamplerError::StatFailed { .. })));
    }
}
