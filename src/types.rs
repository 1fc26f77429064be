// ============================================================================
// CORE TYPE SYSTEM
// ============================================================================
// The values that flow from the samplers into the store and out through the
// snapshot file and the HTTP endpoint.
// ============================================================================

use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Timestamp - Millisecond Wall-Clock Time
// ----------------------------------------------------------------------------

/// Wall-clock timestamp in milliseconds since the Unix epoch.
///
/// Serializes as a bare integer so snapshot files and HTTP responses carry
/// plain numbers. `Timestamp::EPOCH` (0) doubles as "no data".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Zero timestamp (Unix epoch)
    pub const EPOCH: Timestamp = Timestamp(0);

    /// Create a timestamp from milliseconds since the Unix epoch
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Current wall-clock time
    #[inline]
    pub fn now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Milliseconds since the Unix epoch
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Signed number of milliseconds from `earlier` to `self`
    #[inline]
    pub fn millis_since(&self, earlier: Timestamp) -> i64 {
        self.0.saturating_sub(earlier.0)
    }

    /// Subtract a duration, saturating at the representable minimum
    #[inline]
    pub fn sub_duration(&self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_sub(millis))
    }

    /// Add a duration, saturating at the representable maximum
    #[inline]
    pub fn add_duration(&self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }

    /// Convert to chrono DateTime<Utc>
    pub fn to_datetime(&self) -> DateTime<Utc> {
        let secs = self.0.div_euclid(1_000);
        let nanos = (self.0.rem_euclid(1_000) * 1_000_000) as u32;
        DateTime::from_timestamp(secs, nanos).unwrap_or_default()
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_datetime().to_rfc3339())
    }
}

/// Atomic timestamp for lock-free claim/compare operations.
#[derive(Debug)]
#[repr(transparent)]
pub struct AtomicTimestamp(AtomicI64);

impl AtomicTimestamp {
    /// Create a new atomic timestamp
    #[inline]
    pub const fn new(ts: Timestamp) -> Self {
        Self(AtomicI64::new(ts.0))
    }

    /// Load the timestamp with specified ordering
    #[inline]
    pub fn load(&self, ordering: AtomicOrdering) -> Timestamp {
        Timestamp(self.0.load(ordering))
    }

    /// Compare and swap
    #[inline]
    pub fn compare_exchange(
        &self,
        current: Timestamp,
        new: Timestamp,
        success: AtomicOrdering,
        failure: AtomicOrdering,
    ) -> Result<Timestamp, Timestamp> {
        self.0
            .compare_exchange(current.0, new.0, success, failure)
            .map(Timestamp)
            .map_err(Timestamp)
    }

    /// Move the timestamp to `now` if at least `min_gap` has elapsed since
    /// the stored value. Returns `true` for exactly one of any set of
    /// concurrent callers inside the same gap.
    pub fn claim_if_elapsed(&self, now: Timestamp, min_gap: Duration) -> bool {
        let gap = i64::try_from(min_gap.as_millis()).unwrap_or(i64::MAX);
        let mut current = self.load(AtomicOrdering::Acquire);
        loop {
            if current != Timestamp::EPOCH && now.millis_since(current) < gap {
                return false;
            }
            match self.compare_exchange(current, now, AtomicOrdering::AcqRel, AtomicOrdering::Acquire) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for AtomicTimestamp {
    fn default() -> Self {
        Self::new(Timestamp::EPOCH)
    }
}

// ----------------------------------------------------------------------------
// Metric Kinds & Samples
// ----------------------------------------------------------------------------

/// The three sampled series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Ram,
    Disk,
}

impl MetricKind {
    /// Every kind, in response order
    pub const ALL: [MetricKind; 3] = [MetricKind::Cpu, MetricKind::Ram, MetricKind::Disk];

    /// Field name used in snapshots and responses
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Ram => "ram",
            MetricKind::Disk => "disk",
        }
    }
}

impl Display for MetricKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reading of one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// When the reading was taken
    pub timestamp: Timestamp,
    /// Reading value (percent for every kind)
    pub value: f64,
}

impl Sample {
    #[inline]
    pub fn new(timestamp: Timestamp, value: f64) -> Self {
        Self { timestamp, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_serializes_as_integer() {
        let sample = Sample::new(Timestamp::from_millis(1_700_000_000_123), 42.5);
        let json = serde_json::to_string(&sample).unwrap();
        assert_eq!(json, r#"{"timestamp":1700000000123,"value":42.5}"#);
    }

    #[test]
    fn test_timestamp_arithmetic() {
        let ts = Timestamp::from_millis(10_000);
        assert_eq!(ts.sub_duration(Duration::from_secs(3)).as_millis(), 7_000);
        assert_eq!(ts.add_duration(Duration::from_millis(5)).as_millis(), 10_005);
        assert_eq!(ts.millis_since(Timestamp::from_millis(12_000)), -2_000);
    }

    #[test]
    fn test_claim_if_elapsed() {
        let last = AtomicTimestamp::default();
        let gap = Duration::from_secs(60);
        let t0 = Timestamp::from_millis(1_000_000);

        assert!(last.claim_if_elapsed(t0, gap));
        assert!(!last.claim_if_elapsed(t0.add_duration(Duration::from_secs(59)), gap));
        assert!(last.claim_if_elapsed(t0.add_duration(Duration::from_secs(60)), gap));
        assert_eq!(last.load(AtomicOrdering::Relaxed), t0.add_duration(Duration::from_secs(60)));
    }

    #[test]
    fn test_claim_is_exclusive_across_threads() {
        let last = std::sync::Arc::new(AtomicTimestamp::default());
        let now = Timestamp::from_millis(5_000_000);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let last = last.clone();
                std::thread::spawn(move || last.claim_if_elapsed(now, Duration::from_secs(300)))
            })
            .collect();

        let winners = handles.into_iter().filter_map(|h| h.join().ok()).filter(|won| *won).count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_metric_kind_names() {
        let names: Vec<_> = MetricKind::ALL.iter().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["cpu", "ram", "disk"]);
    }
}
