// ============================================================================
// TIME-WINDOWED METRIC STORE
// ============================================================================
// Three rolling series (cpu, ram, disk) plus the last computed disk growth
// rate. Every write purges samples older than the retention window, measured
// from the timestamp being written rather than a fresh clock read.
// ============================================================================

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, trace};

use crate::stats::{DiskSummary, SeriesSummary, Statistics, StatsReport};
use crate::types::{MetricKind, Sample, Timestamp};
use crate::MS_PER_HOUR;

// ----------------------------------------------------------------------------
// Metric Series
// ----------------------------------------------------------------------------

/// Insertion-ordered samples of one metric.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSeries {
    samples: VecDeque<Sample>,
}

impl MetricSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: Sample) {
        self.samples.push_back(sample);
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        self.samples.iter()
    }

    /// Drop every sample older than `cutoff`, returning how many were removed.
    ///
    /// Restored snapshots are not guaranteed to be time-ordered, so this
    /// filters the whole series instead of trimming from the front.
    pub fn purge_before(&mut self, cutoff: Timestamp) -> usize {
        let before = self.samples.len();
        self.samples.retain(|s| s.timestamp >= cutoff);
        before - self.samples.len()
    }

    /// Largest value, 0 when empty
    pub fn max(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.value)
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    /// Arithmetic mean, 0 when empty
    pub fn mean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().map(|s| s.value).sum::<f64>() / self.samples.len() as f64
    }

    /// Timestamp of the last element, `Timestamp::EPOCH` when empty
    pub fn latest_timestamp(&self) -> Timestamp {
        self.latest().map(|s| s.timestamp).unwrap_or(Timestamp::EPOCH)
    }

    pub fn to_vec(&self) -> Vec<Sample> {
        self.samples.iter().copied().collect()
    }
}

impl FromIterator<Sample> for MetricSeries {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        Self {
            samples: iter.into_iter().collect(),
        }
    }
}

// ----------------------------------------------------------------------------
// Metric Store
// ----------------------------------------------------------------------------

/// Rolling windows of every metric kind and the derived disk growth rate.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricStore {
    cpu: MetricSeries,
    ram: MetricSeries,
    disk: MetricSeries,
    /// GB/hour between the last two disk samples with a positive gap
    disk_growth_rate: f64,
    retention: Duration,
}

impl MetricStore {
    /// Create an empty store with the given retention window
    pub fn new(retention: Duration) -> Self {
        Self {
            cpu: MetricSeries::new(),
            ram: MetricSeries::new(),
            disk: MetricSeries::new(),
            disk_growth_rate: 0.0,
            retention,
        }
    }

    /// Rebuild a store from persisted parts and purge it against `now`.
    pub fn restore(
        retention: Duration,
        cpu: MetricSeries,
        ram: MetricSeries,
        disk: MetricSeries,
        disk_growth_rate: f64,
        now: Timestamp,
    ) -> Self {
        let mut store = Self { cpu, ram, disk, disk_growth_rate, retention };
        let dropped = store.purge(now);
        if dropped > 0 {
            debug!(target: "pulse::store", dropped, "discarded stale samples from snapshot");
        }
        store
    }

    pub fn disk_growth_rate(&self) -> f64 {
        self.disk_growth_rate
    }

    pub fn series(&self, kind: MetricKind) -> &MetricSeries {
        match kind {
            MetricKind::Cpu => &self.cpu,
            MetricKind::Ram => &self.ram,
            MetricKind::Disk => &self.disk,
        }
    }

    fn series_mut(&mut self, kind: MetricKind) -> &mut MetricSeries {
        match kind {
            MetricKind::Cpu => &mut self.cpu,
            MetricKind::Ram => &mut self.ram,
            MetricKind::Disk => &mut self.disk,
        }
    }

    pub fn len(&self, kind: MetricKind) -> usize {
        self.series(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        MetricKind::ALL.iter().all(|k| self.series(*k).is_empty())
    }

    /// Append a sample and purge every series against `timestamp`.
    ///
    /// For disk samples the growth rate is recomputed from the previous disk
    /// sample when the gap between them is positive; `capacity_gb` is only
    /// invoked in that case.
    pub fn record<F>(&mut self, kind: MetricKind, timestamp: Timestamp, value: f64, capacity_gb: F)
    where
        F: FnOnce() -> f64,
    {
        if kind == MetricKind::Disk {
            if let Some(prev) = self.disk.latest().copied() {
                let elapsed_hours = timestamp.millis_since(prev.timestamp) as f64 / MS_PER_HOUR as f64;
                if elapsed_hours > 0.0 {
                    let percent_delta = value - prev.value;
                    self.disk_growth_rate = (percent_delta / 100.0) * capacity_gb() / elapsed_hours;
                    trace!(
                        target: "pulse::store",
                        rate = self.disk_growth_rate,
                        elapsed_hours,
                        "disk growth updated"
                    );
                }
            }
        }

        self.series_mut(kind).push(Sample::new(timestamp, value));
        self.purge(timestamp);
    }

    /// Drop samples older than `now - retention` from every series.
    pub fn purge(&mut self, now: Timestamp) -> usize {
        let cutoff = now.sub_duration(self.retention);
        self.cpu.purge_before(cutoff) + self.ram.purge_before(cutoff) + self.disk.purge_before(cutoff)
    }

    /// Numeric summary of every series
    pub fn summarize(&self) -> Statistics {
        Statistics {
            cpu: SeriesSummary::of(&self.cpu),
            ram: SeriesSummary::of(&self.ram),
            disk: DiskSummary {
                current: self.disk.latest().map(|s| s.value).unwrap_or(0.0),
                growth: self.disk_growth_rate,
                count: self.disk.len(),
                latest_timestamp: self.disk.latest_timestamp(),
            },
        }
    }

    /// Display-ready statistics, as served over HTTP
    pub fn statistics(&self) -> StatsReport {
        self.summarize().to_report()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const HOUR: Duration = Duration::from_secs(3600);
    const T0: i64 = 1_700_000_000_000;

    fn ts(offset_ms: i64) -> Timestamp {
        Timestamp::from_millis(T0 + offset_ms)
    }

    fn no_capacity() -> f64 {
        panic!("capacity must not be read")
    }

    #[test]
    fn test_cpu_scenario_same_minute() {
        let mut store = MetricStore::new(HOUR);
        store.record(MetricKind::Cpu, ts(0), 20.0, no_capacity);
        store.record(MetricKind::Cpu, ts(30_000), 80.0, no_capacity);

        let report = store.statistics();
        assert_eq!(report.cpu.max, "80%");
        assert_eq!(report.cpu.avg, "50%");
        assert_eq!(report.cpu.count, 2);
        assert_eq!(report.cpu.timestamp, T0 + 30_000);
    }

    #[test]
    fn test_empty_store_statistics() {
        let store = MetricStore::new(HOUR);
        let report = store.statistics();

        for series in [&report.cpu, &report.ram] {
            assert_eq!(series.max, "0%");
            assert_eq!(series.avg, "0%");
            assert_eq!(series.count, 0);
            assert_eq!(series.timestamp, 0);
        }
        assert_eq!(report.disk.current, "0%");
        assert_eq!(report.disk.growth, "±0 GB");
        assert_eq!(report.disk.count, 0);
        assert_eq!(report.disk.timestamp, 0);
    }

    #[test]
    fn test_disk_growth_one_hour() {
        let mut store = MetricStore::new(Duration::from_secs(2 * 3600));
        store.record(MetricKind::Disk, ts(0), 40.0, no_capacity);
        store.record(MetricKind::Disk, ts(3_600_000), 45.0, || 100.0);

        assert_eq!(store.disk_growth_rate(), 5.0);
        assert_eq!(store.statistics().disk.growth, "+ 5.0 GB");
        assert_eq!(store.statistics().disk.current, "45%");
    }

    #[test]
    fn test_disk_growth_shrinking() {
        let mut store = MetricStore::new(HOUR);
        store.record(MetricKind::Disk, ts(0), 50.0, no_capacity);
        store.record(MetricKind::Disk, ts(1_800_000), 49.0, || 500.0);

        // -1% of 500 GB over half an hour
        assert!((store.disk_growth_rate() + 10.0).abs() < 1e-9);
        assert_eq!(store.statistics().disk.growth, "- 10.0 GB");
    }

    #[test]
    fn test_disk_growth_ignores_non_positive_gap() {
        let mut store = MetricStore::new(HOUR);
        store.record(MetricKind::Disk, ts(0), 40.0, no_capacity);
        store.record(MetricKind::Disk, ts(600_000), 41.0, || 100.0);
        let rate = store.disk_growth_rate();

        store.record(MetricKind::Disk, ts(600_000), 90.0, no_capacity);
        store.record(MetricKind::Disk, ts(500_000), 10.0, no_capacity);

        assert_eq!(store.disk_growth_rate(), rate);
        assert_eq!(store.len(MetricKind::Disk), 4);
    }

    #[test]
    fn test_first_disk_sample_leaves_rate() {
        let mut store = MetricStore::new(HOUR);
        store.record(MetricKind::Disk, ts(0), 40.0, no_capacity);
        assert_eq!(store.disk_growth_rate(), 0.0);
    }

    #[test]
    fn test_failed_capacity_read_zeroes_rate() {
        let mut store = MetricStore::new(HOUR);
        store.record(MetricKind::Disk, ts(0), 40.0, no_capacity);
        store.record(MetricKind::Disk, ts(60_000), 60.0, || 0.0);
        assert_eq!(store.disk_growth_rate(), 0.0);
    }

    #[test]
    fn test_record_purges_every_series() {
        let mut store = MetricStore::new(HOUR);
        store.record(MetricKind::Cpu, ts(0), 10.0, no_capacity);
        store.record(MetricKind::Ram, ts(0), 10.0, no_capacity);
        store.record(MetricKind::Disk, ts(0), 10.0, no_capacity);

        // Exactly on the window edge: kept
        store.record(MetricKind::Cpu, ts(3_600_000), 20.0, no_capacity);
        assert_eq!(store.len(MetricKind::Ram), 1);

        // One millisecond past: every series drops its old sample
        store.record(MetricKind::Cpu, ts(3_600_001), 30.0, no_capacity);
        assert_eq!(store.len(MetricKind::Cpu), 2);
        assert_eq!(store.len(MetricKind::Ram), 0);
        assert_eq!(store.len(MetricKind::Disk), 0);
    }

    #[test]
    fn test_purge_keeps_growth_rate() {
        let mut store = MetricStore::new(HOUR);
        store.record(MetricKind::Disk, ts(0), 40.0, no_capacity);
        store.record(MetricKind::Disk, ts(60_000), 41.0, || 100.0);
        let rate = store.disk_growth_rate();

        store.purge(ts(10 * 3_600_000));
        assert!(store.is_empty());
        assert_eq!(store.disk_growth_rate(), rate);
    }

    #[test]
    fn test_restore_drops_stale_samples() {
        let disk: MetricSeries = [Sample::new(ts(-2 * 3_600_000), 30.0), Sample::new(ts(-60_000), 31.0)]
            .into_iter()
            .collect();
        let store = MetricStore::restore(HOUR, MetricSeries::new(), MetricSeries::new(), disk, 1.5, ts(0));

        assert_eq!(store.len(MetricKind::Disk), 1);
        assert_eq!(store.disk_growth_rate(), 1.5);
    }

    #[test]
    fn test_statistics_idempotent() {
        let mut store = MetricStore::new(HOUR);
        store.record(MetricKind::Ram, ts(0), 33.3, no_capacity);
        store.record(MetricKind::Ram, ts(60_000), 66.6, no_capacity);

        assert_eq!(store.statistics(), store.statistics());
        assert_eq!(store.summarize(), store.summarize());
    }

    #[test]
    fn test_values_are_not_validated() {
        let mut store = MetricStore::new(HOUR);
        store.record(MetricKind::Cpu, ts(0), 0.0, no_capacity);
        store.record(MetricKind::Cpu, ts(1), 250.0, no_capacity);
        let summary = store.summarize();
        assert_eq!(summary.cpu.max, 250.0);
        assert_eq!(summary.cpu.count, 2);
    }

    proptest! {
        #[test]
        fn prop_window_never_holds_stale_samples(
            steps in prop::collection::vec((1i64..600_000, 0.0f64..100.0), 1..120)
        ) {
            let mut store = MetricStore::new(HOUR);
            let mut now = T0;
            let mut recorded = Vec::new();

            for (gap, value) in steps {
                now += gap;
                recorded.push(now);
                store.record(MetricKind::Cpu, Timestamp::from_millis(now), value, no_capacity);

                let cutoff = now - 3_600_000;
                prop_assert!(store.series(MetricKind::Cpu).iter().all(|s| s.timestamp.as_millis() >= cutoff));
                let expected = recorded.iter().filter(|t| **t >= cutoff).count();
                prop_assert_eq!(store.statistics().cpu.count, expected);
            }
        }
    }
}
