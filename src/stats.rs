// ============================================================================
// STATISTICS & DISPLAY FORMATTING
// ============================================================================
// Numeric summaries of the rolling windows and their rendering for the HTTP
// response: whole percentages and a signed GB/hour growth figure with a
// dead zone around zero.
// ============================================================================

use serde::{Deserialize, Serialize};

use crate::store::MetricSeries;
use crate::types::Timestamp;
use crate::GROWTH_DEAD_ZONE_GB;

// ----------------------------------------------------------------------------
// Numeric Summaries
// ----------------------------------------------------------------------------

/// Max / average summary of a percentage series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesSummary {
    pub max: f64,
    pub avg: f64,
    pub count: usize,
    pub latest_timestamp: Timestamp,
}

impl SeriesSummary {
    pub fn of(series: &MetricSeries) -> Self {
        Self {
            max: series.max(),
            avg: series.mean(),
            count: series.len(),
            latest_timestamp: series.latest_timestamp(),
        }
    }
}

/// Latest reading and growth rate of the disk series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiskSummary {
    pub current: f64,
    /// GB/hour
    pub growth: f64,
    pub count: usize,
    pub latest_timestamp: Timestamp,
}

/// Unformatted statistics for every series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub cpu: SeriesSummary,
    pub ram: SeriesSummary,
    pub disk: DiskSummary,
}

impl Statistics {
    /// Render for display
    pub fn to_report(&self) -> StatsReport {
        StatsReport {
            cpu: SeriesReport::from(&self.cpu),
            ram: SeriesReport::from(&self.ram),
            disk: DiskReport {
                current: format_percent(self.disk.current),
                growth: format_growth(self.disk.growth),
                count: self.disk.count,
                timestamp: self.disk.latest_timestamp.as_millis(),
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Display Report (HTTP body)
// ----------------------------------------------------------------------------

/// `{"max": "NN%", "avg": "NN%", "count": N, "timestamp": N}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesReport {
    pub max: String,
    pub avg: String,
    pub count: usize,
    /// Milliseconds since epoch of the newest sample, 0 for no data
    pub timestamp: i64,
}

impl From<&SeriesSummary> for SeriesReport {
    fn from(summary: &SeriesSummary) -> Self {
        Self {
            max: format_percent(summary.max),
            avg: format_percent(summary.avg),
            count: summary.count,
            timestamp: summary.latest_timestamp.as_millis(),
        }
    }
}

/// `{"current": "NN%", "growth": "+ 1.2 GB", "count": N, "timestamp": N}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskReport {
    pub current: String,
    pub growth: String,
    pub count: usize,
    pub timestamp: i64,
}

/// The JSON body served by the statistics endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsReport {
    pub cpu: SeriesReport,
    pub ram: SeriesReport,
    pub disk: DiskReport,
}

// ----------------------------------------------------------------------------
// Formatting
// ----------------------------------------------------------------------------

/// Nearest whole percent: `37.6` -> `"38%"`
pub fn format_percent(value: f64) -> String {
    format!("{}%", value.round() as i64)
}

/// Signed growth in GB with one decimal place.
///
/// Rates whose unrounded magnitude is below the dead zone render as
/// `"±0 GB"`; everything else as `"+ X.Y GB"` or `"- X.Y GB"`.
pub fn format_growth(rate: f64) -> String {
    if !rate.is_finite() || rate.abs() < GROWTH_DEAD_ZONE_GB {
        return "±0 GB".to_string();
    }
    let sign = if rate > 0.0 { '+' } else { '-' };
    let magnitude = (rate.abs() * 10.0).round() / 10.0;
    format!("{} {:.1} GB", sign, magnitude)
}
