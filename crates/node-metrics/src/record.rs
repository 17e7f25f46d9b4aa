// node-metrics/src/record.rs

use serde::{Deserialize, Serialize};
use std::fmt;

/// One sample of node load and performance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    /// Concurrent users (load proxy)
    pub active_users: u64,
    /// Transactions per second; reported, never a decision input
    pub throughput_tps: f64,
    /// Average end-to-end latency in milliseconds
    pub latency_ms: i64,
    /// Energy cost, normally within 0..1
    pub energy_normalized: f64,
}

impl MetricsRecord {
    pub fn new(active_users: u64, throughput_tps: f64, latency_ms: i64, energy_normalized: f64) -> Self {
        Self {
            active_users,
            throughput_tps,
            latency_ms,
            energy_normalized,
        }
    }
}

/// Logical columns of a recorded metrics row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricField {
    ActiveUsers,
    ThroughputTps,
    LatencyMs,
    EnergyNormalized,
}

impl MetricField {
    /// Every required column, in canonical header order
    pub const ALL: [MetricField; 4] = [
        MetricField::ActiveUsers,
        MetricField::ThroughputTps,
        MetricField::LatencyMs,
        MetricField::EnergyNormalized,
    ];

    /// Header name after normalization (lowercase, no whitespace)
    pub fn key(&self) -> &'static str {
        match self {
            MetricField::ActiveUsers => "activeusers",
            MetricField::ThroughputTps => "throughputtps",
            MetricField::LatencyMs => "latencyms",
            MetricField::EnergyNormalized => "energynormalized",
        }
    }

    /// Header name as written by `MetricsRecorder`
    pub fn header(&self) -> &'static str {
        match self {
            MetricField::ActiveUsers => "ActiveUsers",
            MetricField::ThroughputTps => "ThroughputTPS",
            MetricField::LatencyMs => "LatencyMS",
            MetricField::EnergyNormalized => "EnergyNormalized",
        }
    }

    pub(crate) fn slot(&self) -> usize {
        match self {
            MetricField::ActiveUsers => 0,
            MetricField::ThroughputTps => 1,
            MetricField::LatencyMs => 2,
            MetricField::EnergyNormalized => 3,
        }
    }
}

impl fmt::Display for MetricField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

/// Normalize a header cell for lookup: drop whitespace, lowercase ASCII.
pub fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{feff}')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("ActiveUsers"), "activeusers");
        assert_eq!(normalize_header("  Latency MS\t"), "latencyms");
        assert_eq!(normalize_header("\u{feff}ThroughputTPS"), "throughputtps");
    }

    #[test]
    fn test_field_keys_match_headers() {
        for field in MetricField::ALL {
            assert_eq!(normalize_header(field.header()), field.key());
        }
    }

    #[test]
    fn test_slots_are_distinct() {
        let mut seen = [false; 4];
        for field in MetricField::ALL {
            assert!(!seen[field.slot()]);
            seen[field.slot()] = true;
        }
    }
}
