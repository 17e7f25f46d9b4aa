// consensus/src/thresholds.rs

use crate::{ConsensusError, ConsensusResult};
use serde::{Deserialize, Serialize};

/// Switching thresholds for the selection policy
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Users below this run PoW
    pub low_load: u64,
    /// Users from here run PoS, or DPoS under a guardrail breach
    pub medium_load: u64,
    /// Users from here run DPoS
    pub high_load: u64,
    /// Latency ceiling in milliseconds
    pub latency_threshold: i64,
    /// Normalized energy ceiling
    pub energy_threshold: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            low_load: 250,
            medium_load: 2_500,
            high_load: 7_000,
            latency_threshold: 500,
            energy_threshold: 0.8,
        }
    }
}

impl Thresholds {
    /// Check the precondition `decide` relies on.
    ///
    /// Loads must be strictly positive and non-decreasing; an inverted order
    /// would make some load tiers unreachable.
    pub fn validate(&self) -> ConsensusResult<()> {
        if self.low_load == 0 || self.medium_load == 0 || self.high_load == 0 {
            return Err(ConsensusError::InvalidConfiguration(format!(
                "load thresholds must be positive (low={}, medium={}, high={})",
                self.low_load, self.medium_load, self.high_load
            )));
        }

        if self.low_load > self.medium_load || self.medium_load > self.high_load {
            return Err(ConsensusError::InvalidConfiguration(format!(
                "load thresholds must satisfy low <= medium <= high (low={}, medium={}, high={})",
                self.low_load, self.medium_load, self.high_load
            )));
        }

        if self.energy_threshold.is_nan() {
            return Err(ConsensusError::InvalidConfiguration(
                "energy threshold is not a number".into(),
            ));
        }

        Ok(())
    }
}
