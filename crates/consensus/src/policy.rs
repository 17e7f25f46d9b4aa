// consensus/src/policy.rs

use crate::{ConsensusError, Thresholds};
use node_metrics::MetricsRecord;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Consensus mechanisms the policy can select
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConsensusKind {
    /// Proof of Work
    PoW,
    /// Adaptive Proof of Work (difficulty follows load)
    APoW,
    /// Proof of Stake
    PoS,
    /// Delegated Proof of Stake
    DPoS,
}

impl ConsensusKind {
    pub const ALL: [ConsensusKind; 4] = [
        ConsensusKind::PoW,
        ConsensusKind::APoW,
        ConsensusKind::PoS,
        ConsensusKind::DPoS,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConsensusKind::PoW => "PoW",
            ConsensusKind::APoW => "APoW",
            ConsensusKind::PoS => "PoS",
            ConsensusKind::DPoS => "DPoS",
        }
    }
}

impl fmt::Display for ConsensusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConsensusKind {
    type Err = ConsensusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConsensusKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ConsensusError::UnknownConsensus(s.to_string()))
    }
}

/// Load band of `active_users` relative to the configured thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadTier {
    /// `users < low_load`
    Low,
    /// `low_load <= users < medium_load`
    Medium,
    /// `medium_load <= users < high_load`
    High,
    /// `users >= high_load`
    VeryHigh,
}

impl LoadTier {
    pub fn classify(active_users: u64, thresholds: &Thresholds) -> Self {
        match active_users {
            u if u < thresholds.low_load => LoadTier::Low,
            u if u < thresholds.medium_load => LoadTier::Medium,
            u if u < thresholds.high_load => LoadTier::High,
            _ => LoadTier::VeryHigh,
        }
    }
}

/// Which rule produced a decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionRule {
    /// Latency and/or energy exceeded their thresholds
    Guardrail {
        latency_breach: bool,
        energy_breach: bool,
    },
    /// No breach; selected from the load tier
    LoadTier(LoadTier),
}

/// Outcome of one policy evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub consensus: ConsensusKind,
    pub reason: &'static str,
    pub rule: DecisionRule,
}

impl Decision {
    fn new(consensus: ConsensusKind, reason: &'static str, rule: DecisionRule) -> Self {
        Self {
            consensus,
            reason,
            rule,
        }
    }
}

/// Select a consensus mechanism for one metrics sample.
///
/// Rules, first match wins:
/// 1. Guardrail: `latency_ms > latency_threshold` or
///    `energy_normalized > energy_threshold` excludes work-based modes;
///    DPoS when `active_users >= medium_load`, otherwise PoS.
/// 2. Load tier on `active_users` with half-open bands at `low_load`,
///    `medium_load` and `high_load`: PoW, APoW, PoS, DPoS.
///
/// Throughput is not an input. Thresholds are expected to have passed
/// [`Thresholds::validate`]; out-of-range metrics are classified as-is.
pub fn decide(metrics: &MetricsRecord, thresholds: &Thresholds) -> Decision {
    let latency_breach = metrics.latency_ms > thresholds.latency_threshold;
    let energy_breach = metrics.energy_normalized > thresholds.energy_threshold;

    if latency_breach || energy_breach {
        let rule = DecisionRule::Guardrail {
            latency_breach,
            energy_breach,
        };
        return if metrics.active_users >= thresholds.medium_load {
            Decision::new(
                ConsensusKind::DPoS,
                "High latency/energy & medium/high load → DPoS",
                rule,
            )
        } else {
            Decision::new(
                ConsensusKind::PoS,
                "High latency/energy & low/medium load → PoS",
                rule,
            )
        };
    }

    let tier = LoadTier::classify(metrics.active_users, thresholds);
    let rule = DecisionRule::LoadTier(tier);
    match tier {
        LoadTier::Low => Decision::new(
            ConsensusKind::PoW,
            "Low load → PoW (max security; low cost impact)",
            rule,
        ),
        LoadTier::Medium => Decision::new(
            ConsensusKind::APoW,
            "Medium-ish load → APoW (difficulty adapts)",
            rule,
        ),
        LoadTier::High => Decision::new(ConsensusKind::PoS, "High load (tier 1) → PoS", rule),
        LoadTier::VeryHigh => Decision::new(
            ConsensusKind::DPoS,
            "Very high load → DPoS (maximize throughput)",
            rule,
        ),
    }
}
