// consensus/src/lib.rs

//! Adaptive Consensus Selection Policy
//!
//! This crate maps one metrics sample plus a threshold configuration to the
//! consensus mechanism a node should run:
//! - Guardrail: latency or energy over threshold forces a stake-based mode
//! - Load tiers: active users select PoW, APoW, PoS or DPoS
//!
//! The policy is a pure function. It keeps no history, never logs and never
//! fails; it does not implement any of the consensus protocols it names.

pub mod policy;
pub mod thresholds;

pub use policy::{decide, ConsensusKind, Decision, DecisionRule, LoadTier};
pub use thresholds::Thresholds;

/// Result type for consensus configuration
pub type ConsensusResult<T> = Result<T, ConsensusError>;

/// Errors raised while validating policy configuration
#[derive(Debug, thiserror::Error)]
pub enum ConsensusError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Unknown consensus kind: {0}")]
    UnknownConsensus(String),
}
