// node/src/lib.rs
pub mod config;
pub mod report;
pub mod runtime;

pub use config::{BadRowPolicy, DriverConfig, NodeConfig};
pub use report::{DecisionLog, DecisionReport, OutputFormat};
pub use runtime::{Driver, DriverStats, TickOutcome};
