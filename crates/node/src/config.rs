// node/src/config.rs
use anyhow::Context;
use consensus::Thresholds;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    pub thresholds: Thresholds,
    #[serde(default)]
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Seconds between decisions; 0 decides once and exits
    pub interval_secs: u64,
    /// Replay this CSV instead of generating random metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_csv: Option<String>,
    /// Seed for the random source
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Append every decision to this CSV
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decisions_out: Option<String>,
    pub on_bad_row: BadRowPolicy,
}

/// What the driver loop does with a metrics row it cannot parse
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadRowPolicy {
    /// Log and move on to the next tick
    #[default]
    Skip,
    /// Stop the driver with an error
    Abort,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            metrics_csv: None,
            seed: None,
            decisions_out: None,
            on_bad_row: BadRowPolicy::Skip,
        }
    }
}

impl NodeConfig {
    /// Load and validate a config file.
    ///
    /// `.json` files may hold either a full config or just the threshold
    /// object; anything else is read as TOML.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path))?;

        let config = if is_json(path) {
            Self::from_json(&contents)
        } else {
            toml::from_str::<Self>(&contents).map_err(anyhow::Error::from)
        }
        .with_context(|| format!("failed to parse config {}", path))?;

        config
            .validate()
            .with_context(|| format!("invalid thresholds in {}", path))?;
        Ok(config)
    }

    pub fn from_json(contents: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(contents)?;

        if value.get("thresholds").is_some() {
            Ok(serde_json::from_value(value)?)
        } else {
            let thresholds: Thresholds = serde_json::from_value(value)?;
            Ok(Self {
                thresholds,
                driver: DriverConfig::default(),
            })
        }
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.thresholds.validate()?;
        Ok(())
    }
}

fn is_json(path: &str) -> bool {
    Path::new(path)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
