// node/src/report.rs
use chrono::{DateTime, SecondsFormat, Utc};
use consensus::{Decision, Thresholds};
use node_metrics::MetricsRecord;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Header of the decision log CSV
pub const DECISION_LOG_HEADER: &str =
    "Timestamp,ActiveUsers,ThroughputTPS,LatencyMS,EnergyNormalized,SelectedConsensus,Reason";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// A decision together with the inputs that produced it
#[derive(Debug, Clone, Serialize)]
pub struct DecisionReport {
    pub at: DateTime<Utc>,
    pub metrics: MetricsRecord,
    pub thresholds: Thresholds,
    pub decision: Decision,
}

impl DecisionReport {
    pub fn new(metrics: MetricsRecord, thresholds: Thresholds, decision: Decision) -> Self {
        Self::with_timestamp(Utc::now(), metrics, thresholds, decision)
    }

    pub fn with_timestamp(at: DateTime<Utc>, metrics: MetricsRecord, thresholds: Thresholds, decision: Decision) -> Self {
        Self {
            at,
            metrics,
            thresholds,
            decision,
        }
    }

    pub fn render(&self, format: OutputFormat) -> anyhow::Result<String> {
        match format {
            OutputFormat::Text => Ok(self.render_text()),
            OutputFormat::Json => Ok(serde_json::to_string(self)?),
        }
    }

    pub fn render_text(&self) -> String {
        let m = &self.metrics;
        let t = &self.thresholds;
        format!(
            "decision @ {}\n   users={}  tps={:.1}  latency_ms={}  energy_norm={:.2}\n   thresholds: low={}  med={}  high={}  L_thr={}ms  E_thr={:.2}\n   → SELECTED CONSENSUS: {}\n   reason: {}",
            self.at.to_rfc3339_opts(SecondsFormat::Secs, true),
            m.active_users,
            m.throughput_tps,
            m.latency_ms,
            m.energy_normalized,
            t.low_load,
            t.medium_load,
            t.high_load,
            t.latency_threshold,
            t.energy_threshold,
            self.decision.consensus,
            self.decision.reason,
        )
    }
}

/// Appends one CSV row per decision
pub struct DecisionLog<W: Write> {
    writer: W,
    rows: usize,
}

impl DecisionLog<BufWriter<File>> {
    /// Open `path` for appending; the header is written only to a new or empty file
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let empty = file.metadata()?.len() == 0;
        Self::new(BufWriter::new(file), empty)
    }
}

impl<W: Write> DecisionLog<W> {
    pub fn new(mut writer: W, write_header: bool) -> anyhow::Result<Self> {
        if write_header {
            writeln!(writer, "{}", DECISION_LOG_HEADER)?;
        }
        Ok(Self { writer, rows: 0 })
    }

    pub fn append(&mut self, report: &DecisionReport) -> anyhow::Result<()> {
        let m = &report.metrics;
        writeln!(
            self.writer,
            "{},{},{},{},{},{},{}",
            report.at.to_rfc3339_opts(SecondsFormat::Millis, true),
            m.active_users,
            m.throughput_tps,
            m.latency_ms,
            m.energy_normalized,
            report.decision.consensus,
            quote(report.decision.reason),
        )?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(mut self) -> anyhow::Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}
