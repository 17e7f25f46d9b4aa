// node-metrics/src/recorder.rs

use crate::{MetricField, MetricsRecord, MetricsResult};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes metrics rows in the format `CsvSource` replays
pub struct MetricsRecorder<W: Write> {
    writer: W,
    rows: usize,
}

impl MetricsRecorder<BufWriter<File>> {
    /// Create (or truncate) a file and write the header
    pub fn create<P: AsRef<Path>>(path: P) -> MetricsResult<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file))
    }
}

impl<W: Write> MetricsRecorder<W> {
    pub fn new(mut writer: W) -> MetricsResult<Self> {
        let header: Vec<&str> = MetricField::ALL.iter().map(|f| f.header()).collect();
        writeln!(writer, "{}", header.join(","))?;

        Ok(Self { writer, rows: 0 })
    }

    pub fn record(&mut self, metrics: &MetricsRecord) -> MetricsResult<()> {
        writeln!(
            self.writer,
            "{},{},{},{}",
            metrics.active_users, metrics.throughput_tps, metrics.latency_ms, metrics.energy_normalized
        )?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, header excluded
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Flush and hand back the writer
    pub fn finish(mut self) -> MetricsResult<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_output() {
        let mut recorder = MetricsRecorder::new(Vec::new()).unwrap();
        recorder.record(&MetricsRecord::new(1200, 380.5, 640, 0.62)).unwrap();
        recorder.record(&MetricsRecord::new(5, 100.0, 80, 0.05)).unwrap();
        assert_eq!(recorder.rows(), 2);

        let bytes = recorder.finish().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "ActiveUsers,ThroughputTPS,LatencyMS,EnergyNormalized\n1200,380.5,640,0.62\n5,100,80,0.05\n"
        );
    }
}
