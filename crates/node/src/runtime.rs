// node/src/runtime.rs
use crate::{BadRowPolicy, DecisionLog, DecisionReport};
use anyhow::Context;
use consensus::{decide, DecisionRule, Thresholds};
use node_metrics::MetricsSource;
use std::fs::File;
use std::future::Future;
use std::io::BufWriter;
use tokio::time::{interval_at, Duration, Instant};

/// Result of a single driver tick
#[derive(Debug)]
pub enum TickOutcome {
    Decided(DecisionReport),
    /// An unreadable row was skipped
    Skipped,
    /// The source has no more records
    Exhausted,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub decisions: u64,
    pub skipped: u64,
}

/// Pulls metrics from a source, runs the policy and records the outcome.
///
/// The driver owns the only handle to its source, so records are read
/// strictly one at a time.
pub struct Driver {
    source: Box<dyn MetricsSource + Send>,
    thresholds: Thresholds,
    on_bad_row: BadRowPolicy,
    log: Option<DecisionLog<BufWriter<File>>>,
    stats: DriverStats,
    closed: bool,
}

impl Driver {
    pub fn new(source: Box<dyn MetricsSource + Send>, thresholds: Thresholds) -> Self {
        Self {
            source,
            thresholds,
            on_bad_row: BadRowPolicy::default(),
            log: None,
            stats: DriverStats::default(),
            closed: false,
        }
    }

    pub fn with_bad_row_policy(mut self, policy: BadRowPolicy) -> Self {
        self.on_bad_row = policy;
        self
    }

    pub fn with_decision_log(mut self, log: DecisionLog<BufWriter<File>>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    /// Swap thresholds between cycles
    pub fn set_thresholds(&mut self, thresholds: Thresholds) -> anyhow::Result<()> {
        thresholds.validate()?;
        tracing::info!(
            low = thresholds.low_load,
            medium = thresholds.medium_load,
            high = thresholds.high_load,
            latency_ms = thresholds.latency_threshold,
            energy = thresholds.energy_threshold,
            "Thresholds updated"
        );
        self.thresholds = thresholds;
        Ok(())
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    /// Read one record and decide on it. End of data and, under
    /// `BadRowPolicy::Skip`, parse errors are outcomes rather than errors.
    pub fn tick(&mut self) -> anyhow::Result<TickOutcome> {
        match self.source.next() {
            Ok(metrics) => Ok(TickOutcome::Decided(self.record(metrics)?)),
            Err(e) if e.is_end_of_data() => {
                tracing::info!(decisions = self.stats.decisions, "Metrics source exhausted");
                Ok(TickOutcome::Exhausted)
            }
            Err(e) if e.is_parse() && self.on_bad_row == BadRowPolicy::Skip => {
                tracing::warn!(error = %e, "Skipping unreadable metrics row");
                self.stats.skipped += 1;
                Ok(TickOutcome::Skipped)
            }
            Err(e) => Err(anyhow::Error::new(e).context("failed to read metrics")),
        }
    }

    /// Decide exactly once. Any source failure, end of data included, is an error.
    pub fn run_once(&mut self) -> anyhow::Result<DecisionReport> {
        let metrics = self.source.next().context("failed to read metrics")?;
        self.record(metrics)
    }

    /// Decide on every tick of `period` until the source runs dry or
    /// `shutdown` resolves. The first decision happens one period in.
    /// Closes the source before returning.
    pub async fn run_loop<S, F>(
        &mut self,
        period: Duration,
        shutdown: S,
        mut on_decision: F,
    ) -> anyhow::Result<DriverStats>
    where
        S: Future<Output = ()>,
        F: FnMut(&DecisionReport) -> anyhow::Result<()>,
    {
        let mut ticker = interval_at(Instant::now() + period, period);
        tokio::pin!(shutdown);

        tracing::info!(period_secs = period.as_secs_f64(), "Driver loop started");

        let result = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick() {
                        Ok(TickOutcome::Decided(report)) => {
                            if let Err(e) = on_decision(&report) {
                                break Err(e);
                            }
                        }
                        Ok(TickOutcome::Skipped) => {}
                        Ok(TickOutcome::Exhausted) => break Ok(()),
                        Err(e) => break Err(e),
                    }
                }
                _ = &mut shutdown => {
                    tracing::info!("Received shutdown signal");
                    break Ok(());
                }
            }
        };

        self.finish(result)?;
        Ok(self.stats)
    }

    /// Like `run_once`, but closes the driver afterwards whether or not a
    /// decision was made.
    pub fn run_once_and_close(&mut self) -> anyhow::Result<DecisionReport> {
        let result = self.run_once();
        self.finish(result)
    }

    /// Flush the decision log and release the source. Safe to call twice.
    pub fn close(&mut self) -> anyhow::Result<()> {
        let flushed = match self.log.as_mut() {
            Some(log) => log.flush(),
            None => Ok(()),
        };
        if !self.closed {
            self.closed = true;
            self.source.close().context("failed to close metrics source")?;
            tracing::debug!("Metrics source closed");
        }
        flushed
    }

    /// Close, then report the first error: `result`'s if it failed, otherwise the close error
    fn finish<T>(&mut self, result: anyhow::Result<T>) -> anyhow::Result<T> {
        let closed = self.close();
        match result {
            Ok(value) => closed.map(|_| value),
            Err(e) => {
                if let Err(close_err) = closed {
                    tracing::warn!(error = %close_err, "Failed to close driver after error");
                }
                Err(e)
            }
        }
    }

    fn record(&mut self, metrics: node_metrics::MetricsRecord) -> anyhow::Result<DecisionReport> {
        let decision = decide(&metrics, &self.thresholds);
        let guardrail = matches!(decision.rule, DecisionRule::Guardrail { .. });

        tracing::info!(
            users = metrics.active_users,
            tps = metrics.throughput_tps,
            latency_ms = metrics.latency_ms,
            energy = metrics.energy_normalized,
            consensus = %decision.consensus,
            guardrail,
            "Consensus selected"
        );

        let report = DecisionReport::new(metrics, self.thresholds, decision);
        if let Some(log) = self.log.as_mut() {
            log.append(&report).context("failed to write decision log")?;
        }
        self.stats.decisions += 1;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use consensus::ConsensusKind;
    use node_metrics::{CsvSource, MetricField, MetricsError, MetricsRecord, MetricsResult, RandomSource};
    use std::io::Cursor;

    fn replay(text: &str) -> Box<dyn MetricsSource + Send> {
        Box::new(CsvSource::from_reader(Cursor::new(text.as_bytes().to_vec())).unwrap())
    }

    const HEADER: &str = "ActiveUsers,ThroughputTPS,LatencyMS,EnergyNormalized\n";

    /// Counts how often `close` is forwarded to the source
    struct Counting {
        closes: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl MetricsSource for Counting {
        fn next(&mut self) -> MetricsResult<MetricsRecord> {
            Ok(MetricsRecord::new(1, 1.0, 1, 0.0))
        }

        fn close(&mut self) -> MetricsResult<()> {
            self.closes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    /// Every row is unreadable
    struct Garbled {
        closes: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl MetricsSource for Garbled {
        fn next(&mut self) -> MetricsResult<MetricsRecord> {
            Err(MetricsError::Parse {
                field: MetricField::ActiveUsers,
                value: "??".into(),
                line: 2,
                reason: "invalid digit found in string".into(),
            })
        }

        fn close(&mut self) -> MetricsResult<()> {
            self.closes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_tick_sequence() {
        let text = format!("{}100,50.0,200,0.1\nbad,1,1,1\n3000,400.0,600,0.1\n", HEADER);
        let mut driver = Driver::new(replay(&text), Thresholds::default());

        match driver.tick().unwrap() {
            TickOutcome::Decided(report) => assert_eq!(report.decision.consensus, ConsensusKind::PoW),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(driver.tick().unwrap(), TickOutcome::Skipped));
        match driver.tick().unwrap() {
            TickOutcome::Decided(report) => assert_eq!(report.decision.consensus, ConsensusKind::DPoS),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert!(matches!(driver.tick().unwrap(), TickOutcome::Exhausted));

        assert_eq!(driver.stats(), DriverStats { decisions: 2, skipped: 1 });
    }

    #[test]
    fn test_abort_on_bad_row() {
        let text = format!("{}bad,1,1,1\n", HEADER);
        let mut driver =
            Driver::new(replay(&text), Thresholds::default()).with_bad_row_policy(BadRowPolicy::Abort);

        assert!(driver.tick().is_err());
    }

    #[test]
    fn test_run_once_fails_on_empty_source() {
        let mut driver = Driver::new(replay(HEADER), Thresholds::default());
        assert!(driver.run_once().is_err());
    }

    #[test]
    fn test_run_once_with_random_source() {
        let mut driver = Driver::new(Box::new(RandomSource::seeded(8)), Thresholds::default());
        let report = driver.run_once().unwrap();
        assert_eq!(report.decision, decide(&report.metrics, &Thresholds::default()));
        assert_eq!(driver.stats().decisions, 1);
    }

    #[test]
    fn test_set_thresholds() {
        let text = format!("{}3000,400.0,200,0.1\n3000,400.0,200,0.1\n", HEADER);
        let mut driver = Driver::new(replay(&text), Thresholds::default());

        let first = driver.run_once().unwrap();
        assert_eq!(first.decision.consensus, ConsensusKind::PoS);

        let raised = Thresholds {
            medium_load: 4_000,
            ..Thresholds::default()
        };
        driver.set_thresholds(raised).unwrap();
        let second = driver.run_once().unwrap();
        assert_eq!(second.decision.consensus, ConsensusKind::APoW);

        let invalid = Thresholds {
            low_load: 0,
            ..Thresholds::default()
        };
        assert!(driver.set_thresholds(invalid).is_err());
        assert_eq!(driver.thresholds(), &raised);
    }

    #[test]
    fn test_close_forwards_once() {
        let closes = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let source = Counting {
            closes: closes.clone(),
        };
        let mut driver = Driver::new(Box::new(source), Thresholds::default());

        driver.close().unwrap();
        driver.close().unwrap();
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_at_end_of_data() {
        let text = format!("{}100,50.0,200,0.1\n300,80.0,200,0.1\n8000,900.0,200,0.1\n", HEADER);
        let mut driver = Driver::new(replay(&text), Thresholds::default());

        let mut seen = Vec::new();
        let stats = driver
            .run_loop(Duration::from_secs(5), std::future::pending::<()>(), |report| {
                seen.push(report.decision.consensus);
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![ConsensusKind::PoW, ConsensusKind::APoW, ConsensusKind::DPoS]);
        assert_eq!(stats.decisions, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_stops_on_shutdown() {
        let mut driver = Driver::new(Box::new(RandomSource::seeded(1)), Thresholds::default());

        let mut count = 0;
        let shutdown = tokio::time::sleep(Duration::from_millis(3_500));
        let stats = driver
            .run_loop(Duration::from_secs(1), shutdown, |_| {
                count += 1;
                Ok(())
            })
            .await
            .unwrap();

        assert_eq!(count, 3);
        assert_eq!(stats.decisions, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_closes_source_on_abort() {
        let closes = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let source = Garbled {
            closes: closes.clone(),
        };
        let mut driver =
            Driver::new(Box::new(source), Thresholds::default()).with_bad_row_policy(BadRowPolicy::Abort);

        let result = driver
            .run_loop(Duration::from_secs(1), std::future::pending::<()>(), |_| Ok(()))
            .await;

        assert!(result.is_err());
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_closes_source_when_callback_fails() {
        let closes = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let source = Counting {
            closes: closes.clone(),
        };
        let mut driver = Driver::new(Box::new(source), Thresholds::default());

        let result = driver
            .run_loop(Duration::from_secs(1), std::future::pending::<()>(), |_| {
                anyhow::bail!("stdout closed")
            })
            .await;

        assert_eq!(result.unwrap_err().to_string(), "stdout closed");
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(driver.stats().decisions, 1);
    }

    #[test]
    fn test_run_once_and_close() {
        let closes = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut driver = Driver::new(
            Box::new(Garbled {
                closes: closes.clone(),
            }),
            Thresholds::default(),
        );
        assert!(driver.run_once_and_close().is_err());
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);

        let closes = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut driver = Driver::new(
            Box::new(Counting {
                closes: closes.clone(),
            }),
            Thresholds::default(),
        );
        let report = driver.run_once_and_close().unwrap();
        assert_eq!(report.decision.consensus, ConsensusKind::PoW);
        assert_eq!(closes.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
