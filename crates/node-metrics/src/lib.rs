// node-metrics/src/lib.rs

//! Node Load Metrics Sources
//!
//! This crate provides the metrics side of the adaptive consensus selector:
//! - `MetricsRecord`: one sample of users, throughput, latency and energy
//! - `MetricsSource`: pluggable producer of records (`next` / `close`)
//! - `RandomSource` and `LoadSimulator`: synthetic generators
//! - `CsvSource`: replay of recorded rows
//! - `MetricsRecorder`: writes records in the replay format
//!
//! Sources never log, retry or skip rows; every failure is returned to the
//! caller, which owns the recovery policy.

pub mod record;
pub mod synthetic;
pub mod replay;
pub mod recorder;

pub use record::{MetricField, MetricsRecord};
pub use synthetic::{LoadSimulator, RandomSource};
pub use replay::{ColumnMap, CsvSource};
pub use recorder::MetricsRecorder;

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;

/// Errors that can occur while producing metrics
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Missing CSV column: {0}")]
    MissingColumn(MetricField),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Parse error on line {line}: cannot read {field} from {value:?} ({reason})")]
    Parse {
        field: MetricField,
        value: String,
        line: usize,
        reason: String,
    },

    #[error("End of data")]
    EndOfData,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MetricsError {
    /// Source is exhausted; a normal stop signal rather than a failure
    pub fn is_end_of_data(&self) -> bool {
        matches!(self, MetricsError::EndOfData)
    }

    /// The source cannot be used at all (bad header)
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            MetricsError::MissingColumn(_) | MetricsError::MalformedHeader(_)
        )
    }

    /// A single row was unreadable; later rows may still be fine
    pub fn is_parse(&self) -> bool {
        matches!(self, MetricsError::Parse { .. })
    }
}

/// A producer of metrics records.
///
/// Implementations hold a cursor (RNG state or file position) and are
/// single-caller: both methods take `&mut self`, so sharing a source across
/// threads requires the caller to wrap it in a lock.
pub trait MetricsSource {
    /// Produce the next record.
    ///
    /// Returns `MetricsError::EndOfData` once a finite source is exhausted.
    fn next(&mut self) -> MetricsResult<MetricsRecord>;

    /// Release any underlying resource. Calling it more than once is a no-op.
    fn close(&mut self) -> MetricsResult<()>;
}

impl<S: MetricsSource + ?Sized> MetricsSource for Box<S> {
    fn next(&mut self) -> MetricsResult<MetricsRecord> {
        (**self).next()
    }

    fn close(&mut self) -> MetricsResult<()> {
        (**self).close()
    }
}
