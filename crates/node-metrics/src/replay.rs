// node-metrics/src/replay.rs

//! Replay of recorded metrics rows.
//!
//! Expected header (order flexible, case-insensitive, whitespace ignored):
//! `ActiveUsers, ThroughputTPS, LatencyMS, EnergyNormalized`.
//! Extra columns are ignored. Example row: `1200, 380.5, 640, 0.62`.
//!
//! Quoted cells are supported, cells spanning several lines are not.

use crate::record::normalize_header;
use crate::{MetricField, MetricsError, MetricsRecord, MetricsResult, MetricsSource};
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::str::FromStr;

/// Physical column position of each required field, resolved once from the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    positions: [usize; 4],
}

impl ColumnMap {
    /// Resolve required fields against header cells.
    /// When two cells normalize to the same name the later one wins.
    pub fn from_header<S: AsRef<str>>(cells: &[S]) -> MetricsResult<Self> {
        let by_name: HashMap<String, usize> = cells
            .iter()
            .enumerate()
            .map(|(ix, cell)| (normalize_header(cell.as_ref()), ix))
            .collect();

        let mut positions = [0usize; 4];
        for field in MetricField::ALL {
            positions[field.slot()] = *by_name
                .get(field.key())
                .ok_or(MetricsError::MissingColumn(field))?;
        }

        Ok(Self { positions })
    }

    pub fn position(&self, field: MetricField) -> usize {
        self.positions[field.slot()]
    }

    /// Parse one data row into a record
    pub fn parse_row<S: AsRef<str>>(&self, cells: &[S], line: usize) -> MetricsResult<MetricsRecord> {
        Ok(MetricsRecord {
            active_users: self.parse_cell(cells, MetricField::ActiveUsers, line)?,
            throughput_tps: self.parse_cell(cells, MetricField::ThroughputTps, line)?,
            latency_ms: self.parse_cell(cells, MetricField::LatencyMs, line)?,
            energy_normalized: self.parse_cell(cells, MetricField::EnergyNormalized, line)?,
        })
    }

    fn parse_cell<S, T>(&self, cells: &[S], field: MetricField, line: usize) -> MetricsResult<T>
    where
        S: AsRef<str>,
        T: FromStr,
        T::Err: Display,
    {
        let raw = match cells.get(self.position(field)) {
            Some(cell) => cell.as_ref().trim(),
            None => {
                return Err(MetricsError::Parse {
                    field,
                    value: String::new(),
                    line,
                    reason: format!("row has only {} cells", cells.len()),
                })
            }
        };

        raw.parse::<T>().map_err(|e| MetricsError::Parse {
            field,
            value: raw.to_string(),
            line,
            reason: e.to_string(),
        })
    }
}

/// Metrics source replaying rows from a CSV stream
pub struct CsvSource<R = BufReader<File>> {
    /// `None` once closed
    reader: Option<R>,
    columns: ColumnMap,
    /// 1-based line number of the last line read
    line: usize,
    buf: Vec<u8>,
}

impl CsvSource<BufReader<File>> {
    /// Open a file and resolve its header
    pub fn open<P: AsRef<Path>>(path: P) -> MetricsResult<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}

impl<R: BufRead> CsvSource<R> {
    /// Read the header from `reader`. Leading blank lines are skipped.
    pub fn from_reader(mut reader: R) -> MetricsResult<Self> {
        let mut buf = Vec::new();
        let mut line = 0;

        let columns = loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Err(MetricsError::MalformedHeader("no header row".into()));
            }
            line += 1;

            let text = String::from_utf8_lossy(&buf);
            let row = trim_newline(&text);
            if row.trim().is_empty() {
                continue;
            }
            break ColumnMap::from_header(split_row(row).as_slice())?;
        };

        Ok(Self {
            reader: Some(reader),
            columns,
            line,
            buf,
        })
    }

    pub fn columns(&self) -> &ColumnMap {
        &self.columns
    }

    /// Line number of the most recently read line (the header is line 1)
    pub fn line(&self) -> usize {
        self.line
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

impl<R: BufRead> MetricsSource for CsvSource<R> {
    fn next(&mut self) -> MetricsResult<MetricsRecord> {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return Err(MetricsError::EndOfData),
        };

        loop {
            self.buf.clear();
            if reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Err(MetricsError::EndOfData);
            }
            self.line += 1;

            // Undecodable bytes only matter if they land in a required cell,
            // where they fail to parse like any other bad value
            let text = String::from_utf8_lossy(&self.buf);
            let row = trim_newline(&text);
            if row.trim().is_empty() {
                continue;
            }
            return self.columns.parse_row(split_row(row).as_slice(), self.line);
        }
    }

    fn close(&mut self) -> MetricsResult<()> {
        // Dropping the reader releases the file handle
        self.reader.take();
        Ok(())
    }
}

fn trim_newline(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// Split one CSV line into cells, honoring double quotes and `""` escapes.
fn split_row(row: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = row.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell)),
            _ => cell.push(c),
        }
    }
    cells.push(cell);

    cells
}
