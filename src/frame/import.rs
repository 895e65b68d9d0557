//! CSV frame loading
//!
//! Builds a series frame from CSV: one column is the time axis, every other
//! column becomes a numeric field. Empty cells are missing values.

use super::error::{FrameError, FrameResult};
use super::types::{Field, Frame};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::path::Path;

/// CSV frame reader with configurable column mapping
#[derive(Debug, Clone)]
pub struct CsvFrameReader {
    /// Column index for timestamps; auto-detected from the header when `None`
    time_column: Option<usize>,
    /// Format string tried first when parsing timestamps
    time_format: String,
    /// Whether the CSV has a header row
    has_header: bool,
}

impl Default for CsvFrameReader {
    fn default() -> Self {
        Self::new()
    }
}

impl CsvFrameReader {
    /// Create a reader that auto-detects the time column
    pub fn new() -> Self {
        Self {
            time_column: None,
            time_format: "%Y-%m-%d %H:%M:%S".to_string(),
            has_header: true,
        }
    }

    /// Set the time column index
    pub fn with_time_column(mut self, column: usize) -> Self {
        self.time_column = Some(column);
        self
    }

    /// Set the timestamp format string
    pub fn with_time_format(mut self, format: &str) -> Self {
        self.time_format = format.to_string();
        self
    }

    /// Set whether the CSV has a header row
    pub fn with_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    /// Read a frame from a CSV file
    pub fn read_path(&self, name: &str, path: &Path) -> FrameResult<Frame> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(self.has_header)
            .from_path(path)?;
        self.read(name, reader)
    }

    /// Read a frame from a CSV string (useful for testing)
    pub fn read_str(&self, name: &str, data: &str) -> FrameResult<Frame> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(self.has_header)
            .from_reader(data.as_bytes());
        self.read(name, reader)
    }

    fn read<R: std::io::Read>(&self, name: &str, mut reader: csv::Reader<R>) -> FrameResult<Frame> {
        let headers: Vec<String> = if self.has_header {
            reader.headers()?.iter().map(|h| h.trim().to_string()).collect()
        } else {
            Vec::new()
        };

        let time_column = self
            .time_column
            .or_else(|| detect_time_column(&headers))
            .unwrap_or(0);

        let mut rows: Vec<(i64, Vec<Option<f64>>)> = Vec::new();
        let mut width = headers.len();

        for (line_num, result) in reader.records().enumerate() {
            let line = if self.has_header { line_num + 2 } else { line_num + 1 };
            let record = result?;
            width = width.max(record.len());

            let ts_str = record
                .get(time_column)
                .map(str::trim)
                .ok_or_else(|| FrameError::Csv(format!("Line {}: missing time column", line)))?;
            let timestamp = self
                .parse_timestamp(ts_str)
                .map_err(|e| FrameError::Timestamp(format!("line {}: {}", line, e)))?;

            let mut values = Vec::with_capacity(record.len().saturating_sub(1));
            for (idx, cell) in record.iter().enumerate() {
                if idx == time_column {
                    continue;
                }
                let cell = cell.trim();
                if cell.is_empty() {
                    values.push(None);
                    continue;
                }
                let value = parse_cell(cell).ok_or_else(|| {
                    FrameError::Csv(format!("Line {}: '{}' is not a number", line, cell))
                })?;
                values.push(Some(value));
            }
            rows.push((timestamp, values));
        }

        // Time-series frames need a non-decreasing axis
        rows.sort_by_key(|(ts, _)| *ts);

        let field_count = width.saturating_sub(1);
        let field_names: Vec<String> = (0..width)
            .filter(|idx| *idx != time_column)
            .map(|idx| {
                headers
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| format!("field_{}", idx))
            })
            .collect();

        let time: Vec<i64> = rows.iter().map(|(ts, _)| *ts).collect();
        let fields = (0..field_count)
            .map(|i| {
                let values = rows
                    .iter()
                    .map(|(_, values)| values.get(i).copied().flatten())
                    .collect();
                Field::number(field_names[i].clone(), values)
            })
            .collect();

        Frame::series(name, time, fields)
    }

    /// Parse a timestamp cell: epoch millis, RFC 3339, the configured format, or a common date format
    fn parse_timestamp(&self, ts_str: &str) -> FrameResult<i64> {
        if let Ok(millis) = ts_str.parse::<i64>() {
            return Ok(millis);
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(ts_str) {
            return Ok(dt.with_timezone(&Utc).timestamp_millis());
        }

        if let Ok(dt) = NaiveDateTime::parse_from_str(ts_str, &self.time_format) {
            return Ok(dt.and_utc().timestamp_millis());
        }

        let formats = [
            "%Y-%m-%d %H:%M:%S",
            "%Y-%m-%dT%H:%M:%S",
            "%Y-%m-%dT%H:%M:%SZ",
            "%Y/%m/%d %H:%M:%S",
        ];
        for fmt in formats {
            if let Ok(dt) = NaiveDateTime::parse_from_str(ts_str, fmt) {
                return Ok(dt.and_utc().timestamp_millis());
            }
        }

        for fmt in ["%Y-%m-%d", "%Y/%m/%d"] {
            if let Ok(date) = NaiveDate::parse_from_str(ts_str, fmt) {
                if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                    return Ok(dt.and_utc().timestamp_millis());
                }
            }
        }

        Err(FrameError::Timestamp(ts_str.to_string()))
    }
}

/// Pick the first header that looks like a time column
fn detect_time_column(headers: &[String]) -> Option<usize> {
    headers.iter().position(|h| {
        let h = h.to_lowercase();
        h.contains("time") || h.contains("date") || h == "ts"
    })
}

fn parse_cell(cell: &str) -> Option<f64> {
    match cell {
        "NaN" | "nan" => Some(f64::NAN),
        "+Inf" | "Inf" | "inf" => Some(f64::INFINITY),
        "-Inf" | "-inf" => Some(f64::NEG_INFINITY),
        _ => cell.parse::<f64>().ok(),
    }
}

/// Read a CSV file with header auto-detection
pub fn read_csv_frame(name: &str, path: &Path) -> FrameResult<Frame> {
    CsvFrameReader::new().read_path(name, path)
}
