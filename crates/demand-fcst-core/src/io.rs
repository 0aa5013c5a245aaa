//! Reading monthly quantities and writing forecast exports.
//!
//! Both formats are semicolon-delimited with a comma decimal separator and a
//! `year;month;quantity` header.

use crate::error::{ForecastError, Result};
use crate::forecast::ForecastRow;
use crate::series::Observation;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use std::fs;
use std::path::Path;

const HEADER: [&str; 3] = ["year", "month", "quantity"];

/// One line of an exported forecast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportRow {
    pub year: i32,
    pub month: u32,
    pub quantity: f64,
}

fn load_error(path: &Path, reason: impl Into<String>) -> ForecastError {
    ForecastError::DataLoad {
        path: path.display().to_string(),
        reason: reason.into(),
    }
}

/// Parse a number written with either decimal separator.
fn parse_decimal(field: &str) -> Option<f64> {
    field.trim().replace(',', ".").parse::<f64>().ok()
}

fn format_decimal(value: f64) -> String {
    value.to_string().replace('.', ",")
}

fn read_rows(path: &Path) -> Result<Vec<(u64, StringRecord)>> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| load_error(path, e.to_string()))?;

    let headers = reader
        .headers()
        .map_err(|e| load_error(path, e.to_string()))?
        .clone();
    let names: Vec<String> = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
    if names != HEADER {
        return Err(load_error(
            path,
            format!("expected header 'year;month;quantity', found '{}'", names.join(";")),
        ));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| load_error(path, e.to_string()))?;
        let line = record.position().map_or(0, |p| p.line());
        rows.push((line, record));
    }
    Ok(rows)
}

fn parse_row(path: &Path, line: u64, record: &StringRecord) -> Result<(i32, u32, f64)> {
    let field = |i: usize| record.get(i).unwrap_or("");
    let year = field(0)
        .parse::<i32>()
        .map_err(|_| load_error(path, format!("line {}: invalid year '{}'", line, field(0))))?;
    let month = field(1)
        .parse::<u32>()
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| load_error(path, format!("line {}: invalid month '{}'", line, field(1))))?;
    let quantity = parse_decimal(field(2))
        .filter(|q| q.is_finite())
        .ok_or_else(|| {
            load_error(path, format!("line {}: invalid quantity '{}'", line, field(2)))
        })?;
    Ok((year, month, quantity))
}

/// Load the monthly history, sorted by date.
///
/// Quantities are rounded to the nearest integer.
pub fn load_observations(path: impl AsRef<Path>) -> Result<Vec<Observation>> {
    let path = path.as_ref();
    let mut observations = read_rows(path)?
        .iter()
        .map(|(line, record)| {
            let (year, month, quantity) = parse_row(path, *line, record)?;
            Observation::from_year_month(year, month, quantity.round() as i64)
                .map_err(|e| load_error(path, format!("line {}: {}", line, e)))
        })
        .collect::<Result<Vec<_>>>()?;

    observations.sort_by_key(|o| o.date);
    tracing::debug!(path = %path.display(), rows = observations.len(), "loaded observations");
    Ok(observations)
}

/// Write the horizon rows of a forecast table.
///
/// Rows with an actual are skipped; the exported quantity is the point
/// forecast. Missing parent directories are created.
pub fn export_forecast(path: impl AsRef<Path>, rows: &[ForecastRow]) -> Result<usize> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut writer = WriterBuilder::new()
        .delimiter(b';')
        .from_path(path)
        .map_err(|e| ForecastError::Io(e.into()))?;
    writer
        .write_record(HEADER)
        .map_err(|e| ForecastError::Io(e.into()))?;

    let mut written = 0;
    for row in rows.iter().filter(|r| r.is_future()) {
        writer
            .write_record([
                row.year().to_string(),
                row.month().to_string(),
                format_decimal(row.yhat),
            ])
            .map_err(|e| ForecastError::Io(e.into()))?;
        written += 1;
    }
    writer.flush()?;

    tracing::info!(path = %path.display(), rows = written, "exported forecast");
    Ok(written)
}

/// Read an exported forecast back.
pub fn read_export(path: impl AsRef<Path>) -> Result<Vec<ExportRow>> {
    let path = path.as_ref();
    read_rows(path)?
        .iter()
        .map(|(line, record)| {
            let (year, month, quantity) = parse_row(path, *line, record)?;
            Ok(ExportRow {
                year,
                month,
                quantity,
            })
        })
        .collect()
}
