//! Reads raw CSV exports from the object store into one table.

use chrono::NaiveDateTime;

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::time;
use crate::store::{ObjectStore, StorePath};

use super::domain::RawTable;

/// Layout of the raw exports: timestamp index in column 0, one column per
/// series, a header row naming the series.
#[derive(Clone, Debug)]
pub struct CsvFormat {
    pub delimiter: u8,
    pub decimal_mark: char,
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self {
            delimiter: b';',
            decimal_mark: ',',
        }
    }
}

/// Parse one export. Empty cells become NaN.
pub fn parse_csv(bytes: &[u8], format: &CsvFormat, source: &str) -> PipelineResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .map_err(|err| PipelineError::data_format(format!("{source}: bad header: {err}")))?;
    let columns: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();
    if columns.is_empty() {
        return Err(PipelineError::data_format(format!(
            "{source}: no series columns"
        )));
    }

    let mut index: Vec<NaiveDateTime> = Vec::new();
    let mut values = vec![Vec::new(); columns.len()];
    for (row, record) in reader.records().enumerate() {
        let record = record
            .map_err(|err| PipelineError::data_format(format!("{source}: row {row}: {err}")))?;
        let stamp = record.get(0).unwrap_or_default();
        index.push(time::parse_timestamp(stamp).map_err(|err| {
            PipelineError::data_format(format!("{source}: row {row}: {err}"))
        })?);
        for (col, cell) in record.iter().skip(1).enumerate() {
            values[col].push(parse_number(cell, format.decimal_mark).ok_or_else(|| {
                PipelineError::data_format(format!(
                    "{source}: row {row}, column '{}': not a number: '{cell}'",
                    columns[col]
                ))
            })?);
        }
    }

    RawTable::new(index, columns, values)
}

fn parse_number(cell: &str, decimal_mark: char) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return Some(f64::NAN);
    }
    if decimal_mark == '.' {
        cell.parse().ok()
    } else {
        cell.replace(decimal_mark, ".").parse().ok()
    }
}

/// Lists and fetches every export under a prefix.
pub struct StoreReader<'a> {
    store: &'a dyn ObjectStore,
    format: CsvFormat,
}

impl<'a> StoreReader<'a> {
    pub fn new(store: &'a dyn ObjectStore, format: CsvFormat) -> Self {
        Self { store, format }
    }

    /// Concatenate all objects under `prefix` in key order.
    ///
    /// Directory markers are skipped. An empty listing is a store error.
    pub fn read_prefix(&self, prefix: &StorePath) -> PipelineResult<RawTable> {
        let listing = self.store.list(prefix.bucket(), prefix.key())?;
        let mut tables = Vec::with_capacity(listing.len());
        for meta in listing.iter().filter(|m| !m.is_directory_marker()) {
            let path = StorePath::new(prefix.bucket(), meta.key.clone());
            let body = self.store.get(&path)?;
            let table = parse_csv(&body, &self.format, &path.to_string())?;
            tracing::info!(%path, rows = table.num_rows(), series = table.num_series(), "raw export loaded");
            tables.push(table);
        }
        if tables.is_empty() {
            return Err(PipelineError::store(prefix, "no raw objects under prefix"));
        }
        RawTable::concat(tables)
    }
}
