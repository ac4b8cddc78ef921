//! Core dataset definitions: raw tables, series, records and windows.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::time::{self, Frequency};

/// Time-indexed table with one numeric column per series.
///
/// `values[c][r]` is column `c` at `index[r]`. Missing cells are NaN.
#[derive(Clone, Debug, PartialEq)]
pub struct RawTable {
    pub index: Vec<NaiveDateTime>,
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl RawTable {
    pub fn new(
        index: Vec<NaiveDateTime>,
        columns: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> PipelineResult<Self> {
        let table = Self {
            index,
            columns,
            values,
        };
        table.check_shape()?;
        Ok(table)
    }

    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn num_series(&self) -> usize {
        self.columns.len()
    }

    fn check_shape(&self) -> PipelineResult<()> {
        if self.values.len() != self.columns.len() {
            return Err(PipelineError::data_format(format!(
                "{} columns named but {} present",
                self.columns.len(),
                self.values.len()
            )));
        }
        if let Some((c, col)) = self
            .values
            .iter()
            .enumerate()
            .find(|(_, col)| col.len() != self.index.len())
        {
            return Err(PipelineError::data_format(format!(
                "column '{}' has {} values for {} timestamps",
                self.columns[c],
                col.len(),
                self.index.len()
            )));
        }
        Ok(())
    }

    /// Shape check plus strictly increasing index.
    pub fn validate(&self) -> PipelineResult<()> {
        self.check_shape()?;
        if let Some(pos) = self.index.windows(2).position(|w| w[0] >= w[1]) {
            return Err(PipelineError::data_format(format!(
                "index not strictly increasing at row {}: {} then {}",
                pos + 1,
                time::format_timestamp(&self.index[pos]),
                time::format_timestamp(&self.index[pos + 1])
            )));
        }
        Ok(())
    }

    /// Stack tables row-wise; every table must carry the same columns.
    pub fn concat(tables: Vec<RawTable>) -> PipelineResult<RawTable> {
        let mut iter = tables.into_iter();
        let mut out = iter
            .next()
            .ok_or_else(|| PipelineError::data_format("no tables to concatenate"))?;
        for table in iter {
            if table.columns != out.columns {
                return Err(PipelineError::data_format(format!(
                    "column mismatch while concatenating: {:?} vs {:?}",
                    out.columns, table.columns
                )));
            }
            out.index.extend(table.index);
            for (dst, src) in out.values.iter_mut().zip(table.values) {
                dst.extend(src);
            }
        }
        Ok(out)
    }
}

/// One entity's observations on a uniform grid.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeries {
    pub name: String,
    pub start: NaiveDateTime,
    pub freq: Frequency,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(
        name: impl Into<String>,
        start: NaiveDateTime,
        freq: Frequency,
        values: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            start,
            freq,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamp_at(&self, i: usize) -> NaiveDateTime {
        self.freq.advance(self.start, i as i64)
    }

    /// Timestamp of the last value, if any.
    pub fn last_timestamp(&self) -> Option<NaiveDateTime> {
        self.len().checked_sub(1).map(|i| self.timestamp_at(i))
    }

    /// Values with timestamps in `[from, until)`, as a record.
    ///
    /// The record starts at its first retained value, or at `from` when
    /// nothing falls inside the range. Ranges past the data are truncated.
    pub fn window(&self, from: NaiveDateTime, until: NaiveDateTime) -> TimeSeriesRecord {
        let clamp = |steps: i64| steps.clamp(0, self.len() as i64) as usize;
        let lo = clamp(self.freq.steps_between_ceil(self.start, from));
        let hi = clamp(self.freq.steps_between_ceil(self.start, until));
        if lo >= hi {
            return TimeSeriesRecord::new(from, Vec::new());
        }
        TimeSeriesRecord::new(self.timestamp_at(lo), self.values[lo..hi].to_vec())
    }
}

/// Line-delimited record consumed by the forecasting service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesRecord {
    #[serde(with = "time::timestamp")]
    pub start: NaiveDateTime,
    pub target: Vec<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cat: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_feat: Option<Vec<Vec<f64>>>,
}

impl TimeSeriesRecord {
    pub fn new(start: NaiveDateTime, target: Vec<f64>) -> Self {
        Self {
            start,
            target,
            cat: None,
            dynamic_feat: None,
        }
    }

    pub fn with_cat(mut self, cat: i64) -> Self {
        self.cat = Some(cat);
        self
    }
}

/// Bucket aggregation applied to the raw table.
#[derive(Clone, Debug, PartialEq)]
pub struct Resample {
    pub freq: Frequency,
    /// Bucket sums are divided by this value.
    pub divisor: f64,
}

/// Where training and test windows are cut.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowSpec {
    pub start_dataset: NaiveDateTime,
    pub end_training: NaiveDateTime,
    pub prediction_length: usize,
    pub num_test_windows: usize,
    pub freq: Frequency,
}

impl WindowSpec {
    pub fn validate(&self) -> PipelineResult<()> {
        if self.start_dataset >= self.end_training {
            return Err(PipelineError::config(
                "start_dataset must precede end_training",
            ));
        }
        if self.prediction_length == 0 {
            return Err(PipelineError::config("prediction_length must be positive"));
        }
        if self.num_test_windows == 0 {
            return Err(PipelineError::config("num_test_windows must be positive"));
        }
        Ok(())
    }

    /// Exclusive end of test window `k` (1-based).
    pub fn test_end(&self, k: usize) -> NaiveDateTime {
        self.freq
            .advance(self.end_training, (k * self.prediction_length) as i64)
    }
}

/// Training and test records ready to be written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Windows {
    pub train: Vec<TimeSeriesRecord>,
    /// Ordered by window index, then by series.
    pub test: Vec<TimeSeriesRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::time::{parse_timestamp, TWO_HOURS};

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    #[test]
    fn validate_rejects_out_of_order_index() {
        let table = RawTable::new(
            vec![ts("2014-01-01 02:00"), ts("2014-01-01 01:00")],
            vec!["MT_001".into()],
            vec![vec![1.0, 2.0]],
        )
        .unwrap();
        assert!(matches!(table.validate(), Err(PipelineError::DataFormat(_))));
    }

    #[test]
    fn ragged_columns_are_rejected() {
        let err = RawTable::new(
            vec![ts("2014-01-01 00:00")],
            vec!["MT_001".into()],
            vec![vec![1.0, 2.0]],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::DataFormat(_)));
    }

    #[test]
    fn concat_requires_matching_columns() {
        let a = RawTable::new(vec![ts("2014-01-01")], vec!["a".into()], vec![vec![1.0]]).unwrap();
        let b = RawTable::new(vec![ts("2014-01-02")], vec!["b".into()], vec![vec![2.0]]).unwrap();
        assert!(RawTable::concat(vec![a.clone(), b]).is_err());

        let c = RawTable::new(vec![ts("2014-01-03")], vec!["a".into()], vec![vec![3.0]]).unwrap();
        let joined = RawTable::concat(vec![a, c]).unwrap();
        assert_eq!(joined.values, vec![vec![1.0, 3.0]]);
        assert_eq!(joined.num_rows(), 2);
    }

    #[test]
    fn window_is_half_open_and_truncated() {
        let series = TimeSeries::new(
            "MT_001",
            ts("2014-01-01 00:00"),
            TWO_HOURS,
            vec![1.0, 2.0, 3.0, 4.0, 5.0],
        );
        let rec = series.window(ts("2014-01-01 02:00"), ts("2014-01-01 06:00"));
        assert_eq!(rec.start, ts("2014-01-01 02:00"));
        assert_eq!(rec.target, vec![2.0, 3.0]);

        let past_end = series.window(ts("2014-01-01 00:00"), ts("2014-01-03 00:00"));
        assert_eq!(past_end.target.len(), 5);

        let empty = series.window(ts("2014-02-01 00:00"), ts("2014-03-01 00:00"));
        assert!(empty.target.is_empty());
        assert_eq!(empty.start, ts("2014-02-01 00:00"));
    }

    #[test]
    fn optional_fields_are_omitted_from_json() {
        let rec = TimeSeriesRecord::new(ts("2014-01-01 00:00"), vec![1.5, 2.0]);
        assert_eq!(
            serde_json::to_string(&rec).unwrap(),
            r#"{"start":"2014-01-01 00:00:00","target":[1.5,2.0]}"#
        );
        let with_cat = rec.with_cat(3);
        assert!(serde_json::to_string(&with_cat).unwrap().contains(r#""cat":3"#));
    }
}
