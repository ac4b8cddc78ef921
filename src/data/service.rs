//! Dataset builder: resampling, leading-zero trimming and window carving,
//! plus the data preparation phase that ties reader, builder and writer.

use std::path::Path;

use crate::common::config::PipelineConfig;
use crate::common::error::{PipelineError, PipelineResult};
use crate::common::log;
use crate::store::{ObjectStore, StorePath};

use super::domain::{RawTable, Resample, TimeSeries, WindowSpec, Windows};
use super::reader::{CsvFormat, StoreReader};
use super::writer::{self, ArtifactWriter, UploadOutcome};

/// Aggregate the table onto a dense grid of `resample.freq` buckets.
///
/// Each bucket holds the sum of its non-missing raw values divided by
/// `resample.divisor`; buckets with no data hold zero.
pub fn resample(table: &RawTable, resample: &Resample) -> PipelineResult<RawTable> {
    table.validate()?;
    let (Some(first), Some(last)) = (table.index.first(), table.index.last()) else {
        return Err(PipelineError::data_format("cannot resample an empty table"));
    };

    let freq = &resample.freq;
    let origin = freq.floor(*first);
    let buckets = (freq.floor(*last) - origin).num_seconds() / freq.step_seconds() + 1;
    let buckets = usize::try_from(buckets)
        .map_err(|_| PipelineError::data_format("resampled range is negative"))?;

    let slot = |ts| ((freq.floor(ts) - origin).num_seconds() / freq.step_seconds()) as usize;
    let mut values = vec![vec![0.0; buckets]; table.num_series()];
    for (col, raw) in table.values.iter().enumerate() {
        for (ts, v) in table.index.iter().zip(raw) {
            if !v.is_nan() {
                values[col][slot(*ts)] += v;
            }
        }
    }
    for column in &mut values {
        for v in column.iter_mut() {
            *v /= resample.divisor;
        }
    }

    let index = (0..buckets)
        .map(|i| freq.advance(origin, i as i64))
        .collect();
    RawTable::new(index, table.columns.clone(), values)
}

/// Index of the first nonzero value; `values.len()` when all are zero.
pub fn leading_zeros(values: &[f64]) -> usize {
    values
        .iter()
        .position(|v| *v != 0.0)
        .unwrap_or(values.len())
}

/// Split a resampled table into per-column series with leading zeros
/// trimmed. An all-zero column becomes an empty series starting one step
/// past the table's last timestamp.
pub fn to_series(table: &RawTable, resample: &Resample) -> PipelineResult<Vec<TimeSeries>> {
    table.validate()?;
    let Some(first) = table.index.first() else {
        return Ok(Vec::new());
    };
    let freq = &resample.freq;
    Ok(table
        .columns
        .iter()
        .zip(&table.values)
        .map(|(name, column)| {
            let skip = leading_zeros(column);
            TimeSeries::new(
                name.clone(),
                freq.advance(*first, skip as i64),
                freq.clone(),
                column[skip..].to_vec(),
            )
        })
        .collect())
}

/// Cut one training window per series and `num_test_windows` test windows
/// per series, the latter ordered by window index then series.
pub fn build_windows(series: &[TimeSeries], spec: &WindowSpec) -> PipelineResult<Windows> {
    spec.validate()?;
    let train = series
        .iter()
        .map(|s| s.window(spec.start_dataset, spec.end_training))
        .collect();
    let test = (1..=spec.num_test_windows)
        .flat_map(|k| {
            let until = spec.test_end(k);
            series
                .iter()
                .map(move |s| s.window(spec.start_dataset, until))
        })
        .collect();
    Ok(Windows { train, test })
}

/// Raw table in, training/test records out.
pub struct DatasetBuilder {
    pub resample: Resample,
    pub windows: WindowSpec,
}

impl DatasetBuilder {
    pub fn from_config(cfg: &PipelineConfig) -> Self {
        let ds = &cfg.dataset;
        Self {
            resample: Resample {
                freq: ds.freq.clone(),
                divisor: ds.resample_divisor,
            },
            windows: WindowSpec {
                start_dataset: ds.start_dataset,
                end_training: ds.end_training,
                prediction_length: ds.prediction_length,
                num_test_windows: ds.num_test_windows,
                freq: ds.freq.clone(),
            },
        }
    }

    pub fn build(&self, raw: &RawTable) -> PipelineResult<Windows> {
        let resampled = resample(raw, &self.resample)?;
        let series = to_series(&resampled, &self.resample)?;
        tracing::info!(
            series = series.len(),
            buckets = resampled.num_rows(),
            freq = %self.resample.freq,
            "raw table resampled"
        );
        build_windows(&series, &self.windows)
    }
}

/// Locations produced by the data preparation phase.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedData {
    pub train_path: StorePath,
    pub test_path: StorePath,
    pub output_path: StorePath,
    pub train_upload: UploadOutcome,
    pub test_upload: UploadOutcome,
}

/// Read raw exports, build windows, write and upload record files.
pub fn prepare(store: &dyn ObjectStore, cfg: &PipelineConfig) -> PipelineResult<PreparedData> {
    log::banner("start creating data");

    let format = CsvFormat {
        delimiter: cfg.dataset.csv_delimiter as u8,
        decimal_mark: cfg.dataset.decimal_mark,
    };
    let raw = StoreReader::new(store, format).read_prefix(&cfg.raw_path())?;
    let windows = DatasetBuilder::from_config(cfg).build(&raw)?;
    tracing::info!(
        train = windows.train.len(),
        test = windows.test.len(),
        "windows built"
    );

    if let Some(dir) = &cfg.dataset.local_copy_dir {
        writer::write_local_file(&Path::new(dir).join("train.json"), &windows.train)?;
        writer::write_local_file(&Path::new(dir).join("test.json"), &windows.test)?;
    }

    let data_path = cfg.data_path();
    let train_path = data_path.join("train/train.json");
    let test_path = data_path.join("test/test.json");
    let uploader = ArtifactWriter::new(store, cfg.dataset.override_existing);
    let train_upload = uploader.upload(&train_path, &windows.train)?;
    let test_upload = uploader.upload(&test_path, &windows.test)?;

    log::banner("creating data is finished");
    Ok(PreparedData {
        train_path,
        test_path,
        output_path: cfg.output_path(),
        train_upload,
        test_upload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::time::{parse_timestamp, TWO_HOURS};
    use chrono::NaiveDateTime;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    fn two_hourly() -> Resample {
        Resample {
            freq: TWO_HOURS,
            divisor: 8.0,
        }
    }

    fn spec(start: &str, end: &str, pl: usize, n: usize) -> WindowSpec {
        WindowSpec {
            start_dataset: ts(start),
            end_training: ts(end),
            prediction_length: pl,
            num_test_windows: n,
            freq: TWO_HOURS,
        }
    }

    #[test]
    fn resample_sums_buckets_and_fills_gaps() {
        let table = RawTable::new(
            vec![
                ts("2014-01-01 00:15"),
                ts("2014-01-01 01:45"),
                ts("2014-01-01 06:00"),
            ],
            vec!["MT_001".into()],
            vec![vec![8.0, 8.0, f64::NAN]],
        )
        .unwrap();
        let out = resample(&table, &two_hourly()).unwrap();
        assert_eq!(
            out.index,
            vec![
                ts("2014-01-01 00:00"),
                ts("2014-01-01 02:00"),
                ts("2014-01-01 04:00"),
                ts("2014-01-01 06:00"),
            ]
        );
        assert_eq!(out.values[0], vec![2.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn resample_rejects_non_monotonic_index() {
        let table = RawTable::new(
            vec![ts("2014-01-01 02:00"), ts("2014-01-01 02:00")],
            vec!["MT_001".into()],
            vec![vec![1.0, 1.0]],
        )
        .unwrap();
        assert!(matches!(
            resample(&table, &two_hourly()),
            Err(PipelineError::DataFormat(_))
        ));
    }

    #[test]
    fn trimming_keeps_first_nonzero_and_shifts_start() {
        assert_eq!(leading_zeros(&[0.0, 0.0, 3.0, 0.0]), 2);
        assert_eq!(leading_zeros(&[0.0, 0.0]), 2);
        assert_eq!(leading_zeros(&[]), 0);

        let table = RawTable::new(
            vec![
                ts("2014-01-01 00:00"),
                ts("2014-01-01 02:00"),
                ts("2014-01-01 04:00"),
            ],
            vec!["a".into(), "b".into()],
            vec![vec![0.0, 5.0, 0.0], vec![0.0, 0.0, 0.0]],
        )
        .unwrap();
        let series = to_series(&table, &two_hourly()).unwrap();
        assert_eq!(series[0].start, ts("2014-01-01 02:00"));
        assert_eq!(series[0].values, vec![5.0, 0.0]);
        assert!(series[1].is_empty());
    }

    #[test]
    fn windows_end_where_expected() {
        let series = vec![TimeSeries::new(
            "MT_001",
            ts("2014-01-01 00:00"),
            TWO_HOURS,
            (1..=24).map(f64::from).collect(),
        )];
        let spec = spec("2014-01-01 00:00", "2014-01-01 12:00", 3, 2);
        let windows = build_windows(&series, &spec).unwrap();

        assert_eq!(windows.train.len(), 1);
        let train = &windows.train[0];
        assert_eq!(train.target.len(), 6);
        let last = spec.freq.advance(train.start, train.target.len() as i64 - 1);
        assert!(last < spec.end_training);

        assert_eq!(windows.test.len(), 2);
        assert_eq!(windows.test[0].target.len(), 9);
        assert_eq!(windows.test[1].target.len(), 12);
        for test in &windows.test {
            assert_eq!(test.start, train.start);
            assert_eq!(&test.target[..train.target.len()], &train.target[..]);
        }
    }

    #[test]
    fn windows_past_the_data_are_truncated() {
        let series = vec![TimeSeries::new(
            "MT_001",
            ts("2014-01-01 00:00"),
            TWO_HOURS,
            vec![1.0; 8],
        )];
        let windows =
            build_windows(&series, &spec("2014-01-01 00:00", "2014-01-01 12:00", 4, 3)).unwrap();
        assert!(windows.test.iter().all(|t| t.target.len() == 8));
    }

    #[test]
    fn all_zero_series_collapses_to_empty_training_target() {
        let table = RawTable::new(
            (0..6)
                .map(|i| TWO_HOURS.advance(ts("2014-01-01 00:00"), i))
                .collect(),
            vec!["late".into()],
            vec![vec![0.0, 0.0, 0.0, 0.0, 7.0, 8.0]],
        )
        .unwrap();
        let series = to_series(&table, &two_hourly()).unwrap();
        let windows =
            build_windows(&series, &spec("2014-01-01 00:00", "2014-01-01 08:00", 1, 1)).unwrap();
        assert!(windows.train[0].target.is_empty());
        assert_eq!(windows.test[0].target, vec![7.0]);
        assert_eq!(windows.test[0].start, ts("2014-01-01 08:00"));
    }

    #[test]
    fn test_windows_are_grouped_by_k_then_series() {
        let a = TimeSeries::new("a", ts("2014-01-01"), TWO_HOURS, vec![1.0; 30]);
        let b = TimeSeries::new("b", ts("2014-01-01"), TWO_HOURS, vec![2.0; 30]);
        let windows =
            build_windows(&[a, b], &spec("2014-01-01 00:00", "2014-01-01 10:00", 2, 3)).unwrap();
        let heads: Vec<(f64, usize)> = windows
            .test
            .iter()
            .map(|r| (r.target[0], r.target.len()))
            .collect();
        assert_eq!(
            heads,
            vec![(1.0, 7), (2.0, 7), (1.0, 9), (2.0, 9), (1.0, 11), (2.0, 11)]
        );
    }

    #[test]
    fn invalid_window_spec_is_a_config_error() {
        let bad = spec("2014-02-01 00:00", "2014-01-01 00:00", 1, 1);
        assert!(matches!(
            build_windows(&[], &bad),
            Err(PipelineError::Config(_))
        ));
    }
}
