//! Inference wire protocol and the decoded forecast table.

use std::collections::BTreeMap;
use std::io::Write;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::time;

/// Optional inputs and output shape of a prediction.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictOptions {
    pub cat: Option<i64>,
    pub dynamic_feat: Option<Vec<Vec<f64>>>,
    pub num_samples: u32,
    pub return_samples: bool,
    pub quantiles: Vec<f64>,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            cat: None,
            dynamic_feat: None,
            num_samples: 100,
            return_samples: false,
            quantiles: vec![0.1, 0.5, 0.9],
        }
    }
}

impl PredictOptions {
    /// Quantiles as the strings used for response keys and table columns.
    pub fn quantile_keys(&self) -> Vec<String> {
        self.quantiles.iter().map(|q| q.to_string()).collect()
    }
}

/// Target value on the wire. Missing observations are sent as `"NaN"`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TargetValue {
    Value(f64),
    Missing(&'static str),
}

impl From<f64> for TargetValue {
    fn from(v: f64) -> Self {
        if v.is_finite() {
            TargetValue::Value(v)
        } else {
            TargetValue::Missing("NaN")
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Instance {
    #[serde(with = "time::timestamp")]
    pub start: NaiveDateTime,
    pub target: Vec<TargetValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cat: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_feat: Option<Vec<Vec<f64>>>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Configuration {
    pub num_samples: u32,
    pub output_types: Vec<String>,
    pub quantiles: Vec<String>,
}

/// Batch-of-one request body.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PredictionRequest {
    pub instances: Vec<Instance>,
    pub configuration: Configuration,
}

/// Response body. Every field is optional here so that a malformed body
/// is reported as a response format error rather than a parse failure.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PredictionResponse {
    #[serde(default)]
    pub predictions: Option<Vec<Prediction>>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Prediction {
    #[serde(default)]
    pub quantiles: Option<BTreeMap<String, Vec<f64>>>,
    #[serde(default)]
    pub samples: Option<Vec<Vec<f64>>>,
}

/// Forecast indexed by timestamp, one column per quantile or sample path.
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastTable {
    pub index: Vec<NaiveDateTime>,
    pub columns: Vec<(String, Vec<f64>)>,
}

impl ForecastTable {
    pub fn num_rows(&self) -> usize {
        self.index.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(name, _)| name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Write as CSV with a leading `timestamp` column.
    pub fn write_csv<W: Write>(&self, out: W) -> PipelineResult<()> {
        let csv_err = |err: csv::Error| PipelineError::data_format(format!("writing forecast: {err}"));
        let mut writer = csv::Writer::from_writer(out);
        let mut header = vec!["timestamp"];
        header.extend(self.column_names());
        writer.write_record(&header).map_err(csv_err)?;
        for (row, ts) in self.index.iter().enumerate() {
            let mut record = vec![time::format_timestamp(ts)];
            record.extend(self.columns.iter().map(|(_, v)| v[row].to_string()));
            writer.write_record(&record).map_err(csv_err)?;
        }
        writer
            .flush()
            .map_err(|err| PipelineError::data_format(format!("writing forecast: {err}")))
    }
}

/// Invocation channel to a deployed endpoint.
#[cfg_attr(test, mockall::automock)]
pub trait InferenceTransport {
    /// Send a JSON request body, return the raw response body.
    fn invoke(&self, endpoint: &str, body: &[u8]) -> PipelineResult<Vec<u8>>;
}
