//! Request encoding, response decoding and the predictor facade.

use chrono::NaiveDateTime;

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::time::Frequency;
use crate::data::TimeSeries;

use super::domain::{
    Configuration, ForecastTable, InferenceTransport, Instance, PredictOptions, Prediction,
    PredictionRequest, PredictionResponse,
};

/// Wrap `series` as the single instance of a request.
pub fn encode_request(series: &TimeSeries, options: &PredictOptions) -> PipelineResult<Vec<u8>> {
    if series.is_empty() {
        return Err(PipelineError::data_format(format!(
            "series '{}' has no values to predict from",
            series.name
        )));
    }
    let mut output_types = vec!["quantiles".to_string()];
    if options.return_samples {
        output_types.push("samples".to_string());
    }
    let request = PredictionRequest {
        instances: vec![Instance {
            start: series.start,
            target: series.values.iter().map(|v| (*v).into()).collect(),
            cat: options.cat,
            dynamic_feat: options.dynamic_feat.clone(),
        }],
        configuration: Configuration {
            num_samples: options.num_samples,
            output_types,
            quantiles: options.quantile_keys(),
        },
    };
    serde_json::to_vec(&request).map_err(|err| PipelineError::data_format(err.to_string()))
}

fn lookup_quantile<'p>(prediction: &'p Prediction, key: &str, q: f64) -> Option<&'p Vec<f64>> {
    let quantiles = prediction.quantiles.as_ref()?;
    quantiles.get(key).or_else(|| {
        quantiles
            .iter()
            .find(|(k, _)| k.parse::<f64>().is_ok_and(|parsed| parsed == q))
            .map(|(_, v)| v)
    })
}

/// Turn a response body into a table indexed from `prediction_time`.
pub fn decode_response(
    body: &[u8],
    options: &PredictOptions,
    freq: &Frequency,
    prediction_time: NaiveDateTime,
) -> PipelineResult<ForecastTable> {
    let response: PredictionResponse = serde_json::from_slice(body)
        .map_err(|err| PipelineError::response_format(format!("invalid JSON: {err}")))?;
    let prediction = response
        .predictions
        .and_then(|p| p.into_iter().next())
        .ok_or_else(|| PipelineError::response_format("no predictions in response"))?;
    let Some(returned) = prediction.quantiles.as_ref() else {
        return Err(PipelineError::response_format("prediction has no 'quantiles'"));
    };

    let mut columns = Vec::with_capacity(options.quantiles.len());
    for (key, q) in options.quantile_keys().into_iter().zip(&options.quantiles) {
        let values = lookup_quantile(&prediction, &key, *q).ok_or_else(|| {
            PipelineError::response_format(format!("quantile {key} missing from response"))
        })?;
        columns.push((key, values.clone()));
    }
    let horizon = columns.first().map(|(_, v)| v.len()).unwrap_or_default();
    if let Some((key, values)) = returned.iter().find(|(_, v)| v.len() != horizon) {
        return Err(PipelineError::response_format(format!(
            "quantile {key} has {} values, expected {horizon}",
            values.len()
        )));
    }

    if options.return_samples {
        let samples = prediction
            .samples
            .ok_or_else(|| PipelineError::response_format("samples requested but missing"))?;
        for (i, sample) in samples.into_iter().enumerate() {
            if sample.len() != horizon {
                return Err(PipelineError::response_format(format!(
                    "sample {i} has {} values, expected {horizon}",
                    sample.len()
                )));
            }
            columns.push((format!("sample_{i}"), sample));
        }
    }

    let index = (0..horizon)
        .map(|i| freq.advance(prediction_time, i as i64))
        .collect();
    Ok(ForecastTable { index, columns })
}

/// Calls a deployed forecasting endpoint.
pub struct Predictor<'a> {
    transport: &'a dyn InferenceTransport,
    endpoint: String,
}

impl<'a> Predictor<'a> {
    pub fn new(transport: &'a dyn InferenceTransport, endpoint: impl Into<String>) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
        }
    }

    /// Forecast the steps following the last value of `series`.
    pub fn predict(
        &self,
        series: &TimeSeries,
        options: &PredictOptions,
    ) -> PipelineResult<ForecastTable> {
        let body = encode_request(series, options)?;
        let prediction_time = series
            .last_timestamp()
            .map(|last| series.freq.advance(last, 1))
            .ok_or_else(|| PipelineError::data_format("empty series"))?;
        tracing::info!(
            endpoint = %self.endpoint,
            series = %series.name,
            points = series.len(),
            "invoking endpoint"
        );
        let response = self.transport.invoke(&self.endpoint, &body)?;
        let table = decode_response(&response, options, &series.freq, prediction_time)?;
        tracing::info!(rows = table.num_rows(), columns = table.columns.len(), "forecast decoded");
        Ok(table)
    }
}
