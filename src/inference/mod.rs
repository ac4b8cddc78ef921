//! Inference domain: forecasts from a deployed endpoint.

pub mod domain;
pub mod remote;
pub mod service;

pub use domain::{ForecastTable, InferenceTransport, PredictOptions};
pub use service::{decode_response, encode_request, Predictor};
