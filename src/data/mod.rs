//! Data domain: raw exports in, training/test record files out.

pub mod domain;
pub mod reader;
pub mod service;
pub mod writer;

pub use domain::{RawTable, Resample, TimeSeries, TimeSeriesRecord, WindowSpec, Windows};
pub use service::{prepare, DatasetBuilder, PreparedData};
pub use writer::{ArtifactWriter, UploadOutcome};
