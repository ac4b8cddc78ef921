// lib.rs - forecasting pipeline and shard trainer
pub mod common;
pub mod data;
pub mod deploy;
pub mod evaluation;
pub mod inference;
pub mod pipeline;
pub mod sharded;
pub mod store;
pub mod training;

pub use common::{ErrorCode, PipelineError, PipelineResult};
pub use pipeline::{run, Platforms, PipelineRun};
