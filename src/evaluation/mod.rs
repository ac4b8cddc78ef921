//! Evaluation: accuracy and throughput reporting for the shard trainer.

pub mod domain;
pub mod service;

pub use domain::{Accuracy, EpochReport};
pub use service::{evaluate, Speedometer};
