//! Sharded image-classifier training, run once per host of a training
//! cluster.

pub mod domain;
pub mod idx;
pub mod model;
pub mod service;
pub mod sync;

pub use domain::{parse_hosts, shard_for, Device, OptimizerKind, Shard, ShardTrainConfig, SyncMode};
pub use service::{ShardTrainer, TrainOutcome};
