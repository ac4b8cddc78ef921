//! Shard assignment and shard-trainer settings.

use std::fmt;
use std::path::PathBuf;

use crate::common::error::{PipelineError, PipelineResult};

/// Half-open `[start, end)` slice of the training arrays owned by one host.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Shard {
    pub start: usize,
    pub end: usize,
}

impl Shard {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Slice of `total_count` samples assigned to `host`.
///
/// Every host gets `total_count / hosts.len()` samples in host order. The
/// remainder is assigned to nobody.
pub fn shard_for(host: &str, hosts: &[String], total_count: usize) -> PipelineResult<Shard> {
    if hosts.is_empty() {
        return Err(PipelineError::config("host list is empty"));
    }
    let position = hosts
        .iter()
        .position(|h| h == host)
        .ok_or_else(|| PipelineError::config(format!("host '{host}' not in {hosts:?}")))?;
    let shard_size = total_count / hosts.len();
    let start = shard_size * position;
    Ok(Shard {
        start,
        end: start + shard_size,
    })
}

/// How parameters are combined across hosts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SyncMode {
    Local,
    DistSync,
}

impl SyncMode {
    pub fn for_hosts(count: usize) -> Self {
        if count <= 1 {
            SyncMode::Local
        } else {
            SyncMode::DistSync
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncMode::Local => "local",
            SyncMode::DistSync => "dist_sync",
        })
    }
}

/// Compute context requested by the harness.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Device {
    Cpu,
    Gpu,
}

impl Device {
    pub fn select(num_gpus: u32) -> Self {
        if num_gpus > 0 {
            Device::Gpu
        } else {
            Device::Cpu
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum OptimizerKind {
    Sgd,
    Adam,
}

impl fmt::Display for OptimizerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OptimizerKind::Sgd => "sgd",
            OptimizerKind::Adam => "adam",
        })
    }
}

/// Host list as passed by the harness: a JSON array, or a comma separated
/// list when given by hand.
pub fn parse_hosts(raw: &str) -> PipelineResult<Vec<String>> {
    let raw = raw.trim();
    let hosts: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw)
            .map_err(|err| PipelineError::config(format!("hosts is not a JSON list: {err}")))?
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(String::from)
            .collect()
    };
    if hosts.is_empty() {
        return Err(PipelineError::config("host list is empty"));
    }
    Ok(hosts)
}

/// Resolved settings of one shard-training run.
#[derive(Clone, Debug, PartialEq)]
pub struct ShardTrainConfig {
    pub optimizer: OptimizerKind,
    pub num_epoch: usize,
    pub learning_rate: f32,
    pub batch_size: usize,
    pub train_dir: PathBuf,
    pub test_dir: PathBuf,
    pub model_dir: PathBuf,
    pub num_gpus: u32,
    pub num_cpus: u32,
    pub current_host: String,
    pub hosts: Vec<String>,
    /// Shared directory for parameter exchange; needed with several hosts.
    pub sync_dir: Option<PathBuf>,
    /// Namespace for this run's keys in `sync_dir`.
    pub run_id: Option<String>,
    pub seed: u64,
}

impl ShardTrainConfig {
    pub fn sync_mode(&self) -> SyncMode {
        SyncMode::for_hosts(self.hosts.len())
    }

    pub fn device(&self) -> Device {
        Device::select(self.num_gpus)
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if self.num_epoch == 0 {
            return Err(PipelineError::config("num_epoch must be positive"));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::config("batch_size must be positive"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PipelineError::config("learning_rate must be positive"));
        }
        if !self.hosts.contains(&self.current_host) {
            return Err(PipelineError::config(format!(
                "current host '{}' not in {:?}",
                self.current_host, self.hosts
            )));
        }
        if self.sync_mode() == SyncMode::DistSync {
            if self.sync_dir.is_none() {
                return Err(PipelineError::config(
                    "a sync directory is required with more than one host",
                ));
            }
            match self.run_id.as_deref() {
                Some(id) if !matches!(id, "" | "." | "..") && !id.contains(['/', '\\']) => {}
                _ => {
                    return Err(PipelineError::config(
                        "a run id without path separators is required with more than one host",
                    ))
                }
            }
        }
        Ok(())
    }
}
