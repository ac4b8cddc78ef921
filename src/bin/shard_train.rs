//! Per-host entry point of the sharded image-classifier training.
//!
//! Flags fall back to the `SM_*` variables the training harness exports.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use forecast_pipeline::common::log::{self, LogFormat};
use forecast_pipeline::sharded::{parse_hosts, OptimizerKind, ShardTrainConfig, ShardTrainer};
use forecast_pipeline::{PipelineError, PipelineResult};

#[derive(Parser, Debug)]
#[command(name = "shard-train")]
#[command(about = "Train this host's shard of an image classifier")]
struct Args {
    #[arg(long, value_enum)]
    optimizer: Option<OptimizerKind>,

    #[arg(long = "num_epoch", default_value_t = 100)]
    num_epoch: usize,

    #[arg(long = "learning_rate", default_value_t = 0.1)]
    learning_rate: f32,

    #[arg(long = "batch_size")]
    batch_size: Option<usize>,

    /// Training channel directory
    #[arg(long, env = "SM_CHANNEL_TRAIN")]
    train: Option<PathBuf>,

    /// Test channel directory
    #[arg(long, env = "SM_CHANNEL_TEST")]
    test: Option<PathBuf>,

    #[arg(long = "model-dir", env = "SM_MODEL_DIR")]
    model_dir: Option<PathBuf>,

    #[arg(long = "num_gpus", env = "SM_NUM_GPUS")]
    num_gpus: Option<u32>,

    #[arg(long = "num_cpus", env = "SM_NUM_CPUS")]
    num_cpus: Option<u32>,

    #[arg(long = "current_host", env = "SM_CURRENT_HOST")]
    current_host: Option<String>,

    /// JSON list of all hosts, e.g. `["algo-1","algo-2"]`
    #[arg(long, env = "SM_HOSTS")]
    hosts: Option<String>,

    /// Directory shared by all hosts for parameter averaging
    #[arg(long = "sync-dir", env = "SHARD_SYNC_DIR")]
    sync_dir: Option<PathBuf>,

    /// Namespace of this run inside the sync directory
    #[arg(long = "run-id", env = "TRAINING_JOB_NAME")]
    run_id: Option<String>,

    /// Seed for initialisation and shuffling
    #[arg(long, default_value_t = 0)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

fn required<T>(value: Option<T>, name: &str) -> PipelineResult<T> {
    value.ok_or_else(|| PipelineError::config(format!("missing required value: {name}")))
}

impl Args {
    fn into_config(self) -> PipelineResult<ShardTrainConfig> {
        let hosts = parse_hosts(&required(self.hosts, "--hosts / SM_HOSTS")?)?;
        let cfg = ShardTrainConfig {
            optimizer: required(self.optimizer, "--optimizer")?,
            num_epoch: self.num_epoch,
            learning_rate: self.learning_rate,
            batch_size: required(self.batch_size, "--batch_size")?,
            train_dir: required(self.train, "--train / SM_CHANNEL_TRAIN")?,
            test_dir: required(self.test, "--test / SM_CHANNEL_TEST")?,
            model_dir: required(self.model_dir, "--model-dir / SM_MODEL_DIR")?,
            num_gpus: required(self.num_gpus, "--num_gpus / SM_NUM_GPUS")?,
            num_cpus: required(self.num_cpus, "--num_cpus / SM_NUM_CPUS")?,
            current_host: required(self.current_host, "--current_host / SM_CURRENT_HOST")?,
            hosts,
            sync_dir: self.sync_dir,
            run_id: self.run_id,
            seed: self.seed,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

fn run(args: Args) -> Result<()> {
    let cfg = args.into_config()?;
    let outcome = ShardTrainer::new(&cfg).run()?;
    info!(
        epochs = outcome.epochs.len(),
        accuracy = outcome.final_validation_accuracy(),
        "training complete"
    );
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    log::init("info", args.log_format);
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("shard-train failed: {err:#}");
            let code = err
                .downcast_ref::<PipelineError>()
                .map_or(1, |e| e.code() as u8);
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> PipelineResult<ShardTrainConfig> {
        let mut argv = vec![
            "shard-train",
            "--optimizer",
            "sgd",
            "--batch_size",
            "100",
            "--train",
            "/opt/ml/input/data/train",
            "--test",
            "/opt/ml/input/data/test",
            "--model-dir",
            "/opt/ml/model",
            "--num_gpus",
            "0",
            "--num_cpus",
            "4",
            "--current_host",
            "algo-1",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap().into_config()
    }

    #[test]
    fn single_host_defaults() {
        let cfg = parse(&["--hosts", r#"["algo-1"]"#]).unwrap();
        assert_eq!(cfg.num_epoch, 100);
        assert_eq!(cfg.learning_rate, 0.1);
        assert_eq!(cfg.optimizer, OptimizerKind::Sgd);
        assert_eq!(cfg.hosts, vec!["algo-1"]);
    }

    #[test]
    fn several_hosts_without_sync_dir_is_a_config_error() {
        let err = parse(&["--hosts", r#"["algo-1","algo-2"]"#]).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        let err = parse(&["--hosts", r#"["algo-1","algo-2"]"#, "--sync-dir", "/shared"]).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        let cfg = parse(&[
            "--hosts",
            r#"["algo-1","algo-2"]"#,
            "--sync-dir",
            "/shared",
            "--run-id",
            "job-1",
        ])
        .unwrap();
        assert_eq!(cfg.run_id.as_deref(), Some("job-1"));
    }
}
