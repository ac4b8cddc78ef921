//! Shard trainer: load, shard, fit, evaluate and save.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::common::error::{PipelineError, PipelineResult};
use crate::common::log;
use crate::evaluation::{self, Accuracy, EpochReport, Speedometer};
use crate::store::FsObjectStore;

use super::domain::{shard_for, ShardTrainConfig, SyncMode};
use super::idx::{self, ImageSet};
use super::model::{Mlp, Optimizer};
use super::sync::{LocalSync, ParameterSync, StoreSync};

/// File written into the model directory.
pub const MODEL_FILE: &str = "model.json";

/// Batches between throughput reports.
const SPEEDOMETER_FREQUENT: usize = 100;

const SYNC_BUCKET: &str = "params";

/// Trained network plus per-epoch metrics.
#[derive(Debug)]
pub struct TrainOutcome {
    pub model: Mlp,
    pub epochs: Vec<EpochReport>,
}

impl TrainOutcome {
    pub fn final_validation_accuracy(&self) -> Option<f64> {
        self.epochs.last().and_then(|e| e.validation_accuracy)
    }
}

pub struct ShardTrainer<'a> {
    cfg: &'a ShardTrainConfig,
}

impl<'a> ShardTrainer<'a> {
    pub fn new(cfg: &'a ShardTrainConfig) -> Self {
        Self { cfg }
    }

    /// Fit a fresh network on `train`, validating on `test` after every
    /// epoch and exchanging parameters through `sync`.
    pub fn fit(
        &self,
        train: &ImageSet,
        test: &ImageSet,
        sync: &mut dyn ParameterSync,
    ) -> PipelineResult<TrainOutcome> {
        let cfg = self.cfg;
        if train.is_empty() {
            return Err(PipelineError::data_format("training shard is empty"));
        }
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let mut model = Mlp::new(train.num_features(), &mut rng);
        check_sets(train, test, model.num_classes())?;
        let mut optimizer = Optimizer::new(cfg.optimizer, cfg.learning_rate);
        let mut speedometer = Speedometer::new(cfg.batch_size, SPEEDOMETER_FREQUENT);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut epochs = Vec::with_capacity(cfg.num_epoch);

        for epoch in 0..cfg.num_epoch {
            let started = Instant::now();
            let mut train_acc = Accuracy::new();
            let mut loss_sum = 0.0f32;
            let mut batches = 0usize;
            order.shuffle(&mut rng);
            speedometer.reset();

            for (nbatch, idx) in order.chunks(cfg.batch_size).enumerate() {
                let x = train.images.select(ndarray::Axis(0), idx);
                let y: Vec<u8> = idx.iter().map(|&i| train.labels[i]).collect();
                let (loss, grads, predicted) = model.gradients(&x, &y);
                optimizer.apply(&mut model, &grads);
                train_acc.update(&predicted, &y);
                loss_sum += loss;
                batches += 1;
                speedometer.on_batch(epoch, nbatch, &train_acc);
            }

            if sync.mode() == SyncMode::DistSync {
                let averaged = sync.sync(epoch, model.parameters())?;
                model.set_parameters(&averaged)?;
            }

            let validation = evaluation::evaluate(&model, &test.images, &test.labels, cfg.batch_size);
            let report = EpochReport {
                epoch,
                train_accuracy: train_acc.get(),
                validation_accuracy: validation.get(),
                mean_loss: loss_sum / batches.max(1) as f32,
                seconds: started.elapsed().as_secs_f64(),
            };
            tracing::info!(
                epoch,
                train_accuracy = report.train_accuracy,
                validation_accuracy = report.validation_accuracy,
                loss = report.mean_loss,
                time_cost = report.seconds,
                "epoch finished"
            );
            epochs.push(report);
        }
        Ok(TrainOutcome { model, epochs })
    }

    /// Full run: load both channels, keep this host's shard, fit and save.
    pub fn run(&self) -> PipelineResult<TrainOutcome> {
        let cfg = self.cfg;
        cfg.validate()?;
        log::banner("start shard training");

        let train = idx::load_dir(&cfg.train_dir)?;
        let test = idx::load_dir(&cfg.test_dir)?;
        let shard = shard_for(&cfg.current_host, &cfg.hosts, train.len())?;
        tracing::info!(
            host = %cfg.current_host,
            hosts = cfg.hosts.len(),
            start = shard.start,
            end = shard.end,
            dropped = train.len() - shard.len() * cfg.hosts.len(),
            sync_mode = %cfg.sync_mode(),
            device = ?cfg.device(),
            cpus = cfg.num_cpus,
            optimizer = %cfg.optimizer,
            "shard assigned"
        );
        let train = train.shard(shard);

        let outcome = match (cfg.sync_mode(), &cfg.sync_dir, &cfg.run_id) {
            (SyncMode::DistSync, Some(dir), Some(run_id)) => {
                let store = FsObjectStore::new(dir);
                let mut sync = StoreSync::new(
                    &store,
                    SYNC_BUCKET,
                    run_id.as_str(),
                    cfg.current_host.clone(),
                    cfg.hosts.clone(),
                );
                self.fit(&train, &test, &mut sync)?
            }
            _ => self.fit(&train, &test, &mut LocalSync)?,
        };

        let path = save_model(&cfg.model_dir, &outcome.model)?;
        tracing::info!(path = %path.display(), accuracy = outcome.final_validation_accuracy(), "model saved");
        log::banner("shard training is finished");
        Ok(outcome)
    }
}

/// Train and test sets must share the pixel layout and carry labels the
/// output layer can represent.
fn check_sets(train: &ImageSet, test: &ImageSet, num_classes: usize) -> PipelineResult<()> {
    if train.num_features() != test.num_features() {
        return Err(PipelineError::data_format(format!(
            "train images have {} pixels, test images {}",
            train.num_features(),
            test.num_features()
        )));
    }
    for (name, set) in [("train", train), ("test", test)] {
        if let Some(bad) = set.labels.iter().find(|&&l| usize::from(l) >= num_classes) {
            return Err(PipelineError::data_format(format!(
                "{name} label {bad} is outside 0..{num_classes}"
            )));
        }
    }
    Ok(())
}

/// Serialize the network as JSON into `dir`.
pub fn save_model(dir: &Path, model: &Mlp) -> PipelineResult<PathBuf> {
    let path = dir.join(MODEL_FILE);
    fs::create_dir_all(dir).map_err(|err| PipelineError::store(dir.display(), err))?;
    let body = serde_json::to_vec(model).map_err(|err| PipelineError::store(path.display(), err))?;
    fs::write(&path, body).map_err(|err| PipelineError::store(path.display(), err))?;
    Ok(path)
}

pub fn load_model(path: &Path) -> PipelineResult<Mlp> {
    let body = fs::read(path).map_err(|err| PipelineError::store(path.display(), err))?;
    serde_json::from_slice(&body)
        .map_err(|err| PipelineError::data_format(format!("{}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sharded::domain::OptimizerKind;
    use crate::sharded::idx::fixtures::write_set;

    /// Label `l` lights up pixel `l`; a trivially learnable set.
    fn pixel(labels: &'static [u8]) -> impl Fn(usize, usize) -> u8 {
        move |i, p| if p == usize::from(labels[i]) { 255 } else { 0 }
    }

    const LABELS: &[u8] = &[0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3, 9];

    fn config(root: &Path, hosts: &[&str]) -> ShardTrainConfig {
        ShardTrainConfig {
            optimizer: OptimizerKind::Adam,
            num_epoch: 30,
            learning_rate: 0.01,
            batch_size: 4,
            train_dir: root.join("train"),
            test_dir: root.join("test"),
            model_dir: root.join("model"),
            num_gpus: 0,
            num_cpus: 1,
            current_host: hosts[0].to_string(),
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            sync_dir: Some(root.join("sync")),
            run_id: Some("job-1".into()),
            seed: 11,
        }
    }

    #[test]
    fn single_host_run_learns_and_saves() {
        let dir = tempfile::tempdir().unwrap();
        write_set(&dir.path().join("train"), LABELS, 2, 2, pixel(LABELS));
        write_set(&dir.path().join("test/data"), &LABELS[..4], 2, 2, pixel(LABELS));

        let cfg = config(dir.path(), &["algo-1"]);
        let outcome = ShardTrainer::new(&cfg).run().unwrap();
        assert_eq!(outcome.epochs.len(), 30);
        assert_eq!(outcome.final_validation_accuracy(), Some(1.0));

        let saved = load_model(&cfg.model_dir.join(MODEL_FILE)).unwrap();
        assert_eq!(saved, outcome.model);
    }

    #[test]
    fn empty_shard_is_rejected() {
        let cfg = config(Path::new("/unused"), &["algo-1"]);
        let empty = ImageSet {
            images: ndarray::Array2::zeros((0, 4)),
            labels: vec![],
        };
        let err = ShardTrainer::new(&cfg)
            .fit(&empty, &empty, &mut LocalSync)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DataFormat(_)));
    }

    fn tiny_set(rows: usize, cols: usize, labels: Vec<u8>) -> ImageSet {
        ImageSet {
            images: ndarray::Array2::zeros((rows, cols)),
            labels,
        }
    }

    #[test]
    fn label_beyond_output_layer_is_a_data_error() {
        let cfg = config(Path::new("/unused"), &["algo-1"]);
        let train = tiny_set(2, 4, vec![3, 12]);
        let test = tiny_set(1, 4, vec![1]);
        let err = ShardTrainer::new(&cfg)
            .fit(&train, &test, &mut LocalSync)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DataFormat(_)));

        let err = ShardTrainer::new(&cfg)
            .fit(&test, &train, &mut LocalSync)
            .unwrap_err();
        assert!(matches!(err, PipelineError::DataFormat(_)));
    }

    #[test]
    fn train_and_test_pixel_counts_must_agree() {
        let cfg = config(Path::new("/unused"), &["algo-1"]);
        let train = tiny_set(2, 4, vec![0, 1]);
        let test = tiny_set(2, 9, vec![0, 1]);
        let err = ShardTrainer::new(&cfg)
            .fit(&train, &test, &mut LocalSync)
            .unwrap_err();
        assert!(err.to_string().contains("pixels"));
    }

    #[test]
    fn unknown_host_fails_before_loading() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path(), &["algo-1"]);
        cfg.current_host = "algo-7".into();
        assert!(matches!(
            ShardTrainer::new(&cfg).run(),
            Err(PipelineError::Config(_))
        ));
    }
}
