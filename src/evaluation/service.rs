//! Model evaluation and training throughput reporting.

use std::time::Instant;

use ndarray::{s, Array2};

use crate::sharded::model::Mlp;

use super::domain::Accuracy;

/// Accuracy of `model` over a full labelled set, evaluated in batches.
pub fn evaluate(model: &Mlp, images: &Array2<f32>, labels: &[u8], batch_size: usize) -> Accuracy {
    let mut metric = Accuracy::new();
    let batch_size = batch_size.max(1);
    let mut start = 0;
    while start < images.nrows() {
        let end = (start + batch_size).min(images.nrows());
        let batch = images.slice(s![start..end, ..]).to_owned();
        metric.update(&model.predict(&batch), &labels[start..end]);
        start = end;
    }
    metric
}

/// Logs training speed every `frequent` batches.
pub struct Speedometer {
    batch_size: usize,
    frequent: usize,
    tic: Option<Instant>,
}

impl Speedometer {
    pub fn new(batch_size: usize, frequent: usize) -> Self {
        Self {
            batch_size,
            frequent: frequent.max(1),
            tic: None,
        }
    }

    /// Call after batch `nbatch` (0-based) of `epoch`. Returns the measured
    /// samples per second when a report was logged.
    pub fn on_batch(&mut self, epoch: usize, nbatch: usize, metric: &Accuracy) -> Option<f64> {
        let Some(tic) = self.tic else {
            self.tic = Some(Instant::now());
            return None;
        };
        let count = nbatch + 1;
        if count % self.frequent != 0 {
            return None;
        }
        let elapsed = tic.elapsed().as_secs_f64().max(f64::EPSILON);
        let speed = (self.frequent * self.batch_size) as f64 / elapsed;
        match metric.get() {
            Some(acc) => tracing::info!(
                epoch,
                batch = count,
                samples_per_sec = speed,
                train_accuracy = acc,
                "speedometer"
            ),
            None => tracing::info!(epoch, batch = count, samples_per_sec = speed, "speedometer"),
        }
        self.tic = Some(Instant::now());
        Some(speed)
    }

    /// Forget the timer at an epoch boundary.
    pub fn reset(&mut self) {
        self.tic = None;
    }
}
