//! Classification metrics.

/// Running accuracy (`acc`) over predicted and true class labels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Accuracy {
    correct: usize,
    total: usize,
}

impl Accuracy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, predicted: &[usize], labels: &[u8]) {
        self.correct += predicted
            .iter()
            .zip(labels)
            .filter(|(p, l)| **p == usize::from(**l))
            .count();
        self.total += predicted.len().min(labels.len());
    }

    /// `None` until at least one sample was seen.
    pub fn get(&self) -> Option<f64> {
        (self.total > 0).then(|| self.correct as f64 / self.total as f64)
    }

    pub fn samples(&self) -> usize {
        self.total
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Metric summary of one epoch.
#[derive(Clone, Debug, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    pub train_accuracy: Option<f64>,
    pub validation_accuracy: Option<f64>,
    pub mean_loss: f32,
    pub seconds: f64,
}
