//! Feed-forward classifier: flatten, 128 ReLU, 64 ReLU, 10 softmax.

use ndarray::{Array2, Axis, Zip};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::common::error::{PipelineError, PipelineResult};

use super::domain::OptimizerKind;

/// Hidden and output widths.
pub const LAYER_SIZES: [usize; 3] = [128, 64, 10];

/// Fully connected layer. The bias is kept as a `1 x n` row so it
/// broadcasts over a batch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub weights: Array2<f32>,
    pub bias: Array2<f32>,
}

impl Dense {
    fn init(inputs: usize, outputs: usize, rng: &mut impl Rng) -> Self {
        let limit = (6.0 / (inputs + outputs) as f32).sqrt();
        Self {
            weights: Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-limit..limit)),
            bias: Array2::zeros((1, outputs)),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    layers: Vec<Dense>,
}

/// Gradient of the loss for each layer, in layer order.
pub type Gradients = Vec<Dense>;

fn softmax_rows(mut z: Array2<f32>) -> Array2<f32> {
    for mut row in z.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |m, v| m.max(*v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    z
}

fn argmax(row: ndarray::ArrayView1<f32>) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, v)| if *v > best.1 { (i, *v) } else { best })
        .0
}

impl Mlp {
    /// Network with the standard layer sizes over `input_dim` features.
    pub fn new(input_dim: usize, rng: &mut impl Rng) -> Self {
        Self::with_layers(input_dim, &LAYER_SIZES, rng)
    }

    pub fn with_layers(input_dim: usize, sizes: &[usize], rng: &mut impl Rng) -> Self {
        let mut layers = Vec::with_capacity(sizes.len());
        let mut inputs = input_dim;
        for &outputs in sizes {
            layers.push(Dense::init(inputs, outputs, rng));
            inputs = outputs;
        }
        Self { layers }
    }

    pub fn layers(&self) -> &[Dense] {
        &self.layers
    }

    pub fn num_classes(&self) -> usize {
        self.layers.last().map_or(0, |l| l.bias.ncols())
    }

    /// Activations of every layer; the first entry is the input, the last
    /// the class probabilities.
    fn forward_trace(&self, x: &Array2<f32>) -> Vec<Array2<f32>> {
        let mut acts = vec![x.clone()];
        let last = self.layers.len().saturating_sub(1);
        for (i, layer) in self.layers.iter().enumerate() {
            let z = acts[i].dot(&layer.weights) + &layer.bias;
            acts.push(if i == last {
                softmax_rows(z)
            } else {
                z.mapv(|v| v.max(0.0))
            });
        }
        acts
    }

    pub fn predict_proba(&self, x: &Array2<f32>) -> Array2<f32> {
        self.forward_trace(x).pop().unwrap_or_else(|| x.clone())
    }

    /// Most likely class per row.
    pub fn predict(&self, x: &Array2<f32>) -> Vec<usize> {
        self.predict_proba(x).rows().into_iter().map(argmax).collect()
    }

    /// Mean cross-entropy over the batch, its gradients, and the batch
    /// predictions.
    pub fn gradients(&self, x: &Array2<f32>, labels: &[u8]) -> (f32, Gradients, Vec<usize>) {
        let acts = self.forward_trace(x);
        let batch = x.nrows().max(1) as f32;
        let mut delta = acts[acts.len() - 1].clone();
        let predictions: Vec<usize> = delta.rows().into_iter().map(argmax).collect();

        let mut loss = 0.0;
        for (mut row, &label) in delta.rows_mut().into_iter().zip(labels) {
            let label = usize::from(label);
            loss -= row[label].max(1e-12).ln();
            row[label] -= 1.0;
        }
        delta.mapv_inplace(|v| v / batch);

        let mut grads = Vec::with_capacity(self.layers.len());
        for i in (0..self.layers.len()).rev() {
            let input = &acts[i];
            grads.push(Dense {
                weights: input.t().dot(&delta),
                bias: delta.sum_axis(Axis(0)).insert_axis(Axis(0)),
            });
            if i > 0 {
                let mut back = delta.dot(&self.layers[i].weights.t());
                Zip::from(&mut back)
                    .and(input)
                    .for_each(|d, &a| if a <= 0.0 { *d = 0.0 });
                delta = back;
            }
        }
        grads.reverse();
        (loss / batch, grads, predictions)
    }

    fn tensors_mut(&mut self) -> impl Iterator<Item = &mut Array2<f32>> {
        self.layers
            .iter_mut()
            .flat_map(|l| [&mut l.weights, &mut l.bias])
    }

    /// All weights and biases, flattened in layer order.
    pub fn parameters(&self) -> Vec<f32> {
        self.layers
            .iter()
            .flat_map(|l| l.weights.iter().chain(l.bias.iter()))
            .copied()
            .collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.layers
            .iter()
            .map(|l| l.weights.len() + l.bias.len())
            .sum()
    }

    /// Overwrite all parameters from a flat vector produced by
    /// [`Mlp::parameters`].
    pub fn set_parameters(&mut self, flat: &[f32]) -> PipelineResult<()> {
        if flat.len() != self.num_parameters() {
            return Err(PipelineError::data_format(format!(
                "expected {} parameters, got {}",
                self.num_parameters(),
                flat.len()
            )));
        }
        let mut values = flat.iter();
        for tensor in self.tensors_mut() {
            for (dst, src) in tensor.iter_mut().zip(&mut values) {
                *dst = *src;
            }
        }
        Ok(())
    }
}

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;

/// Parameter update rule with its running state.
pub struct Optimizer {
    kind: OptimizerKind,
    learning_rate: f32,
    step: i32,
    moments: Vec<(Array2<f32>, Array2<f32>)>,
}

impl Optimizer {
    pub fn new(kind: OptimizerKind, learning_rate: f32) -> Self {
        Self {
            kind,
            learning_rate,
            step: 0,
            moments: Vec::new(),
        }
    }

    pub fn apply(&mut self, model: &mut Mlp, grads: &[Dense]) {
        let grads: Vec<&Array2<f32>> = grads.iter().flat_map(|g| [&g.weights, &g.bias]).collect();
        let lr = self.learning_rate;
        match self.kind {
            OptimizerKind::Sgd => {
                for (param, grad) in model.tensors_mut().zip(grads) {
                    param.scaled_add(-lr, grad);
                }
            }
            OptimizerKind::Adam => {
                if self.moments.is_empty() {
                    self.moments = grads
                        .iter()
                        .map(|g| (Array2::zeros(g.raw_dim()), Array2::zeros(g.raw_dim())))
                        .collect();
                }
                self.step += 1;
                let c1 = 1.0 - ADAM_BETA1.powi(self.step);
                let c2 = 1.0 - ADAM_BETA2.powi(self.step);
                for ((param, grad), (m, v)) in model
                    .tensors_mut()
                    .zip(grads)
                    .zip(self.moments.iter_mut())
                {
                    m.zip_mut_with(grad, |m, &g| *m = ADAM_BETA1 * *m + (1.0 - ADAM_BETA1) * g);
                    v.zip_mut_with(grad, |v, &g| *v = ADAM_BETA2 * *v + (1.0 - ADAM_BETA2) * g * g);
                    Zip::from(param).and(&*m).and(&*v).for_each(|p, &m, &v| {
                        *p -= lr * (m / c1) / ((v / c2).sqrt() + ADAM_EPS);
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy() -> (Array2<f32>, Vec<u8>) {
        // Two separable clusters.
        let x = Array2::from_shape_vec(
            (4, 2),
            vec![0.0, 1.0, 0.1, 0.9, 1.0, 0.0, 0.9, 0.1],
        )
        .unwrap();
        (x, vec![0, 0, 1, 1])
    }

    #[test]
    fn default_network_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let model = Mlp::new(784, &mut rng);
        let dims: Vec<_> = model.layers().iter().map(|l| l.weights.dim()).collect();
        assert_eq!(dims, vec![(784, 128), (128, 64), (64, 10)]);
        assert_eq!(model.num_classes(), 10);
    }

    #[test]
    fn probabilities_sum_to_one() {
        let mut rng = StdRng::seed_from_u64(1);
        let model = Mlp::with_layers(2, &[4, 3], &mut rng);
        let (x, _) = toy();
        for row in model.predict_proba(&x).rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn training_reduces_loss() {
        for kind in [OptimizerKind::Sgd, OptimizerKind::Adam] {
            let mut rng = StdRng::seed_from_u64(3);
            let mut model = Mlp::with_layers(2, &[8, 2], &mut rng);
            let mut opt = Optimizer::new(kind, if kind == OptimizerKind::Sgd { 0.5 } else { 0.05 });
            let (x, y) = toy();
            let (first, _, _) = model.gradients(&x, &y);
            for _ in 0..200 {
                let (_, grads, _) = model.gradients(&x, &y);
                opt.apply(&mut model, &grads);
            }
            let (last, _, _) = model.gradients(&x, &y);
            assert!(last < first * 0.5, "{kind}: {first} -> {last}");
            assert_eq!(model.predict(&x), vec![0, 0, 1, 1]);
        }
    }

    #[test]
    fn parameters_round_trip_through_flat_vector() {
        let mut rng = StdRng::seed_from_u64(5);
        let a = Mlp::with_layers(3, &[4, 2], &mut rng);
        let mut b = Mlp::with_layers(3, &[4, 2], &mut rng);
        assert_ne!(a, b);
        b.set_parameters(&a.parameters()).unwrap();
        assert_eq!(a, b);
        assert!(b.set_parameters(&[0.0; 3]).is_err());
    }
}
