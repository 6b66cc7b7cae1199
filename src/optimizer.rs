//! AdamW Optimizer
//!
//! Adam with decoupled weight decay:
//!
//! ```text
//! θ = θ * (1 - α * λ)              # weight decay (2D weight matrices only)
//! m = β₁ * m + (1 - β₁) * g        # first moment
//! v = β₂ * v + (1 - β₂) * g²       # second moment
//! m_hat = m / (1 - β₁^t)
//! v_hat = v / (1 - β₂^t)
//! θ = θ - α * m_hat / (√v_hat + ε)
//! ```
//!
//! Defaults match the usual AdamW settings: β₁ = 0.9, β₂ = 0.999, ε = 1e-8.
//!
//! ## Selective Weight Decay
//!
//! The model reports which of its parameters decay through
//! [`GPTModel::decay_mask`]: weight matrices do; embeddings, biases and
//! LayerNorm parameters do not.
//!
//! Moment buffers are kept as one flat list in the model's parameter order,
//! so the optimizer does not need to know the model's structure.

use crate::model::{GPTModel, ModelGradients};
use crate::tensor::Tensor;
use rayon::prelude::*;

/// Tensors larger than this are updated in parallel
const PARALLEL_THRESHOLD: usize = 1000;

pub struct AdamW {
    pub lr: f32,
    pub weight_decay: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    /// Number of updates applied so far
    pub step: usize,
    m: Vec<Tensor>,
    v: Vec<Tensor>,
    decay: Vec<bool>,
}

impl AdamW {
    /// Zeroed moment buffers shaped like `model`'s parameters
    pub fn new(model: &GPTModel, lr: f32, weight_decay: f32) -> Self {
        let zeros: Vec<Tensor> = model
            .parameters()
            .iter()
            .map(|p| Tensor::zeros(p.shape.clone()))
            .collect();
        Self {
            lr,
            weight_decay,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
            m: zeros.clone(),
            v: zeros,
            decay: model.decay_mask(),
        }
    }

    /// Apply one update to every parameter of `model`
    pub fn step(&mut self, model: &mut GPTModel, grads: &ModelGradients) {
        self.step += 1;
        let t = self.step as i32;
        let bias_correction1 = 1.0 - self.beta1.powi(t);
        let bias_correction2 = 1.0 - self.beta2.powi(t);

        let (lr, beta1, beta2, epsilon) = (self.lr, self.beta1, self.beta2, self.epsilon);
        let grads = grads.collect();
        let params = model.parameters_mut();
        assert_eq!(params.len(), grads.len(), "Gradient count mismatch");

        for ((((param, grad), m), v), &decay) in params
            .into_iter()
            .zip(grads)
            .zip(self.m.iter_mut())
            .zip(self.v.iter_mut())
            .zip(&self.decay)
        {
            let decay_factor = if decay {
                1.0 - lr * self.weight_decay
            } else {
                1.0
            };
            let update = |(p, &g, m, v): (&mut f32, &f32, &mut f32, &mut f32)| {
                *p *= decay_factor;
                *m = beta1 * *m + (1.0 - beta1) * g;
                *v = beta2 * *v + (1.0 - beta2) * g * g;
                let m_hat = *m / bias_correction1;
                let v_hat = *v / bias_correction2;
                *p -= lr * m_hat / (v_hat.sqrt() + epsilon);
            };

            if param.data.len() > PARALLEL_THRESHOLD {
                param
                    .data
                    .par_iter_mut()
                    .zip(grad.data.par_iter())
                    .zip(m.data.par_iter_mut().zip(v.data.par_iter_mut()))
                    .for_each(|((p, g), (m, v))| update((p, g, m, v)));
            } else {
                param
                    .data
                    .iter_mut()
                    .zip(&grad.data)
                    .zip(m.data.iter_mut().zip(v.data.iter_mut()))
                    .for_each(|((p, g), (m, v))| update((p, g, m, v)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_model() -> GPTModel {
        let config = ModelConfig {
            vocab_size: 10,
            context_length: 4,
            emb_dim: 8,
            n_heads: 2,
            n_layers: 1,
            drop_rate: 0.0,
            qkv_bias: false,
        };
        GPTModel::new(&config, &mut StdRng::seed_from_u64(0))
    }

    #[test]
    fn test_step_reduces_loss() {
        let mut model = tiny_model();
        let inputs = vec![vec![1, 2, 3, 4]];
        let targets = vec![vec![2, 3, 4, 5]];
        let mut opt = AdamW::new(&model, 1e-2, 0.0);

        let before = model.batch_loss(&inputs, &targets);
        for _ in 0..10 {
            let (_, grads) = model.loss_and_gradients(&inputs, &targets, None);
            opt.step(&mut model, &grads);
        }
        let after = model.batch_loss(&inputs, &targets);
        assert!(after < before, "{} !< {}", after, before);
        assert_eq!(opt.step, 10);
    }

    #[test]
    fn test_weight_decay_is_selective() {
        let mut model = tiny_model();
        let before: Vec<Tensor> = model.parameters().into_iter().cloned().collect();
        let mask = model.decay_mask();

        // With zero gradients only the decay term moves anything
        let (_, mut grads) = model.loss_and_gradients(&[vec![1]], &[vec![2]], None);
        for g in grads.collect_mut() {
            g.data.iter_mut().for_each(|v| *v = 0.0);
        }
        let mut opt = AdamW::new(&model, 0.1, 0.5);
        opt.step(&mut model, &grads);

        for ((after, before), decay) in model.parameters().iter().zip(&before).zip(mask) {
            if decay {
                for (a, b) in after.data.iter().zip(&before.data) {
                    assert!((a - b * 0.95).abs() < 1e-6);
                }
            } else {
                assert_eq!(after.data, before.data);
            }
        }
    }
}
