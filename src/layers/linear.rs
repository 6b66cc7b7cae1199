//! Linear Layer
//!
//! An affine map `y = x @ W + b` with an optional bias (attention's query,
//! key and value projections drop the bias when `qkv_bias = false`, and the
//! output head never has one).
//!
//! ```text
//! Forward:  y      = x @ W + b         x: [seq, in], W: [in, out], b: [out]
//! Backward: grad_W = x^T @ grad_y
//!           grad_b = sum(grad_y, axis=0)
//!           grad_x = grad_y @ W^T
//! ```
//!
//! Weights are initialised uniformly in `±1/√in_features`, the usual
//! default for fully connected layers; biases start at zero.

use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Uniform};

/// Linear layer `y = x @ W (+ b)`
pub struct Linear {
    pub weight: Tensor,
    pub bias: Option<Tensor>,
}

impl Linear {
    pub fn new(in_features: usize, out_features: usize, bias: bool, rng: &mut StdRng) -> Self {
        let bound = 1.0 / (in_features as f32).sqrt();
        let dist = Uniform::new_inclusive(-bound, bound);
        let weight = (0..in_features * out_features)
            .map(|_| dist.sample(rng))
            .collect();

        Self {
            weight: Tensor::new(weight, vec![in_features, out_features]),
            bias: bias.then(|| Tensor::zeros(vec![out_features])),
        }
    }

    pub fn in_features(&self) -> usize {
        self.weight.rows()
    }

    pub fn out_features(&self) -> usize {
        self.weight.cols()
    }

    /// Computes `y = x @ W + b` and caches `x` for the backward pass
    pub fn forward(&self, x: &Tensor) -> (Tensor, LinearCache) {
        let y = x.matmul(&self.weight);
        let y = match &self.bias {
            Some(b) => y.add(b),
            None => y,
        };
        (y, LinearCache { x: x.clone() })
    }

    /// Forward pass without keeping a cache (inference)
    pub fn apply(&self, x: &Tensor) -> Tensor {
        let y = x.matmul(&self.weight);
        match &self.bias {
            Some(b) => y.add(b),
            None => y,
        }
    }

    pub fn backward(&self, grad_out: &Tensor, cache: &LinearCache) -> LinearGradients {
        LinearGradients {
            weight: cache.x.t_matmul(grad_out),
            bias: self.bias.as_ref().map(|_| grad_out.sum_rows()),
            x: grad_out.matmul_t(&self.weight),
        }
    }

    pub(crate) fn collect_params<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        out.push(&self.weight);
        if let Some(b) = &self.bias {
            out.push(b);
        }
    }

    pub(crate) fn collect_params_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        out.push(&mut self.weight);
        if let Some(b) = &mut self.bias {
            out.push(b);
        }
    }
}

/// Cache for linear layer backward pass
pub struct LinearCache {
    pub x: Tensor,
}

/// Gradients for a linear layer
pub struct LinearGradients {
    pub weight: Tensor,
    pub bias: Option<Tensor>,
    /// Gradient to pass to the previous layer
    pub x: Tensor,
}

impl LinearGradients {
    pub(crate) fn collect<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        out.push(&self.weight);
        if let Some(b) = &self.bias {
            out.push(b);
        }
    }

    pub(crate) fn collect_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        out.push(&mut self.weight);
        if let Some(b) = &mut self.bias {
            out.push(b);
        }
    }
}
