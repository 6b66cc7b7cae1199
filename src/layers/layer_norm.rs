//! Layer Normalization
//!
//! Normalises each row to zero mean and unit (biased) variance, then applies
//! a learnable scale and shift:
//!
//! ```text
//! mean   = sum(x) / N
//! var    = sum((x - mean)²) / N
//! x_norm = (x - mean) / √(var + ε)
//! y      = scale * x_norm + shift
//! ```
//!
//! ## Backward Pass
//!
//! Every element of a row influences that row's mean and variance, so the
//! input gradient has two correction terms:
//!
//! ```text
//! grad_x_norm = grad_y * scale
//! grad_x = (grad_x_norm - mean(grad_x_norm) - x_norm * mean(grad_x_norm * x_norm)) / √(var + ε)
//! ```

use crate::tensor::Tensor;

/// Layer normalization over the last dimension
pub struct LayerNorm {
    pub scale: Tensor,
    pub shift: Tensor,
    pub eps: f32,
}

impl LayerNorm {
    /// Scale starts at 1, shift at 0, ε = 1e-5
    pub fn new(emb_dim: usize) -> Self {
        Self {
            scale: Tensor::new(vec![1.0; emb_dim], vec![emb_dim]),
            shift: Tensor::zeros(vec![emb_dim]),
            eps: 1e-5,
        }
    }

    pub fn forward(&self, x: &Tensor) -> (Tensor, LayerNormCache) {
        let (rows, cols) = (x.rows(), x.cols());
        let mut y = vec![0.0; rows * cols];
        let mut x_norm = vec![0.0; rows * cols];
        let mut std = Vec::with_capacity(rows);

        for i in 0..rows {
            let row = x.row(i);
            let mean = row.iter().sum::<f32>() / cols as f32;
            let var = row.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / cols as f32;
            let s = (var + self.eps).sqrt();
            std.push(s);

            for j in 0..cols {
                let n = (row[j] - mean) / s;
                x_norm[i * cols + j] = n;
                y[i * cols + j] = n * self.scale.data[j] + self.shift.data[j];
            }
        }

        let cache = LayerNormCache {
            x_norm: Tensor::new(x_norm, x.shape.clone()),
            std,
        };
        (Tensor::new(y, x.shape.clone()), cache)
    }

    pub fn backward(&self, grad_out: &Tensor, cache: &LayerNormCache) -> LayerNormGradients {
        let (rows, cols) = (grad_out.rows(), grad_out.cols());
        let mut grad_scale = vec![0.0; cols];
        let mut grad_shift = vec![0.0; cols];
        let mut grad_x = vec![0.0; rows * cols];

        for i in 0..rows {
            let g = grad_out.row(i);
            let n = cache.x_norm.row(i);

            let mut mean_g = 0.0;
            let mut mean_gn = 0.0;
            for j in 0..cols {
                grad_scale[j] += g[j] * n[j];
                grad_shift[j] += g[j];

                let gx = g[j] * self.scale.data[j];
                mean_g += gx;
                mean_gn += gx * n[j];
            }
            mean_g /= cols as f32;
            mean_gn /= cols as f32;

            for j in 0..cols {
                let gx = g[j] * self.scale.data[j];
                grad_x[i * cols + j] = (gx - mean_g - n[j] * mean_gn) / cache.std[i];
            }
        }

        LayerNormGradients {
            scale: Tensor::new(grad_scale, vec![cols]),
            shift: Tensor::new(grad_shift, vec![cols]),
            x: Tensor::new(grad_x, grad_out.shape.clone()),
        }
    }

    pub(crate) fn collect_params<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        out.push(&self.scale);
        out.push(&self.shift);
    }

    pub(crate) fn collect_params_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        out.push(&mut self.scale);
        out.push(&mut self.shift);
    }
}

/// Cache for layer norm backward pass
pub struct LayerNormCache {
    pub x_norm: Tensor,
    /// Per-row √(var + ε)
    pub std: Vec<f32>,
}

/// Gradients for layer norm
pub struct LayerNormGradients {
    pub scale: Tensor,
    pub shift: Tensor,
    pub x: Tensor,
}

impl LayerNormGradients {
    pub(crate) fn collect<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        out.push(&self.scale);
        out.push(&self.shift);
    }

    pub(crate) fn collect_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        out.push(&mut self.scale);
        out.push(&mut self.shift);
    }
}
