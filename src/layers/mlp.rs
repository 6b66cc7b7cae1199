//! Feed-Forward Network
//!
//! The position-wise MLP inside each transformer block:
//!
//! ```text
//! x [seq, emb] → Linear(emb → 4·emb) → GELU → Linear(4·emb → emb) → y [seq, emb]
//! ```
//!
//! The 4× expansion follows GPT-2.

use super::activation::{gelu_backward, gelu_forward};
use super::linear::{Linear, LinearCache, LinearGradients};
use crate::tensor::Tensor;
use rand::rngs::StdRng;

pub struct FeedForward {
    pub fc1: Linear,
    pub fc2: Linear,
}

impl FeedForward {
    pub fn new(emb_dim: usize, rng: &mut StdRng) -> Self {
        let hidden = emb_dim * 4;
        Self {
            fc1: Linear::new(emb_dim, hidden, true, rng),
            fc2: Linear::new(hidden, emb_dim, true, rng),
        }
    }

    pub fn forward(&self, x: &Tensor) -> (Tensor, FeedForwardCache) {
        let (h, fc1_cache) = self.fc1.forward(x);
        let (y, fc2_cache) = self.fc2.forward(&gelu_forward(&h));
        (
            y,
            FeedForwardCache {
                fc1_cache,
                h,
                fc2_cache,
            },
        )
    }

    pub fn backward(&self, grad_out: &Tensor, cache: &FeedForwardCache) -> FeedForwardGradients {
        let fc2 = self.fc2.backward(grad_out, &cache.fc2_cache);
        let grad_h = gelu_backward(&fc2.x, &cache.h);
        let fc1 = self.fc1.backward(&grad_h, &cache.fc1_cache);
        let x = fc1.x.clone();
        FeedForwardGradients { fc1, fc2, x }
    }

    pub(crate) fn collect_params<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        self.fc1.collect_params(out);
        self.fc2.collect_params(out);
    }

    pub(crate) fn collect_params_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        self.fc1.collect_params_mut(out);
        self.fc2.collect_params_mut(out);
    }
}

pub struct FeedForwardCache {
    pub fc1_cache: LinearCache,
    /// Pre-activation, needed for the GELU backward
    pub h: Tensor,
    pub fc2_cache: LinearCache,
}

pub struct FeedForwardGradients {
    pub fc1: LinearGradients,
    pub fc2: LinearGradients,
    pub x: Tensor,
}

impl FeedForwardGradients {
    pub(crate) fn collect<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        self.fc1.collect(out);
        self.fc2.collect(out);
    }

    pub(crate) fn collect_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        self.fc1.collect_mut(out);
        self.fc2.collect_mut(out);
    }
}
