//! Multi-Head Causal Self-Attention
//!
//! ```text
//! Q, K, V    = x @ W_q, x @ W_k, x @ W_v            [seq, emb]
//! per head h (columns h·d .. (h+1)·d, d = emb / n_heads):
//!   scores_h = Q_h @ K_h^T / √d                       [seq, seq]
//!   weights  = softmax(mask(scores_h))                 future positions → -inf
//!   ctx_h    = dropout(weights) @ V_h                  [seq, d]
//! out        = concat(ctx_h) @ W_o + b_o
//! ```
//!
//! ## Backward Pass
//!
//! Per head, in reverse:
//!
//! 1. `grad_V_h = dropped_weights^T @ grad_ctx_h`
//! 2. `grad_dropped = grad_ctx_h @ V_h^T`, then back through the dropout mask
//! 3. Softmax, row by row: `grad_s = w * (grad_w - sum(grad_w * w))`
//! 4. `grad_Q_h = grad_s @ K_h / √d`, `grad_K_h = grad_s^T @ Q_h / √d`
//!
//! Masked positions have weight exactly 0, so step 3 sends them no gradient.
//! The three projections all read the same input, so their input gradients
//! are summed.

use super::dropout::{Dropout, DropoutCache};
use super::linear::{Linear, LinearCache, LinearGradients};
use crate::tensor::Tensor;
use rand::rngs::StdRng;

pub struct MultiHeadAttention {
    pub w_query: Linear,
    pub w_key: Linear,
    pub w_value: Linear,
    pub out_proj: Linear,
    pub dropout: Dropout,
    pub n_heads: usize,
}

impl MultiHeadAttention {
    pub fn new(
        emb_dim: usize,
        n_heads: usize,
        drop_rate: f32,
        qkv_bias: bool,
        rng: &mut StdRng,
    ) -> Self {
        assert_eq!(emb_dim % n_heads, 0, "emb_dim must be divisible by n_heads");
        Self {
            w_query: Linear::new(emb_dim, emb_dim, qkv_bias, rng),
            w_key: Linear::new(emb_dim, emb_dim, qkv_bias, rng),
            w_value: Linear::new(emb_dim, emb_dim, qkv_bias, rng),
            out_proj: Linear::new(emb_dim, emb_dim, true, rng),
            dropout: Dropout::new(drop_rate),
            n_heads,
        }
    }

    fn head_dim(&self) -> usize {
        self.w_query.out_features() / self.n_heads
    }

    /// Forward pass; `rng = None` disables attention dropout
    pub fn forward(&self, x: &Tensor, mut rng: Option<&mut StdRng>) -> (Tensor, AttentionCache) {
        let seq_len = x.rows();
        let head_dim = self.head_dim();
        let inv_scale = 1.0 / (head_dim as f32).sqrt();

        let (q, q_cache) = self.w_query.forward(x);
        let (k, k_cache) = self.w_key.forward(x);
        let (v, v_cache) = self.w_value.forward(x);

        let mut context = Tensor::zeros(vec![seq_len, self.w_query.out_features()]);
        let mut heads = Vec::with_capacity(self.n_heads);

        for h in 0..self.n_heads {
            let start = h * head_dim;
            let q_h = q.slice_cols(start, head_dim);
            let k_h = k.slice_cols(start, head_dim);
            let v_h = v.slice_cols(start, head_dim);

            let mut scores = q_h.matmul_t(&k_h);
            for i in 0..seq_len {
                for j in 0..seq_len {
                    let s = &mut scores.data[i * seq_len + j];
                    *s = if j > i { f32::NEG_INFINITY } else { *s * inv_scale };
                }
            }

            let weights = scores.softmax_rows();
            let (dropped, dropout_cache) = self.dropout.forward(&weights, rng.as_deref_mut());
            context.write_cols(start, &dropped.matmul(&v_h));

            heads.push(HeadCache {
                weights,
                dropped,
                dropout_cache,
            });
        }

        let (y, out_cache) = self.out_proj.forward(&context);

        let cache = AttentionCache {
            q,
            k,
            v,
            heads,
            q_cache,
            k_cache,
            v_cache,
            out_cache,
        };
        (y, cache)
    }

    pub fn backward(&self, grad_out: &Tensor, cache: &AttentionCache) -> AttentionGradients {
        let seq_len = cache.q.rows();
        let head_dim = self.head_dim();
        let inv_scale = 1.0 / (head_dim as f32).sqrt();

        let out_proj = self.out_proj.backward(grad_out, &cache.out_cache);
        let grad_context = &out_proj.x;

        let mut grad_q = Tensor::zeros(cache.q.shape.clone());
        let mut grad_k = Tensor::zeros(cache.k.shape.clone());
        let mut grad_v = Tensor::zeros(cache.v.shape.clone());

        for (h, head) in cache.heads.iter().enumerate() {
            let start = h * head_dim;
            let grad_ctx_h = grad_context.slice_cols(start, head_dim);
            let q_h = cache.q.slice_cols(start, head_dim);
            let k_h = cache.k.slice_cols(start, head_dim);
            let v_h = cache.v.slice_cols(start, head_dim);

            grad_v.write_cols(start, &head.dropped.t_matmul(&grad_ctx_h));

            let grad_dropped = grad_ctx_h.matmul_t(&v_h);
            let grad_weights = self.dropout.backward(&grad_dropped, &head.dropout_cache);

            let mut grad_scores = vec![0.0; seq_len * seq_len];
            for i in 0..seq_len {
                let w = head.weights.row(i);
                let gw = grad_weights.row(i);
                let dot: f32 = w.iter().zip(gw).map(|(a, b)| a * b).sum();
                for j in 0..seq_len {
                    grad_scores[i * seq_len + j] = w[j] * (gw[j] - dot) * inv_scale;
                }
            }
            let grad_scores = Tensor::new(grad_scores, vec![seq_len, seq_len]);

            grad_q.write_cols(start, &grad_scores.matmul(&k_h));
            grad_k.write_cols(start, &grad_scores.t_matmul(&q_h));
        }

        let query = self.w_query.backward(&grad_q, &cache.q_cache);
        let key = self.w_key.backward(&grad_k, &cache.k_cache);
        let value = self.w_value.backward(&grad_v, &cache.v_cache);

        let mut x = query.x.clone();
        x.add_assign(&key.x);
        x.add_assign(&value.x);

        AttentionGradients {
            query,
            key,
            value,
            out_proj,
            x,
        }
    }

    pub(crate) fn collect_params<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        self.w_query.collect_params(out);
        self.w_key.collect_params(out);
        self.w_value.collect_params(out);
        self.out_proj.collect_params(out);
    }

    pub(crate) fn collect_params_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        self.w_query.collect_params_mut(out);
        self.w_key.collect_params_mut(out);
        self.w_value.collect_params_mut(out);
        self.out_proj.collect_params_mut(out);
    }
}

/// Per-head values saved for the backward pass
pub struct HeadCache {
    /// Softmax output before dropout
    pub weights: Tensor,
    /// Weights actually multiplied with V
    pub dropped: Tensor,
    pub dropout_cache: DropoutCache,
}

pub struct AttentionCache {
    pub q: Tensor,
    pub k: Tensor,
    pub v: Tensor,
    pub heads: Vec<HeadCache>,
    pub q_cache: LinearCache,
    pub k_cache: LinearCache,
    pub v_cache: LinearCache,
    pub out_cache: LinearCache,
}

pub struct AttentionGradients {
    pub query: LinearGradients,
    pub key: LinearGradients,
    pub value: LinearGradients,
    pub out_proj: LinearGradients,
    pub x: Tensor,
}

impl AttentionGradients {
    pub(crate) fn collect<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        self.query.collect(out);
        self.key.collect(out);
        self.value.collect(out);
        self.out_proj.collect(out);
    }

    pub(crate) fn collect_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        self.query.collect_mut(out);
        self.key.collect_mut(out);
        self.value.collect_mut(out);
        self.out_proj.collect_mut(out);
    }
}
