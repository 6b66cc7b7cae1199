//! Transformer Block
//!
//! Pre-norm block with dropout on both residual branches:
//!
//! ```text
//! x → LayerNorm → Attention → Dropout → (+) → LayerNorm → FeedForward → Dropout → (+) → y
//! │                                      ↑ │                                         ↑
//! └──────────────────────────────────────┘ └─────────────────────────────────────────┘
//! ```
//!
//! ## Backward Pass
//!
//! At each residual join the incoming gradient flows both straight through
//! and into the sublayer, and the two paths are summed.

use super::attention::{AttentionCache, AttentionGradients, MultiHeadAttention};
use super::dropout::{Dropout, DropoutCache};
use super::layer_norm::{LayerNorm, LayerNormCache, LayerNormGradients};
use super::mlp::{FeedForward, FeedForwardCache, FeedForwardGradients};
use crate::config::ModelConfig;
use crate::tensor::Tensor;
use rand::rngs::StdRng;

pub struct TransformerBlock {
    pub norm1: LayerNorm,
    pub att: MultiHeadAttention,
    pub norm2: LayerNorm,
    pub ff: FeedForward,
    pub drop_shortcut: Dropout,
}

impl TransformerBlock {
    pub fn new(config: &ModelConfig, rng: &mut StdRng) -> Self {
        Self {
            norm1: LayerNorm::new(config.emb_dim),
            att: MultiHeadAttention::new(
                config.emb_dim,
                config.n_heads,
                config.drop_rate,
                config.qkv_bias,
                rng,
            ),
            norm2: LayerNorm::new(config.emb_dim),
            ff: FeedForward::new(config.emb_dim, rng),
            drop_shortcut: Dropout::new(config.drop_rate),
        }
    }

    pub fn forward(&self, x: &Tensor, mut rng: Option<&mut StdRng>) -> (Tensor, BlockCache) {
        let (n1, norm1_cache) = self.norm1.forward(x);
        let (a, att_cache) = self.att.forward(&n1, rng.as_deref_mut());
        let (a, drop1_cache) = self.drop_shortcut.forward(&a, rng.as_deref_mut());
        let x1 = x.add(&a);

        let (n2, norm2_cache) = self.norm2.forward(&x1);
        let (f, ff_cache) = self.ff.forward(&n2);
        let (f, drop2_cache) = self.drop_shortcut.forward(&f, rng.as_deref_mut());
        let y = x1.add(&f);

        let cache = BlockCache {
            norm1_cache,
            att_cache,
            drop1_cache,
            norm2_cache,
            ff_cache,
            drop2_cache,
        };
        (y, cache)
    }

    pub fn backward(&self, grad_out: &Tensor, cache: &BlockCache) -> BlockGradients {
        // Second residual: y = x1 + dropout(ff(norm2(x1)))
        let grad_f = self.drop_shortcut.backward(grad_out, &cache.drop2_cache);
        let ff = self.ff.backward(&grad_f, &cache.ff_cache);
        let norm2 = self.norm2.backward(&ff.x, &cache.norm2_cache);
        let mut grad_x1 = grad_out.clone();
        grad_x1.add_assign(&norm2.x);

        // First residual: x1 = x + dropout(att(norm1(x)))
        let grad_a = self.drop_shortcut.backward(&grad_x1, &cache.drop1_cache);
        let att = self.att.backward(&grad_a, &cache.att_cache);
        let norm1 = self.norm1.backward(&att.x, &cache.norm1_cache);
        let mut x = grad_x1;
        x.add_assign(&norm1.x);

        BlockGradients {
            norm1,
            att,
            norm2,
            ff,
            x,
        }
    }

    pub(crate) fn collect_params<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        self.norm1.collect_params(out);
        self.att.collect_params(out);
        self.norm2.collect_params(out);
        self.ff.collect_params(out);
    }

    pub(crate) fn collect_params_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        self.norm1.collect_params_mut(out);
        self.att.collect_params_mut(out);
        self.norm2.collect_params_mut(out);
        self.ff.collect_params_mut(out);
    }
}

pub struct BlockCache {
    pub norm1_cache: LayerNormCache,
    pub att_cache: AttentionCache,
    pub drop1_cache: DropoutCache,
    pub norm2_cache: LayerNormCache,
    pub ff_cache: FeedForwardCache,
    pub drop2_cache: DropoutCache,
}

pub struct BlockGradients {
    pub norm1: LayerNormGradients,
    pub att: AttentionGradients,
    pub norm2: LayerNormGradients,
    pub ff: FeedForwardGradients,
    pub x: Tensor,
}

impl BlockGradients {
    pub(crate) fn collect<'a>(&'a self, out: &mut Vec<&'a Tensor>) {
        self.norm1.collect(out);
        self.att.collect(out);
        self.norm2.collect(out);
        self.ff.collect(out);
    }

    pub(crate) fn collect_mut<'a>(&'a mut self, out: &mut Vec<&'a mut Tensor>) {
        self.norm1.collect_mut(out);
        self.att.collect_mut(out);
        self.norm2.collect_mut(out);
        self.ff.collect_mut(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            vocab_size: 16,
            context_length: 8,
            emb_dim: 8,
            n_heads: 2,
            n_layers: 1,
            drop_rate: 0.1,
            qkv_bias: false,
        }
    }

    #[test]
    fn test_params_and_gradients_line_up() {
        let mut rng = StdRng::seed_from_u64(0);
        let block = TransformerBlock::new(&tiny_config(), &mut rng);
        let x = Tensor::new((0..32).map(|i| (i as f32 * 0.1).sin()).collect(), vec![4, 8]);
        let (y, cache) = block.forward(&x, Some(&mut rng));
        let grads = block.backward(&Tensor::new(vec![1.0; 32], vec![4, 8]), &cache);

        let mut params = Vec::new();
        block.collect_params(&mut params);
        let mut grad_list = Vec::new();
        grads.collect(&mut grad_list);

        // 2 norms × 2 + q, k, v weights + out_proj (w, b) + fc1 (w, b) + fc2 (w, b)
        assert_eq!(params.len(), 13);
        assert_eq!(params.len(), grad_list.len());
        for (p, g) in params.iter().zip(&grad_list) {
            assert_eq!(p.shape, g.shape);
        }
        assert_eq!(y.shape, x.shape);
        assert_eq!(grads.x.shape, x.shape);
    }

    #[test]
    fn test_eval_forward_is_deterministic() {
        let mut rng = StdRng::seed_from_u64(1);
        let block = TransformerBlock::new(&tiny_config(), &mut rng);
        let x = Tensor::new(vec![0.5; 16], vec![2, 8]);
        let (a, _) = block.forward(&x, None);
        let (b, _) = block.forward(&x, None);
        assert_eq!(a, b);
    }
}
