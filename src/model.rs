//! GPT Model
//!
//! The full decoder-only transformer, trainable end to end:
//!
//! ```text
//! token ids [seq]
//!   → tok_emb[id] + pos_emb[pos]        [seq, emb]
//!   → dropout
//!   → TransformerBlock × n_layers
//!   → final LayerNorm
//!   → out_head (no bias)                 [seq, vocab]
//! ```
//!
//! ## Training Mode
//!
//! There is no train/eval flag on the model. Passing `Some(rng)` to
//! [`GPTModel::forward`] enables every dropout layer and draws the masks
//! from that generator; passing `None` runs the deterministic inference
//! path used for evaluation and generation.
//!
//! ## Batches
//!
//! A batch is a slice of equal-length token sequences. Each sequence goes
//! through forward and backward on its own, and the per-sequence gradients
//! are summed in batch order. The loss is the mean cross-entropy over every
//! target token in the batch.
//!
//! ## Parameter Order
//!
//! [`GPTModel::parameters`], [`ModelGradients::collect`] and the checkpoint
//! format all walk the parameters in the same fixed order:
//!
//! ```text
//! tok_emb, pos_emb,
//! per block: norm1 (scale, shift), W_q [b_q], W_k [b_k], W_v [b_v],
//!            out_proj (W, b), norm2 (scale, shift), fc1 (W, b), fc2 (W, b)
//! final_norm (scale, shift), out_head W
//! ```

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use crate::layers::{
    BlockCache, BlockGradients, Dropout, DropoutCache, LayerNorm, LayerNormCache,
    LayerNormGradients, Linear, LinearCache, LinearGradients, TransformerBlock,
};
use crate::tensor::Tensor;
use rand::distributions::WeightedIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

const CHECKPOINT_MAGIC: &[u8; 8] = b"WHRTCKPT";
const CHECKPOINT_VERSION: u8 = 1;
/// Serialized `ModelConfig` is a few hundred bytes
const MAX_CONFIG_BYTES: usize = 64 * 1024;

/// GPT language model
pub struct GPTModel {
    pub config: ModelConfig,
    /// Token embeddings `[vocab_size, emb_dim]`
    pub tok_emb: Tensor,
    /// Learned position embeddings `[context_length, emb_dim]`
    pub pos_emb: Tensor,
    pub drop_emb: Dropout,
    pub blocks: Vec<TransformerBlock>,
    pub final_norm: LayerNorm,
    pub out_head: Linear,
}

impl GPTModel {
    /// Build a freshly initialised model
    ///
    /// Embeddings are drawn from N(0, 1); linear layers use uniform
    /// `±1/√in_features`. All randomness comes from `rng`, so the same seed
    /// always yields the same weights.
    pub fn new(config: &ModelConfig, rng: &mut StdRng) -> Self {
        let tok_emb = normal_tensor(config.vocab_size, config.emb_dim, rng);
        let pos_emb = normal_tensor(config.context_length, config.emb_dim, rng);
        let blocks = (0..config.n_layers)
            .map(|_| TransformerBlock::new(config, rng))
            .collect();
        let out_head = Linear::new(config.emb_dim, config.vocab_size, false, rng);

        Self {
            config: config.clone(),
            tok_emb,
            pos_emb,
            drop_emb: Dropout::new(config.drop_rate),
            blocks,
            final_norm: LayerNorm::new(config.emb_dim),
            out_head,
        }
    }

    /// Forward pass over one sequence
    ///
    /// Returns logits `[seq, vocab_size]` and the cache for [`backward`](Self::backward).
    ///
    /// # Panics
    ///
    /// Panics if the sequence is empty, longer than `context_length`, or
    /// contains an id outside the vocabulary.
    pub fn forward(&self, ids: &[usize], mut rng: Option<&mut StdRng>) -> (Tensor, ModelCache) {
        let seq_len = ids.len();
        let emb_dim = self.config.emb_dim;
        assert!(
            seq_len > 0 && seq_len <= self.config.context_length,
            "Sequence length {} outside 1..={}",
            seq_len,
            self.config.context_length
        );

        let mut embedded = vec![0.0; seq_len * emb_dim];
        for (pos, &id) in ids.iter().enumerate() {
            assert!(
                id < self.config.vocab_size,
                "Token id {} out of vocabulary ({})",
                id,
                self.config.vocab_size
            );
            let tok = self.tok_emb.row(id);
            let p = self.pos_emb.row(pos);
            for (j, out) in embedded[pos * emb_dim..(pos + 1) * emb_dim]
                .iter_mut()
                .enumerate()
            {
                *out = tok[j] + p[j];
            }
        }
        let embedded = Tensor::new(embedded, vec![seq_len, emb_dim]);
        let (mut x, drop_cache) = self.drop_emb.forward(&embedded, rng.as_deref_mut());

        let mut block_caches = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            let (next, cache) = block.forward(&x, rng.as_deref_mut());
            block_caches.push(cache);
            x = next;
        }

        let (normed, final_norm_cache) = self.final_norm.forward(&x);
        let (logits, head_cache) = self.out_head.forward(&normed);

        let cache = ModelCache {
            ids: ids.to_vec(),
            drop_cache,
            block_caches,
            final_norm_cache,
            head_cache,
        };
        (logits, cache)
    }

    /// Inference-mode logits for one sequence
    pub fn logits(&self, ids: &[usize]) -> Tensor {
        self.forward(ids, None).0
    }

    pub fn backward(&self, grad_logits: &Tensor, cache: &ModelCache) -> ModelGradients {
        let out_head = self.out_head.backward(grad_logits, &cache.head_cache);
        let final_norm = self.final_norm.backward(&out_head.x, &cache.final_norm_cache);

        let mut grad_x = final_norm.x.clone();
        let mut blocks = Vec::with_capacity(self.blocks.len());
        for (block, block_cache) in self.blocks.iter().zip(&cache.block_caches).rev() {
            let grads = block.backward(&grad_x, block_cache);
            grad_x = grads.x.clone();
            blocks.push(grads);
        }
        blocks.reverse();

        let grad_embedded = self.drop_emb.backward(&grad_x, &cache.drop_cache);

        // Scatter into the rows that were looked up
        let emb_dim = self.config.emb_dim;
        let mut tok_emb = Tensor::zeros(self.tok_emb.shape.clone());
        let mut pos_emb = Tensor::zeros(self.pos_emb.shape.clone());
        for (pos, &id) in cache.ids.iter().enumerate() {
            let g = grad_embedded.row(pos);
            for j in 0..emb_dim {
                tok_emb.data[id * emb_dim + j] += g[j];
                pos_emb.data[pos * emb_dim + j] += g[j];
            }
        }

        ModelGradients {
            tok_emb,
            pos_emb,
            blocks,
            final_norm,
            out_head,
        }
    }

    /// Mean cross-entropy over a batch and the matching parameter gradients
    ///
    /// `rng = Some(..)` trains with dropout; `None` computes exact
    /// inference-mode gradients.
    pub fn loss_and_gradients(
        &self,
        inputs: &[Vec<usize>],
        targets: &[Vec<usize>],
        mut rng: Option<&mut StdRng>,
    ) -> (f32, ModelGradients) {
        assert_eq!(inputs.len(), targets.len(), "Batch size mismatch");
        assert!(!inputs.is_empty(), "Empty batch");
        let total_tokens: usize = targets.iter().map(Vec::len).sum();

        let (mut loss, mut grads) =
            self.sequence_gradients(&inputs[0], &targets[0], total_tokens, rng.as_deref_mut());
        for (ids, target) in inputs.iter().zip(targets).skip(1) {
            let (seq_loss, seq_grads) =
                self.sequence_gradients(ids, target, total_tokens, rng.as_deref_mut());
            loss += seq_loss;
            grads.accumulate(&seq_grads);
        }
        (loss, grads)
    }

    /// One sequence's share of the batch loss and gradients
    fn sequence_gradients(
        &self,
        ids: &[usize],
        target: &[usize],
        total_tokens: usize,
        rng: Option<&mut StdRng>,
    ) -> (f32, ModelGradients) {
        let (logits, cache) = self.forward(ids, rng);
        let (seq_loss, mut grad_logits) = cross_entropy(&logits, target);

        // Reweight the per-sequence mean into the batch-wide mean
        let weight = target.len() as f32 / total_tokens as f32;
        grad_logits.scale(weight);
        (seq_loss * weight, self.backward(&grad_logits, &cache))
    }

    /// Mean cross-entropy of a batch in inference mode
    pub fn batch_loss(&self, inputs: &[Vec<usize>], targets: &[Vec<usize>]) -> f32 {
        let total_tokens: usize = targets.iter().map(Vec::len).sum();
        inputs
            .iter()
            .zip(targets)
            .map(|(ids, target)| {
                let (loss, _) = cross_entropy(&self.logits(ids), target);
                loss * target.len() as f32 / total_tokens as f32
            })
            .sum()
    }

    /// All trainable tensors in checkpoint order
    pub fn parameters(&self) -> Vec<&Tensor> {
        let mut out = vec![&self.tok_emb, &self.pos_emb];
        for block in &self.blocks {
            block.collect_params(&mut out);
        }
        self.final_norm.collect_params(&mut out);
        self.out_head.collect_params(&mut out);
        out
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Tensor> {
        let mut out = vec![&mut self.tok_emb, &mut self.pos_emb];
        for block in &mut self.blocks {
            block.collect_params_mut(&mut out);
        }
        self.final_norm.collect_params_mut(&mut out);
        self.out_head.collect_params_mut(&mut out);
        out
    }

    /// Which parameters receive weight decay
    ///
    /// Only 2D weight matrices decay. Embeddings, biases and LayerNorm
    /// parameters do not.
    pub fn decay_mask(&self) -> Vec<bool> {
        self.parameters()
            .iter()
            .enumerate()
            .map(|(i, p)| i >= 2 && p.shape.len() == 2)
            .collect()
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.data.len()).sum()
    }

    /// Autoregressive generation with temperature and top-k sampling
    ///
    /// `temperature == 0.0` decodes greedily and never touches `rng`.
    /// Generation stops early when `eos_id` is produced. An empty prompt
    /// has no position to predict from and is returned unchanged.
    pub fn generate(
        &self,
        ids: &[usize],
        options: &GenerateOptions,
        rng: &mut StdRng,
    ) -> Vec<usize> {
        let context_size = self.config.context_length;
        let mut tokens = ids.to_vec();
        if tokens.is_empty() {
            return tokens;
        }

        for _ in 0..options.max_new_tokens {
            let start = tokens.len().saturating_sub(context_size);
            let logits = self.logits(&tokens[start..]);
            let mut last = logits.row(logits.rows() - 1).to_vec();

            if let Some(k) = options.top_k.filter(|&k| k > 0 && k < last.len()) {
                let mut sorted = last.clone();
                sorted.sort_by(|a, b| b.total_cmp(a));
                let threshold = sorted[k - 1];
                for v in last.iter_mut().filter(|v| **v < threshold) {
                    *v = f32::NEG_INFINITY;
                }
            }

            let next = if options.temperature > 0.0 {
                sample_with_temperature(&last, options.temperature, rng)
            } else {
                argmax(&last)
            };

            if options.eos_id == Some(next) {
                break;
            }
            tokens.push(next);
        }

        tokens
    }

    /// Write a checkpoint: magic, version, JSON config, then every parameter
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = BufWriter::new(File::create(path)?);

        file.write_all(CHECKPOINT_MAGIC)?;
        file.write_all(&[CHECKPOINT_VERSION])?;

        let config_json = serde_json::to_vec(&self.config)?;
        file.write_all(&(config_json.len() as u32).to_le_bytes())?;
        file.write_all(&config_json)?;

        let params = self.parameters();
        file.write_all(&(params.len() as u32).to_le_bytes())?;
        for tensor in params {
            write_tensor(&mut file, tensor)?;
        }
        file.flush()?;
        Ok(())
    }

    /// Read a checkpoint written by [`save`](Self::save)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 8];
        file.read_exact(&mut magic)?;
        if &magic != CHECKPOINT_MAGIC {
            return Err(Error::Checkpoint("bad magic header".to_string()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != CHECKPOINT_VERSION {
            return Err(Error::Checkpoint(format!(
                "unsupported version {}",
                version[0]
            )));
        }

        let config_len = read_u32(&mut file)? as usize;
        if config_len > MAX_CONFIG_BYTES {
            return Err(Error::Checkpoint(format!(
                "config header of {} bytes exceeds {}",
                config_len, MAX_CONFIG_BYTES
            )));
        }
        let mut config_json = vec![0u8; config_len];
        file.read_exact(&mut config_json)?;
        let config: ModelConfig = serde_json::from_slice(&config_json)?;
        config
            .validate()
            .map_err(|e| Error::Checkpoint(format!("stored config is invalid: {e}")))?;

        // Weights are overwritten below; the seed only shapes the tensors
        let mut model = GPTModel::new(&config, &mut StdRng::seed_from_u64(0));

        let count = read_u32(&mut file)? as usize;
        let mut params = model.parameters_mut();
        if count != params.len() {
            return Err(Error::Checkpoint(format!(
                "expected {} tensors, found {}",
                params.len(),
                count
            )));
        }
        for (i, param) in params.iter_mut().enumerate() {
            param.data = read_tensor(&mut file, i, &param.shape)?;
        }

        Ok(model)
    }
}

/// Sampling controls for [`GPTModel::generate`]
#[derive(Clone, Debug)]
pub struct GenerateOptions {
    pub max_new_tokens: usize,
    /// 0.0 means greedy decoding
    pub temperature: f32,
    pub top_k: Option<usize>,
    pub eos_id: Option<usize>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            max_new_tokens: 50,
            temperature: 0.0,
            top_k: None,
            eos_id: None,
        }
    }
}

/// Greedy decoding, cropping the context to the last `context_size` tokens
///
/// An empty prompt is returned unchanged.
pub fn generate_text_simple(
    model: &GPTModel,
    ids: &[usize],
    max_new_tokens: usize,
    context_size: usize,
) -> Vec<usize> {
    let mut tokens = ids.to_vec();
    if tokens.is_empty() {
        return tokens;
    }
    for _ in 0..max_new_tokens {
        let start = tokens.len().saturating_sub(context_size);
        let logits = model.logits(&tokens[start..]);
        tokens.push(argmax(logits.row(logits.rows() - 1)));
    }
    tokens
}

/// Mean cross-entropy of `logits [seq, vocab]` against `targets [seq]`
///
/// Returns the loss and its gradient with respect to the logits:
///
/// ```text
/// loss   = -mean(log softmax(logits)[target])
/// grad   = (softmax(logits) - one_hot(target)) / seq
/// ```
pub fn cross_entropy(logits: &Tensor, targets: &[usize]) -> (f32, Tensor) {
    let (seq_len, vocab) = (logits.rows(), logits.cols());
    assert_eq!(seq_len, targets.len(), "One target per logit row");
    let inv_n = 1.0 / seq_len as f32;

    let mut grad = logits.data.clone();
    let row_losses: Vec<f32> = grad
        .par_chunks_mut(vocab)
        .zip(targets.par_iter())
        .map(|(row, &target)| {
            let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let target_logit = row[target] - max;
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            let loss = sum.ln() - target_logit;
            for v in row.iter_mut() {
                *v = *v / sum * inv_n;
            }
            row[target] -= inv_n;
            loss
        })
        .collect();

    // Summed in row order so the result does not depend on thread count
    let loss = row_losses.iter().sum::<f32>() * inv_n;
    (loss, Tensor::new(grad, logits.shape.clone()))
}

/// Cached activations from [`GPTModel::forward`]
pub struct ModelCache {
    ids: Vec<usize>,
    drop_cache: DropoutCache,
    block_caches: Vec<BlockCache>,
    final_norm_cache: LayerNormCache,
    head_cache: LinearCache,
}

/// Gradients for every parameter of a [`GPTModel`]
pub struct ModelGradients {
    pub tok_emb: Tensor,
    pub pos_emb: Tensor,
    pub blocks: Vec<BlockGradients>,
    pub final_norm: LayerNormGradients,
    pub out_head: LinearGradients,
}

impl ModelGradients {
    /// Parameter gradients in the same order as [`GPTModel::parameters`]
    pub fn collect(&self) -> Vec<&Tensor> {
        let mut out = vec![&self.tok_emb, &self.pos_emb];
        for block in &self.blocks {
            block.collect(&mut out);
        }
        self.final_norm.collect(&mut out);
        self.out_head.collect(&mut out);
        out
    }

    pub fn collect_mut(&mut self) -> Vec<&mut Tensor> {
        let mut out = vec![&mut self.tok_emb, &mut self.pos_emb];
        for block in &mut self.blocks {
            block.collect_mut(&mut out);
        }
        self.final_norm.collect_mut(&mut out);
        self.out_head.collect_mut(&mut out);
        out
    }

    /// `self += other`, parameter by parameter
    pub fn accumulate(&mut self, other: &ModelGradients) {
        for (acc, g) in self.collect_mut().into_iter().zip(other.collect()) {
            acc.add_assign(g);
        }
    }
}

fn normal_tensor(rows: usize, cols: usize, rng: &mut StdRng) -> Tensor {
    let data = (0..rows * cols)
        .map(|_| StandardNormal.sample(rng))
        .collect();
    Tensor::new(data, vec![rows, cols])
}

fn argmax(values: &[f32]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(bi, bv), (i, &v)| {
            if v > bv {
                (i, v)
            } else {
                (bi, bv)
            }
        })
        .0
}

fn sample_with_temperature(logits: &[f32], temperature: f32, rng: &mut StdRng) -> usize {
    let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let weights: Vec<f32> = logits
        .iter()
        .map(|&v| ((v - max) / temperature).exp())
        .collect();
    match WeightedIndex::new(&weights) {
        Ok(dist) => rng.sample(dist),
        Err(_) => argmax(logits),
    }
}

fn write_tensor<W: Write>(out: &mut W, tensor: &Tensor) -> Result<()> {
    out.write_all(&(tensor.shape.len() as u32).to_le_bytes())?;
    for &dim in &tensor.shape {
        out.write_all(&(dim as u32).to_le_bytes())?;
    }
    out.write_all(&(tensor.data.len() as u32).to_le_bytes())?;
    for &val in &tensor.data {
        out.write_all(&val.to_le_bytes())?;
    }
    Ok(())
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32> {
    let mut bytes = [0u8; 4];
    input.read_exact(&mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Read the data of parameter `index`, rejecting any header that
/// disagrees with `expected` before allocating
fn read_tensor<R: Read>(input: &mut R, index: usize, expected: &[usize]) -> Result<Vec<f32>> {
    let rank = read_u32(input)? as usize;
    if rank != expected.len() {
        return Err(Error::Checkpoint(format!(
            "tensor {} has rank {}, expected shape {:?}",
            index, rank, expected
        )));
    }

    let mut shape = Vec::with_capacity(rank);
    for _ in 0..rank {
        shape.push(read_u32(input)? as usize);
    }
    if shape != expected {
        return Err(Error::Checkpoint(format!(
            "tensor {} has shape {:?}, expected {:?}",
            index, shape, expected
        )));
    }

    let numel = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| {
            Error::Checkpoint(format!("tensor {} shape {:?} overflows", index, shape))
        })?;
    let len = read_u32(input)? as usize;
    if len != numel {
        return Err(Error::Checkpoint(format!(
            "tensor {} has length {}, expected {}",
            index, len, numel
        )));
    }

    let byte_len = len
        .checked_mul(4)
        .ok_or_else(|| {
            Error::Checkpoint(format!("tensor {} length {} overflows", index, len))
        })?;
    let mut bytes = vec![0u8; byte_len];
    input.read_exact(&mut bytes)?;
    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            vocab_size: 11,
            context_length: 6,
            emb_dim: 8,
            n_heads: 2,
            n_layers: 2,
            drop_rate: 0.1,
            qkv_bias: true,
        }
    }

    fn tiny_model(seed: u64) -> GPTModel {
        GPTModel::new(&tiny_config(), &mut StdRng::seed_from_u64(seed))
    }

    #[test]
    fn test_parameter_count() {
        let c = tiny_config();
        let model = tiny_model(0);
        let e = c.emb_dim;
        let per_block = 2 * e          // norm1
            + 3 * (e * e + e)          // q, k, v with bias
            + (e * e + e)              // out_proj
            + 2 * e                    // norm2
            + (e * 4 * e + 4 * e)      // fc1
            + (4 * e * e + e); // fc2
        let expected = c.vocab_size * e
            + c.context_length * e
            + c.n_layers * per_block
            + 2 * e
            + e * c.vocab_size;
        assert_eq!(model.num_parameters(), expected);
    }

    #[test]
    fn test_decay_mask_skips_embeddings_and_vectors() {
        let model = tiny_model(0);
        let params = model.parameters();
        let mask = model.decay_mask();
        assert_eq!(params.len(), mask.len());
        assert!(!mask[0] && !mask[1]);
        for (p, &decay) in params.iter().zip(&mask).skip(2) {
            assert_eq!(decay, p.shape.len() == 2);
        }
        assert!(*mask.last().unwrap());
    }

    #[test]
    fn test_cross_entropy_of_uniform_logits() {
        let logits = Tensor::zeros(vec![3, 4]);
        let (loss, grad) = cross_entropy(&logits, &[0, 1, 3]);
        assert!((loss - 4f32.ln()).abs() < 1e-6);
        // Each row of the gradient sums to zero
        for i in 0..3 {
            assert!(grad.row(i).iter().sum::<f32>().abs() < 1e-6);
        }
        assert!((grad.data[0] - (0.25 - 1.0) / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_gradients_match_finite_difference() {
        let mut model = tiny_model(3);
        let inputs = vec![vec![1, 4, 2, 7], vec![3, 3, 9, 0]];
        let targets = vec![vec![4, 2, 7, 5], vec![3, 9, 0, 10]];
        let (_, grads) = model.loss_and_gradients(&inputs, &targets, None);

        // (parameter index, element) pairs: pos_emb, a block weight, out_head
        let n_params = model.parameters().len();
        let probes = [(1, 3), (4, 5), (n_params - 1, 17)];
        let analytic: Vec<f32> = probes
            .iter()
            .map(|&(p, i)| grads.collect()[p].data[i])
            .collect();

        let eps = 1e-2;
        for (&(p, i), &a) in probes.iter().zip(&analytic) {
            let base = model.parameters()[p].data[i];
            model.parameters_mut()[p].data[i] = base + eps;
            let plus = model.batch_loss(&inputs, &targets);
            model.parameters_mut()[p].data[i] = base - eps;
            let minus = model.batch_loss(&inputs, &targets);
            model.parameters_mut()[p].data[i] = base;

            let numeric = (plus - minus) / (2.0 * eps);
            assert!(
                (a - numeric).abs() < 2e-3 + 0.05 * numeric.abs(),
                "param {} elem {}: analytic {} numeric {}",
                p,
                i,
                a,
                numeric
            );
        }
    }

    #[test]
    fn test_dropout_only_with_rng() {
        let model = tiny_model(1);
        let ids = [1, 2, 3];
        assert_eq!(model.logits(&ids), model.logits(&ids));

        let mut rng = StdRng::seed_from_u64(5);
        let (train_logits, _) = model.forward(&ids, Some(&mut rng));
        assert_ne!(train_logits, model.logits(&ids));
    }

    #[test]
    fn test_greedy_generate_matches_simple() {
        let model = tiny_model(2);
        let prompt = [1, 2];
        let simple = generate_text_simple(&model, &prompt, 8, model.config.context_length);
        let options = GenerateOptions {
            max_new_tokens: 8,
            ..Default::default()
        };
        let greedy = model.generate(&prompt, &options, &mut StdRng::seed_from_u64(0));
        assert_eq!(simple, greedy);
        assert_eq!(simple.len(), 10);

        // top_k = 1 leaves only the argmax, whatever the temperature
        let top1 = GenerateOptions {
            max_new_tokens: 8,
            temperature: 1.5,
            top_k: Some(1),
            eos_id: None,
        };
        assert_eq!(model.generate(&prompt, &top1, &mut StdRng::seed_from_u64(9)), simple);
    }

    #[test]
    fn test_generate_stops_at_eos() {
        let model = tiny_model(2);
        let first = generate_text_simple(&model, &[1], 1, 6)[1];
        let options = GenerateOptions {
            max_new_tokens: 5,
            eos_id: Some(first),
            ..Default::default()
        };
        assert_eq!(model.generate(&[1], &options, &mut StdRng::seed_from_u64(0)), vec![1]);
    }

    #[test]
    fn test_empty_prompt_returned_unchanged() {
        let model = tiny_model(3);
        assert!(generate_text_simple(&model, &[], 3, 4).is_empty());

        let options = GenerateOptions {
            max_new_tokens: 3,
            temperature: 1.0,
            ..Default::default()
        };
        assert!(model
            .generate(&[], &options, &mut StdRng::seed_from_u64(0))
            .is_empty());
    }
}
