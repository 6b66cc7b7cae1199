//! Training Orchestrator
//!
//! Runs a complete training job from a model configuration and a set of
//! training settings, and hands back the loss history together with the
//! trained model:
//!
//! ```text
//! run(model_config, settings) -> (train_losses, val_losses, tokens_seen, model)
//! ```
//!
//! ## Procedure
//!
//! ```text
//! seed rng ─→ build model
//! corpus ─→ split 90/10 by characters ─→ tokenize ─→ windows of context_length
//!
//! for epoch in 1..=num_epochs:
//!     for batch in shuffled train batches (partial batch dropped):
//!         loss, grads = model.loss_and_gradients(batch, dropout on)
//!         AdamW step
//!         tokens_seen += tokens in batch
//!         if global_step % eval_freq == 0:
//!             train/val loss on the first eval_iter batches (dropout off)
//!             record (train_loss, val_loss, tokens_seen)
//!         global_step += 1
//!     greedy sample from start_context
//! ```
//!
//! The number of checkpoints is `ceil(num_epochs * train_batches / eval_freq)`.
//!
//! ## Determinism
//!
//! Every random choice (initial weights, shuffling, dropout masks) comes
//! from one `StdRng` seeded from [`TrainerOptions::seed`], and no kernel
//! uses parallel floating-point reductions, so identical inputs produce
//! identical histories.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wharton::{train, ModelConfig, TrainingSettings};
//!
//! let config = ModelConfig::gpt2_124m();
//! let settings = TrainingSettings::default();
//! let (train_losses, val_losses, tokens_seen, model) = train::run(&config, &settings)?.into_parts();
//! # Ok::<(), wharton::Error>(())
//! ```

use crate::config::{ModelConfig, RunConfig, TrainerOptions, TrainingSettings};
use crate::data::{split_text, Batch, DataLoader, GptDataset, CORPUS};
use crate::error::{Error, Result};
use crate::model::{generate_text_simple, GPTModel};
use crate::optimizer::AdamW;
use crate::tokenizer::{text_to_token_ids, token_ids_to_text, ByteTokenizer, Tokenizer};
use crate::training_logger::{CheckpointRecord, TrainingLogger};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info};

/// Losses and token counts sampled at each evaluation checkpoint
///
/// The three sequences always have the same length.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrainingHistory {
    pub train_losses: Vec<f32>,
    pub val_losses: Vec<f32>,
    pub tokens_seen: Vec<usize>,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.train_losses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.train_losses.is_empty()
    }

    fn record(&mut self, train_loss: f32, val_loss: f32, tokens_seen: usize) {
        self.train_losses.push(train_loss);
        self.val_losses.push(val_loss);
        self.tokens_seen.push(tokens_seen);
    }
}

/// Outcome of a training run
pub struct TrainingRun {
    pub history: TrainingHistory,
    pub model: GPTModel,
    /// Text generated from the start context after each epoch
    pub samples: Vec<String>,
}

impl TrainingRun {
    /// `(train_losses, val_losses, tokens_seen, model)`
    pub fn into_parts(self) -> (Vec<f32>, Vec<f32>, Vec<usize>, GPTModel) {
        let TrainingHistory {
            train_losses,
            val_losses,
            tokens_seen,
        } = self.history;
        (train_losses, val_losses, tokens_seen, self.model)
    }
}

/// Train on the bundled corpus with default trainer options
pub fn run(config: &ModelConfig, settings: &TrainingSettings) -> Result<TrainingRun> {
    Trainer::new(config.clone(), settings.clone(), TrainerOptions::default())?.train(None)
}

/// [`run`] with configuration given as loosely-typed JSON mappings
///
/// Missing or malformed keys surface as [`Error::Config`].
pub fn run_from_maps(
    config: serde_json::Value,
    settings: serde_json::Value,
) -> Result<TrainingRun> {
    let config = ModelConfig::from_value(config)?;
    let settings = TrainingSettings::from_value(settings)?;
    run(&config, &settings)
}

/// A validated training job
pub struct Trainer {
    config: ModelConfig,
    settings: TrainingSettings,
    options: TrainerOptions,
    tokenizer: ByteTokenizer,
}

impl Trainer {
    pub fn new(
        config: ModelConfig,
        settings: TrainingSettings,
        options: TrainerOptions,
    ) -> Result<Self> {
        config.validate()?;
        settings.validate()?;
        options.validate()?;

        let tokenizer = ByteTokenizer;
        if tokenizer.vocab_size() > config.vocab_size {
            return Err(Error::config(format!(
                "tokenizer produces {} ids but vocab_size is {}",
                tokenizer.vocab_size(),
                config.vocab_size
            )));
        }

        Ok(Self {
            config,
            settings,
            options,
            tokenizer,
        })
    }

    pub fn from_run_config(run: &RunConfig) -> Result<Self> {
        Self::new(run.model.clone(), run.training.clone(), run.trainer.clone())
    }

    /// Train on the bundled corpus
    pub fn train(&self, logger: Option<&mut TrainingLogger>) -> Result<TrainingRun> {
        self.train_on(CORPUS, logger)
    }

    /// Train on arbitrary text
    ///
    /// Fails with [`Error::Resource`] if either split is too short to
    /// produce a single batch.
    pub fn train_on(
        &self,
        text: &str,
        mut logger: Option<&mut TrainingLogger>,
    ) -> Result<TrainingRun> {
        let context_length = self.config.context_length;
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let mut model = GPTModel::new(&self.config, &mut rng);

        let (train_text, val_text) = split_text(text, self.options.train_ratio);
        let train_loader = self.loader(train_text, true);
        let val_loader = self.loader(val_text, false);

        if train_loader.num_batches() == 0 {
            return Err(Error::resource(format!(
                "training split ({} chars) yields no batches of {} x {} tokens",
                train_text.chars().count(),
                self.settings.batch_size,
                context_length
            )));
        }
        if val_loader.num_batches() == 0 {
            return Err(Error::resource(format!(
                "validation split ({} chars) yields no batches of {} tokens",
                val_text.chars().count(),
                context_length
            )));
        }

        debug!(
            parameters = model.num_parameters(),
            train_windows = train_loader.dataset().len(),
            train_batches = train_loader.num_batches(),
            val_windows = val_loader.dataset().len(),
            val_batches = val_loader.num_batches(),
            "starting training"
        );

        let mut optimizer = AdamW::new(
            &model,
            self.settings.learning_rate,
            self.settings.weight_decay,
        );
        let mut history = TrainingHistory::default();
        let mut samples = Vec::with_capacity(self.settings.num_epochs);
        let mut tokens_seen = 0usize;
        let mut global_step = 0usize;

        for epoch in 1..=self.settings.num_epochs {
            for (inputs, targets) in train_loader.batches(Some(&mut rng)) {
                let (_, grads) = model.loss_and_gradients(&inputs, &targets, Some(&mut rng));
                optimizer.step(&mut model, &grads);
                tokens_seen += inputs.iter().map(Vec::len).sum::<usize>();

                if global_step % self.options.eval_freq == 0 {
                    let (train_loss, val_loss) =
                        evaluate_model(&model, &train_loader, &val_loader, self.options.eval_iter);
                    history.record(train_loss, val_loss, tokens_seen);
                    info!(
                        "Ep {} (Step {:06}): Train loss {:.3}, Val loss {:.3}",
                        epoch, global_step, train_loss, val_loss
                    );

                    if let Some(logger) = logger.as_deref_mut() {
                        logger.log(&CheckpointRecord {
                            epoch,
                            step: global_step,
                            tokens_seen,
                            train_loss,
                            val_loss,
                        })?;
                    }
                }
                global_step += 1;
            }

            let sample = generate_and_log_sample(
                &model,
                &self.tokenizer,
                &self.options.start_context,
                self.options.sample_tokens,
            );
            samples.push(sample);
        }

        Ok(TrainingRun {
            history,
            model,
            samples,
        })
    }

    fn loader(&self, text: &str, train: bool) -> DataLoader {
        let ids = text_to_token_ids(text, &self.tokenizer);
        let context_length = self.config.context_length;
        let dataset = GptDataset::new(&ids, context_length, context_length);
        DataLoader::new(dataset, self.settings.batch_size, train, train)
    }
}

/// Mean cross-entropy of one batch, dropout off
pub fn calc_loss_batch(model: &GPTModel, inputs: &[Vec<usize>], targets: &[Vec<usize>]) -> f32 {
    model.batch_loss(inputs, targets)
}

/// Mean batch loss over the first `num_batches` batches (all if `None`)
///
/// Returns NaN for an empty loader.
pub fn calc_loss_loader(model: &GPTModel, batches: &[Batch], num_batches: Option<usize>) -> f32 {
    if batches.is_empty() {
        return f32::NAN;
    }
    let n = num_batches.map_or(batches.len(), |n| n.min(batches.len()));
    let total: f32 = batches[..n]
        .iter()
        .map(|(inputs, targets)| calc_loss_batch(model, inputs, targets))
        .sum();
    total / n as f32
}

/// `(train_loss, val_loss)` estimated from the first `eval_iter` batches of
/// each loader, in corpus order
pub fn evaluate_model(
    model: &GPTModel,
    train_loader: &DataLoader,
    val_loader: &DataLoader,
    eval_iter: usize,
) -> (f32, f32) {
    let train_loss = calc_loss_loader(model, &train_loader.first_batches(eval_iter), None);
    let val_loss = calc_loss_loader(model, &val_loader.first_batches(eval_iter), None);
    (train_loss, val_loss)
}

/// Greedily continue `start_context` and log the result on one line
pub fn generate_and_log_sample<T: Tokenizer + ?Sized>(
    model: &GPTModel,
    tokenizer: &T,
    start_context: &str,
    max_new_tokens: usize,
) -> String {
    let context_size = model.config.context_length;
    let ids = text_to_token_ids(start_context, tokenizer);
    let text = if ids.is_empty() {
        String::new()
    } else {
        let generated = generate_text_simple(model, &ids, max_new_tokens, context_size);
        token_ids_to_text(&generated, tokenizer)
    };
    let flat = text.replace('\n', " ");
    info!("{}", flat);
    flat
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            vocab_size: 256,
            context_length: 8,
            emb_dim: 16,
            n_heads: 2,
            n_layers: 1,
            drop_rate: 0.1,
            qkv_bias: false,
        }
    }

    fn tiny_settings() -> TrainingSettings {
        TrainingSettings {
            learning_rate: 1e-3,
            num_epochs: 1,
            batch_size: 4,
            weight_decay: 0.1,
        }
    }

    #[test]
    fn test_vocab_smaller_than_tokenizer_rejected() {
        let config = ModelConfig {
            vocab_size: 100,
            ..tiny_config()
        };
        let err = Trainer::new(config, tiny_settings(), TrainerOptions::default())
            .err()
            .unwrap();
        assert!(err.is_config());
    }

    #[test]
    fn test_checkpoint_cadence() {
        // 1000 chars → 900 train tokens → 112 windows → 28 batches
        let text: String = "abcdefghij".repeat(100);
        let trainer =
            Trainer::new(tiny_config(), tiny_settings(), TrainerOptions::default()).unwrap();
        let run = trainer.train_on(&text, None).unwrap();

        // Steps 0, 5, ..., 25
        assert_eq!(run.history.len(), 6);
        assert_eq!(run.history.tokens_seen[0], 4 * 8);
        assert_eq!(run.history.tokens_seen[5], 26 * 4 * 8);
        assert_eq!(run.samples.len(), 1);
        assert!(run.samples[0].starts_with("Every effort moves you"));
    }

    #[test]
    fn test_short_text_is_resource_error() {
        let trainer =
            Trainer::new(tiny_config(), tiny_settings(), TrainerOptions::default()).unwrap();
        let err = trainer.train_on("far too short", None).err().unwrap();
        assert!(err.is_resource());
    }

    #[test]
    fn test_calc_loss_loader_empty_is_nan() {
        let model = GPTModel::new(&tiny_config(), &mut StdRng::seed_from_u64(0));
        assert!(calc_loss_loader(&model, &[], Some(1)).is_nan());

        let batch: Batch = (vec![vec![1, 2, 3]], vec![vec![2, 3, 4]]);
        let one = calc_loss_loader(&model, std::slice::from_ref(&batch), None);
        assert_eq!(one, calc_loss_batch(&model, &batch.0, &batch.1));
        // num_batches larger than the loader is clamped
        let two = calc_loss_loader(&model, &[batch.clone(), batch], Some(10));
        assert!((one - two).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_model_uses_leading_batches() {
        let model = GPTModel::new(&tiny_config(), &mut StdRng::seed_from_u64(0));
        let tokens: Vec<usize> = (0..200).map(|i| i % 50).collect();
        let train = DataLoader::new(GptDataset::new(&tokens, 8, 8), 4, true, true);
        let val = DataLoader::new(GptDataset::new(&tokens[..60], 8, 8), 4, false, false);

        let (train_loss, val_loss) = evaluate_model(&model, &train, &val, 2);
        assert_eq!(train_loss, calc_loss_loader(&model, &train.batches(None), Some(2)));
        assert_eq!(val_loss, calc_loss_loader(&model, &val.batches(None), Some(2)));
    }
}
