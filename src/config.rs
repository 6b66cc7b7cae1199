//! Run Configuration
//!
//! Three typed structures describe a training run:
//!
//! - [`ModelConfig`]: the architecture. Fully determines the model's shape.
//! - [`TrainingSettings`]: the optimisation loop (learning rate, epochs,
//!   batch size, weight decay). Never affects shape.
//! - [`TrainerOptions`]: orchestration defaults (evaluation cadence, seed,
//!   train/validation split, sample prompt). Every field has a default.
//!
//! ## Sources
//!
//! Configurations can be built directly, taken from presets such as
//! [`ModelConfig::gpt2_124m`], read from a loosely-typed JSON mapping with
//! [`ModelConfig::from_value`], or loaded from a TOML file as a
//! [`RunConfig`]:
//!
//! ```toml
//! [model]
//! vocab_size = 50257
//! context_length = 256
//! emb_dim = 768
//! n_heads = 12
//! n_layers = 12
//! drop_rate = 0.1
//! qkv_bias = false
//!
//! [training]
//! learning_rate = 5e-4
//! num_epochs = 10
//! batch_size = 2
//! weight_decay = 0.1
//! ```
//!
//! Whatever the source, a missing key or an out-of-range value surfaces as
//! [`Error::Config`]. There are no silent defaults for model or training keys.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Model architecture hyperparameters
///
/// # Parameter Count
///
/// ```text
/// embeddings ≈ (vocab_size + context_length) × emb_dim
/// per_layer  ≈ 12 × emb_dim²
/// head       = emb_dim × vocab_size
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub context_length: usize,
    pub emb_dim: usize,
    pub n_heads: usize,
    pub n_layers: usize,
    pub drop_rate: f32,
    pub qkv_bias: bool,
}

impl ModelConfig {
    /// The 124M-parameter GPT-2 architecture
    pub fn gpt2_124m() -> Self {
        Self {
            vocab_size: 50257,
            context_length: 256,
            emb_dim: 768,
            n_heads: 12,
            n_layers: 12,
            drop_rate: 0.1,
            qkv_bias: false,
        }
    }

    /// Parse and validate a configuration from a JSON mapping
    ///
    /// All seven keys are required; extra keys are ignored.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| Error::config(format!("model config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Size of each attention head
    pub fn head_dim(&self) -> usize {
        self.emb_dim / self.n_heads
    }

    pub fn validate(&self) -> Result<()> {
        if self.vocab_size == 0 {
            return Err(Error::config("vocab_size must be > 0"));
        }
        if self.context_length == 0 {
            return Err(Error::config("context_length must be > 0"));
        }
        if self.emb_dim == 0 {
            return Err(Error::config("emb_dim must be > 0"));
        }
        if self.n_heads == 0 {
            return Err(Error::config("n_heads must be > 0"));
        }
        if self.emb_dim % self.n_heads != 0 {
            return Err(Error::config(format!(
                "emb_dim ({}) must be divisible by n_heads ({})",
                self.emb_dim, self.n_heads
            )));
        }
        if self.n_layers == 0 {
            return Err(Error::config("n_layers must be > 0"));
        }
        if !(0.0..1.0).contains(&self.drop_rate) {
            return Err(Error::config(format!(
                "drop_rate must be in [0, 1), got {}",
                self.drop_rate
            )));
        }
        Ok(())
    }
}

/// Optimisation-loop hyperparameters
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrainingSettings {
    pub learning_rate: f32,
    pub num_epochs: usize,
    pub batch_size: usize,
    pub weight_decay: f32,
}

impl TrainingSettings {
    /// Parse and validate settings from a JSON mapping
    ///
    /// All four keys are required; extra keys are ignored.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let settings: Self = serde_json::from_value(value)
            .map_err(|e| Error::config(format!("training settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(Error::config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::config("batch_size must be > 0"));
        }
        if !(self.weight_decay.is_finite() && self.weight_decay >= 0.0) {
            return Err(Error::config(format!(
                "weight_decay must be >= 0, got {}",
                self.weight_decay
            )));
        }
        Ok(())
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            learning_rate: 5e-4,
            num_epochs: 10,
            batch_size: 2,
            weight_decay: 0.1,
        }
    }
}

/// Orchestration knobs with fixed defaults
///
/// The defaults (evaluate every 5 batches on 1 batch per split, seed 123,
/// 90/10 split) are the values the training history lengths are calibrated
/// against.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerOptions {
    /// Evaluate every `eval_freq` optimizer steps
    pub eval_freq: usize,
    /// Number of batches averaged per loss estimate
    pub eval_iter: usize,
    pub seed: u64,
    /// Fraction of corpus characters used for training
    pub train_ratio: f64,
    /// Prompt for the sample generated after each epoch
    pub start_context: String,
    pub sample_tokens: usize,
}

impl Default for TrainerOptions {
    fn default() -> Self {
        Self {
            eval_freq: 5,
            eval_iter: 1,
            seed: 123,
            train_ratio: 0.9,
            start_context: "Every effort moves you".to_string(),
            sample_tokens: 50,
        }
    }
}

impl TrainerOptions {
    pub fn validate(&self) -> Result<()> {
        if self.eval_freq == 0 {
            return Err(Error::config("eval_freq must be > 0"));
        }
        if self.eval_iter == 0 {
            return Err(Error::config("eval_iter must be > 0"));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(Error::config(format!(
                "train_ratio must be in (0, 1), got {}",
                self.train_ratio
            )));
        }
        Ok(())
    }
}

/// Everything needed to launch a run, as stored in a TOML file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub model: ModelConfig,
    pub training: TrainingSettings,
    #[serde(default)]
    pub trainer: TrainerOptions,
}

impl RunConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| Error::config(format!("run config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.model.validate()?;
        self.training.validate()?;
        self.trainer.validate()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::gpt2_124m(),
            training: TrainingSettings::default(),
            trainer: TrainerOptions::default(),
        }
    }
}
