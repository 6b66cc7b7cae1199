//! Wharton: a GPT Language Model Trained From First Principles
//!
//! A small GPT-style transformer with hand-written forward and backward
//! passes, plus the training loop that drives it. The crate is built around
//! one contract:
//!
//! ```text
//! train::run(model_config, training_settings)
//!     -> (train_losses, val_losses, tokens_seen, model)
//! ```
//!
//! # Modules
//!
//! - [`config`] - Model, training and trainer configuration
//! - [`error`] - Error type shared by every module
//! - [`tensor`] - Row-major `f32` tensors with Rayon kernels
//! - [`layers`] - Linear, LayerNorm, dropout, attention, feed-forward, block
//! - [`model`] - The GPT model, loss, generation and checkpoint files
//! - [`optimizer`] - AdamW
//! - [`tokenizer`] - Byte-level tokenizer
//! - [`data`] - Bundled corpus, sliding-window dataset, batching
//! - [`train`] - The training orchestrator
//! - [`training_logger`] - CSV metrics log
//! - [`env_check`] - Toolchain version check
//!
//! # Example
//!
//! ```rust,no_run
//! use wharton::{train, ModelConfig, TrainingSettings};
//!
//! let config = ModelConfig {
//!     vocab_size: 50257,
//!     context_length: 12,
//!     emb_dim: 32,
//!     n_heads: 4,
//!     n_layers: 2,
//!     drop_rate: 0.1,
//!     qkv_bias: false,
//! };
//! let settings = TrainingSettings {
//!     learning_rate: 5e-4,
//!     num_epochs: 1,
//!     batch_size: 2,
//!     weight_decay: 0.1,
//! };
//!
//! let (train_losses, val_losses, tokens_seen, _model) =
//!     train::run(&config, &settings)?.into_parts();
//! assert_eq!(train_losses.len(), val_losses.len());
//! assert_eq!(train_losses.len(), tokens_seen.len());
//! # Ok::<(), wharton::Error>(())
//! ```

pub mod config;
pub mod data;
pub mod env_check;
pub mod error;
pub mod layers;
pub mod model;
pub mod optimizer;
pub mod tensor;
pub mod tokenizer;
pub mod train;
pub mod training_logger;

// Re-export main types for convenience
pub use config::{ModelConfig, RunConfig, TrainerOptions, TrainingSettings};
pub use error::{Error, Result};
pub use model::{generate_text_simple, GPTModel, GenerateOptions};
pub use optimizer::AdamW;
pub use tensor::Tensor;
pub use tokenizer::{ByteTokenizer, Tokenizer};
pub use train::{Trainer, TrainingHistory, TrainingRun};
pub use training_logger::TrainingLogger;
