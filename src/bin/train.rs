//! Train a GPT model on the bundled corpus
//!
//! Writes `loss_log.csv` and `model.bin` into the output directory, then
//! reloads the checkpoint and checks it reproduces the trained model's
//! logits.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin train -- --config configs/tiny.toml --out runs/tiny
//! RUST_LOG=debug cargo run --release --bin train -- --epochs 1
//! ```
//!
//! Without `--config` the GPT-2 124M preset is trained for 10 epochs.

use anyhow::{bail, Context};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use tracing::info;
use wharton::tokenizer::text_to_token_ids;
use wharton::{ByteTokenizer, GPTModel, RunConfig, Trainer, TrainingLogger};

#[derive(Parser, Debug)]
#[command(name = "train")]
#[command(about = "Train a GPT model on the bundled corpus", version)]
struct Args {
    /// TOML run configuration (defaults to the GPT-2 124M preset)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the number of training epochs
    #[arg(long)]
    epochs: Option<usize>,

    /// Directory for the loss log and model checkpoint
    #[arg(long, default_value = "runs/latest")]
    out: PathBuf,
}

fn init_tracing() {
    // Default: INFO level, override with RUST_LOG
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut run_config = match &args.config {
        Some(path) => RunConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(epochs) = args.epochs {
        run_config.training.num_epochs = epochs;
    }

    fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;
    let mut logger = TrainingLogger::new(args.out.join("loss_log.csv"))?;

    let trainer = Trainer::from_run_config(&run_config)?;
    info!(
        epochs = run_config.training.num_epochs,
        batch_size = run_config.training.batch_size,
        context_length = run_config.model.context_length,
        "training"
    );

    let run = trainer.train(Some(&mut logger))?;
    if let (Some(train), Some(val)) = (
        run.history.train_losses.last(),
        run.history.val_losses.last(),
    ) {
        info!(
            "Finished {} checkpoints: train loss {:.3}, val loss {:.3}",
            run.history.len(),
            train,
            val
        );
    }

    let checkpoint = args.out.join("model.bin");
    run.model
        .save(&checkpoint)
        .with_context(|| format!("Failed to save {}", checkpoint.display()))?;

    let reloaded = GPTModel::load(&checkpoint)
        .with_context(|| format!("Failed to reload {}", checkpoint.display()))?;
    let mut probe = text_to_token_ids(&run_config.trainer.start_context, &ByteTokenizer);
    probe.truncate(run_config.model.context_length);
    if !probe.is_empty() && reloaded.logits(&probe) != run.model.logits(&probe) {
        bail!("Reloaded checkpoint does not reproduce the trained model");
    }

    info!(
        parameters = reloaded.num_parameters(),
        "Saved and verified {}",
        checkpoint.display()
    );
    Ok(())
}
