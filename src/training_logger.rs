//! Training Logger
//!
//! Appends one CSV row per evaluation checkpoint so a run can be plotted
//! afterwards.
//!
//! ## CSV Format
//!
//! - `epoch`: 1-based epoch the checkpoint fell in
//! - `step`: zero-based global step
//! - `tokens_seen`: cumulative input tokens at the checkpoint
//! - `elapsed_seconds`: time since the logger was created
//! - `train_loss`, `val_loss`: cross-entropy estimates
//! - `train_perplexity`, `val_perplexity`: `exp(loss)`
//!
//! ## Perplexity
//!
//! ```text
//! perplexity = exp(loss)
//! ```
//!
//! A model guessing uniformly over the 256 byte tokens scores 256; a
//! perfect model scores 1.

use crate::error::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;

/// One evaluation checkpoint
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CheckpointRecord {
    pub epoch: usize,
    pub step: usize,
    pub tokens_seen: usize,
    pub train_loss: f32,
    pub val_loss: f32,
}

pub struct TrainingLogger {
    log_file: File,
    start_time: Instant,
}

impl TrainingLogger {
    /// Create the CSV file and write its header
    pub fn new<P: AsRef<Path>>(log_path: P) -> Result<Self> {
        let mut log_file = File::create(log_path)?;
        writeln!(
            log_file,
            "epoch,step,tokens_seen,elapsed_seconds,train_loss,val_loss,train_perplexity,val_perplexity"
        )?;

        Ok(Self {
            log_file,
            start_time: Instant::now(),
        })
    }

    pub fn log(&mut self, record: &CheckpointRecord) -> Result<()> {
        let elapsed = self.start_time.elapsed().as_secs_f32();
        writeln!(
            self.log_file,
            "{},{},{},{:.2},{:.4},{:.4},{:.2},{:.2}",
            record.epoch,
            record.step,
            record.tokens_seen,
            elapsed,
            record.train_loss,
            record.val_loss,
            record.train_loss.exp(),
            record.val_loss.exp()
        )?;

        // Keep the file usable if the run is interrupted
        self.log_file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loss_log.csv");

        let mut logger = TrainingLogger::new(&path).unwrap();
        logger
            .log(&CheckpointRecord {
                epoch: 1,
                step: 5,
                tokens_seen: 144,
                train_loss: 0.0,
                val_loss: 1.0,
            })
            .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("epoch,step,tokens_seen"));

        let fields: Vec<&str> = lines[1].split(',').collect();
        assert_eq!(&fields[..3], &["1", "5", "144"]);
        assert_eq!(fields[6], "1.00");
        assert_eq!(fields[7], "2.72");
    }
}
