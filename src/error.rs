//! Error Types
//!
//! Every fallible operation in the crate returns [`Result<T>`]. The two
//! failure kinds the training orchestrator itself raises are:
//!
//! - **Configuration errors**: a required key is missing from a model or
//!   training mapping, or a value is out of range (e.g. `emb_dim` not
//!   divisible by `n_heads`).
//! - **Resource errors**: a collaborator cannot supply what the run needs,
//!   typically a corpus too short to fill a single batch.
//!
//! Neither is retried or masked; both propagate to the caller.

use thiserror::Error;

/// Errors raised while configuring, training, or persisting a model
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    pub fn resource(msg: impl Into<String>) -> Self {
        Error::Resource(msg.into())
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Error::Resource(_))
    }
}
