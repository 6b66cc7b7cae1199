//! Neural Network Layers
//!
//! The building blocks of the GPT model, each with an explicit forward and
//! backward pass.
//!
//! ## Layers
//!
//! - **activation**: GELU (tanh approximation)
//! - **linear**: Fully connected layer with optional bias
//! - **layer_norm**: Layer normalization
//! - **dropout**: Dropout, active only when given a random number generator
//! - **mlp**: Feed-forward network
//! - **attention**: Multi-head causal self-attention
//! - **block**: Complete transformer block
//!
//! ## Design Pattern
//!
//! ```rust,ignore
//! impl Layer {
//!     pub fn forward(&self, x: &Tensor, ...) -> (Tensor, Cache) { }
//!     pub fn backward(&self, grad: &Tensor, cache: &Cache) -> Gradients { }
//! }
//! ```
//!
//! Parameter containers expose `collect_params` and their gradient structs
//! expose `collect`, both in the same order, so the optimizer can walk the
//! two lists side by side.

pub mod activation;
pub mod attention;
pub mod block;
pub mod dropout;
pub mod layer_norm;
pub mod linear;
pub mod mlp;

pub use activation::{gelu_backward, gelu_forward};
pub use attention::{AttentionCache, AttentionGradients, MultiHeadAttention};
pub use block::{BlockCache, BlockGradients, TransformerBlock};
pub use dropout::{Dropout, DropoutCache};
pub use layer_norm::{LayerNorm, LayerNormCache, LayerNormGradients};
pub use linear::{Linear, LinearCache, LinearGradients};
pub use mlp::{FeedForward, FeedForwardCache, FeedForwardGradients};
