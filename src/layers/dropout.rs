//! Dropout Layer
//!
//! Randomly zeroes activations during training and rescales the survivors by
//! `1 / (1 - rate)` so the expected value is unchanged. In inference mode it
//! is the identity.
//!
//! The mode is not stored on the layer. A forward pass is in training mode
//! exactly when it is handed a random number generator; passing `None`
//! disables dropout. This keeps the model free of hidden mutable state and
//! makes every dropout mask a function of the trainer's seed.

use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::Rng;

/// Dropout with a fixed rate
pub struct Dropout {
    pub rate: f32,
}

impl Dropout {
    pub fn new(rate: f32) -> Self {
        assert!(
            (0.0..1.0).contains(&rate),
            "Dropout rate must be in [0.0, 1.0)"
        );
        Self { rate }
    }

    /// Forward pass; `rng = None` means inference mode
    pub fn forward(&self, x: &Tensor, rng: Option<&mut StdRng>) -> (Tensor, DropoutCache) {
        let rng = match rng {
            Some(rng) if self.rate > 0.0 => rng,
            _ => {
                return (
                    x.clone(),
                    DropoutCache {
                        mask: None,
                        scale: 1.0,
                    },
                )
            }
        };

        let scale = 1.0 / (1.0 - self.rate);
        let mut mask = Vec::with_capacity(x.data.len());
        let mut output = Tensor::zeros(x.shape.clone());

        for (out, &val) in output.data.iter_mut().zip(&x.data) {
            let keep = rng.gen::<f32>() >= self.rate;
            mask.push(keep);
            if keep {
                *out = val * scale;
            }
        }

        (
            output,
            DropoutCache {
                mask: Some(mask),
                scale,
            },
        )
    }

    /// Backward pass: route gradients through the kept positions only
    pub fn backward(&self, grad_output: &Tensor, cache: &DropoutCache) -> Tensor {
        match &cache.mask {
            Some(mask) => {
                let data = grad_output
                    .data
                    .iter()
                    .zip(mask)
                    .map(|(&g, &keep)| if keep { g * cache.scale } else { 0.0 })
                    .collect();
                Tensor::new(data, grad_output.shape.clone())
            }
            None => grad_output.clone(),
        }
    }
}

/// Cache for dropout backward pass
pub struct DropoutCache {
    /// Dropout mask (true = kept); `None` if dropout was inactive
    pub mask: Option<Vec<bool>>,
    /// Scaling factor applied to kept values
    pub scale: f32,
}
