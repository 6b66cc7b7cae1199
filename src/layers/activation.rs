//! GELU Activation
//!
//! The feed-forward network inside each transformer block uses GELU, with
//! the tanh approximation used by GPT-2:
//!
//! ```text
//! GELU(x) ≈ 0.5 × x × (1 + tanh(√(2/π) × (x + 0.044715 × x³)))
//! ```
//!
//! Its derivative, needed for the backward pass, follows from the product
//! rule and `d/du tanh(u) = 1 - tanh²(u)`:
//!
//! ```text
//! GELU'(x) = 0.5 × (1 + tanh(u)) + 0.5 × x × (1 - tanh²(u)) × √(2/π) × (1 + 3 × 0.044715 × x²)
//! ```

use crate::tensor::Tensor;
use rayon::prelude::*;

const GELU_COEFF: f32 = 0.044715;

#[inline]
fn sqrt_2_over_pi() -> f32 {
    (2.0 / std::f32::consts::PI).sqrt()
}

/// GELU activation (forward pass), element-wise
pub fn gelu_forward(x: &Tensor) -> Tensor {
    let c = sqrt_2_over_pi();
    let result = x
        .data
        .par_iter()
        .map(|&v| 0.5 * v * (1.0 + (c * (v + GELU_COEFF * v * v * v)).tanh()))
        .collect();
    Tensor::new(result, x.shape.clone())
}

/// GELU derivative (backward pass)
///
/// # Arguments
///
/// * `grad_out` - Gradient flowing back from the next layer
/// * `x` - The pre-activation input saved during the forward pass
pub fn gelu_backward(grad_out: &Tensor, x: &Tensor) -> Tensor {
    let c = sqrt_2_over_pi();
    let grad = x
        .data
        .par_iter()
        .zip(&grad_out.data)
        .map(|(&v, &g)| {
            let tanh_inner = (c * (v + GELU_COEFF * v * v * v)).tanh();
            let sech_sq = 1.0 - tanh_inner * tanh_inner;
            let local = 0.5 * (1.0 + tanh_inner)
                + 0.5 * v * sech_sq * c * (1.0 + 3.0 * GELU_COEFF * v * v);
            g * local
        })
        .collect();
    Tensor::new(grad, x.shape.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gelu_reference_values() {
        let x = Tensor::new(vec![-3.0, 0.0, 1.0, 3.0], vec![4]);
        let y = gelu_forward(&x);
        assert!(y.data[0].abs() < 0.01);
        assert_eq!(y.data[1], 0.0);
        assert!((y.data[2] - 0.8412).abs() < 1e-3);
        assert!((y.data[3] - 2.9964).abs() < 1e-3);
    }

    #[test]
    fn test_gelu_backward_matches_finite_difference() {
        let eps = 1e-3;
        for &v in &[-2.0f32, -0.5, 0.0, 0.7, 2.5] {
            let x = Tensor::new(vec![v], vec![1]);
            let ones = Tensor::new(vec![1.0], vec![1]);
            let analytic = gelu_backward(&ones, &x).data[0];

            let plus = gelu_forward(&Tensor::new(vec![v + eps], vec![1])).data[0];
            let minus = gelu_forward(&Tensor::new(vec![v - eps], vec![1])).data[0];
            let numeric = (plus - minus) / (2.0 * eps);

            assert!((analytic - numeric).abs() < 1e-2, "x={}", v);
        }
    }
}
