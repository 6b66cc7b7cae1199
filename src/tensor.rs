//! Tensor Operations
//!
//! A deliberately small tensor type: a flat `Vec<f32>` in row-major order
//! plus a shape. Every layer in the model works on 2D tensors of shape
//! `[seq_len, features]`, so that is all this module supports.
//!
//! ## Example
//!
//! ```rust
//! use wharton::Tensor;
//!
//! let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
//! let b = Tensor::new(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], vec![3, 2]);
//! let c = a.matmul(&b);
//! assert_eq!(c.shape, vec![2, 2]);
//! assert_eq!(c.data, vec![4.0, 5.0, 10.0, 11.0]);
//! ```
//!
//! ## Three Matrix Products
//!
//! Backpropagation needs products against transposed operands all the time:
//!
//! ```text
//! forward:      y      = x @ W
//! backward:     grad_x = grad_y @ W^T     (matmul_t)
//!               grad_W = x^T @ grad_y     (t_matmul)
//! ```
//!
//! Rather than materialising transposes (the output head's weight alone is
//! `emb_dim × 50257`), [`Tensor::matmul_t`] and [`Tensor::t_matmul`] read the
//! operands in place.
//!
//! ## Parallelism and Determinism
//!
//! Kernels are parallelised with Rayon by partitioning the *output* rows.
//! Each output element is still accumulated by a single thread in a fixed
//! order, so results are bit-for-bit reproducible regardless of thread
//! count. No parallel floating-point reductions are used anywhere.

use rayon::prelude::*;

/// Below this many multiply-adds a product runs sequentially
const PARALLEL_THRESHOLD: usize = 4_096;

/// A 2D array of `f32` values in row-major order
#[derive(Clone, Debug, PartialEq)]
pub struct Tensor {
    /// Flat storage of all tensor elements
    pub data: Vec<f32>,
    /// Dimensions; `[n]` for vectors, `[rows, cols]` for matrices
    pub shape: Vec<usize>,
}

impl Tensor {
    /// Create a new tensor with given data and shape
    ///
    /// # Panics
    ///
    /// Panics if the product of shape dimensions doesn't equal data length
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Self {
        let expected_size: usize = shape.iter().product();
        assert_eq!(
            data.len(),
            expected_size,
            "Data length ({}) doesn't match shape {:?} (expected {})",
            data.len(),
            shape,
            expected_size
        );
        Self { data, shape }
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: Vec<usize>) -> Self {
        let size: usize = shape.iter().product();
        Self::new(vec![0.0; size], shape)
    }

    pub fn rows(&self) -> usize {
        self.shape[0]
    }

    pub fn cols(&self) -> usize {
        *self.shape.last().unwrap_or(&1)
    }

    /// Borrow one row of a 2D tensor
    pub fn row(&self, i: usize) -> &[f32] {
        let cols = self.cols();
        &self.data[i * cols..(i + 1) * cols]
    }

    /// SIMD-friendly inner loop: `result[j] += a * b[j]`
    #[inline(always)]
    fn axpy(a: f32, b: &[f32], result: &mut [f32]) {
        for (r, &b_val) in result.iter_mut().zip(b.iter()) {
            *r += a * b_val;
        }
    }

    #[inline(always)]
    fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    /// Matrix multiplication `self @ other`
    ///
    /// `[m, k] @ [k, n] -> [m, n]`. Large products use a cache-blocked
    /// kernel with output rows split across threads.
    ///
    /// # Panics
    ///
    /// Panics if inner dimensions differ
    pub fn matmul(&self, other: &Tensor) -> Tensor {
        let (m, k) = (self.rows(), self.cols());
        let n = other.cols();
        assert_eq!(
            k,
            other.rows(),
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]",
            m,
            k,
            other.rows(),
            n
        );

        if m * n * k < PARALLEL_THRESHOLD {
            let mut result = vec![0.0; m * n];
            for i in 0..m {
                let out = &mut result[i * n..(i + 1) * n];
                for l in 0..k {
                    Self::axpy(self.data[i * k + l], other.row(l), out);
                }
            }
            return Tensor::new(result, vec![m, n]);
        }

        self.matmul_parallel_blocked(other, m, n, k)
    }

    /// Parallel cache-blocked matrix multiplication
    ///
    /// Processes 8-row blocks of the output per task and walks the inner
    /// dimension in 8-wide strips so that the touched slice of `other` stays
    /// in L1.
    fn matmul_parallel_blocked(&self, other: &Tensor, m: usize, n: usize, k: usize) -> Tensor {
        const BLOCK_SIZE: usize = 8;

        let mut result = vec![0.0; m * n];

        result
            .par_chunks_mut(BLOCK_SIZE * n)
            .enumerate()
            .for_each(|(block_i, result_block)| {
                let i_start = block_i * BLOCK_SIZE;
                let i_end = (i_start + BLOCK_SIZE).min(m);

                for k_start in (0..k).step_by(BLOCK_SIZE) {
                    let k_end = (k_start + BLOCK_SIZE).min(k);
                    for i in i_start..i_end {
                        let row_offset = (i - i_start) * n;
                        for k_idx in k_start..k_end {
                            Self::axpy(
                                self.data[i * k + k_idx],
                                &other.data[k_idx * n..(k_idx + 1) * n],
                                &mut result_block[row_offset..row_offset + n],
                            );
                        }
                    }
                }
            });

        Tensor::new(result, vec![m, n])
    }

    /// `self @ other^T` without materialising the transpose
    ///
    /// `[m, k] @ [n, k]^T -> [m, n]`; every output element is a dot product
    /// of two contiguous rows.
    pub fn matmul_t(&self, other: &Tensor) -> Tensor {
        let (m, k) = (self.rows(), self.cols());
        let n = other.rows();
        assert_eq!(
            k,
            other.cols(),
            "Matrix dimensions incompatible: [{}, {}] @ [{}, {}]^T",
            m,
            k,
            n,
            other.cols()
        );

        let mut result = vec![0.0; m * n];
        let fill_row = |(i, out): (usize, &mut [f32])| {
            let a = &self.data[i * k..(i + 1) * k];
            for (j, o) in out.iter_mut().enumerate() {
                *o = Self::dot(a, &other.data[j * k..(j + 1) * k]);
            }
        };

        if m * n * k < PARALLEL_THRESHOLD {
            result.chunks_mut(n.max(1)).enumerate().for_each(fill_row);
        } else if m >= n {
            result.par_chunks_mut(n.max(1)).enumerate().for_each(fill_row);
        } else {
            // Few rows, many columns (the output head): split columns instead
            for i in 0..m {
                let a = &self.data[i * k..(i + 1) * k];
                result[i * n..(i + 1) * n]
                    .par_iter_mut()
                    .enumerate()
                    .for_each(|(j, o)| *o = Self::dot(a, &other.data[j * k..(j + 1) * k]));
            }
        }

        Tensor::new(result, vec![m, n])
    }

    /// `self^T @ other` without materialising the transpose
    ///
    /// `[r, m]^T @ [r, n] -> [m, n]`. Used for weight gradients, where `r`
    /// is the sequence length and is usually the smallest dimension.
    pub fn t_matmul(&self, other: &Tensor) -> Tensor {
        let (r, m) = (self.rows(), self.cols());
        let n = other.cols();
        assert_eq!(
            r,
            other.rows(),
            "Matrix dimensions incompatible: [{}, {}]^T @ [{}, {}]",
            r,
            m,
            other.rows(),
            n
        );

        let mut result = vec![0.0; m * n];
        let fill_row = |(a, out): (usize, &mut [f32])| {
            for row in 0..r {
                Self::axpy(self.data[row * m + a], other.row(row), out);
            }
        };

        if m * n * r < PARALLEL_THRESHOLD {
            result.chunks_mut(n.max(1)).enumerate().for_each(fill_row);
        } else {
            result.par_chunks_mut(n.max(1)).enumerate().for_each(fill_row);
        }

        Tensor::new(result, vec![m, n])
    }

    /// Transpose a 2D matrix
    pub fn transpose(&self) -> Tensor {
        let (rows, cols) = (self.rows(), self.cols());
        let mut result = vec![0.0; rows * cols];
        for i in 0..rows {
            for j in 0..cols {
                result[j * rows + i] = self.data[i * cols + j];
            }
        }
        Tensor::new(result, vec![cols, rows])
    }

    /// Numerically stable softmax over each row
    ///
    /// ```text
    /// softmax(x)[i] = exp(x[i] - max(x)) / sum(exp(x[j] - max(x)))
    /// ```
    ///
    /// Rows that are entirely `-inf` would produce NaN, so callers must
    /// leave at least one finite entry per row (causal masking always keeps
    /// the diagonal).
    pub fn softmax_rows(&self) -> Tensor {
        let cols = self.cols();
        let mut result = self.data.clone();
        result.par_chunks_mut(cols.max(1)).for_each(|row| {
            let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            let mut sum = 0.0;
            for v in row.iter_mut() {
                *v = (*v - max).exp();
                sum += *v;
            }
            for v in row.iter_mut() {
                *v /= sum;
            }
        });
        Tensor::new(result, self.shape.clone())
    }

    /// Element-wise addition with broadcasting
    ///
    /// Supports identical shapes and `[*, n] + [n]` (bias addition).
    pub fn add(&self, other: &Tensor) -> Tensor {
        if self.shape == other.shape {
            let result = self
                .data
                .par_iter()
                .zip(&other.data)
                .map(|(a, b)| a + b)
                .collect();
            return Tensor::new(result, self.shape.clone());
        }

        let last_dim = self.cols();
        assert!(
            other.shape.len() == 1 && other.data.len() == last_dim,
            "Unsupported broadcast for add: {:?} + {:?}",
            self.shape,
            other.shape
        );
        let mut result = self.data.clone();
        result
            .par_chunks_mut(last_dim)
            .for_each(|row| row.iter_mut().zip(&other.data).for_each(|(r, b)| *r += b));
        Tensor::new(result, self.shape.clone())
    }

    /// In-place accumulation: `self += other`
    pub fn add_assign(&mut self, other: &Tensor) {
        assert_eq!(self.shape, other.shape, "Shapes must match for add_assign");
        self.data
            .par_iter_mut()
            .zip(&other.data)
            .for_each(|(a, b)| *a += b);
    }

    /// Scale all elements in place
    pub fn scale(&mut self, scalar: f32) {
        self.data.par_iter_mut().for_each(|x| *x *= scalar);
    }

    /// Column sums of a 2D tensor, `[rows, cols] -> [cols]`
    pub fn sum_rows(&self) -> Tensor {
        let cols = self.cols();
        let mut result = vec![0.0; cols];
        for row in self.data.chunks(cols.max(1)) {
            result.iter_mut().zip(row).for_each(|(r, v)| *r += v);
        }
        Tensor::new(result, vec![cols])
    }

    /// Copy out columns `[start, start + width)` of a 2D tensor
    ///
    /// Used to split a `[seq, emb_dim]` projection into attention heads.
    pub fn slice_cols(&self, start: usize, width: usize) -> Tensor {
        let (rows, cols) = (self.rows(), self.cols());
        assert!(start + width <= cols, "Column slice out of range");
        let mut result = Vec::with_capacity(rows * width);
        for i in 0..rows {
            result.extend_from_slice(&self.data[i * cols + start..i * cols + start + width]);
        }
        Tensor::new(result, vec![rows, width])
    }

    /// Write `src` into columns starting at `start`; inverse of [`slice_cols`](Self::slice_cols)
    pub fn write_cols(&mut self, start: usize, src: &Tensor) {
        let (rows, cols) = (self.rows(), self.cols());
        let width = src.cols();
        assert_eq!(rows, src.rows(), "Row count must match for write_cols");
        assert!(start + width <= cols, "Column slice out of range");
        for i in 0..rows {
            self.data[i * cols + start..i * cols + start + width].copy_from_slice(src.row(i));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(rows: usize, cols: usize) -> Tensor {
        let data = (0..rows * cols).map(|i| (i as f32 * 0.37).sin()).collect();
        Tensor::new(data, vec![rows, cols])
    }

    fn assert_close(a: &Tensor, b: &Tensor) {
        assert_eq!(a.shape, b.shape);
        for (x, y) in a.data.iter().zip(&b.data) {
            assert!((x - y).abs() < 1e-4, "{} vs {}", x, y);
        }
    }

    #[test]
    fn test_matmul_small() {
        let a = Tensor::new(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]);
        let b = Tensor::new(vec![5.0, 6.0, 7.0, 8.0], vec![2, 2]);
        assert_eq!(a.matmul(&b).data, vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_blocked_matmul_matches_naive() {
        let a = seq(19, 23);
        let b = seq(23, 17);
        let fast = a.matmul(&b);

        let mut naive = vec![0.0; 19 * 17];
        for i in 0..19 {
            for j in 0..17 {
                for l in 0..23 {
                    naive[i * 17 + j] += a.data[i * 23 + l] * b.data[l * 17 + j];
                }
            }
        }
        assert_close(&fast, &Tensor::new(naive, vec![19, 17]));
    }

    #[test]
    fn test_transposed_products_match_explicit_transpose() {
        let a = seq(12, 32);
        let w = seq(40, 32);
        assert_close(&a.matmul_t(&w), &a.matmul(&w.transpose()));

        let wide = seq(300, 32);
        assert_close(&seq(3, 32).matmul_t(&wide), &seq(3, 32).matmul(&wide.transpose()));

        let x = seq(12, 20);
        let g = seq(12, 30);
        assert_close(&x.t_matmul(&g), &x.transpose().matmul(&g));
    }

    #[test]
    fn test_softmax_rows_sum_to_one() {
        let t = Tensor::new(vec![1.0, 2.0, 3.0, -1.0, f32::NEG_INFINITY, 0.0], vec![2, 3]);
        let s = t.softmax_rows();
        for i in 0..2 {
            let sum: f32 = s.row(i).iter().sum();
            assert!((sum - 1.0).abs() < 1e-6);
        }
        assert_eq!(s.data[4], 0.0);
    }

    #[test]
    fn test_bias_broadcast_and_column_ops() {
        let x = Tensor::new(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        let b = Tensor::new(vec![10.0, 20.0, 30.0], vec![3]);
        assert_eq!(x.add(&b).data, vec![11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
        assert_eq!(x.sum_rows().data, vec![5.0, 7.0, 9.0]);

        let mid = x.slice_cols(1, 2);
        assert_eq!(mid.data, vec![2.0, 3.0, 5.0, 6.0]);
        let mut y = Tensor::zeros(vec![2, 3]);
        y.write_cols(1, &mid);
        assert_eq!(y.data, vec![0.0, 2.0, 3.0, 0.0, 5.0, 6.0]);
    }
}
