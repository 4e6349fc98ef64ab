//! # Orthogonal Initialization
//!
//! Fills a weight tensor with a (semi-)orthogonal matrix, as described in
//! "Exact solutions to the nonlinear dynamics of learning in deep linear neural
//! networks" (Saxe et al., 2013). The tensor is viewed as a matrix of
//! `dims[0]` rows by `product(dims[1..])` columns.

use burn::{prelude::*, tensor::Distribution};
use rand::RngCore;

/// Creates a tensor whose flattened `[rows, cols]` view has orthonormal rows
/// (if `rows <= cols`) or orthonormal columns (otherwise), scaled by `gain`.
///
/// A normal matrix is sampled from `rng` and orthonormalized with modified
/// Gram-Schmidt, which yields the `Q` factor of its QR decomposition with a
/// positive diagonal in `R`.
pub fn orthogonal<B: Backend, const D: usize, R: RngCore>(
    dims: [usize; D],
    gain: f64,
    rng: &mut R,
    device: &Device<B>,
) -> Tensor<B, D> {
    let rows = dims[0];
    let cols: usize = dims[1..].iter().product();
    // `m` vectors of length `n` with m <= n, so they can all be orthonormal.
    let (n, m) = if rows < cols { (cols, rows) } else { (rows, cols) };

    let sample =
        TensorData::random::<f64, _, _>([m * n], Distribution::Normal(0.0, 1.0), rng);
    let mut q: Vec<f64> = sample.iter::<f64>().collect();

    for j in 0..m {
        for k in 0..j {
            let (done, rest) = q.split_at_mut(j * n);
            let q_k = &done[k * n..(k + 1) * n];
            let v = &mut rest[..n];
            let r: f64 = q_k.iter().zip(v.iter()).map(|(a, b)| a * b).sum();
            v.iter_mut().zip(q_k).for_each(|(v, q)| *v -= r * q);
        }

        let v = &mut q[j * n..(j + 1) * n];
        let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
        if norm > f64::EPSILON {
            v.iter_mut().for_each(|x| *x /= norm);
        }
    }

    // Vector `j` is stored contiguously at `q[j * n..]`.
    let mut values = vec![0.0_f32; rows * cols];
    for i in 0..rows {
        for j in 0..cols {
            let value = if rows < cols {
                q[i * n + j]
            } else {
                q[j * n + i]
            };
            values[i * cols + j] = (gain * value) as f32;
        }
    }

    Tensor::from_data(TensorData::new(values, dims), device)
}
