//! # Special-Purpose Functions
//!
//! Tensor initialization helpers that are not part of the standard Burn library.
//!
//! - `normal`: tensors filled from a seeded normal distribution.
//! - `orthogonal`: (semi-)orthogonal matrices reshaped to a weight tensor.

mod normal;
mod orthogonal;

pub use normal::*;
pub use orthogonal::*;
