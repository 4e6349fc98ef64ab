//! # Attention Gate
//!
//! Computes a single-channel soft mask from a decoder gating signal and an
//! encoder skip feature map, and uses it to suppress skip activations before
//! they are fused back into the decoder.

use burn::{
    nn::{conv::Conv2d, BatchNorm, BatchNormConfig, Relu},
    prelude::*,
    tensor::activation::sigmoid,
};

use super::conv_blocks::conv1x1;
use crate::error::{UNetError, UNetResult};

/// Configuration for the `AttentionBlock` module.
#[derive(Config, Debug)]
pub struct AttentionBlockConfig {
    /// Channels of the gating signal `g`.
    f_g: usize,
    /// Channels of the skip feature map `x`.
    f_l: usize,
    /// Intermediate channels both inputs are projected to.
    f_int: usize,
}

impl AttentionBlockConfig {
    /// Initializes a new `AttentionBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> AttentionBlock<B> {
        AttentionBlock {
            w_g_conv: conv1x1(self.f_g, self.f_int, device),
            w_g_bn: BatchNormConfig::new(self.f_int).init(device),
            w_x_conv: conv1x1(self.f_l, self.f_int, device),
            w_x_bn: BatchNormConfig::new(self.f_int).init(device),
            psi_conv: conv1x1(self.f_int, 1, device),
            psi_bn: BatchNormConfig::new(1).init(device),
            relu: Relu::new(),
        }
    }
}

/// Additive attention gate on a skip connection.
#[derive(Module, Debug)]
pub struct AttentionBlock<B: Backend> {
    pub(crate) w_g_conv: Conv2d<B>,
    pub(crate) w_g_bn: BatchNorm<B, 2>,
    pub(crate) w_x_conv: Conv2d<B>,
    pub(crate) w_x_bn: BatchNorm<B, 2>,
    pub(crate) psi_conv: Conv2d<B>,
    pub(crate) psi_bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> AttentionBlock<B> {
    /// Computes the attention mask of shape `[N, 1, H, W]` with values in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::InvalidTensorShape)` if `g` and `x` differ in batch
    /// size or spatial size.
    pub fn attention_map(&self, g: Tensor<B, 4>, x: Tensor<B, 4>) -> UNetResult<Tensor<B, 4>> {
        let [g_n, _, g_h, g_w] = g.dims();
        let [x_n, _, x_h, x_w] = x.dims();
        if (g_n, g_h, g_w) != (x_n, x_h, x_w) {
            return Err(UNetError::InvalidTensorShape {
                expected: format!("skip tensor of shape [{g_n}, C, {g_h}, {g_w}]"),
                actual: format!("{:?}", x.dims()),
            });
        }

        let g1 = self.w_g_bn.forward(self.w_g_conv.forward(g));
        let x1 = self.w_x_bn.forward(self.w_x_conv.forward(x));
        let psi = self.relu.forward(g1 + x1);
        let psi = self.psi_bn.forward(self.psi_conv.forward(psi));

        Ok(sigmoid(psi))
    }

    /// Gates the skip feature map `x` with the mask computed from `g`.
    ///
    /// The returned tensor has the shape of `x`.
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::InvalidTensorShape)` if `g` and `x` differ in batch
    /// size or spatial size.
    pub fn forward(&self, g: Tensor<B, 4>, x: Tensor<B, 4>) -> UNetResult<Tensor<B, 4>> {
        let psi = self.attention_map(g, x.clone())?;

        Ok(x * psi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    #[test]
    fn attention_map_lies_in_unit_interval() {
        let device = Default::default();
        let gate = AttentionBlockConfig::new(8, 6, 4).init::<TestBackend>(&device);

        let g = Tensor::<TestBackend, 4>::random(
            [2, 8, 10, 10],
            Distribution::Normal(0.0, 100.0),
            &device,
        );
        let x = Tensor::<TestBackend, 4>::random(
            [2, 6, 10, 10],
            Distribution::Normal(0.0, 100.0),
            &device,
        );
        let psi = gate.attention_map(g, x).unwrap();

        assert_eq!(psi.dims(), [2, 1, 10, 10]);
        assert!(psi.clone().min().into_scalar() >= 0.0);
        assert!(psi.max().into_scalar() <= 1.0);
    }

    #[test]
    fn attention_output_has_skip_shape() {
        let device = Default::default();
        let gate = AttentionBlockConfig::new(16, 8, 4).init::<TestBackend>(&device);

        let g =
            Tensor::<TestBackend, 4>::random([1, 16, 6, 4], Distribution::Normal(0.0, 1.0), &device);
        let x =
            Tensor::<TestBackend, 4>::random([1, 8, 6, 4], Distribution::Normal(0.0, 1.0), &device);
        let output = gate.forward(g, x).unwrap();

        assert_eq!(output.dims(), [1, 8, 6, 4]);
    }

    #[test]
    fn attention_never_amplifies_skip_magnitude() {
        let device = Default::default();
        let gate = AttentionBlockConfig::new(4, 4, 2).init::<TestBackend>(&device);

        let g =
            Tensor::<TestBackend, 4>::random([1, 4, 8, 8], Distribution::Normal(0.0, 1.0), &device);
        let x =
            Tensor::<TestBackend, 4>::random([1, 4, 8, 8], Distribution::Normal(0.0, 1.0), &device);
        let output = gate.forward(g, x.clone()).unwrap();

        let excess = (output.abs() - x.abs()).max().into_scalar();
        assert!(excess <= 1e-6);
    }

    #[test]
    fn spatial_mismatch_is_rejected() {
        let device = Default::default();
        let gate = AttentionBlockConfig::new(4, 4, 2).init::<TestBackend>(&device);

        let g = Tensor::<TestBackend, 4>::zeros([1, 4, 8, 8], &device);
        let x = Tensor::<TestBackend, 4>::zeros([1, 4, 16, 16], &device);

        match gate.forward(g, x) {
            Err(UNetError::InvalidTensorShape { actual, .. }) => {
                assert!(actual.contains("16"));
            }
            _ => panic!("Expected InvalidTensorShape error"),
        }
    }
}
