//! # Convolution Blocks
//!
//! The feature-extraction units shared by the encoder and decoder of both
//! networks: the double convolution block, its residual variant, and the
//! upsampling block that drives the decoder back toward input resolution.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
    tensor::{
        module::interpolate,
        ops::{InterpolateMode, InterpolateOptions},
    },
};

/// 3x3 convolution with stride 1 and padding 1, preserving spatial size.
fn conv3x3<B: Backend>(ch_in: usize, ch_out: usize, device: &Device<B>) -> Conv2d<B> {
    Conv2dConfig::new([ch_in, ch_out], [3, 3])
        .with_stride([1, 1])
        .with_padding(PaddingConfig2d::Explicit(1, 1))
        .with_bias(true)
        .init(device)
}

/// 1x1 convolution with bias.
pub(crate) fn conv1x1<B: Backend>(ch_in: usize, ch_out: usize, device: &Device<B>) -> Conv2d<B> {
    Conv2dConfig::new([ch_in, ch_out], [1, 1])
        .with_stride([1, 1])
        .with_padding(PaddingConfig2d::Explicit(0, 0))
        .with_bias(true)
        .init(device)
}

/// Configuration for the `ConvBlock` module.
#[derive(Config, Debug)]
pub struct ConvBlockConfig {
    /// Number of input channels.
    ch_in: usize,
    /// Number of output channels.
    ch_out: usize,
}

impl ConvBlockConfig {
    /// Initializes a new `ConvBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvBlock<B> {
        ConvBlock {
            conv1: conv3x3(self.ch_in, self.ch_out, device),
            bn1: BatchNormConfig::new(self.ch_out).init(device),
            relu1: Relu::new(),
            conv2: conv3x3(self.ch_out, self.ch_out, device),
            bn2: BatchNormConfig::new(self.ch_out).init(device),
            relu2: Relu::new(),
        }
    }
}

/// Two stacked conv3x3 -> BatchNorm -> ReLU stages.
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub(crate) conv1: Conv2d<B>,
    pub(crate) bn1: BatchNorm<B, 2>,
    relu1: Relu,
    pub(crate) conv2: Conv2d<B>,
    pub(crate) bn2: BatchNorm<B, 2>,
    relu2: Relu,
}

impl<B: Backend> ConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv1.forward(x);
        let x = self.bn1.forward(x);
        let x = self.relu1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.bn2.forward(x);

        self.relu2.forward(x)
    }
}

/// Configuration for the `ResConvBlock` module.
#[derive(Config, Debug)]
pub struct ResConvBlockConfig {
    /// Number of input channels.
    ch_in: usize,
    /// Number of output channels.
    ch_out: usize,
}

impl ResConvBlockConfig {
    /// Initializes a new `ResConvBlock` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ResConvBlock<B> {
        ResConvBlock {
            conv: ConvBlockConfig::new(self.ch_in, self.ch_out).init(device),
            conv_1x1: conv1x1(self.ch_in, self.ch_out, device),
        }
    }
}

/// A `ConvBlock` with a 1x1 projection shortcut.
///
/// The shortcut has no normalization or activation; it only maps `ch_in` to
/// `ch_out` so the two paths can be summed.
#[derive(Module, Debug)]
pub struct ResConvBlock<B: Backend> {
    pub(crate) conv: ConvBlock<B>,
    pub(crate) conv_1x1: Conv2d<B>,
}

impl<B: Backend> ResConvBlock<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let residual = self.conv_1x1.forward(x.clone());
        let x = self.conv.forward(x);

        residual + x
    }
}

/// Configuration for the `UpConv` module.
#[derive(Config, Debug)]
pub struct UpConvConfig {
    /// Number of input channels.
    ch_in: usize,
    /// Number of output channels.
    ch_out: usize,
}

impl UpConvConfig {
    /// Initializes a new `UpConv` module.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UpConv<B> {
        UpConv {
            conv: conv3x3(self.ch_in, self.ch_out, device),
            bn: BatchNormConfig::new(self.ch_out).init(device),
            relu: Relu::new(),
        }
    }
}

/// Nearest-neighbour x2 upsampling followed by conv3x3 -> BatchNorm -> ReLU.
#[derive(Module, Debug)]
pub struct UpConv<B: Backend> {
    pub(crate) conv: Conv2d<B>,
    pub(crate) bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> UpConv<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, _, h, w] = x.dims();
        let x = interpolate(
            x,
            [h * 2, w * 2],
            InterpolateOptions::new(InterpolateMode::Nearest),
        );
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);

        self.relu.forward(x)
    }
}
