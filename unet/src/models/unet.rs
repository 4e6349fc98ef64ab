//! # U-Net
//!
//! Encoder-decoder network with plain skip connections. The encoder halves the
//! spatial resolution and doubles the channel width at every stage; the decoder
//! mirrors it, concatenating the matching encoder output at every stage, and a
//! final 1x1 convolution produces raw logits at input resolution.
//!
//! Only the stages selected by [`NetworkConfig::depth`] are instantiated.

use burn::{
    module::Ignored,
    nn::{
        conv::Conv2d,
        pool::{MaxPool2d, MaxPool2dConfig},
    },
    prelude::*,
};

use super::modules::{conv1x1, ConvBlock, ConvBlockConfig, UpConv, UpConvConfig};
use crate::{
    config::NetworkConfig,
    error::{UNetError, UNetResult},
};

/// 2x2 max-pool with stride 2.
pub(crate) fn maxpool2x2() -> MaxPool2d {
    MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init()
}

/// One decoder stage: upsample, concatenate the skip tensor, fuse.
#[derive(Module, Debug)]
pub struct DecoderStage<B: Backend> {
    pub(crate) up: UpConv<B>,
    pub(crate) up_conv: ConvBlock<B>,
}

impl<B: Backend> DecoderStage<B> {
    /// Creates the stage restoring encoder level `level - 1` from level `level`.
    fn new(base_channels: usize, level: usize, device: &Device<B>) -> Self {
        let ch_in = base_channels << level;
        let ch_out = base_channels << (level - 1);

        Self {
            up: UpConvConfig::new(ch_in, ch_out).init(device),
            up_conv: ConvBlockConfig::new(ch_in, ch_out).init(device),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> Tensor<B, 4> {
        let d = self.up.forward(x);
        let d = Tensor::cat(vec![skip, d], 1);

        self.up_conv.forward(d)
    }
}

/// Configuration for the `UNet` model.
#[derive(Config, Debug)]
pub struct UNetConfig {
    /// The network topology.
    pub network: NetworkConfig,
}

impl UNetConfig {
    /// Initializes a `UNet` model with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the network configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UNetResult<UNet<B>> {
        self.network.validate()?;

        let channels = self.network.stage_channels();
        tracing::debug!(
            depth = self.network.depth,
            img_ch = self.network.img_ch,
            output_ch = self.network.output_ch,
            ?channels,
            "building U_Net"
        );

        let mut ch_in = self.network.img_ch;
        let mut encoder = Vec::with_capacity(channels.len());
        for &ch_out in &channels {
            encoder.push(ConvBlockConfig::new(ch_in, ch_out).init(device));
            ch_in = ch_out;
        }

        let decoder = (1..self.network.depth)
            .map(|level| DecoderStage::new(self.network.base_channels, level, device))
            .collect();

        Ok(UNet {
            maxpool: maxpool2x2(),
            encoder,
            decoder,
            conv_1x1: conv1x1(self.network.base_channels, self.network.output_ch, device),
            network: Ignored(self.network.clone()),
        })
    }
}

/// U-Net for semantic segmentation.
#[derive(Module, Debug)]
pub struct UNet<B: Backend> {
    maxpool: MaxPool2d,
    /// Encoder stages, shallowest first.
    pub(crate) encoder: Vec<ConvBlock<B>>,
    /// Decoder stages, shallowest first. Stage `i` restores encoder level `i`.
    pub(crate) decoder: Vec<DecoderStage<B>>,
    pub(crate) conv_1x1: Conv2d<B>,
    network: Ignored<NetworkConfig>,
}

impl<B: Backend> UNet<B> {
    /// The topology this model was built with.
    pub fn network(&self) -> &NetworkConfig {
        &self.network.0
    }

    /// Runs the encoder, returning every stage output, shallowest first.
    fn forward_enc(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut features: Vec<Tensor<B, 4>> = Vec::with_capacity(self.encoder.len());
        let mut x = x;
        for (i, stage) in self.encoder.iter().enumerate() {
            if i > 0 {
                x = self.maxpool.forward(x);
            }
            x = stage.forward(x);
            features.push(x.clone());
        }

        features
    }

    /// The forward pass for the `UNet` model.
    ///
    /// # Arguments
    ///
    /// * `x` - The input tensor of shape `[N, img_ch, H, W]`, with `H` and `W`
    ///   divisible by `2^(depth - 1)`.
    ///
    /// # Returns
    ///
    /// Raw logits of shape `[N, output_ch, H, W]`.
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::InvalidTensorShape)` if the input cannot be processed.
    pub fn forward(&self, x: Tensor<B, 4>) -> UNetResult<Tensor<B, 4>> {
        self.network.0.check_input(x.dims())?;

        let mut features = self.forward_enc(x);
        // The deepest feature map starts the decoder; it is not a skip tensor.
        let mut d = features
            .pop()
            .ok_or_else(|| UNetError::InvalidConfiguration {
                reason: "network has no encoder stages".to_string(),
            })?;

        for (stage, skip) in self.decoder.iter().rev().zip(features.into_iter().rev()) {
            d = stage.forward(d, skip);
        }

        Ok(self.conv_1x1.forward(d))
    }
}
