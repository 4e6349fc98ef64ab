//! # Residual Attention U-Net
//!
//! Same topology and depth policy as [`UNet`](super::UNet), with two changes:
//! encoder stages are residual blocks, and every skip tensor passes through an
//! attention gate driven by the upsampled decoder features before it is
//! concatenated.

use burn::{
    module::Ignored,
    nn::{conv::Conv2d, pool::MaxPool2d},
    prelude::*,
};

use super::{
    modules::{
        conv1x1, AttentionBlock, AttentionBlockConfig, ConvBlock, ConvBlockConfig, ResConvBlock,
        ResConvBlockConfig, UpConv, UpConvConfig,
    },
    unet::maxpool2x2,
};
use crate::{
    config::NetworkConfig,
    error::{UNetError, UNetResult},
};

/// One attention-gated decoder stage: upsample, gate the skip tensor,
/// concatenate, fuse.
#[derive(Module, Debug)]
pub struct AttentionDecoderStage<B: Backend> {
    pub(crate) up: UpConv<B>,
    pub(crate) att: AttentionBlock<B>,
    pub(crate) up_conv: ConvBlock<B>,
}

impl<B: Backend> AttentionDecoderStage<B> {
    /// Creates the stage restoring encoder level `level - 1` from level `level`.
    fn new(base_channels: usize, level: usize, device: &Device<B>) -> Self {
        let ch_in = base_channels << level;
        let ch_out = base_channels << (level - 1);

        Self {
            up: UpConvConfig::new(ch_in, ch_out).init(device),
            att: AttentionBlockConfig::new(ch_out, ch_out, ch_out / 2).init(device),
            up_conv: ConvBlockConfig::new(ch_in, ch_out).init(device),
        }
    }

    /// Decodes `x` using `skip`.
    ///
    /// `skip` is consumed by the gate; only the gated tensor is concatenated.
    pub fn forward(&self, x: Tensor<B, 4>, skip: Tensor<B, 4>) -> UNetResult<Tensor<B, 4>> {
        let d = self.up.forward(x);
        let skip = self.att.forward(d.clone(), skip)?;
        let d = Tensor::cat(vec![skip, d], 1);

        Ok(self.up_conv.forward(d))
    }
}

/// Configuration for the `ResAttUNet` model.
#[derive(Config, Debug)]
pub struct ResAttUNetConfig {
    /// The network topology.
    pub network: NetworkConfig,
}

impl ResAttUNetConfig {
    /// Initializes a `ResAttUNet` model with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the network configuration is invalid, or if
    /// `base_channels` is too small to give the shallowest attention gate
    /// a non-empty intermediate width.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UNetResult<ResAttUNet<B>> {
        self.network.validate()?;

        if self.network.base_channels < 2 {
            return Err(UNetError::InvalidConfiguration {
                reason: format!(
                    "ResAttU_Net needs base_channels >= 2, got {}",
                    self.network.base_channels
                ),
            });
        }

        let channels = self.network.stage_channels();
        tracing::debug!(
            depth = self.network.depth,
            img_ch = self.network.img_ch,
            output_ch = self.network.output_ch,
            ?channels,
            "building ResAttU_Net"
        );

        let mut ch_in = self.network.img_ch;
        let mut encoder = Vec::with_capacity(channels.len());
        for &ch_out in &channels {
            encoder.push(ResConvBlockConfig::new(ch_in, ch_out).init(device));
            ch_in = ch_out;
        }

        let decoder = (1..self.network.depth)
            .map(|level| AttentionDecoderStage::new(self.network.base_channels, level, device))
            .collect();

        Ok(ResAttUNet {
            maxpool: maxpool2x2(),
            encoder,
            decoder,
            conv_1x1: conv1x1(self.network.base_channels, self.network.output_ch, device),
            network: Ignored(self.network.clone()),
        })
    }
}

/// U-Net with residual encoder stages and attention-gated skip connections.
#[derive(Module, Debug)]
pub struct ResAttUNet<B: Backend> {
    maxpool: MaxPool2d,
    /// Encoder stages, shallowest first.
    pub(crate) encoder: Vec<ResConvBlock<B>>,
    /// Decoder stages, shallowest first. Stage `i` restores encoder level `i`.
    pub(crate) decoder: Vec<AttentionDecoderStage<B>>,
    pub(crate) conv_1x1: Conv2d<B>,
    network: Ignored<NetworkConfig>,
}

impl<B: Backend> ResAttUNet<B> {
    /// The topology this model was built with.
    pub fn network(&self) -> &NetworkConfig {
        &self.network.0
    }

    fn forward_enc(&self, x: Tensor<B, 4>) -> Vec<Tensor<B, 4>> {
        let mut features = Vec::with_capacity(self.encoder.len());
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

    /// The forward pass for the `ResAttUNet` model.
    ///
    /// Takes `[N, img_ch, H, W]` with `H` and `W` divisible by `2^(depth - 1)` and
    /// returns raw logits of shape `[N, output_ch, H, W]`.
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::InvalidTensorShape)` if the input cannot be processed.
    pub fn forward(&self, x: Tensor<B, 4>) -> UNetResult<Tensor<B, 4>> {
        self.network.0.check_input(x.dims())?;

        let mut features = self.forward_enc(x);
        let mut d = features
            .pop()
            .ok_or_else(|| UNetError::InvalidConfiguration {
                reason: "network has no encoder stages".to_string(),
            })?;

        for (stage, skip) in self.decoder.iter().rev().zip(features.into_iter().rev()) {
            d = stage.forward(d, skip)?;
        }

        Ok(self.conv_1x1.forward(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::{backend::NdArray, module::Param, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    fn random_input(dims: [usize; 4]) -> Tensor<TestBackend, 4> {
        Tensor::random(dims, Distribution::Normal(0.0, 1.0), &Default::default())
    }

    #[test]
    fn test_res_att_unet_forward_depth4_base64() {
        let device = Default::default();
        let model = ResAttUNetConfig::new(NetworkConfig::new(4))
            .init::<TestBackend>(&device)
            .unwrap();

        let output = model.forward(random_input([1, 3, 64, 64])).unwrap();

        assert_eq!(output.dims(), [1, 1, 64, 64]);
    }

    #[test]
    fn test_res_att_unet_forward_depth5() {
        let device = Default::default();
        let network = NetworkConfig::new(5).with_img_ch(1).with_base_channels(8);
        let model = ResAttUNetConfig::new(network)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = model.forward(random_input([2, 1, 32, 48])).unwrap();

        assert_eq!(output.dims(), [2, 1, 32, 48]);
    }

    #[test]
    fn test_res_att_unet_output_channels_follow_config() {
        let device = Default::default();
        let network = NetworkConfig::new(3)
            .with_img_ch(5)
            .with_output_ch(3)
            .with_base_channels(4);
        let model = ResAttUNetConfig::new(network)
            .init::<TestBackend>(&device)
            .unwrap();

        let output = model.forward(random_input([1, 5, 8, 8])).unwrap();

        assert_eq!(output.dims(), [1, 3, 8, 8]);
    }

    #[test]
    fn test_attention_widths_follow_stage_widths() {
        let device = Default::default();
        let model = ResAttUNetConfig::new(NetworkConfig::new(4).with_base_channels(8))
            .init::<TestBackend>(&device)
            .unwrap();

        assert_eq!(model.encoder.len(), 4);
        assert_eq!(model.decoder.len(), 3);

        // Shallowest gate: F_g = F_l = 8, F_int = 4.
        let [f_int, f_g, _, _] = model.decoder[0].att.w_g_conv.weight.val().dims();
        assert_eq!((f_int, f_g), (4, 8));
        // Deepest gate: F_g = F_l = 32, F_int = 16.
        let [f_int, f_l, _, _] = model.decoder[2].att.w_x_conv.weight.val().dims();
        assert_eq!((f_int, f_l), (16, 32));
    }

    #[test]
    fn test_base_channels_one_is_rejected() {
        let device = Default::default();
        let result = ResAttUNetConfig::new(NetworkConfig::new(3).with_base_channels(1))
            .init::<TestBackend>(&device);

        assert!(matches!(
            result,
            Err(UNetError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_closed_gate_removes_skip_from_concatenation() {
        let device = Default::default();
        let mut model = ResAttUNetConfig::new(NetworkConfig::new(3).with_base_channels(4))
            .init::<TestBackend>(&device)
            .unwrap();
        // sigmoid(psi) == 0 everywhere.
        model.decoder[0].att.psi_bn.beta = Param::from_tensor(Tensor::full([1], -1.0e4, &device));
        let stage = &model.decoder[0];

        let d = random_input([1, 8, 4, 4]);
        let skip = random_input([1, 4, 8, 8]);
        let output = stage.forward(d.clone(), skip.clone()).unwrap();

        let up = stage.up.forward(d);
        let closed = stage
            .up_conv
            .forward(Tensor::cat(vec![skip.zeros_like(), up.clone()], 1));
        let raw = stage.up_conv.forward(Tensor::cat(vec![skip, up], 1));

        let diff_closed = (output.clone() - closed).abs().max().into_scalar();
        let diff_raw = (output - raw).abs().max().into_scalar();
        assert!(diff_closed <= 1e-6, "gated output differs by {diff_closed}");
        assert!(diff_raw > 1e-3, "raw skip reached the decoder");
    }

    #[test]
    fn test_closed_gates_make_output_independent_of_skips() {
        let device = Default::default();
        let mut model = ResAttUNetConfig::new(NetworkConfig::new(3).with_base_channels(4))
            .init::<TestBackend>(&device)
            .unwrap();
        for stage in model.decoder.iter_mut() {
            stage.att.psi_bn.beta = Param::from_tensor(Tensor::full([1], -1.0e4, &device));
        }

        let deepest = random_input([1, 16, 2, 2]);
        let skips = [random_input([1, 4, 8, 8]), random_input([1, 8, 4, 4])];
        let other_skips = [
            random_input([1, 4, 8, 8]).mul_scalar(10.0),
            random_input([1, 8, 4, 4]).mul_scalar(10.0),
        ];

        let decode = |skips: [Tensor<TestBackend, 4>; 2]| {
            let mut d = deepest.clone();
            for (stage, skip) in model.decoder.iter().rev().zip(skips.into_iter().rev()) {
                d = stage.forward(d, skip).unwrap();
            }
            model.conv_1x1.forward(d)
        };

        let diff = (decode(skips) - decode(other_skips))
            .abs()
            .max()
            .into_scalar();
        assert!(diff <= 1e-6, "output changed by {diff} with closed gates");
    }
}
