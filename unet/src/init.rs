//! # Weight Initialization
//!
//! Re-initializes every convolution and batch-norm parameter of a model with a
//! named scheme:
//!
//! - Convolution weights follow the requested [`InitType`]; biases are zeroed.
//! - Batch-norm scale is drawn from `N(1, gain^2)` and shift is zeroed,
//!   whatever the scheme.
//!
//! The initializer owns a seeded RNG, so applying the same scheme with the same
//! seed to identically configured models produces identical parameters.
//! An unknown scheme name is rejected when the initializer is built, before any
//! model is touched.

use std::str::FromStr;

use burn::{
    module::Param,
    nn::{conv::Conv2d, BatchNorm},
    prelude::*,
};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    config::InitType,
    error::UNetResult,
    models::{
        AttentionBlock, AttentionDecoderStage, ConvBlock, DecoderStage, ResAttUNet, ResConvBlock,
        SegmentationModel, UNet, UpConv,
    },
    special::{orthogonal, seeded_normal},
};

/// Configuration for a [`WeightInitializer`].
#[derive(Config, Debug)]
pub struct WeightInitConfig {
    /// The scheme applied to convolution weights.
    #[config(default = "InitType::Normal")]
    pub init_type: InitType,
    /// Standard deviation for `Normal`, gain for `Xavier` and `Orthogonal`,
    /// and standard deviation of the batch-norm scale.
    #[config(default = "0.02")]
    pub gain: f64,
    /// Seed of the random number generator.
    #[config(default = "0")]
    pub seed: u64,
}

impl WeightInitConfig {
    /// Creates the initializer.
    pub fn init(&self) -> WeightInitializer {
        WeightInitializer {
            init_type: self.init_type.clone(),
            gain: self.gain,
            rng: StdRng::seed_from_u64(self.seed),
        }
    }
}

/// Applies an initialization scheme to parameters.
#[derive(Debug)]
pub struct WeightInitializer {
    init_type: InitType,
    gain: f64,
    rng: StdRng,
}

impl WeightInitializer {
    /// Creates an initializer from a scheme name (`normal`, `xavier`, `kaiming`
    /// or `orthogonal`).
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::UnsupportedInitType)` if the name is not recognized.
    pub fn from_name(init_type: &str, gain: f64, seed: u64) -> UNetResult<Self> {
        let init_type = InitType::from_str(init_type)?;

        Ok(WeightInitConfig::new()
            .with_init_type(init_type)
            .with_gain(gain)
            .with_seed(seed)
            .init())
    }

    pub const fn init_type(&self) -> &InitType {
        &self.init_type
    }

    /// Re-initializes a convolution: weights per scheme, bias zeroed.
    pub fn init_conv<B: Backend>(&mut self, conv: Conv2d<B>) -> Conv2d<B> {
        let mut conv = conv;
        let weight = conv.weight.val();
        let device = weight.device();
        let dims = weight.dims();
        let [ch_out, ch_in, k1, k2] = dims;
        let fan_in = ch_in * k1 * k2;
        let fan_out = ch_out * k1 * k2;

        let weight = match self.init_type {
            InitType::Normal => seeded_normal(dims, 0.0, self.gain, &mut self.rng, &device),
            InitType::Xavier => {
                let std = self.gain * (2.0 / (fan_in + fan_out) as f64).sqrt();
                seeded_normal(dims, 0.0, std, &mut self.rng, &device)
            }
            InitType::Kaiming => {
                let std = (2.0 / fan_in as f64).sqrt();
                seeded_normal(dims, 0.0, std, &mut self.rng, &device)
            }
            InitType::Orthogonal => orthogonal(dims, self.gain, &mut self.rng, &device),
        };

        conv.weight = Param::from_tensor(weight);
        conv.bias = conv
            .bias
            .map(|bias| Param::from_tensor(bias.val().zeros_like()));
        conv
    }

    /// Re-initializes a batch norm: scale from `N(1, gain^2)`, shift zeroed.
    pub fn init_batch_norm<B: Backend>(&mut self, bn: BatchNorm<B, 2>) -> BatchNorm<B, 2> {
        let mut bn = bn;
        let gamma = bn.gamma.val();
        let device = gamma.device();

        bn.gamma = Param::from_tensor(seeded_normal(
            gamma.dims(),
            1.0,
            self.gain,
            &mut self.rng,
            &device,
        ));
        bn.beta = Param::from_tensor(bn.beta.val().zeros_like());
        bn
    }
}

/// Modules whose parameters can be re-initialized by a [`WeightInitializer`].
///
/// Parameters are visited in a fixed order (field order, shallowest stage
/// first), which keeps seeded initialization reproducible.
pub trait InitWeights: Sized {
    #[must_use]
    fn init_weights(self, initializer: &mut WeightInitializer) -> Self;
}

impl<B: Backend> InitWeights for ConvBlock<B> {
    fn init_weights(mut self, initializer: &mut WeightInitializer) -> Self {
        self.conv1 = initializer.init_conv(self.conv1);
        self.bn1 = initializer.init_batch_norm(self.bn1);
        self.conv2 = initializer.init_conv(self.conv2);
        self.bn2 = initializer.init_batch_norm(self.bn2);
        self
    }
}

impl<B: Backend> InitWeights for ResConvBlock<B> {
    fn init_weights(mut self, initializer: &mut WeightInitializer) -> Self {
        self.conv = self.conv.init_weights(initializer);
        self.conv_1x1 = initializer.init_conv(self.conv_1x1);
        self
    }
}

impl<B: Backend> InitWeights for UpConv<B> {
    fn init_weights(mut self, initializer: &mut WeightInitializer) -> Self {
        self.conv = initializer.init_conv(self.conv);
        self.bn = initializer.init_batch_norm(self.bn);
        self
    }
}

impl<B: Backend> InitWeights for AttentionBlock<B> {
    fn init_weights(mut self, initializer: &mut WeightInitializer) -> Self {
        self.w_g_conv = initializer.init_conv(self.w_g_conv);
        self.w_g_bn = initializer.init_batch_norm(self.w_g_bn);
        self.w_x_conv = initializer.init_conv(self.w_x_conv);
        self.w_x_bn = initializer.init_batch_norm(self.w_x_bn);
        self.psi_conv = initializer.init_conv(self.psi_conv);
        self.psi_bn = initializer.init_batch_norm(self.psi_bn);
        self
    }
}

impl<B: Backend> InitWeights for DecoderStage<B> {
    fn init_weights(mut self, initializer: &mut WeightInitializer) -> Self {
        self.up = self.up.init_weights(initializer);
        self.up_conv = self.up_conv.init_weights(initializer);
        self
    }
}

impl<B: Backend> InitWeights for AttentionDecoderStage<B> {
    fn init_weights(mut self, initializer: &mut WeightInitializer) -> Self {
        self.up = self.up.init_weights(initializer);
        self.att = self.att.init_weights(initializer);
        self.up_conv = self.up_conv.init_weights(initializer);
        self
    }
}

impl<M: InitWeights> InitWeights for Vec<M> {
    fn init_weights(self, initializer: &mut WeightInitializer) -> Self {
        self.into_iter()
            .map(|module| module.init_weights(initializer))
            .collect()
    }
}

impl<B: Backend> InitWeights for UNet<B> {
    fn init_weights(mut self, initializer: &mut WeightInitializer) -> Self {
        tracing::info!(
            init_type = initializer.init_type.name(),
            gain = initializer.gain,
            "initialize U_Net"
        );
        self.encoder = self.encoder.init_weights(initializer);
        self.decoder = self.decoder.init_weights(initializer);
        self.conv_1x1 = initializer.init_conv(self.conv_1x1);
        self
    }
}

impl<B: Backend> InitWeights for ResAttUNet<B> {
    fn init_weights(mut self, initializer: &mut WeightInitializer) -> Self {
        tracing::info!(
            init_type = initializer.init_type.name(),
            gain = initializer.gain,
            "initialize ResAttU_Net"
        );
        self.encoder = self.encoder.init_weights(initializer);
        self.decoder = self.decoder.init_weights(initializer);
        self.conv_1x1 = initializer.init_conv(self.conv_1x1);
        self
    }
}

impl<B: Backend> InitWeights for SegmentationModel<B> {
    fn init_weights(self, initializer: &mut WeightInitializer) -> Self {
        match self {
            Self::UNet(model) => Self::UNet(model.init_weights(initializer)),
            Self::ResAttUNet(model) => Self::ResAttUNet(model.init_weights(initializer)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::NetworkConfig,
        error::UNetError,
        models::{ResAttUNetConfig, UNetConfig},
    };
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn max_abs_diff<const D: usize>(a: Tensor<TestBackend, D>, b: Tensor<TestBackend, D>) -> f32 {
        (a - b).abs().max().into_scalar()
    }

    fn small_unet() -> UNet<TestBackend> {
        UNetConfig::new(NetworkConfig::new(3).with_base_channels(4))
            .init(&Default::default())
            .unwrap()
    }

    fn conv_params(conv: &Conv2d<TestBackend>) -> Vec<Tensor<TestBackend, 1>> {
        let mut params = vec![conv.weight.val().flatten(0, 3)];
        params.extend(conv.bias.as_ref().map(|bias| bias.val()));
        params
    }

    fn bn_params(bn: &BatchNorm<TestBackend, 2>) -> Vec<Tensor<TestBackend, 1>> {
        vec![bn.gamma.val(), bn.beta.val()]
    }

    fn block_params(block: &ConvBlock<TestBackend>) -> Vec<Tensor<TestBackend, 1>> {
        [
            conv_params(&block.conv1),
            bn_params(&block.bn1),
            conv_params(&block.conv2),
            bn_params(&block.bn2),
        ]
        .concat()
    }

    /// Every trainable tensor of a `UNet`, flattened, in field order.
    fn unet_params(model: &UNet<TestBackend>) -> Vec<Tensor<TestBackend, 1>> {
        let mut params = Vec::new();
        for stage in &model.encoder {
            params.extend(block_params(stage));
        }
        for stage in &model.decoder {
            params.extend(conv_params(&stage.up.conv));
            params.extend(bn_params(&stage.up.bn));
            params.extend(block_params(&stage.up_conv));
        }
        params.extend(conv_params(&model.conv_1x1));
        params
    }

    #[test]
    fn test_xavier_with_same_seed_is_reproducible() {
        let mut init_a = WeightInitializer::from_name("xavier", 0.02, 42).unwrap();
        let mut init_b = WeightInitializer::from_name("xavier", 0.02, 42).unwrap();
        let a = small_unet().init_weights(&mut init_a);
        let b = small_unet().init_weights(&mut init_b);

        let params_a = unet_params(&a);
        let params_b = unet_params(&b);
        let total: usize = params_a.iter().map(|p| p.dims()[0]).sum();
        assert_eq!(total, a.num_params());
        assert_eq!(params_a.len(), params_b.len());

        for (i, (pa, pb)) in params_a.into_iter().zip(params_b).enumerate() {
            let pa = pa.into_data().to_vec::<f32>().unwrap();
            let pb = pb.into_data().to_vec::<f32>().unwrap();
            assert_eq!(pa, pb, "parameter {i} differs");
        }
    }

    #[test]
    fn test_same_seed_gives_identical_res_att_unet_outputs() {
        let device = Default::default();
        let config = ResAttUNetConfig::new(NetworkConfig::new(4).with_base_channels(4));
        let a = config
            .init::<TestBackend>(&device)
            .unwrap()
            .init_weights(&mut WeightInitializer::from_name("orthogonal", 1.0, 11).unwrap());
        let b = config
            .init::<TestBackend>(&device)
            .unwrap()
            .init_weights(&mut WeightInitializer::from_name("orthogonal", 1.0, 11).unwrap());

        let input = Tensor::<TestBackend, 4>::random(
            [2, 3, 16, 16],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );
        let out_a = a.forward(input.clone()).unwrap().into_data();
        let out_b = b.forward(input).unwrap().into_data();

        assert_eq!(
            out_a.to_vec::<f32>().unwrap(),
            out_b.to_vec::<f32>().unwrap()
        );
    }

    #[test]
    fn test_different_seeds_differ() {
        let a = small_unet().init_weights(&mut WeightInitConfig::new().with_seed(1).init());
        let b = small_unet().init_weights(&mut WeightInitConfig::new().with_seed(2).init());

        assert!(max_abs_diff(a.conv_1x1.weight.val(), b.conv_1x1.weight.val()) > 0.0);
    }

    #[test]
    fn test_unknown_scheme_is_rejected_before_touching_the_model() {
        let model = small_unet();
        let before = model.conv_1x1.weight.val();

        match WeightInitializer::from_name("bogus", 0.02, 0) {
            Err(UNetError::UnsupportedInitType { init_type }) => {
                assert_eq!(init_type, "bogus");
            }
            _ => panic!("Expected UnsupportedInitType error"),
        }

        assert_eq!(max_abs_diff(model.conv_1x1.weight.val(), before), 0.0);
    }

    #[test]
    fn test_biases_and_batch_norm_follow_fixed_rule() {
        for scheme in ["normal", "xavier", "kaiming", "orthogonal"] {
            let mut initializer = WeightInitializer::from_name(scheme, 0.02, 3).unwrap();
            let model = small_unet().init_weights(&mut initializer);

            let block = &model.encoder[1];
            let bias = block.conv1.bias.as_ref().unwrap().val();
            assert_eq!(bias.abs().max().into_scalar(), 0.0, "{scheme}");
            assert_eq!(block.bn1.beta.val().abs().max().into_scalar(), 0.0, "{scheme}");

            let gamma_offset = block.bn1.gamma.val().sub_scalar(1.0).abs().max().into_scalar();
            assert!(gamma_offset < 0.2, "{scheme}: gamma offset {gamma_offset}");
        }
    }

    #[test]
    fn test_kaiming_std_follows_fan_in() {
        let network = NetworkConfig::new(3).with_base_channels(32);
        let model = UNetConfig::new(network)
            .init::<TestBackend>(&Default::default())
            .unwrap()
            .init_weights(&mut WeightInitializer::from_name("kaiming", 0.02, 5).unwrap());

        // conv2 of the last encoder stage: 128 -> 128, 3x3, fan_in = 1152.
        let weight = model.encoder[2].conv2.weight.val().flatten::<1>(0, 3);
        let std = weight.var(0).sqrt().into_scalar();
        let expected = (2.0_f32 / 1152.0).sqrt();
        assert!((std - expected).abs() < expected * 0.05, "std {std}");
    }

    #[test]
    fn test_res_att_unet_attention_gates_are_initialized() {
        let model = ResAttUNetConfig::new(NetworkConfig::new(3).with_base_channels(4))
            .init::<TestBackend>(&Default::default())
            .unwrap()
            .init_weights(&mut WeightInitializer::from_name("normal", 0.5, 9).unwrap());

        let psi_bias = model.decoder[0].att.psi_conv.bias.as_ref().unwrap().val();
        assert_eq!(psi_bias.abs().max().into_scalar(), 0.0);

        let projection_bias = model.encoder[0].conv_1x1.bias.as_ref().unwrap().val();
        assert_eq!(projection_bias.abs().max().into_scalar(), 0.0);
    }

    #[test]
    fn test_scheme_names_are_case_insensitive() {
        let initializer = WeightInitializer::from_name("Orthogonal", 1.0, 0).unwrap();
        assert_eq!(initializer.init_type(), &InitType::Orthogonal);
    }
}
