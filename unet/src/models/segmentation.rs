//! A single module type over both segmentation networks, selected by
//! [`ModelKind`] at construction.

use burn::prelude::*;

use super::{ResAttUNet, ResAttUNetConfig, UNet, UNetConfig};
use crate::{
    config::{ModelKind, NetworkConfig},
    error::UNetResult,
};

/// Configuration for the `SegmentationModel`.
#[derive(Config, Debug)]
pub struct SegmentationModelConfig {
    /// Which network to build.
    #[config(default = "ModelKind::UNet")]
    pub kind: ModelKind,
    /// The network topology.
    pub network: NetworkConfig,
}

impl SegmentationModelConfig {
    /// Initializes the selected network.
    ///
    /// # Errors
    ///
    /// Returns an error if the network configuration is invalid.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> UNetResult<SegmentationModel<B>> {
        let model = match self.kind {
            ModelKind::UNet => {
                SegmentationModel::UNet(UNetConfig::new(self.network.clone()).init(device)?)
            }
            ModelKind::ResAttUNet => SegmentationModel::ResAttUNet(
                ResAttUNetConfig::new(self.network.clone()).init(device)?,
            ),
        };

        Ok(model)
    }
}

/// Either segmentation network.
#[derive(Module, Debug)]
pub enum SegmentationModel<B: Backend> {
    UNet(UNet<B>),
    ResAttUNet(ResAttUNet<B>),
}

impl<B: Backend> SegmentationModel<B> {
    pub const fn kind(&self) -> ModelKind {
        match self {
            Self::UNet(_) => ModelKind::UNet,
            Self::ResAttUNet(_) => ModelKind::ResAttUNet,
        }
    }

    pub fn network(&self) -> &NetworkConfig {
        match self {
            Self::UNet(model) => model.network(),
            Self::ResAttUNet(model) => model.network(),
        }
    }

    /// Runs the selected network. See [`UNet::forward`] and [`ResAttUNet::forward`].
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::InvalidTensorShape)` if the input cannot be processed.
    pub fn forward(&self, x: Tensor<B, 4>) -> UNetResult<Tensor<B, 4>> {
        match self {
            Self::UNet(model) => model.forward(x),
            Self::ResAttUNet(model) => model.forward(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_builds_selected_kind() {
        let device = Default::default();
        let network = NetworkConfig::new(3).with_base_channels(4);

        for kind in [ModelKind::UNet, ModelKind::ResAttUNet] {
            let model = SegmentationModelConfig::new(network.clone())
                .with_kind(kind.clone())
                .init::<TestBackend>(&device)
                .unwrap();

            assert_eq!(model.kind(), kind);
            assert_eq!(model.network().depth, 3);

            let output = model
                .forward(Tensor::zeros([1, 3, 8, 8], &device))
                .unwrap();
            assert_eq!(output.dims(), [1, 1, 8, 8]);
        }
    }

    #[test]
    fn test_res_att_unet_has_more_params_than_unet() {
        let device = Default::default();
        let network = NetworkConfig::new(4).with_base_channels(8);

        let unet = SegmentationModelConfig::new(network.clone())
            .init::<TestBackend>(&device)
            .unwrap();
        let res_att = SegmentationModelConfig::new(network)
            .with_kind(ModelKind::ResAttUNet)
            .init::<TestBackend>(&device)
            .unwrap();

        assert!(unet.num_params() < res_att.num_params());
    }
}
