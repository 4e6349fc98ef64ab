//! Enumeration types for network configuration.

use std::str::FromStr;

use burn::prelude::*;

use crate::error::UNetError;

/// Selects which segmentation network to build.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum ModelKind {
    /// Plain U-Net with `ConvBlock` encoder stages.
    UNet,
    /// U-Net with residual encoder stages and attention-gated skip connections.
    ResAttUNet,
}

impl FromStr for ModelKind {
    type Err = UNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['_', '-'], "").as_str() {
            "unet" => Ok(Self::UNet),
            "resattunet" => Ok(Self::ResAttUNet),
            _ => Err(UNetError::InvalidConfiguration {
                reason: format!("Unknown model type: {s}"),
            }),
        }
    }
}

impl ModelKind {
    /// PyTorch class name of the network, as used in checkpoints and on the command line.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::UNet => "U_Net",
            Self::ResAttUNet => "ResAttU_Net",
        }
    }
}

/// Weight initialization scheme for convolution weights.
#[derive(Config, Debug, PartialEq, Eq)]
pub enum InitType {
    /// Normal distribution with mean 0 and `std = gain`.
    Normal,
    /// Xavier (Glorot) normal, scaled by `gain`.
    Xavier,
    /// Kaiming (He) normal in fan-in mode. `gain` is not used.
    Kaiming,
    /// (Semi-)orthogonal matrix scaled by `gain`.
    Orthogonal,
}

impl FromStr for InitType {
    type Err = UNetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "xavier" => Ok(Self::Xavier),
            "kaiming" => Ok(Self::Kaiming),
            "orthogonal" => Ok(Self::Orthogonal),
            _ => Err(UNetError::UnsupportedInitType {
                init_type: s.to_string(),
            }),
        }
    }
}

impl InitType {
    /// Lowercase scheme name, as accepted by `from_str`.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Xavier => "xavier",
            Self::Kaiming => "kaiming",
            Self::Orthogonal => "orthogonal",
        }
    }
}
