//! Topology configuration shared by the segmentation networks.

use burn::prelude::*;

use crate::error::{UNetError, UNetResult};

/// Smallest supported number of encoder/decoder stage pairs.
pub const MIN_DEPTH: usize = 3;
/// Largest supported number of encoder/decoder stage pairs.
pub const MAX_DEPTH: usize = 5;

/// Topology configuration shared by `UNet` and `ResAttUNet`.
///
/// `depth` controls how many encoder stages are built; the decoder always has
/// `depth - 1` stages. The channel width of encoder stage `i` (0-based) is
/// `base_channels * 2^i`.
#[derive(Config, Debug)]
pub struct NetworkConfig {
    /// Number of encoder stages. Range: [3, 5].
    pub depth: usize,
    /// Number of channels of the input image.
    #[config(default = "3")]
    pub img_ch: usize,
    /// Number of channels of the output logits.
    #[config(default = "1")]
    pub output_ch: usize,
    /// Channel width of the first encoder stage.
    #[config(default = "64")]
    pub base_channels: usize,
}

impl NetworkConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::InvalidConfiguration)` if the depth is outside
    /// `[3, 5]` or any channel count is zero.
    pub fn validate(&self) -> UNetResult<()> {
        if !(MIN_DEPTH..=MAX_DEPTH).contains(&self.depth) {
            return Err(UNetError::InvalidConfiguration {
                reason: format!(
                    "Depth must be in [{MIN_DEPTH}, {MAX_DEPTH}], got {}",
                    self.depth
                ),
            });
        }

        if self.img_ch == 0 || self.output_ch == 0 {
            return Err(UNetError::InvalidConfiguration {
                reason: format!(
                    "Channel counts must be positive, got img_ch={} output_ch={}",
                    self.img_ch, self.output_ch
                ),
            });
        }

        if self.base_channels == 0 {
            return Err(UNetError::InvalidConfiguration {
                reason: "base_channels must be positive".to_string(),
            });
        }

        Ok(())
    }

    /// Channel width of every encoder stage, shallowest first.
    #[must_use]
    pub fn stage_channels(&self) -> Vec<usize> {
        (0..self.depth).map(|i| self.base_channels << i).collect()
    }

    /// The factor input height and width must be divisible by.
    #[must_use]
    pub const fn downsampling_factor(&self) -> usize {
        1 << (self.depth.saturating_sub(1))
    }

    /// Check that an input tensor of the given dimensions can be processed.
    ///
    /// # Errors
    ///
    /// Returns `Err(UNetError::InvalidTensorShape)` if the channel count does not
    /// match `img_ch` or the spatial size is not divisible by the downsampling factor.
    pub fn check_input(&self, dims: [usize; 4]) -> UNetResult<()> {
        let [_, channels, height, width] = dims;
        let factor = self.downsampling_factor();

        if channels != self.img_ch {
            return Err(UNetError::InvalidTensorShape {
                expected: format!("[N, {}, H, W]", self.img_ch),
                actual: format!("{dims:?}"),
            });
        }

        if height == 0 || width == 0 || height % factor != 0 || width % factor != 0 {
            return Err(UNetError::InvalidTensorShape {
                expected: format!("[N, C, H, W] with H and W divisible by {factor}"),
                actual: format!("{dims:?}"),
            });
        }

        Ok(())
    }
}
