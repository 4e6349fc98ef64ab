//! Command-line tools for the `unet-burn` segmentation networks.
//!
//! ## Available tools
//!
//! - `inspect`: build a network, optionally initialize it, run a forward pass
//!   on random input and report shapes and parameter counts
//! - `converter`: convert a PyTorch checkpoint into a Burn record
//!   (feature `pretrained`)
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin inspect -- --model ResAttU_Net --depth 4 --init kaiming
//! cargo run --bin inspect -- --config model.json --save model
//! cargo run --features pretrained --bin converter -- model.pth model --model U_Net
//! ```

pub mod backend;

use std::{path::PathBuf, str::FromStr};

use anyhow::{Context, Result};
use burn::prelude::*;
use clap::Args;
use tracing_subscriber::EnvFilter;
use unet_burn::{ModelKind, NetworkConfig, SegmentationModelConfig};

pub use backend::{create_device, get_backend_name, SelectedBackend, SelectedDevice};

/// Installs the `tracing` subscriber. `RUST_LOG` overrides the default level.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Model selection flags shared by the tools.
#[derive(Args, Debug)]
pub struct ModelArgs {
    /// JSON `SegmentationModelConfig`; overrides the flags below
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Network type (`U_Net` or `ResAttU_Net`)
    #[arg(short, long, default_value = "U_Net")]
    pub model: String,

    /// Number of encoder stages (3 to 5)
    #[arg(short, long, default_value_t = 5)]
    pub depth: usize,

    /// Input image channels
    #[arg(long, default_value_t = 3)]
    pub img_ch: usize,

    /// Output logit channels
    #[arg(long, default_value_t = 1)]
    pub output_ch: usize,

    /// Channel width of the first encoder stage
    #[arg(long, default_value_t = 64)]
    pub base_channels: usize,
}

impl ModelArgs {
    /// Resolves the flags (or the config file) into a model configuration.
    pub fn model_config(&self) -> Result<SegmentationModelConfig> {
        if let Some(path) = &self.config {
            return SegmentationModelConfig::load(path).map_err(|e| {
                anyhow::anyhow!("Failed to load config file {}: {e}", path.display())
            });
        }

        let kind = ModelKind::from_str(&self.model)
            .with_context(|| format!("Invalid --model value: {}", self.model))?;
        let network = NetworkConfig::new(self.depth)
            .with_img_ch(self.img_ch)
            .with_output_ch(self.output_ch)
            .with_base_channels(self.base_channels);

        Ok(SegmentationModelConfig::new(network).with_kind(kind))
    }
}
