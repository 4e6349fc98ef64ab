//! # Model Architectures
//!
//! - `modules`: building blocks (`ConvBlock`, `ResConvBlock`, `UpConv`, `AttentionBlock`).
//! - `unet`: the plain `UNet`.
//! - `res_att_unet`: the residual attention `ResAttUNet`.
//! - `segmentation`: `SegmentationModel`, one module type over both networks.

pub mod modules;
mod res_att_unet;
mod segmentation;
mod unet;

pub use modules::*;
pub use res_att_unet::*;
pub use segmentation::*;
pub use unet::{DecoderStage, UNet, UNetConfig, UNetRecord};
