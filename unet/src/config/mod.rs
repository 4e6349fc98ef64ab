//! Configuration module for the segmentation networks.
//!
//! - `network`: the topology shared by `UNet` and `ResAttUNet`
//! - `enums`: enumeration types used in configurations

mod enums;
mod network;

pub use enums::{InitType, ModelKind};
pub use network::{NetworkConfig, MAX_DEPTH, MIN_DEPTH};
