//! U-Net and Residual Attention U-Net for cell segmentation, built on Burn.
//!
//! Both networks map an image batch `[N, C_in, H, W]` to raw segmentation
//! logits `[N, C_out, H, W]`. Callers apply their own activation and threshold.

mod config;
mod error;
mod init;
mod models;
mod special;
pub mod weights;

pub use config::*;
pub use error::{UNetError, UNetResult};
pub use init::{InitWeights, WeightInitConfig, WeightInitializer};
pub use models::*;
