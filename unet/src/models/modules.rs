//! Building blocks shared by `UNet` and `ResAttUNet`.

mod attention;
mod conv_blocks;

pub use attention::*;
pub use conv_blocks::*;
