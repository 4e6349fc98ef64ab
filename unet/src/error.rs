use thiserror::Error;

/// The error type for `unet-burn` operations.
///
/// The networks are deterministic numeric graphs, so failures are limited to
/// rejected configurations and inputs whose shape the network cannot process.
#[derive(Error, Debug)]
pub enum UNetError {
    /// Error for when an invalid model configuration is provided.
    /// This can happen if configuration parameters are out of range.
    #[error("Invalid model configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// Error for when an unknown weight initialization scheme is requested.
    #[error("Initialization method [{init_type}] is not implemented")]
    UnsupportedInitType {
        /// The name of the requested scheme.
        init_type: String,
    },

    /// Error for when an input tensor has an invalid shape.
    #[error("Invalid input tensor shape: expected {expected}, got {actual}")]
    InvalidTensorShape {
        /// The expected tensor shape.
        expected: String,
        /// The actual tensor shape.
        actual: String,
    },

    /// Error for when loading model weights fails.
    #[error("Failed to load weights: {reason}")]
    WeightLoadingFailed {
        /// The reason for the weight loading failure.
        reason: String,
    },

    /// Error for when writing a model record fails.
    #[error("Failed to save weights: {reason}")]
    WeightSavingFailed {
        /// The reason for the failure.
        reason: String,
    },
}

/// A specialized `Result` type for `unet-burn` operations.
pub type UNetResult<T> = Result<T, UNetError>;
