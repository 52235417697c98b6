use std::path::PathBuf;

use thiserror::Error;

/// The error type for segmentation head operations.
///
/// Construction, forward passes and the weight store all report failures through this
/// enum; nothing in the library aborts on malformed input.
#[derive(Error, Debug)]
pub enum SegNetError {
    /// A tensor entering an operation does not have the shape the operation was built for.
    #[error("Shape mismatch in {operation}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// The operation that rejected the tensor.
        operation: &'static str,
        /// What the operation expected.
        expected: String,
        /// What it received.
        actual: String,
    },

    /// Error for when an invalid configuration is provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfiguration {
        /// The reason why the configuration is invalid.
        reason: String,
    },

    /// The interpolation policy cannot be honoured by the tensor backend.
    #[error("Unsupported interpolation: {reason}")]
    UnsupportedInterpolation {
        /// Why the policy was rejected.
        reason: String,
    },

    /// Error for when an unsupported backbone network is specified.
    #[error("Unsupported backbone: {backbone}")]
    UnsupportedBackbone {
        /// The name of the unsupported backbone.
        backbone: String,
    },

    /// The dataset registry has no entry for this key.
    #[error("Unknown dataset: {name}")]
    UnknownDataset {
        /// The key that failed lookup.
        name: String,
    },

    /// The architecture name is not one of the provided heads.
    #[error("Unknown architecture: {name}")]
    UnknownArchitecture {
        /// The name that failed lookup.
        name: String,
    },

    /// No stored parameter set exists for the requested model.
    #[error("Pretrained model {name} not found at {}", path.display())]
    PretrainedNotFound {
        /// The model-store name.
        name: String,
        /// Where the file was expected.
        path: PathBuf,
    },

    /// The requested feature has no implementation.
    #[error("Not implemented: {feature}")]
    NotImplemented {
        /// The missing feature.
        feature: String,
    },

    /// Error for when loading model weights fails.
    #[error("Failed to load weights: {reason}")]
    WeightLoadingFailed {
        /// The reason for the weight loading failure.
        reason: String,
    },

    /// Error for when writing model weights fails.
    #[error("Failed to save weights: {reason}")]
    WeightSavingFailed {
        /// The reason for the failure.
        reason: String,
    },
}

/// A specialized `Result` type for segmentation head operations.
pub type SegNetResult<T> = Result<T, SegNetError>;
