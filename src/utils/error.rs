//! Error Handling Module
//!
//! Defines the error type shared by every stage of the crop disease pipeline.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for crop disease training and inference
#[derive(Error, Debug)]
pub enum CropError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset enumeration or splitting
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error with model operations
    #[error("Model error: {0}")]
    Model(String),

    /// Error raised inside the epoch loop
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Checkpoint record could not be written or decoded
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// A checkpoint was requested but nothing exists at its location
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(PathBuf),

    /// The loss of a training batch was NaN or infinite
    #[error("Non-finite loss: {loss}")]
    NonFiniteLoss { loss: f64 },

    /// A scalar could not be turned into a displayable number
    #[error("Non-finite value: {0}")]
    NonFiniteValue(f64),
}

impl From<serde_json::Error> for CropError {
    fn from(err: serde_json::Error) -> Self {
        CropError::Serialization(err.to_string())
    }
}

/// Convenience Result type for crop disease operations
pub type Result<T> = std::result::Result<T, CropError>;
