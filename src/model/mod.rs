//! Model definitions
//!
//! - `cnn`: the convolutional classifier

pub mod cnn;

pub use cnn::{CropClassifier, CropClassifierConfig};

/// What a forward pass is for.
///
/// Passed into every call instead of being stored on the model, so the same
/// weights can serve a training step and an evaluation pass without a hidden
/// flag in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Stochastic layers (dropout) are active
    Train,
    /// Deterministic pass for validation and inference
    Eval,
}

impl Mode {
    pub fn is_train(self) -> bool {
        matches!(self, Mode::Train)
    }
}
