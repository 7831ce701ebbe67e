//! # Crop Disease Classification
//!
//! Training, validation and submission driver for a crop disease image
//! classifier built on the Burn framework.
//!
//! ## Modules
//!
//! - `dataset`: file enumeration, stratified split, batching
//! - `model`: CNN architecture built with Burn
//! - `training`: epoch loop, evaluation, checkpoints, learning rate schedules
//! - `inference`: best-checkpoint prediction and the submission report
//! - `pipeline`: the end-to-end run wired from a [`RunConfig`]
//! - `utils`: logging, errors and formatting helpers

pub mod backend;
pub mod config;
pub mod dataset;
pub mod inference;
pub mod model;
pub mod pipeline;
pub mod training;
pub mod utils;

pub use config::{RunConfig, RunLayout};
pub use dataset::{CropBatcher, CropItem, ImageFolderSource, Sample};
pub use inference::{InferenceRunner, SubmissionRecord};
pub use model::{CropClassifier, Mode};
pub use training::{CheckpointKind, CheckpointStore, ClassifierLearner, Learner, Trainer};
pub use utils::error::{CropError, Result};

/// Classes the model predicts
pub const NUM_CLASSES: usize = 59;

/// Predicted indices above this value are shifted in the report
pub const LABEL_REMAP_THRESHOLD: usize = 43;

/// Shift applied to indices above [`LABEL_REMAP_THRESHOLD`]
pub const LABEL_REMAP_OFFSET: usize = 2;
