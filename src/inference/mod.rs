//! Inference over the unlabelled test set
//!
//! - `runner`: restores the best checkpoint and predicts each sample once
//! - `submission`: the JSON report written at the end of a run

pub mod runner;
pub mod submission;

pub use runner::{argmax, remap_class, softmax, InferenceRunner, PredictionRecord};
pub use submission::{submission_path, write_submission, SubmissionRecord};
