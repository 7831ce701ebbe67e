//! Dataset loading, splitting and batching
//!
//! - `loader`: file enumeration and image decoding
//! - `split`: stratified train/validation split
//! - `burn_dataset`: Burn items and batcher
//! - `source`: sequential batch streams consumed by the trainer

pub mod burn_dataset;
pub mod loader;
pub mod source;
pub mod split;

pub use burn_dataset::{CropBatch, CropBatcher, CropItem};
pub use loader::{list_test_samples, list_train_samples, Sample};
pub use source::{iter_batches, BatchSource, ImageFolderSource, MemorySource, SampleBatch, SampleRecord};
pub use split::{stratified_split, TrainValSplit};

/// ImageNet channel means
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];

/// ImageNet channel standard deviations
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
