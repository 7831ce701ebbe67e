//! Burn integration: decoded items and the batcher that stacks them into tensors.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

use crate::dataset::loader::{load_image_chw, Sample};
use crate::dataset::{IMAGENET_MEAN, IMAGENET_STD};
use crate::utils::error::Result;

/// A decoded sample ready for batching
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CropItem {
    /// Image data as flattened CHW float array [3 * H * W] in [0, 1]
    pub image: Vec<f32>,
    /// Class label, absent for test images
    pub label: Option<usize>,
    /// File name reported in the submission
    pub image_id: String,
}

impl CropItem {
    /// Load and preprocess the image behind a sample
    pub fn from_sample(sample: &Sample, image_size: usize) -> Result<Self> {
        Ok(Self {
            image: load_image_chw(&sample.path, image_size)?,
            label: sample.label,
            image_id: sample.identifier(),
        })
    }
}

/// A batch of normalized images and their targets
#[derive(Clone, Debug)]
pub struct CropBatch<B: Backend> {
    /// Images with shape [batch_size, 3, height, width]
    pub images: Tensor<B, 4>,
    /// Labels with shape [batch_size]; unlabelled items carry 0
    pub targets: Tensor<B, 1, Int>,
}

/// Stacks [`CropItem`]s and applies ImageNet normalization.
///
/// Not tied to a backend, so the same batcher feeds the autodiff model during
/// training and the inner model during evaluation.
#[derive(Clone, Debug)]
pub struct CropBatcher {
    image_size: usize,
}

impl CropBatcher {
    pub fn new(image_size: usize) -> Self {
        Self { image_size }
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }
}

impl<B: Backend> Batcher<B, CropItem, CropBatch<B>> for CropBatcher {
    fn batch(&self, items: Vec<CropItem>, device: &B::Device) -> CropBatch<B> {
        let batch_size = items.len();
        let size = self.image_size;

        let images_data: Vec<f32> = items.iter().flat_map(|item| item.image.iter().copied()).collect();
        let images = Tensor::<B, 4>::from_floats(
            TensorData::new(images_data, [batch_size, 3, size, size]),
            device,
        );

        // (x - mean) / std
        let mean = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_MEAN.to_vec(), [1, 3, 1, 1]), device);
        let std = Tensor::<B, 4>::from_floats(TensorData::new(IMAGENET_STD.to_vec(), [1, 3, 1, 1]), device);
        let images = (images - mean) / std;

        let targets_data: Vec<i64> = items
            .iter()
            .map(|item| item.label.unwrap_or(0) as i64)
            .collect();
        let targets =
            Tensor::<B, 1, Int>::from_data(TensorData::new(targets_data, [batch_size]), device);

        CropBatch { images, targets }
    }
}
