//! Stratified train/validation split.
//!
//! Each class is shuffled with a seeded `ChaCha8Rng` and contributes
//! `round(n * validation_fraction)` samples to validation, so both partitions
//! keep the label proportions of the source set. Every class keeps at least
//! one training sample.

use std::collections::BTreeMap;

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::dataset::loader::Sample;
use crate::utils::error::{CropError, Result};

/// Labelled data divided for one fold
#[derive(Debug, Clone)]
pub struct TrainValSplit {
    pub train: Vec<Sample>,
    pub validation: Vec<Sample>,
}

impl TrainValSplit {
    pub fn len(&self) -> usize {
        self.train.len() + self.validation.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Split labelled samples into train and validation, stratified by label
pub fn stratified_split(
    samples: Vec<Sample>,
    validation_fraction: f64,
    seed: u64,
) -> Result<TrainValSplit> {
    if !(validation_fraction > 0.0 && validation_fraction < 1.0) {
        return Err(CropError::Config(format!(
            "Validation fraction must be in (0, 1), got {}",
            validation_fraction
        )));
    }

    let mut by_class: BTreeMap<usize, Vec<Sample>> = BTreeMap::new();
    for sample in samples {
        let label = sample.label.ok_or_else(|| {
            CropError::Dataset(format!("Cannot stratify unlabelled sample {}", sample.path.display()))
        })?;
        by_class.entry(label).or_default().push(sample);
    }

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut validation = Vec::new();

    for (_, mut class_samples) in by_class {
        class_samples.shuffle(&mut rng);

        let n = class_samples.len();
        let n_val = ((n as f64 * validation_fraction).round() as usize).min(n.saturating_sub(1));

        let rest = class_samples.split_off(n_val);
        validation.extend(class_samples);
        train.extend(rest);
    }

    train.shuffle(&mut rng);
    validation.sort_by(|a, b| a.path.cmp(&b.path));

    info!(
        "Split {} labelled samples into {} train / {} validation",
        train.len() + validation.len(),
        train.len(),
        validation.len()
    );

    Ok(TrainValSplit { train, validation })
}
