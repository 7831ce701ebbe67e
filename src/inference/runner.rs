//! Prediction over the test stream.

use std::collections::HashSet;

use tracing::{info, warn};

use crate::dataset::source::{iter_batches, BatchSource, SampleBatch};
use crate::inference::submission::SubmissionRecord;
use crate::training::checkpoint::{Checkpoint, CheckpointKind, CheckpointStore};
use crate::training::learner::Learner;
use crate::utils::error::{CropError, Result};
use crate::{LABEL_REMAP_OFFSET, LABEL_REMAP_THRESHOLD};

/// Numerically stable softmax of one score row
///
/// NaN scores get zero mass. When the maximum is infinite the mass is split
/// evenly over the scores equal to it.
pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = if max.is_infinite() {
        scores.iter().map(|&s| if s == max { 1.0 } else { 0.0 }).collect()
    } else {
        scores
            .iter()
            .map(|&s| if s.is_nan() { 0.0 } else { (s - max).exp() })
            .collect()
    };
    let total: f32 = exps.iter().sum();
    if total == 0.0 {
        return exps;
    }
    exps.into_iter().map(|e| e / total).collect()
}

/// Index of the first maximal value; NaN never wins
pub fn argmax(values: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            continue;
        }
        match best {
            Some((_, current)) if v <= current => {}
            _ => best = Some((i, v)),
        }
    }
    best.map(|(i, _)| i)
}

/// Map a model class index to the external label space
///
/// Indices above 43 shift up by two.
pub fn remap_class(index: usize) -> usize {
    if index > LABEL_REMAP_THRESHOLD {
        index + LABEL_REMAP_OFFSET
    } else {
        index
    }
}

/// Class probabilities of one test sample
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionRecord {
    pub image_id: String,
    pub probabilities: Vec<f32>,
}

impl PredictionRecord {
    pub fn predicted_class(&self) -> Option<usize> {
        argmax(&self.probabilities)
    }

    pub fn to_submission(&self) -> Result<SubmissionRecord> {
        let index = self.predicted_class().ok_or_else(|| {
            CropError::Inference(format!("No valid score for {}", self.image_id))
        })?;
        Ok(SubmissionRecord {
            image_id: self.image_id.clone(),
            disease_class: remap_class(index),
        })
    }
}

/// Restores the best checkpoint and predicts every test sample once
#[derive(Debug, Clone)]
pub struct InferenceRunner {
    store: CheckpointStore,
    fold: usize,
}

impl InferenceRunner {
    pub fn new(store: CheckpointStore, fold: usize) -> Self {
        Self { store, fold }
    }

    /// Load the best weights of the fold into `learner`
    pub fn restore<L: Learner>(&self, learner: &mut L) -> Result<Checkpoint> {
        let checkpoint = self.store.load(self.fold, CheckpointKind::Best)?;
        learner.load_state_dict(&checkpoint.state_dict)?;
        Ok(checkpoint)
    }

    /// Probabilities for every sample, in stream order
    pub fn predict<L, S>(&self, learner: &L, source: &mut S) -> Result<Vec<PredictionRecord>>
    where
        L: Learner,
        S: BatchSource<Batch = L::Batch>,
        L::Batch: SampleBatch,
    {
        let mut records = Vec::with_capacity(source.num_samples());

        for batch in iter_batches(source) {
            let batch = batch?;
            let ids = batch.identifiers();
            let scores = learner.predict(batch)?;

            if scores.len() != ids.len() {
                return Err(CropError::Inference(format!(
                    "Model returned {} score rows for {} samples",
                    scores.len(),
                    ids.len()
                )));
            }

            records.extend(ids.into_iter().zip(scores).map(|(image_id, row)| PredictionRecord {
                image_id,
                probabilities: softmax(&row),
            }));
        }

        let unique: HashSet<&str> = records.iter().map(|r| r.image_id.as_str()).collect();
        if unique.len() != records.len() {
            warn!(
                "{} test samples share an identifier with another sample",
                records.len() - unique.len()
            );
        }

        Ok(records)
    }

    /// Restore the best checkpoint, predict and remap
    pub fn run<L, S>(&self, learner: &mut L, source: &mut S) -> Result<Vec<SubmissionRecord>>
    where
        L: Learner,
        S: BatchSource<Batch = L::Batch>,
        L::Batch: SampleBatch,
    {
        let checkpoint = self.restore(learner)?;
        info!(
            "Predicting {} test samples with weights from epoch {} (top-1 {:.4})",
            source.num_samples(),
            checkpoint.epoch,
            checkpoint.best_precision1
        );

        self.predict(learner, source)?
            .iter()
            .map(PredictionRecord::to_submission)
            .collect()
    }
}
