//! Validation pass.

use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::dataset::source::{iter_batches, BatchSource};
use crate::training::learner::Learner;
use crate::training::metric::EpochMeters;
use crate::utils::error::Result;

/// Loss, top-1 and top-2 over one validation pass
///
/// JSON has no NaN/inf, so non-finite values are stored as `null` and read
/// back as NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationSummary {
    #[serde(deserialize_with = "nan_if_null")]
    pub loss: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub top1: f64,
    #[serde(deserialize_with = "nan_if_null")]
    pub top2: f64,
}

fn nan_if_null<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

impl ValidationSummary {
    /// Shown before the first validation of a run
    pub fn initial() -> Self {
        Self {
            loss: f64::INFINITY,
            top1: 0.0,
            top2: 0.0,
        }
    }

    pub fn from_array([loss, top1, top2]: [f64; 3]) -> Self {
        Self { loss, top1, top2 }
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.loss, self.top1, self.top2]
    }
}

impl Default for ValidationSummary {
    fn default() -> Self {
        Self::initial()
    }
}

/// Runs a learner over a full validation stream in evaluation mode
#[derive(Debug, Default, Clone, Copy)]
pub struct Evaluator;

impl Evaluator {
    pub fn new() -> Self {
        Self
    }

    /// Visit every validation batch once and average loss and accuracy,
    /// weighting each batch by its size
    pub fn evaluate<L, S>(&self, learner: &L, source: &mut S) -> Result<ValidationSummary>
    where
        L: Learner,
        S: BatchSource<Batch = L::Batch>,
    {
        let mut meters = EpochMeters::default();

        for batch in iter_batches(source) {
            let output = learner.valid_step(batch?)?;
            meters.record(output.loss, &output.scores, &output.targets);
        }

        if meters.loss.is_empty() {
            warn!("Validation stream yielded no samples");
        }

        let summary = ValidationSummary::from_array(meters.averages());
        debug!(
            "Validation: loss {:.4}, top-1 {:.4}, top-2 {:.4}",
            summary.loss, summary.top1, summary.top2
        );
        Ok(summary)
    }
}
