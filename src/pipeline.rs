//! End-to-end run: data, training, best checkpoint, submission.

use std::path::PathBuf;

use burn::tensor::backend::AutodiffBackend;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::dataset::loader::{list_test_samples, list_train_samples};
use crate::dataset::source::ImageFolderSource;
use crate::dataset::split::stratified_split;
use crate::inference::runner::{InferenceRunner, PredictionRecord};
use crate::inference::submission::{submission_path, write_submission, SubmissionRecord};
use crate::training::checkpoint::{CheckpointKind, CheckpointStore};
use crate::training::learner::ClassifierLearner;
use crate::training::trainer::{Trainer, TrainerConfig, TrainingReport};
use crate::utils::error::{CropError, Result};
use crate::utils::format_number;
use crate::utils::logging::TrainingLog;

/// File name of the tabular training log inside the logs directory
pub const TRAINING_LOG_FILE: &str = "log_train.txt";

/// Outcome of [`run`]
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub training: TrainingReport,
    pub best_precision1: f64,
    pub predictions: usize,
    pub submission: PathBuf,
}

/// Train on `paths.train_data`, then predict `paths.test_data` with the best
/// checkpoint and write the submission
pub fn run<B: AutodiffBackend>(config: &RunConfig, device: B::Device) -> Result<PipelineReport> {
    config.validate()?;
    let layout = config.layout();
    layout.ensure_dirs()?;
    B::seed(config.seed);

    let labelled = list_train_samples(&config.paths.train_data, config.num_classes)?;
    if labelled.is_empty() {
        return Err(CropError::Dataset(format!(
            "No labelled images under {}",
            config.paths.train_data.display()
        )));
    }
    let split = stratified_split(labelled, config.validation_fraction, config.seed)?;
    let test = list_test_samples(&config.paths.test_data)?;

    info!(
        "Samples: {} train, {} validation, {} test",
        format_number(split.train.len()),
        format_number(split.validation.len()),
        format_number(test.len())
    );

    let mut train_source =
        ImageFolderSource::new(split.train, config.batch_size, config.image_size, Some(config.seed))?;
    let mut valid_source =
        ImageFolderSource::new(split.validation, config.batch_size, config.image_size, None)?;
    let mut test_source =
        ImageFolderSource::new(test, config.test_batch_size, config.image_size, None)?;

    let store = CheckpointStore::new(&config.paths.weights, &config.paths.best_models, &config.model_name)
        .with_event_log(layout.logs_dir.join(format!("{}.txt", config.model_name)));

    let learner = ClassifierLearner::<B>::from_config(config, device);
    let log = TrainingLog::open(layout.logs_dir.join(TRAINING_LOG_FILE), config.show_progress)?;
    let mut trainer = Trainer::new(learner, TrainerConfig::from(config), store.clone()).with_log(log);

    if let Some(kind) = config.resume {
        trainer.resume(kind)?;
    }

    let training = trainer.fit(&mut train_source, &mut valid_source)?;
    let mut learner = trainer.into_learner();

    let runner = InferenceRunner::new(store.clone(), config.fold);
    let use_best = best_checkpoint_is_current(&training, config.resume.is_some())
        && store.exists(config.fold, CheckpointKind::Best);
    let records: Vec<SubmissionRecord> = if use_best {
        runner.run(&mut learner, &mut test_source)?
    } else {
        warn!("No best checkpoint was stored; predicting with the final weights");
        runner
            .predict(&learner, &mut test_source)?
            .iter()
            .map(PredictionRecord::to_submission)
            .collect::<Result<_>>()?
    };

    let submission = submission_path(&layout.submit_dir, &config.submission_name);
    write_submission(&submission, &records)?;

    Ok(PipelineReport {
        best_precision1: training.best_precision1,
        training,
        predictions: records.len(),
        submission,
    })
}

/// A best checkpoint on disk belongs to this run only if some epoch improved
/// on the best precision or the run resumed from stored state
fn best_checkpoint_is_current(training: &TrainingReport, resumed: bool) -> bool {
    resumed || training.history.iter().any(|epoch| epoch.is_best)
}
