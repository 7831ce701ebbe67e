//! Epoch loop with validation, checkpointing and best-model tracking.
//!
//! Each epoch runs: train batches, validate, checkpoint, log. The unit of
//! resumption is the epoch boundary; a failure inside an epoch leaves the
//! previous epoch's checkpoint as the latest one on disk.

use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RunConfig;
use crate::dataset::source::{iter_batches, BatchSource};
use crate::training::checkpoint::{Checkpoint, CheckpointKind, CheckpointStore};
use crate::training::evaluator::{Evaluator, ValidationSummary};
use crate::training::learner::Learner;
use crate::training::lr_schedule::LrSchedule;
use crate::training::metric::EpochMeters;
use crate::utils::error::{CropError, Result};
use crate::utils::logging::{LogRow, TrainingLog};
use crate::utils::{time_to_str, TimeUnit};

/// Convert a score to a number fit for the training table
pub fn to_display_value(value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CropError::NonFiniteValue(value))
    }
}

/// Running best validation top-1 and its rendering in the log
#[derive(Debug, Clone)]
pub struct BestPrecision {
    best: f64,
    display: String,
}

impl BestPrecision {
    pub fn new(initial: f64) -> Self {
        let mut tracker = Self {
            best: initial,
            display: String::from("0"),
        };
        tracker.refresh_display();
        tracker
    }

    /// Record a validation top-1; returns whether it strictly beats the best
    ///
    /// NaN never counts as an improvement.
    pub fn observe(&mut self, top1: f64) -> bool {
        let is_best = top1 > self.best;
        if is_best {
            self.best = top1;
        }
        self.refresh_display();
        is_best
    }

    pub fn value(&self) -> f64 {
        self.best
    }

    pub fn display(&self) -> &str {
        &self.display
    }

    fn refresh_display(&mut self) {
        match to_display_value(self.best) {
            Ok(value) => self.display = format!("{:.3}", value),
            Err(e) => debug!("Keeping best precision display '{}': {}", self.display, e),
        }
    }
}

impl Default for BestPrecision {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// State owned by the trainer between epochs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingState {
    /// Next epoch to run
    pub epoch: usize,
    pub fold: usize,
    pub best_precision1: f64,
    pub valid: ValidationSummary,
}

impl TrainingState {
    pub fn new(fold: usize) -> Self {
        Self {
            epoch: 0,
            fold,
            best_precision1: 0.0,
            valid: ValidationSummary::initial(),
        }
    }
}

/// Loop settings taken from the run configuration
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub epochs: usize,
    pub learning_rate: f64,
    pub schedule: LrSchedule,
    pub fold: usize,
    pub model_name: String,
    pub skip_non_finite_loss: bool,
    pub log_pause: Duration,
    pub show_progress: bool,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self::from(&RunConfig::default())
    }
}

impl From<&RunConfig> for TrainerConfig {
    fn from(config: &RunConfig) -> Self {
        Self {
            epochs: config.epochs,
            learning_rate: config.optimizer.learning_rate,
            schedule: config.schedule.clone(),
            fold: config.fold,
            model_name: config.model_name.clone(),
            skip_non_finite_loss: config.skip_non_finite_loss,
            log_pause: Duration::from_millis(config.log_pause_ms),
            show_progress: config.show_progress,
        }
    }
}

/// Summary of one finished epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub lr: f64,
    /// Training loss, top-1, top-2
    pub train: [f64; 3],
    pub valid: ValidationSummary,
    pub best_precision1: f64,
    pub is_best: bool,
}

/// What a call to [`Trainer::fit`] did
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingReport {
    pub epochs_run: usize,
    pub batch_steps: usize,
    pub skipped_batches: usize,
    pub evaluations: usize,
    pub checkpoints_saved: usize,
    pub best_precision1: f64,
    pub history: Vec<EpochRecord>,
}

/// Drives a [`Learner`] through the configured epochs
pub struct Trainer<L: Learner> {
    learner: L,
    config: TrainerConfig,
    store: CheckpointStore,
    evaluator: Evaluator,
    log: Option<TrainingLog>,
    state: TrainingState,
    best: BestPrecision,
}

impl<L: Learner> Trainer<L> {
    pub fn new(learner: L, config: TrainerConfig, store: CheckpointStore) -> Self {
        let state = TrainingState::new(config.fold);
        Self {
            learner,
            config,
            store,
            evaluator: Evaluator::new(),
            log: None,
            state,
            best: BestPrecision::default(),
        }
    }

    /// Write header and epoch rows to `log`
    pub fn with_log(mut self, log: TrainingLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Restore weights, optimizer and counters from a stored checkpoint.
    ///
    /// A missing checkpoint is an error: the run cannot continue without it.
    pub fn resume(&mut self, kind: CheckpointKind) -> Result<()> {
        let checkpoint = self.store.load(self.config.fold, kind)?;

        self.learner.load_state_dict(&checkpoint.state_dict)?;
        self.learner.load_optimizer_state(&checkpoint.optimizer)?;

        self.state = TrainingState {
            epoch: checkpoint.epoch,
            fold: checkpoint.fold,
            best_precision1: checkpoint.best_precision1,
            valid: checkpoint.valid_loss,
        };
        self.best = BestPrecision::new(checkpoint.best_precision1);

        info!(
            "Resuming fold {} at epoch {} (best top-1 {})",
            self.state.fold,
            self.state.epoch,
            self.best.display()
        );
        Ok(())
    }

    /// Run the remaining epochs over `train`, validating on `valid`
    pub fn fit<S, V>(&mut self, train: &mut S, valid: &mut V) -> Result<TrainingReport>
    where
        S: BatchSource<Batch = L::Batch>,
        V: BatchSource<Batch = L::Batch>,
    {
        let start = Instant::now();
        let num_batches = train.num_batches().max(1);
        let mut report = TrainingReport {
            best_precision1: self.best.value(),
            ..TrainingReport::default()
        };

        if let Some(log) = self.log.as_mut() {
            log.write_header()?;
        }

        let progress = if self.config.show_progress {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::with_template("{msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar
        } else {
            ProgressBar::hidden()
        };

        info!(
            "Training epochs {}..{} with {} batches per epoch",
            self.state.epoch, self.config.epochs, num_batches
        );

        for epoch in self.state.epoch..self.config.epochs {
            let lr = self.config.schedule.lr_at(self.config.learning_rate, epoch);
            let mut meters = EpochMeters::default();

            for (iter, batch) in iter_batches(train).enumerate() {
                match self.learner.train_step(batch?, lr) {
                    Ok(output) => {
                        meters.record(output.loss, &output.scores, &output.targets);
                        report.batch_steps += 1;
                    }
                    Err(CropError::NonFiniteLoss { loss }) if self.config.skip_non_finite_loss => {
                        warn!("Skipping batch {} of epoch {}: loss is {}", iter, epoch, loss);
                        report.skipped_batches += 1;
                    }
                    Err(e) => return Err(e),
                }

                let row = self.row(lr, epoch as f64 + iter as f64 / num_batches as f64, epoch, &meters, start);
                progress.set_message(row.progress_line());
            }

            let summary = self.evaluator.evaluate(&self.learner, valid)?;
            report.evaluations += 1;

            let is_best = self.best.observe(summary.top1);
            self.state.epoch = epoch + 1;
            self.state.valid = summary;
            self.state.best_precision1 = self.best.value();

            let checkpoint = Checkpoint::new(
                self.state.epoch,
                self.config.model_name.clone(),
                self.learner.state_dict()?,
                self.learner.optimizer_state()?,
                self.state.best_precision1,
                self.state.fold,
                summary,
            );
            self.store.save(&checkpoint, is_best)?;
            report.checkpoints_saved += 1;

            let row = self.row(lr, epoch as f64, epoch, &meters, start);
            if let Some(log) = self.log.as_mut() {
                progress.suspend(|| log.write_row(&row))?;
            }
            debug!("{}", row.epoch_line());

            report.history.push(EpochRecord {
                epoch,
                lr,
                train: meters.averages(),
                valid: summary,
                best_precision1: self.state.best_precision1,
                is_best,
            });
            report.epochs_run += 1;

            if !self.config.log_pause.is_zero() {
                std::thread::sleep(self.config.log_pause);
            }
        }

        progress.finish_and_clear();
        report.best_precision1 = self.best.value();

        info!(
            "Finished {} epochs in {} (best top-1 {})",
            report.epochs_run,
            time_to_str(start.elapsed().as_secs_f64(), TimeUnit::Sec),
            self.best.display()
        );
        Ok(report)
    }

    fn row(&self, lr: f64, progress: f64, epoch: usize, meters: &EpochMeters, start: Instant) -> LogRow {
        LogRow {
            lr,
            progress,
            epoch,
            valid: self.state.valid.as_array(),
            train: meters.averages(),
            best: self.best.display().to_string(),
            elapsed: time_to_str(start.elapsed().as_secs_f64(), TimeUnit::Min),
        }
    }

    pub fn state(&self) -> &TrainingState {
        &self.state
    }

    pub fn learner(&self) -> &L {
        &self.learner
    }

    pub fn into_learner(self) -> L {
        self.learner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_precision_trace() {
        let mut best = BestPrecision::default();
        let observed: Vec<(bool, f64)> = [0.5, 0.6, 0.55, 0.6, 0.7]
            .iter()
            .map(|&top1| (best.observe(top1), best.value()))
            .collect();

        assert_eq!(
            observed,
            vec![(true, 0.5), (true, 0.6), (false, 0.6), (false, 0.6), (true, 0.7)]
        );
        assert_eq!(best.display(), "0.700");
    }

    #[test]
    fn test_nan_is_never_best() {
        let mut best = BestPrecision::new(0.3);
        assert!(!best.observe(f64::NAN));
        assert_eq!(best.value(), 0.3);
    }

    #[test]
    fn test_display_kept_when_value_is_not_finite() {
        let mut best = BestPrecision::new(0.25);
        assert_eq!(best.display(), "0.250");

        assert!(best.observe(f64::INFINITY));
        assert_eq!(best.value(), f64::INFINITY);
        assert_eq!(best.display(), "0.250");
    }

    #[test]
    fn test_to_display_value() {
        assert_eq!(to_display_value(0.5).unwrap(), 0.5);
        assert!(matches!(to_display_value(f64::NAN), Err(CropError::NonFiniteValue(_))));
    }

    #[test]
    fn test_trainer_config_from_run_config() {
        let mut run = RunConfig::default();
        run.epochs = 7;
        run.log_pause_ms = 0;
        let config = TrainerConfig::from(&run);
        assert_eq!(config.epochs, 7);
        assert!(config.log_pause.is_zero());
        assert_eq!(config.learning_rate, run.optimizer.learning_rate);
    }
}
