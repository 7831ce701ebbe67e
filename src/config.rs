//! Run configuration.
//!
//! Every tunable of a run lives in [`RunConfig`]. It is built once at process
//! start (defaults, optionally overridden by a TOML file) and passed by
//! reference to the components that need it.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::training::checkpoint::CheckpointKind;
use crate::training::lr_schedule::LrSchedule;
use crate::utils::error::{CropError, Result};
use crate::NUM_CLASSES;

/// Top-level configuration for a training + submission run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Seed for the split and the per-epoch shuffle
    pub seed: u64,
    /// Name used for checkpoint directories and the event log
    pub model_name: String,
    pub num_classes: usize,
    /// Images are resized to `image_size x image_size`
    pub image_size: usize,
    pub epochs: usize,
    pub batch_size: usize,
    /// Batch size of the inference pass
    pub test_batch_size: usize,
    pub fold: usize,
    /// Share of each class held out for validation
    pub validation_fraction: f64,
    /// File stem of the submission report
    pub submission_name: String,
    /// Skip batches whose loss is NaN/inf instead of aborting the run
    pub skip_non_finite_loss: bool,
    /// Pause after each epoch row so the log reaches disk before the next epoch
    pub log_pause_ms: u64,
    /// Show the per-batch progress line
    pub show_progress: bool,
    /// Resume from a stored checkpoint of `fold`
    pub resume: Option<CheckpointKind>,
    pub paths: PathsConfig,
    pub optimizer: OptimizerSettings,
    pub schedule: LrSchedule,
    pub model: ModelSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            model_name: String::from("crop_cnn"),
            num_classes: NUM_CLASSES,
            image_size: 224,
            epochs: 40,
            batch_size: 16,
            test_batch_size: 1,
            fold: 0,
            validation_fraction: 0.15,
            submission_name: String::from("baseline"),
            skip_non_finite_loss: false,
            log_pause_ms: 10,
            show_progress: true,
            resume: None,
            paths: PathsConfig::default(),
            optimizer: OptimizerSettings::default(),
            schedule: LrSchedule::default(),
            model: ModelSettings::default(),
        }
    }
}

/// Input and output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Labelled images, one sub-directory per integer class id
    pub train_data: PathBuf,
    /// Unlabelled images to predict
    pub test_data: PathBuf,
    pub weights: PathBuf,
    pub best_models: PathBuf,
    pub submit: PathBuf,
    pub logs: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            train_data: PathBuf::from("data/train"),
            test_data: PathBuf::from("data/test"),
            weights: PathBuf::from("checkpoints"),
            best_models: PathBuf::from("checkpoints/best_models"),
            submit: PathBuf::from("submit"),
            logs: PathBuf::from("logs"),
        }
    }
}

/// Adam hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerSettings {
    pub learning_rate: f64,
    pub weight_decay: f64,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            weight_decay: 1e-4,
        }
    }
}

/// CNN shape
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub base_filters: usize,
    pub dropout: f64,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            base_filters: 32,
            dropout: 0.3,
        }
    }
}

impl RunConfig {
    /// Load a configuration file; keys it omits keep their defaults
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CropError::Config(format!("Failed to read config {}: {e}", path.display())))?;

        let config = Self::from_toml_str(&content)
            .map_err(|e| CropError::Config(format!("{} ({})", e, path.display())))?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RunConfig = toml::from_str(content)
            .map_err(|e| CropError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.model_name.trim().is_empty() {
            return Err(CropError::Config("model_name must not be empty".to_string()));
        }
        if self.num_classes < 2 {
            return Err(CropError::Config(format!(
                "num_classes must be at least 2, got {}",
                self.num_classes
            )));
        }
        if self.image_size == 0 {
            return Err(CropError::Config("image_size must be positive".to_string()));
        }
        if self.epochs == 0 {
            return Err(CropError::Config("epochs must be positive".to_string()));
        }
        if self.batch_size == 0 || self.test_batch_size == 0 {
            return Err(CropError::Config("batch sizes must be positive".to_string()));
        }
        if !(self.validation_fraction > 0.0 && self.validation_fraction < 1.0) {
            return Err(CropError::Config(format!(
                "validation_fraction must be in (0, 1), got {}",
                self.validation_fraction
            )));
        }
        if !(self.optimizer.learning_rate > 0.0) {
            return Err(CropError::Config("learning_rate must be positive".to_string()));
        }
        if self.optimizer.weight_decay < 0.0 {
            return Err(CropError::Config("weight_decay must not be negative".to_string()));
        }
        if !(0.0..1.0).contains(&self.model.dropout) {
            return Err(CropError::Config("dropout must be in [0, 1)".to_string()));
        }
        if self.model.base_filters == 0 {
            return Err(CropError::Config("base_filters must be positive".to_string()));
        }
        self.schedule.validate()
    }

    pub fn layout(&self) -> RunLayout {
        RunLayout::new(&self.paths, &self.model_name, self.fold)
    }
}

/// Resolved output directories of one (model, fold) run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLayout {
    pub weights_dir: PathBuf,
    pub best_dir: PathBuf,
    pub submit_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl RunLayout {
    pub fn new(paths: &PathsConfig, model_name: &str, fold: usize) -> Self {
        let fold = fold.to_string();
        Self {
            weights_dir: paths.weights.join(model_name).join(&fold),
            best_dir: paths.best_models.join(model_name).join(&fold),
            submit_dir: paths.submit.clone(),
            logs_dir: paths.logs.clone(),
        }
    }

    /// Create every output directory that does not exist yet
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.weights_dir, &self.best_dir, &self.submit_dir, &self.logs_dir] {
            if !dir.exists() {
                debug!("Creating directory {}", dir.display());
            }
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}
