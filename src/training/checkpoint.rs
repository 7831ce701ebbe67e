//! Checkpoint persistence and best-model tracking.
//!
//! Layout per (model, fold):
//! - `<weights>/<model>/<fold>/_checkpoint.json`, rewritten every epoch
//! - `<best_models>/<model>/<fold>/model_best.json`, rewritten only on a new best
//!
//! Files are written to a temporary sibling and renamed into place, so an
//! interrupted save leaves the previous file intact.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::training::evaluator::ValidationSummary;
use crate::utils::error::{CropError, Result};
use crate::utils::logging::append_line;

pub const LATEST_FILE: &str = "_checkpoint.json";
pub const BEST_FILE: &str = "model_best.json";

/// Which stored checkpoint to read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointKind {
    Latest,
    Best,
}

impl std::fmt::Display for CheckpointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckpointKind::Latest => write!(f, "latest"),
            CheckpointKind::Best => write!(f, "best"),
        }
    }
}

/// Everything needed to resume training or run inference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Index of the next epoch to run
    pub epoch: usize,
    pub model_name: String,
    #[serde(with = "base64_bytes")]
    pub state_dict: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub optimizer: Vec<u8>,
    pub best_precision1: f64,
    pub fold: usize,
    pub valid_loss: ValidationSummary,
    pub timestamp: String,
}

impl Checkpoint {
    pub fn new(
        epoch: usize,
        model_name: impl Into<String>,
        state_dict: Vec<u8>,
        optimizer: Vec<u8>,
        best_precision1: f64,
        fold: usize,
        valid_loss: ValidationSummary,
    ) -> Self {
        Self {
            epoch,
            model_name: model_name.into(),
            state_dict,
            optimizer,
            best_precision1,
            fold,
            valid_loss,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Serialize and atomically replace `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)?;

        let json = serde_json::to_vec(self)
            .map_err(|e| CropError::Serialization(format!("Failed to serialize checkpoint: {}", e)))?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&json)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| CropError::Io(e.error))?;

        debug!("Checkpoint written to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(CropError::CheckpointNotFound(path.to_path_buf()));
        }
        let json = fs::read(path)?;
        serde_json::from_slice(&json)
            .map_err(|e| CropError::Checkpoint(format!("Failed to decode {}: {}", path.display(), e)))
    }
}

/// Reads and writes the latest/best checkpoints of one model
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    weights_root: PathBuf,
    best_root: PathBuf,
    model_name: String,
    event_log: Option<PathBuf>,
}

impl CheckpointStore {
    /// `weights_root` and `best_root` are the directories above the
    /// per-model, per-fold sub-directories
    pub fn new(weights_root: impl Into<PathBuf>, best_root: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            weights_root: weights_root.into(),
            best_root: best_root.into(),
            model_name: model_name.into(),
            event_log: None,
        }
    }

    /// Append a line to `path` every time a new best is stored
    pub fn with_event_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.event_log = Some(path.into());
        self
    }

    pub fn path(&self, fold: usize, kind: CheckpointKind) -> PathBuf {
        match kind {
            CheckpointKind::Latest => self
                .weights_root
                .join(&self.model_name)
                .join(fold.to_string())
                .join(LATEST_FILE),
            CheckpointKind::Best => self
                .best_root
                .join(&self.model_name)
                .join(fold.to_string())
                .join(BEST_FILE),
        }
    }

    /// Write the latest checkpoint, and the best one too when `is_best`
    pub fn save(&self, checkpoint: &Checkpoint, is_best: bool) -> Result<()> {
        let latest = self.path(checkpoint.fold, CheckpointKind::Latest);
        checkpoint.save(&latest)?;

        if is_best {
            let best = self.path(checkpoint.fold, CheckpointKind::Best);
            checkpoint.save(&best)?;

            let message = format!(
                "Get Better top1 : {} saving weights to {}",
                checkpoint.best_precision1,
                best.display()
            );
            info!("{}", message);
            if let Some(log) = &self.event_log {
                append_line(log, &message)?;
            }
        }

        Ok(())
    }

    /// Fails with [`CropError::CheckpointNotFound`] when nothing was saved
    pub fn load(&self, fold: usize, kind: CheckpointKind) -> Result<Checkpoint> {
        let path = self.path(fold, kind);
        let checkpoint = Checkpoint::load(&path)?;
        info!("Loaded {} checkpoint (epoch {}) from {:?}", kind, checkpoint.epoch, path);
        Ok(checkpoint)
    }

    pub fn exists(&self, fold: usize, kind: CheckpointKind) -> bool {
        self.path(fold, kind).is_file()
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn checkpoint(epoch: usize, best: f64) -> Checkpoint {
        Checkpoint::new(
            epoch,
            "cnn",
            vec![1, 2, 3, epoch as u8],
            vec![9, 8, 7],
            best,
            0,
            ValidationSummary {
                loss: 0.8,
                top1: best,
                top2: 0.9,
            },
        )
    }

    fn store(dir: &TempDir) -> CheckpointStore {
        CheckpointStore::new(dir.path().join("weights"), dir.path().join("best"), "cnn")
            .with_event_log(dir.path().join("logs").join("cnn.txt"))
    }

    #[test]
    fn test_save_load_round_trip() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let original = checkpoint(3, 0.625);

        store.save(&original, false)?;
        let loaded = store.load(0, CheckpointKind::Latest)?;

        assert_eq!(loaded.epoch, 3);
        assert_eq!(loaded.fold, 0);
        assert_eq!(loaded.best_precision1, 0.625);
        assert_eq!(loaded, original);
        Ok(())
    }

    #[test]
    fn test_layout() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(
            store.path(2, CheckpointKind::Latest),
            dir.path().join("weights/cnn/2/_checkpoint.json")
        );
        assert_eq!(
            store.path(2, CheckpointKind::Best),
            dir.path().join("best/cnn/2/model_best.json")
        );
    }

    #[test]
    fn test_non_best_save_leaves_best_untouched() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.save(&checkpoint(1, 0.5), true)?;
        let best_path = store.path(0, CheckpointKind::Best);
        let before = fs::read(&best_path)?;

        store.save(&checkpoint(2, 0.5), false)?;

        assert_eq!(fs::read(&best_path)?, before);
        assert_eq!(store.load(0, CheckpointKind::Latest)?.epoch, 2);
        assert_eq!(store.load(0, CheckpointKind::Best)?.epoch, 1);
        Ok(())
    }

    #[test]
    fn test_best_save_appends_event() -> Result<()> {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        store.save(&checkpoint(1, 0.5), true)?;
        store.save(&checkpoint(2, 0.5), false)?;
        store.save(&checkpoint(3, 0.75), true)?;

        let events = fs::read_to_string(dir.path().join("logs/cnn.txt"))?;
        let lines: Vec<&str> = events.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Get Better top1 : 0.5 saving weights to "));
        assert!(lines[1].starts_with("Get Better top1 : 0.75 "));
        Ok(())
    }

    #[test]
    fn test_missing_checkpoint_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = store(&dir).load(0, CheckpointKind::Best).unwrap_err();
        assert!(matches!(err, CropError::CheckpointNotFound(_)));
        assert!(!store(&dir).exists(0, CheckpointKind::Latest));
    }

    #[test]
    fn test_corrupt_checkpoint_is_reported() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let path = store.path(0, CheckpointKind::Latest);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{\"epoch\": 1").unwrap();

        assert!(matches!(store.load(0, CheckpointKind::Latest), Err(CropError::Checkpoint(_))));
    }

    #[test]
    fn test_blobs_are_base64_in_json() {
        let json = serde_json::to_value(checkpoint(1, 0.5)).unwrap();
        assert_eq!(json["optimizer"], "CQgH");
        assert_eq!(json["valid_loss"]["top2"], 0.9);
    }
}
