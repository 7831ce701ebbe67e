//! Submission report.
//!
//! A JSON array with one `{"image_id", "disease_class"}` object per test
//! image, UTF-8 with non-ASCII characters kept as-is.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::utils::error::{CropError, Result};

/// One line of the submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub image_id: String,
    pub disease_class: usize,
}

/// `<dir>/<name>.json`
pub fn submission_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", name))
}

/// Write the report atomically, creating the directory if needed
pub fn write_submission(path: &Path, records: &[SubmissionRecord]) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let json = serde_json::to_vec(records)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&json)?;
    tmp.persist(path).map_err(|e| CropError::Io(e.error))?;

    info!("Wrote {} predictions to {}", records.len(), path.display());
    Ok(())
}

pub fn read_submission(path: &Path) -> Result<Vec<SubmissionRecord>> {
    let json = fs::read(path)?;
    Ok(serde_json::from_slice(&json)?)
}
