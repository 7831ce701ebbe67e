//! Logging Module
//!
//! Two outputs live here:
//! - structured diagnostics through `tracing`, initialised once per process
//! - the append-mode tabular training log that records one row per epoch

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::utils::error::{CropError, Result};

/// Column header written under the banner when a run starts.
pub const LOG_HEADER: [&str; 2] = [
    "                           |------------ VALID -------------|----------- TRAIN -------------|------Accuracy------|------------|",
    "lr       iter     epoch    | loss   top-1  top-2            | loss   top-1  top-2           |    Current Best    | time       |",
];

/// Width of the dashed separator under the header.
pub const LOG_RULE_WIDTH: usize = 127;

/// Initialize the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the verbosity flag when it is set.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .try_init()
        .map_err(|e| CropError::Config(format!("Failed to initialize logger: {e}")))?;

    Ok(())
}

/// One row of the training table.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRow {
    pub lr: f64,
    /// Epoch plus the fraction of batches already seen in it
    pub progress: f64,
    pub epoch: usize,
    /// Validation loss, top-1, top-2
    pub valid: [f64; 3],
    /// Training loss, top-1, top-2
    pub train: [f64; 3],
    /// Best precision as shown to the user
    pub best: String,
    pub elapsed: String,
}

impl LogRow {
    /// In-place progress line printed after every batch
    pub fn progress_line(&self) -> String {
        self.render(9)
    }

    /// Line appended to the log at the end of an epoch
    pub fn epoch_line(&self) -> String {
        self.render(10)
    }

    fn render(&self, valid_pad: usize) -> String {
        format!(
            "{:.4} {:5.1} {:6.1}        | {:.3}  {:.3}  {:.3}{:pad$}| {:.3}  {:.3}  {:.3}         |         {}         | {}",
            self.lr,
            self.progress,
            self.epoch as f64,
            self.valid[0],
            self.valid[1],
            self.valid[2],
            "",
            self.train[0],
            self.train[1],
            self.train[2],
            self.best,
            self.elapsed,
            pad = valid_pad,
        )
    }
}

/// Append-mode text log of a training run.
///
/// Every open writes a timestamped banner; earlier runs stay in the file.
pub struct TrainingLog {
    path: PathBuf,
    file: File,
    echo: bool,
}

impl TrainingLog {
    /// Open (or create) the log file and write the start banner
    pub fn open(path: impl AsRef<Path>, echo: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut log = Self { path, file, echo };

        let banner = format!(
            "\n----------------------------------------------- [START {}] {}\n\n",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            "-".repeat(51)
        );
        log.write(&banner)?;
        Ok(log)
    }

    /// Write the start marker and column header
    pub fn write_header(&mut self) -> Result<()> {
        self.write("** start training here! **\n")?;
        for line in LOG_HEADER {
            self.write(line)?;
            self.write("\n")?;
        }
        self.write(&"-".repeat(LOG_RULE_WIDTH))?;
        self.write("\n")
    }

    /// Append an epoch row followed by a newline
    pub fn write_row(&mut self, row: &LogRow) -> Result<()> {
        self.write(&row.epoch_line())?;
        self.write("\n")
    }

    /// Append raw text, echoing it to stdout when enabled
    pub fn write(&mut self, text: &str) -> Result<()> {
        if self.echo {
            print!("{}", text);
            std::io::stdout().flush()?;
        }
        self.file.write_all(text.as_bytes())?;
        self.file.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Append a single line to a plain event log, creating it if needed
pub fn append_line(path: &Path, line: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)?;
    Ok(())
}
