//! Utilities module for logging, errors, and small formatting helpers
//!
//! This module provides:
//! - Structured logging with tracing and the tabular training log
//! - Error handling types
//! - Elapsed-time formatting for the training table

pub mod error;
pub mod logging;

pub use error::{CropError, Result};
pub use logging::{init_logging, LogRow, TrainingLog};

/// Granularity used when rendering elapsed time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    /// Hours and minutes
    Min,
    /// Minutes and seconds
    Sec,
}

/// Render elapsed seconds the way the training table shows them
pub fn time_to_str(seconds: f64, unit: TimeUnit) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };

    match unit {
        TimeUnit::Min => {
            let minutes = total / 60;
            format!("{:2} hr {:02} min", minutes / 60, minutes % 60)
        }
        TimeUnit::Sec => format!("{:2} min {:02} sec", total / 60, total % 60),
    }
}

/// Format a number with thousands separator
pub fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::new();
    let chars: Vec<char> = s.chars().collect();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }

    result
}
