//! Learning rate scheduling strategies.
//!
//! Schedules are closed-form in the epoch index, so a resumed run picks up
//! the exact rate it would have had without the interruption.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::utils::error::{CropError, Result};

/// Learning rate schedule, selected in the `[schedule]` config section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LrSchedule {
    /// Constant learning rate (no scheduling)
    Constant,

    /// Step decay: `base * gamma^floor(epoch / step_size)`
    Step { step_size: usize, gamma: f64 },

    /// Exponential decay: `base * gamma^epoch`
    Exponential { gamma: f64 },

    /// Cosine annealing from `base` down to `eta_min` over `t_max` epochs
    Cosine { t_max: usize, eta_min: f64 },
}

impl Default for LrSchedule {
    fn default() -> Self {
        Self::Step {
            step_size: 10,
            gamma: 0.1,
        }
    }
}

impl LrSchedule {
    pub fn validate(&self) -> Result<()> {
        match self {
            LrSchedule::Constant => Ok(()),
            LrSchedule::Step { step_size, gamma } => {
                if *step_size == 0 {
                    return Err(CropError::Config("schedule step_size must be positive".to_string()));
                }
                check_gamma(*gamma)
            }
            LrSchedule::Exponential { gamma } => check_gamma(*gamma),
            LrSchedule::Cosine { t_max, eta_min } => {
                if *t_max == 0 {
                    return Err(CropError::Config("schedule t_max must be positive".to_string()));
                }
                if *eta_min < 0.0 {
                    return Err(CropError::Config("schedule eta_min must not be negative".to_string()));
                }
                Ok(())
            }
        }
    }

    /// Learning rate for a zero-based epoch index
    pub fn lr_at(&self, base_lr: f64, epoch: usize) -> f64 {
        match self {
            LrSchedule::Constant => base_lr,
            LrSchedule::Step { step_size, gamma } => {
                let steps = (epoch / (*step_size).max(1)) as i32;
                base_lr * gamma.powi(steps)
            }
            LrSchedule::Exponential { gamma } => base_lr * gamma.powi(epoch as i32),
            LrSchedule::Cosine { t_max, eta_min } => {
                let progress = (epoch as f64 / (*t_max).max(1) as f64).min(1.0);
                eta_min + (base_lr - eta_min) * (1.0 + (progress * PI).cos()) / 2.0
            }
        }
    }
}

fn check_gamma(gamma: f64) -> Result<()> {
    if gamma > 0.0 && gamma.is_finite() {
        Ok(())
    } else {
        Err(CropError::Config(format!("schedule gamma must be positive, got {gamma}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn test_constant_schedule() {
        let schedule = LrSchedule::Constant;
        assert_eq!(schedule.lr_at(0.001, 0), 0.001);
        assert_eq!(schedule.lr_at(0.001, 100), 0.001);
    }

    #[test]
    fn test_step_schedule_decays_every_step_size() {
        let schedule = LrSchedule::default();
        let base = 1e-4;

        for epoch in 0..10 {
            assert!(close(schedule.lr_at(base, epoch), 1e-4));
        }
        assert!(close(schedule.lr_at(base, 10), 1e-5));
        assert!(close(schedule.lr_at(base, 19), 1e-5));
        assert!(close(schedule.lr_at(base, 20), 1e-6));
    }

    #[test]
    fn test_exponential_schedule() {
        let schedule = LrSchedule::Exponential { gamma: 0.5 };
        assert!(close(schedule.lr_at(1.0, 3), 0.125));
    }

    #[test]
    fn test_cosine_schedule_endpoints() {
        let schedule = LrSchedule::Cosine {
            t_max: 10,
            eta_min: 0.0,
        };
        assert!(close(schedule.lr_at(0.1, 0), 0.1));
        assert!(close(schedule.lr_at(0.1, 5), 0.05));
        assert!(schedule.lr_at(0.1, 10).abs() < 1e-12);
        assert!(schedule.lr_at(0.1, 20).abs() < 1e-12);
    }

    #[test]
    fn test_validate() {
        assert!(LrSchedule::default().validate().is_ok());
        assert!(LrSchedule::Step { step_size: 0, gamma: 0.1 }.validate().is_err());
        assert!(LrSchedule::Step { step_size: 3, gamma: 0.0 }.validate().is_err());
        assert!(LrSchedule::Cosine { t_max: 0, eta_min: 0.0 }.validate().is_err());
    }
}
