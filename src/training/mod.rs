//! Training components
//!
//! - `metric`: running averages and top-k accuracy
//! - `learner`: the model/optimizer capability used by the loop
//! - `lr_schedule`: closed-form learning rate schedules
//! - `evaluator`: validation pass
//! - `checkpoint`: latest/best checkpoint persistence
//! - `trainer`: the epoch loop

pub mod checkpoint;
pub mod evaluator;
pub mod learner;
pub mod lr_schedule;
pub mod metric;
pub mod trainer;

pub use checkpoint::{Checkpoint, CheckpointKind, CheckpointStore};
pub use evaluator::{Evaluator, ValidationSummary};
pub use learner::{ClassifierLearner, Learner, StepOutput};
pub use lr_schedule::LrSchedule;
pub use metric::{top_k_accuracy, EpochMeters, RunningMetric};
pub use trainer::{BestPrecision, Trainer, TrainerConfig, TrainingReport, TrainingState};
