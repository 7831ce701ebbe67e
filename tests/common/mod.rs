#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::time::Duration;

use crop_disease::dataset::SampleRecord;
use crop_disease::training::{Learner, LrSchedule, StepOutput, TrainerConfig};
use crop_disease::{CropError, Result};

pub const NUM_CLASSES: usize = 60;

/// A sample that carries its own label
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: String,
    pub label: usize,
}

impl SampleRecord for Item {
    fn identifier(&self) -> String {
        self.id.clone()
    }
}

pub fn items(count: usize) -> Vec<Item> {
    (0..count)
        .map(|i| Item {
            id: format!("{i}.jpg"),
            label: i % 4,
        })
        .collect()
}

/// Learner whose outputs follow a script instead of a model
#[derive(Default)]
pub struct ScriptedLearner {
    /// Successful optimizer steps
    pub train_steps: usize,
    /// Identifiers of every batch handed to `train_step`
    pub train_batches: Vec<Vec<String>>,
    pub learning_rates: Vec<f64>,
    /// Training steps (0-based) that report a NaN loss
    pub nan_steps: HashSet<usize>,
    /// Validation top-1 returned on each evaluation
    pub top1_script: Vec<f64>,
    pub evaluations: Cell<usize>,
    pub predictions: RefCell<Vec<String>>,
    pub loaded_state: Option<Vec<u8>>,
    pub loaded_optimizer: Option<Vec<u8>>,
}

impl ScriptedLearner {
    pub fn with_script(top1_script: Vec<f64>) -> Self {
        Self {
            top1_script,
            ..Self::default()
        }
    }
}

fn one_hot(class: usize) -> Vec<f32> {
    let mut row = vec![0.0; NUM_CLASSES];
    row[class] = 5.0;
    row
}

impl Learner for ScriptedLearner {
    type Batch = Vec<Item>;

    fn train_step(&mut self, batch: Vec<Item>, lr: f64) -> Result<StepOutput> {
        let index = self.train_batches.len();
        self.train_batches.push(batch.iter().map(|item| item.id.clone()).collect());
        self.learning_rates.push(lr);

        if self.nan_steps.contains(&index) {
            return Err(CropError::NonFiniteLoss { loss: f64::NAN });
        }
        self.train_steps += 1;

        Ok(StepOutput {
            loss: 1.0,
            scores: batch.iter().map(|item| one_hot(item.label)).collect(),
            targets: batch.iter().map(|item| item.label).collect(),
        })
    }

    fn valid_step(&self, batch: Vec<Item>) -> Result<StepOutput> {
        let evaluation = self.evaluations.get();
        self.evaluations.set(evaluation + 1);

        let top1 = self.top1_script.get(evaluation).copied().unwrap_or(0.5);
        let correct = (top1 * batch.len() as f64).round() as usize;

        let scores = batch
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if i < correct {
                    one_hot(item.label)
                } else {
                    one_hot((item.label + 1) % NUM_CLASSES)
                }
            })
            .collect();

        Ok(StepOutput {
            loss: 1.0 - top1,
            scores,
            targets: batch.iter().map(|item| item.label).collect(),
        })
    }

    fn predict(&self, batch: Vec<Item>) -> Result<Vec<Vec<f32>>> {
        self.predictions
            .borrow_mut()
            .extend(batch.iter().map(|item| item.id.clone()));
        Ok(batch.iter().map(|item| one_hot(item.label)).collect())
    }

    fn state_dict(&self) -> Result<Vec<u8>> {
        Ok((self.train_steps as u64).to_le_bytes().to_vec())
    }

    fn optimizer_state(&self) -> Result<Vec<u8>> {
        Ok(vec![0xAD; 3])
    }

    fn load_state_dict(&mut self, bytes: &[u8]) -> Result<()> {
        self.loaded_state = Some(bytes.to_vec());
        Ok(())
    }

    fn load_optimizer_state(&mut self, bytes: &[u8]) -> Result<()> {
        self.loaded_optimizer = Some(bytes.to_vec());
        Ok(())
    }
}

pub fn trainer_config(epochs: usize) -> TrainerConfig {
    TrainerConfig {
        epochs,
        learning_rate: 0.1,
        schedule: LrSchedule::Constant,
        fold: 0,
        model_name: "mock".to_string(),
        skip_non_finite_loss: false,
        log_pause: Duration::ZERO,
        show_progress: false,
    }
}
