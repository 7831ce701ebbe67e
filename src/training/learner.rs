//! The model/optimizer pair driven by the trainer.
//!
//! [`Learner`] is the seam between the orchestration code (trainer, evaluator,
//! inference runner) and the tensor framework. The trainer only ever sees
//! host-side numbers and opaque state blobs.

use burn::{
    data::dataloader::batcher::Batcher,
    module::{AutodiffModule, Module},
    nn::loss::CrossEntropyLossConfig,
    optim::{adaptor::OptimizerAdaptor, decay::WeightDecayConfig, Adam, AdamConfig, GradientsParams, Optimizer},
    record::{BinBytesRecorder, FullPrecisionSettings, Recorder},
    tensor::{backend::AutodiffBackend, backend::Backend, ElementConversion, Tensor},
};
use tracing::debug;

use crate::config::RunConfig;
use crate::dataset::burn_dataset::{CropBatch, CropBatcher, CropItem};
use crate::model::{CropClassifier, CropClassifierConfig, Mode};
use crate::utils::error::{CropError, Result};

/// Host-side result of one forward pass over a labelled batch
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutput {
    /// Mean loss over the batch
    pub loss: f64,
    /// Raw class scores, one row per sample
    pub scores: Vec<Vec<f32>>,
    pub targets: Vec<usize>,
}

impl StepOutput {
    pub fn batch_size(&self) -> usize {
        self.targets.len()
    }
}

/// Capabilities the training loop needs from a model and its optimizer
pub trait Learner {
    type Batch;

    /// Forward, loss, backward and one optimizer step.
    ///
    /// A NaN or infinite loss is reported as [`CropError::NonFiniteLoss`]
    /// before any parameter is touched.
    fn train_step(&mut self, batch: Self::Batch, lr: f64) -> Result<StepOutput>;

    /// Forward and loss in evaluation mode; parameters are not modified
    fn valid_step(&self, batch: Self::Batch) -> Result<StepOutput>;

    /// Raw class scores in evaluation mode, one row per sample
    fn predict(&self, batch: Self::Batch) -> Result<Vec<Vec<f32>>>;

    /// Model parameters as an opaque blob
    fn state_dict(&self) -> Result<Vec<u8>>;

    /// Optimizer moments as an opaque blob
    fn optimizer_state(&self) -> Result<Vec<u8>>;

    fn load_state_dict(&mut self, bytes: &[u8]) -> Result<()>;

    fn load_optimizer_state(&mut self, bytes: &[u8]) -> Result<()>;
}

/// Adam as wrapped by burn for [`CropClassifier`]
pub type AdamOptimizer<B> = OptimizerAdaptor<Adam, CropClassifier<B>, B>;

type StateRecorder = BinBytesRecorder<FullPrecisionSettings>;

/// [`Learner`] backed by the CNN, cross-entropy loss and Adam
pub struct ClassifierLearner<B: AutodiffBackend> {
    model: CropClassifier<B>,
    optimizer: AdamOptimizer<B>,
    optimizer_config: AdamConfig,
    batcher: CropBatcher,
    device: B::Device,
}

impl<B: AutodiffBackend> ClassifierLearner<B> {
    pub fn new(
        model: CropClassifier<B>,
        optimizer_config: AdamConfig,
        batcher: CropBatcher,
        device: B::Device,
    ) -> Self {
        Self {
            model,
            optimizer: optimizer_config.init(),
            optimizer_config,
            batcher,
            device,
        }
    }

    /// Build the model and optimizer described by the run configuration
    pub fn from_config(config: &RunConfig, device: B::Device) -> Self {
        let model = CropClassifierConfig::new()
            .with_num_classes(config.num_classes)
            .with_base_filters(config.model.base_filters)
            .with_dropout_rate(config.model.dropout)
            .init(&device);

        let optimizer_config = AdamConfig::new().with_weight_decay(Some(WeightDecayConfig::new(
            config.optimizer.weight_decay as f32,
        )));

        Self::new(model, optimizer_config, CropBatcher::new(config.image_size), device)
    }

    pub fn model(&self) -> &CropClassifier<B> {
        &self.model
    }

    fn inner_batch(&self, items: Vec<CropItem>) -> CropBatch<B::InnerBackend> {
        Batcher::<B::InnerBackend, CropItem, CropBatch<B::InnerBackend>>::batch(
            &self.batcher,
            items,
            &self.device,
        )
    }
}

fn labels(items: &[CropItem]) -> Result<Vec<usize>> {
    items
        .iter()
        .map(|item| {
            item.label.ok_or_else(|| {
                CropError::Training(format!("Sample {} has no label", item.image_id))
            })
        })
        .collect()
}

/// Copy a [batch, classes] tensor to host rows
fn score_rows<B2: Backend>(logits: Tensor<B2, 2>) -> Result<Vec<Vec<f32>>> {
    let [_, num_classes] = logits.dims();
    let flat = logits
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| CropError::Model(format!("Failed to read scores: {:?}", e)))?;

    Ok(flat
        .chunks(num_classes.max(1))
        .map(|row| row.to_vec())
        .collect())
}

fn record_error(e: impl std::fmt::Debug) -> CropError {
    CropError::Checkpoint(format!("{:?}", e))
}

impl<B: AutodiffBackend> Learner for ClassifierLearner<B> {
    type Batch = Vec<CropItem>;

    fn train_step(&mut self, batch: Self::Batch, lr: f64) -> Result<StepOutput> {
        let targets = labels(&batch)?;
        let batch = Batcher::<B, CropItem, CropBatch<B>>::batch(&self.batcher, batch, &self.device);

        let model = self.model.clone();
        let output = model.forward(batch.images, Mode::Train);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), batch.targets);

        let loss_value: f64 = loss.clone().into_scalar().elem();
        if !loss_value.is_finite() {
            return Err(CropError::NonFiniteLoss { loss: loss_value });
        }

        let scores = score_rows(output.detach())?;

        let grads = loss.backward();
        let grads = GradientsParams::from_grads(grads, &model);
        self.model = self.optimizer.step(lr, model, grads);

        Ok(StepOutput {
            loss: loss_value,
            scores,
            targets,
        })
    }

    fn valid_step(&self, batch: Self::Batch) -> Result<StepOutput> {
        let targets = labels(&batch)?;
        let batch = self.inner_batch(batch);

        let model = self.model.valid();
        let output = model.forward(batch.images, Mode::Eval);
        let loss = CrossEntropyLossConfig::new()
            .init(&output.device())
            .forward(output.clone(), batch.targets);

        Ok(StepOutput {
            loss: loss.into_scalar().elem(),
            scores: score_rows(output)?,
            targets,
        })
    }

    fn predict(&self, batch: Self::Batch) -> Result<Vec<Vec<f32>>> {
        let batch = self.inner_batch(batch);
        let output = self.model.valid().forward(batch.images, Mode::Eval);
        score_rows(output)
    }

    fn state_dict(&self) -> Result<Vec<u8>> {
        let recorder = StateRecorder::default();
        Recorder::<B>::record(&recorder, self.model.clone().into_record(), ()).map_err(record_error)
    }

    fn optimizer_state(&self) -> Result<Vec<u8>> {
        let recorder = StateRecorder::default();
        Recorder::<B>::record(&recorder, self.optimizer.to_record(), ()).map_err(record_error)
    }

    fn load_state_dict(&mut self, bytes: &[u8]) -> Result<()> {
        let recorder = StateRecorder::default();
        let record = Recorder::<B>::load(&recorder, bytes.to_vec(), &self.device).map_err(record_error)?;
        self.model = self.model.clone().load_record(record);
        debug!("Restored model parameters ({} bytes)", bytes.len());
        Ok(())
    }

    fn load_optimizer_state(&mut self, bytes: &[u8]) -> Result<()> {
        let recorder = StateRecorder::default();
        let record = Recorder::<B>::load(&recorder, bytes.to_vec(), &self.device).map_err(record_error)?;
        let fresh: AdamOptimizer<B> = self.optimizer_config.init();
        self.optimizer = fresh.load_record(record);
        debug!("Restored optimizer state ({} bytes)", bytes.len());
        Ok(())
    }
}
