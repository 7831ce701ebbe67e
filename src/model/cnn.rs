//! CNN Model Architecture for Crop Disease Classification
//!
//! Four conv blocks with increasing width, global average pooling and a
//! two-layer classifier head.

use burn::{
    config::Config,
    module::Module,
    nn::{
        conv::{Conv2d, Conv2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, Linear, LinearConfig, PaddingConfig2d,
        Relu,
    },
    tensor::{backend::Backend, Tensor},
};

use crate::model::Mode;

/// Configuration for the CropClassifier CNN model
#[derive(Config, Debug)]
pub struct CropClassifierConfig {
    /// Number of output classes
    #[config(default = "59")]
    pub num_classes: usize,

    /// Dropout rate of the classifier head
    #[config(default = "0.3")]
    pub dropout_rate: f64,

    /// Number of input channels (3 for RGB)
    #[config(default = "3")]
    pub in_channels: usize,

    /// Filters of the first block; each later block doubles it
    #[config(default = "32")]
    pub base_filters: usize,

    /// Width of the hidden classifier layer
    #[config(default = "256")]
    pub hidden_size: usize,
}

impl CropClassifierConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CropClassifier<B> {
        CropClassifier::new(self, device)
    }
}

/// Conv2d, BatchNorm, ReLU and a 2x2 max pool
#[derive(Module, Debug)]
pub struct ConvBlock<B: Backend> {
    pub conv: Conv2d<B>,
    pub bn: BatchNorm<B, 2>,
    pub relu: Relu,
    pub pool: MaxPool2d,
}

impl<B: Backend> ConvBlock<B> {
    pub fn new(in_channels: usize, out_channels: usize, device: &B::Device) -> Self {
        let conv = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Same)
            .init(device);

        Self {
            conv,
            bn: BatchNormConfig::new(out_channels).init(device),
            relu: Relu::new(),
            pool: MaxPool2dConfig::new([2, 2]).with_strides([2, 2]).init(),
        }
    }

    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        let x = self.relu.forward(x);
        self.pool.forward(x)
    }
}

/// Crop disease classifier
#[derive(Module, Debug)]
pub struct CropClassifier<B: Backend> {
    pub conv1: ConvBlock<B>,
    pub conv2: ConvBlock<B>,
    pub conv3: ConvBlock<B>,
    pub conv4: ConvBlock<B>,

    pub global_pool: AdaptiveAvgPool2d,

    pub fc1: Linear<B>,
    pub dropout: Dropout,
    pub fc2: Linear<B>,

    num_classes: usize,
}

impl<B: Backend> CropClassifier<B> {
    pub fn new(config: &CropClassifierConfig, device: &B::Device) -> Self {
        let base = config.base_filters;

        Self {
            conv1: ConvBlock::new(config.in_channels, base, device),
            conv2: ConvBlock::new(base, base * 2, device),
            conv3: ConvBlock::new(base * 2, base * 4, device),
            conv4: ConvBlock::new(base * 4, base * 8, device),
            global_pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc1: LinearConfig::new(base * 8, config.hidden_size).init(device),
            dropout: DropoutConfig::new(config.dropout_rate).init(),
            fc2: LinearConfig::new(config.hidden_size, config.num_classes).init(device),
            num_classes: config.num_classes,
        }
    }

    /// Logits of shape [batch_size, num_classes]
    ///
    /// Dropout runs only in [`Mode::Train`].
    pub fn forward(&self, x: Tensor<B, 4>, mode: Mode) -> Tensor<B, 2> {
        let x = self.conv1.forward(x);
        let x = self.conv2.forward(x);
        let x = self.conv3.forward(x);
        let x = self.conv4.forward(x);

        // [B, C, 1, 1] -> [B, C]
        let x = self.global_pool.forward(x);
        let [batch_size, channels, _, _] = x.dims();
        let x = x.reshape([batch_size, channels]);

        let x = self.fc1.forward(x);
        let x = Relu::new().forward(x);
        let x = if mode.is_train() { self.dropout.forward(x) } else { x };
        self.fc2.forward(x)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }
}
