//! Convolution blocks used by every head.
//!
//! `ConvBn`/`ConvBnRelu` are the `conv → BatchNorm (→ ReLU)` stacks (bias-free
//! convolution), and `Classifier` is the `Dropout → 1x1 conv` pixelwise classifier.

use burn::{
    nn::{
        conv::{Conv2d, Conv2dConfig},
        BatchNorm, BatchNormConfig, Dropout, DropoutConfig, PaddingConfig2d, Relu,
    },
    prelude::*,
};

/// Configuration for a bias-free convolution followed by batch normalization.
#[derive(Config, Debug)]
pub struct ConvBnConfig {
    /// `[in_channels, out_channels]`.
    channels: [usize; 2],
    #[config(default = "1")]
    kernel_size: usize,
    #[config(default = "0")]
    padding: usize,
    #[config(default = "1")]
    dilation: usize,
}

impl ConvBnConfig {
    fn conv<B: Backend>(&self, device: &Device<B>) -> Conv2d<B> {
        Conv2dConfig::new(self.channels, [self.kernel_size, self.kernel_size])
            .with_stride([1, 1])
            .with_padding(PaddingConfig2d::Explicit(self.padding, self.padding))
            .with_dilation([self.dilation, self.dilation])
            .with_bias(false)
            .init(device)
    }

    fn bn<B: Backend>(&self, device: &Device<B>) -> BatchNorm<B, 2> {
        BatchNormConfig::new(self.channels[1]).init(device)
    }

    /// Creates the block without activation.
    pub fn init<B: Backend>(&self, device: &Device<B>) -> ConvBn<B> {
        ConvBn {
            conv: self.conv(device),
            bn: self.bn(device),
        }
    }

    /// Creates the block with a trailing ReLU.
    pub fn init_relu<B: Backend>(&self, device: &Device<B>) -> ConvBnRelu<B> {
        ConvBnRelu {
            conv: self.conv(device),
            bn: self.bn(device),
            relu: Relu::new(),
        }
    }
}

/// Convolution followed by batch normalization.
#[derive(Module, Debug)]
pub struct ConvBn<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
}

impl<B: Backend> ConvBn<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        self.bn.forward(x)
    }
}

/// Convolution, batch normalization, ReLU.
#[derive(Module, Debug)]
pub struct ConvBnRelu<B: Backend> {
    conv: Conv2d<B>,
    bn: BatchNorm<B, 2>,
    relu: Relu,
}

impl<B: Backend> ConvBnRelu<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.conv.forward(x);
        let x = self.bn.forward(x);
        self.relu.forward(x)
    }
}

/// Configuration for a pixelwise classifier.
#[derive(Config, Debug)]
pub struct ClassifierConfig {
    /// `[in_channels, num_classes]`.
    channels: [usize; 2],
    /// Dropout probability applied before the projection while training.
    #[config(default = "0.1")]
    dropout: f64,
}

impl ClassifierConfig {
    pub fn init<B: Backend>(&self, device: &Device<B>) -> Classifier<B> {
        Classifier {
            dropout: DropoutConfig::new(self.dropout).init(),
            conv: Conv2dConfig::new(self.channels, [1, 1]).init(device),
        }
    }
}

/// Dropout followed by a 1x1 convolution with bias.
///
/// Burn's dropout is only active on autodiff backends, so inference is deterministic.
#[derive(Module, Debug)]
pub struct Classifier<B: Backend> {
    dropout: Dropout,
    conv: Conv2d<B>,
}

impl<B: Backend> Classifier<B> {
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let x = self.dropout.forward(x);
        self.conv.forward(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::TestBackend;
    use burn::tensor::Distribution;

    #[test]
    fn dilated_conv_keeps_grid() {
        let device = Default::default();
        let block = ConvBnConfig::new([4, 6])
            .with_kernel_size(3)
            .with_padding(5)
            .with_dilation(5)
            .init_relu::<TestBackend>(&device);

        let x = Tensor::random([2, 4, 11, 13], Distribution::Normal(0.0, 1.0), &device);
        let y = block.forward(x);

        assert_eq!(y.dims(), [2, 6, 11, 13]);
        let min: f32 = y.min().into_scalar();
        assert!(min >= 0.0);
    }

    #[test]
    fn classifier_is_deterministic_at_inference() {
        let device = Default::default();
        let classifier = ClassifierConfig::new([8, 5]).init::<TestBackend>(&device);
        let x = Tensor::random([1, 8, 4, 4], Distribution::Normal(0.0, 1.0), &device);

        let a = classifier.forward(x.clone());
        let b = classifier.forward(x);

        assert_eq!(a.dims(), [1, 5, 4, 4]);
        let diff: f32 = (a - b).abs().max().into_scalar();
        assert_eq!(diff, 0.0);
    }
}
