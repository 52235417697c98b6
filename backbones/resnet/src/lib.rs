//! ResNet backbone for segmentation heads.
//!
//! The backbone returns the outputs of its four residual stages. In the dilated
//! configuration the last two stages trade their stride for dilation (2 and 4), so the
//! deepest feature map sits at 1/8 of the input resolution instead of 1/32.

use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{MaxPool2d, MaxPool2dConfig},
    BatchNorm, BatchNormConfig, Initializer, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use core::f64::consts::SQRT_2;

mod blocks;
pub use blocks::*;

// ResNet residual layer block configs
const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];

/// ResNet backbone producing four feature levels, shallow to deep.
#[derive(Module, Debug)]
pub struct ResNetBackbone<B: Backend> {
    // First feature level: conv1 + bn1 + relu + maxpool + layer1
    pub conv1_block: Conv1Block<B>,
    pub layer1: LayerBlock<B>,
    pub layer2: LayerBlock<B>,
    pub layer3: LayerBlock<B>,
    pub layer4: LayerBlock<B>,
    expansion: usize,
}

impl<B: Backend> ResNetBackbone<B> {
    /// Forward pass that returns the 4 stage outputs `[c1, c2, c3, c4]`.
    pub fn forward(&self, input: Tensor<B, 4>) -> [Tensor<B, 4>; 4] {
        let c1 = self.conv1_block.forward(input);
        let c1 = self.layer1.forward(c1);
        let c2 = self.layer2.forward(c1.clone());
        let c3 = self.layer3.forward(c2.clone());
        let c4 = self.layer4.forward(c3.clone());

        [c1, c2, c3, c4]
    }

    /// Channel counts of the four stage outputs.
    pub const fn output_channels(&self) -> [usize; 4] {
        let e = self.expansion;
        [64 * e, 128 * e, 256 * e, 512 * e]
    }

    /// Create ResNet-18 backbone.
    pub fn resnet18(dilated: bool, device: &Device<B>) -> Self {
        Self::new(RESNET18_BLOCKS, 1, dilated, device)
    }

    /// Create ResNet-34 backbone.
    pub fn resnet34(dilated: bool, device: &Device<B>) -> Self {
        Self::new(RESNET34_BLOCKS, 1, dilated, device)
    }

    /// Create ResNet-50 backbone.
    pub fn resnet50(dilated: bool, device: &Device<B>) -> Self {
        Self::new(RESNET50_BLOCKS, 4, dilated, device)
    }

    /// Create ResNet-101 backbone.
    pub fn resnet101(dilated: bool, device: &Device<B>) -> Self {
        Self::new(RESNET101_BLOCKS, 4, dilated, device)
    }

    /// Create ResNet-152 backbone.
    pub fn resnet152(dilated: bool, device: &Device<B>) -> Self {
        Self::new(RESNET152_BLOCKS, 4, dilated, device)
    }

    fn new(blocks: [usize; 4], expansion: usize, dilated: bool, device: &Device<B>) -> Self {
        // 7x7 conv, 64, stride=2, padding=3
        let conv1_block = Conv1Block::new(3, 64, device);

        let bottleneck = expansion > 1;
        let (stride3, dilation3, stride4, dilation4) = if dilated {
            (1, 2, 1, 4)
        } else {
            (2, 1, 2, 1)
        };

        let layer1 = LayerBlock::new(blocks[0], 64, 64 * expansion, 1, 1, bottleneck, device);
        let layer2 = LayerBlock::new(
            blocks[1],
            64 * expansion,
            128 * expansion,
            2,
            1,
            bottleneck,
            device,
        );
        let layer3 = LayerBlock::new(
            blocks[2],
            128 * expansion,
            256 * expansion,
            stride3,
            dilation3,
            bottleneck,
            device,
        );
        let layer4 = LayerBlock::new(
            blocks[3],
            256 * expansion,
            512 * expansion,
            stride4,
            dilation4,
            bottleneck,
            device,
        );

        Self {
            conv1_block,
            layer1,
            layer2,
            layer3,
            layer4,
            expansion,
        }
    }
}

/// First conv block: conv1 + bn1 + relu + maxpool
#[derive(Module, Debug)]
pub struct Conv1Block<B: Backend> {
    conv1: Conv2d<B>,
    bn1: BatchNorm<B, 2>,
    relu: Relu,
    maxpool: MaxPool2d,
}

impl<B: Backend> Conv1Block<B> {
    pub fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv1.forward(input);
        let out = self.bn1.forward(out);
        let out = self.relu.forward(out);
        self.maxpool.forward(out)
    }

    /// Create a new Conv1Block.
    pub fn new(in_channels: usize, out_channels: usize, device: &Device<B>) -> Self {
        let initializer = Initializer::KaimingNormal {
            gain: SQRT_2,
            fan_out_only: true,
        };

        let conv1 = Conv2dConfig::new([in_channels, out_channels], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .with_initializer(initializer)
            .init(device);

        let bn1 = BatchNormConfig::new(out_channels).init(device);

        // 3x3 maxpool, stride=2, padding=1
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        Self {
            conv1,
            bn1,
            relu: Relu::new(),
            maxpool,
        }
    }
}
