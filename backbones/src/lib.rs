//! Backbone implementations for segmentation heads.
//!
//! Heads only see the [`Backbone`] capability: an image goes in, four feature maps
//! (shallow to deep) come out. Concrete networks are wrapped in [`BackboneWrapper`] so
//! they can live inside a Burn `Module`.

use burn::prelude::*;

pub use resnet::ResNetBackbone;

/// Feature extractor capability consumed by the segmentation heads.
pub trait Backbone<B: Backend> {
    /// Runs the trunk and returns `[c1, c2, c3, c4]`, shallow to deep.
    ///
    /// # Arguments
    /// * `input` - Input tensor of shape `[batch_size, 3, height, width]`
    fn extract_features(&self, input: Tensor<B, 4>) -> [Tensor<B, 4>; 4];

    /// Channel count of each returned feature map.
    fn output_channels(&self) -> [usize; 4];
}

impl<B: Backend> Backbone<B> for ResNetBackbone<B> {
    fn extract_features(&self, input: Tensor<B, 4>) -> [Tensor<B, 4>; 4] {
        self.forward(input)
    }

    fn output_channels(&self) -> [usize; 4] {
        ResNetBackbone::output_channels(self)
    }
}

/// Enumeration of supported backbone types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackboneType {
    /// ResNet backbone
    ResNet(ResNetVariant),
}

/// ResNet variants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResNetVariant {
    /// ResNet-18
    ResNet18,
    /// ResNet-34
    ResNet34,
    /// ResNet-50
    ResNet50,
    /// ResNet-101
    ResNet101,
    /// ResNet-152
    ResNet152,
}

/// Enum to wrap different backbone implementations
#[derive(Module, Debug)]
pub enum BackboneWrapper<B: Backend> {
    /// ResNet backbone
    ResNet(ResNetBackbone<B>),
}

impl<B: Backend> Backbone<B> for BackboneWrapper<B> {
    fn extract_features(&self, input: Tensor<B, 4>) -> [Tensor<B, 4>; 4] {
        match self {
            Self::ResNet(backbone) => backbone.forward(input),
        }
    }

    fn output_channels(&self) -> [usize; 4] {
        match self {
            Self::ResNet(backbone) => backbone.output_channels(),
        }
    }
}

/// Factory function to create backbones.
///
/// `dilated` replaces the striding of the last two stages with dilation, keeping the
/// deepest features at 1/8 of the input resolution.
pub fn create_backbone<B: Backend>(
    backbone_type: BackboneType,
    dilated: bool,
    device: &Device<B>,
) -> BackboneWrapper<B> {
    match backbone_type {
        BackboneType::ResNet(variant) => {
            let backbone = match variant {
                ResNetVariant::ResNet18 => ResNetBackbone::resnet18(dilated, device),
                ResNetVariant::ResNet34 => ResNetBackbone::resnet34(dilated, device),
                ResNetVariant::ResNet50 => ResNetBackbone::resnet50(dilated, device),
                ResNetVariant::ResNet101 => ResNetBackbone::resnet101(dilated, device),
                ResNetVariant::ResNet152 => ResNetBackbone::resnet152(dilated, device),
            };
            BackboneWrapper::ResNet(backbone)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_resnet_backbone() {
        let device = Default::default();
        let backbone = create_backbone::<TestBackend>(
            BackboneType::ResNet(ResNetVariant::ResNet50),
            false,
            &device,
        );

        let input = Tensor::<TestBackend, 4>::random(
            [1, 3, 224, 224],
            burn::tensor::Distribution::Normal(0.0, 1.0),
            &device,
        );

        let output = backbone.extract_features(input);
        let channels = backbone.output_channels();

        assert_eq!(channels, [256, 512, 1024, 2048]);
        for (feature, channels) in output.iter().zip(channels) {
            assert_eq!(feature.dims()[1], channels);
        }
        assert_eq!(output[3].dims(), [1, 2048, 7, 7]);
    }

    #[test]
    fn test_basic_block_backbone_channels() {
        let device = Default::default();
        let backbone = create_backbone::<TestBackend>(
            BackboneType::ResNet(ResNetVariant::ResNet34),
            true,
            &device,
        );

        assert_eq!(backbone.output_channels(), [64, 128, 256, 512]);
    }
}
